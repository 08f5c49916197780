//! Calendar periods, timestamp parsing and CF time decoding.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatacubeError, Result};

/// Length of a temporal bucket.
///
/// Month and year periods are aligned to the calendar; day periods are
/// aligned to midnight of the first sample's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "unit", content = "count", rename_all = "lowercase")]
pub enum TimePeriod {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl TimePeriod {
    /// Parse a pandas-style frequency token (`D`, `10D`, `W`, `ME`, `3ME`,
    /// `QE`, `YE`, ...) or a word (`daily`, `monthly`, `quarterly`, ...).
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let word = trimmed.to_ascii_lowercase();
        match word.as_str() {
            "daily" | "day" => return Ok(Self::Days(1)),
            "weekly" | "week" => return Ok(Self::Days(7)),
            "monthly" | "month" => return Ok(Self::Months(1)),
            "quarterly" | "quarter" => return Ok(Self::Months(3)),
            "yearly" | "annual" | "annually" | "year" => return Ok(Self::Years(1)),
            _ => {}
        }

        let upper = trimmed.to_ascii_uppercase();
        let digits_end = upper
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(upper.len());
        let (count, unit) = upper.split_at(digits_end);
        let n: u32 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| DatacubeError::value(format!("invalid period count in '{}'", s)))?
        };
        if n == 0 {
            return Err(DatacubeError::value(format!(
                "period length must be positive: '{}'",
                s
            )));
        }

        match unit {
            "D" => Ok(Self::Days(n)),
            "W" => Ok(Self::Days(7 * n)),
            "M" | "ME" | "MS" => Ok(Self::Months(n)),
            "Q" | "QE" | "QS" => Ok(Self::Months(3 * n)),
            "Y" | "YE" | "YS" | "A" | "AS" => Ok(Self::Years(n)),
            _ => Err(DatacubeError::value(format!(
                "unknown time resolution '{}'",
                s
            ))),
        }
    }

    /// Shortest possible duration of one period.
    pub fn min_duration(&self) -> Duration {
        match *self {
            Self::Days(n) => Duration::days(n as i64),
            Self::Months(n) => Duration::days(28 * n as i64),
            Self::Years(n) => Duration::days(365 * n as i64),
        }
    }

    /// Canonical token, e.g. `"3ME"` or `"YE"`.
    pub fn token(&self) -> String {
        let (n, unit) = match *self {
            Self::Days(n) => (n, "D"),
            Self::Months(n) => (n, "ME"),
            Self::Years(n) => (n, "YE"),
        };
        if n == 1 {
            unit.to_string()
        } else {
            format!("{}{}", n, unit)
        }
    }

    /// Pick the period that best matches a native sampling step.
    pub fn from_step(step: Duration) -> Self {
        let days = step.num_days();
        if days >= 365 {
            Self::Years(1)
        } else if days >= 28 {
            Self::Months(1)
        } else {
            Self::Days(days.max(1) as u32)
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = DatacubeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Assigns timestamps to periods and recovers period start labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodGrouper {
    period: TimePeriod,
    origin: NaiveDate,
}

impl PeriodGrouper {
    /// `first` anchors day periods; month and year periods ignore it.
    pub fn new(period: TimePeriod, first: DateTime<Utc>) -> Self {
        Self {
            period,
            origin: first.date_naive(),
        }
    }

    pub fn period(&self) -> TimePeriod {
        self.period
    }

    /// Integer key of the period containing `t`. Keys of consecutive periods
    /// differ by one.
    pub fn key(&self, t: DateTime<Utc>) -> i64 {
        match self.period {
            TimePeriod::Days(n) => {
                let days = (t.date_naive() - self.origin).num_days();
                days.div_euclid(n as i64)
            }
            TimePeriod::Months(n) => {
                let months = t.year() as i64 * 12 + t.month0() as i64;
                months.div_euclid(n as i64)
            }
            TimePeriod::Years(n) => (t.year() as i64).div_euclid(n as i64),
        }
    }

    /// First instant (00:00 UTC) of the period with the given key.
    pub fn start(&self, key: i64) -> Result<DateTime<Utc>> {
        let date = match self.period {
            TimePeriod::Days(n) => self
                .origin
                .checked_add_signed(Duration::days(key * n as i64)),
            TimePeriod::Months(n) => {
                let months = key * n as i64;
                let year = months.div_euclid(12);
                let month = months.rem_euclid(12) as u32 + 1;
                i32::try_from(year)
                    .ok()
                    .and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
            }
            TimePeriod::Years(n) => i32::try_from(key * n as i64)
                .ok()
                .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
        };
        let date = date
            .ok_or_else(|| DatacubeError::value(format!("period {} is out of range", key)))?;
        midnight(date)
    }
}

fn midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    let ndt = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DatacubeError::value(format!("invalid date {}", date)))?;
    Ok(Utc.from_utc_datetime(&ndt))
}

/// Parse an ISO-8601-ish timestamp. Missing timezone means UTC; a bare date
/// means midnight.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return midnight(date);
    }

    Err(DatacubeError::value(format!("invalid timestamp '{}'", s)))
}

/// Decode CF-convention numeric times (`"days since 1900-01-01"`).
pub fn decode_cf_time(units: &str, values: &[f64]) -> Result<Vec<DateTime<Utc>>> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| DatacubeError::format(format!("unsupported time units '{}'", units)))?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "days" | "day" | "d" => 86_400.0,
        "hours" | "hour" | "h" => 3_600.0,
        "minutes" | "minute" | "min" => 60.0,
        "seconds" | "second" | "s" => 1.0,
        other => {
            return Err(DatacubeError::format(format!(
                "unsupported CF time unit '{}'",
                other
            )))
        }
    };

    // "1900-1-1 00:00:00 UTC" style references
    let reference = reference.trim().trim_end_matches("UTC").trim();
    let origin = parse_datetime(reference)
        .or_else(|_| {
            reference
                .split_whitespace()
                .next()
                .ok_or_else(|| DatacubeError::format("empty time reference"))
                .and_then(parse_datetime)
        })
        .map_err(|_| DatacubeError::format(format!("invalid time reference in '{}'", units)))?;

    values
        .iter()
        .map(|v| {
            if !v.is_finite() {
                return Err(DatacubeError::format("non-finite time coordinate"));
            }
            let millis = (v * seconds_per_unit * 1000.0).round() as i64;
            origin
                .checked_add_signed(Duration::milliseconds(millis))
                .ok_or_else(|| DatacubeError::format(format!("time value {} out of range", v)))
        })
        .collect()
}

/// Minimum positive spacing between consecutive timestamps.
pub fn min_time_step(times: &[DateTime<Utc>]) -> Option<Duration> {
    times
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > Duration::zero())
        .min()
}

/// Human label for a sampling cadence: `daily`, `monthly`, `yearly`,
/// `<n>-day` or `single-timepoint`.
pub fn resolution_label(times: &[DateTime<Utc>]) -> String {
    let Some(step) = min_time_step(times) else {
        return "single-timepoint".to_string();
    };
    match step.num_days() {
        1 => "daily".to_string(),
        28..=31 => "monthly".to_string(),
        365..=366 => "yearly".to_string(),
        days => format!("{}-day", days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_pandas_tokens() {
        assert_eq!(TimePeriod::parse("ME").unwrap(), TimePeriod::Months(1));
        assert_eq!(TimePeriod::parse("M").unwrap(), TimePeriod::Months(1));
        assert_eq!(TimePeriod::parse("3ME").unwrap(), TimePeriod::Months(3));
        assert_eq!(TimePeriod::parse("QE").unwrap(), TimePeriod::Months(3));
        assert_eq!(TimePeriod::parse("YE").unwrap(), TimePeriod::Years(1));
        assert_eq!(TimePeriod::parse("A").unwrap(), TimePeriod::Years(1));
        assert_eq!(TimePeriod::parse("10D").unwrap(), TimePeriod::Days(10));
        assert_eq!(TimePeriod::parse("W").unwrap(), TimePeriod::Days(7));
        assert_eq!(TimePeriod::parse("quarterly").unwrap(), TimePeriod::Months(3));
    }

    #[test]
    fn test_parse_rejects_unknown_and_zero() {
        assert!(TimePeriod::parse("fortnightly").is_err());
        assert!(TimePeriod::parse("0ME").is_err());
        assert!(TimePeriod::parse("").is_err());
    }

    #[test]
    fn test_token_round_trips_through_parse() {
        for p in [TimePeriod::Days(5), TimePeriod::Months(1), TimePeriod::Years(2)] {
            assert_eq!(TimePeriod::parse(&p.token()).unwrap(), p);
        }
    }

    #[test]
    fn test_quarter_grouping_is_calendar_aligned() {
        let g = PeriodGrouper::new(TimePeriod::Months(3), ymd(2021, 2, 15));
        let feb = g.key(ymd(2021, 2, 15));
        assert_eq!(g.key(ymd(2021, 1, 1)), feb);
        assert_eq!(g.key(ymd(2021, 3, 31)), feb);
        assert_eq!(g.key(ymd(2021, 4, 1)), feb + 1);
        assert_eq!(g.start(feb).unwrap(), ymd(2021, 1, 1));
        assert_eq!(g.start(feb + 1).unwrap(), ymd(2021, 4, 1));
    }

    #[test]
    fn test_day_grouping_anchors_on_first_sample() {
        let g = PeriodGrouper::new(TimePeriod::Days(10), ymd(2021, 1, 5));
        assert_eq!(g.key(ymd(2021, 1, 5)), 0);
        assert_eq!(g.key(ymd(2021, 1, 14)), 0);
        assert_eq!(g.key(ymd(2021, 1, 15)), 1);
        assert_eq!(g.start(1).unwrap(), ymd(2021, 1, 15));
    }

    #[test]
    fn test_year_grouping() {
        let g = PeriodGrouper::new(TimePeriod::Years(1), ymd(2020, 6, 1));
        assert_eq!(g.key(ymd(2020, 12, 31)), 2020);
        assert_eq!(g.start(2021).unwrap(), ymd(2021, 1, 1));
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert_eq!(parse_datetime("2021-03-01").unwrap(), ymd(2021, 3, 1));
        assert_eq!(
            parse_datetime("2021-03-01T12:00:00Z").unwrap(),
            Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap()
        );
        assert!(parse_datetime("yesterday").is_err());
    }

    #[test]
    fn test_decode_cf_time() {
        let times = decode_cf_time("days since 1900-01-01 00:00:00", &[0.0, 31.0]).unwrap();
        assert_eq!(times, vec![ymd(1900, 1, 1), ymd(1900, 2, 1)]);

        let hours = decode_cf_time("hours since 2000-01-01", &[24.0]).unwrap();
        assert_eq!(hours[0], ymd(2000, 1, 2));

        assert!(decode_cf_time("months since 2000-01-01", &[1.0]).is_err());
        assert!(decode_cf_time("days", &[1.0]).is_err());
    }

    #[test]
    fn test_resolution_label() {
        let monthly = vec![ymd(2021, 1, 1), ymd(2021, 2, 1), ymd(2021, 3, 1)];
        assert_eq!(resolution_label(&monthly), "monthly");
        assert_eq!(resolution_label(&[ymd(2021, 1, 1)]), "single-timepoint");
        assert_eq!(
            resolution_label(&[ymd(2021, 1, 1), ymd(2021, 1, 6)]),
            "5-day"
        );
    }

    #[test]
    fn test_from_step() {
        assert_eq!(TimePeriod::from_step(Duration::days(31)), TimePeriod::Months(1));
        assert_eq!(TimePeriod::from_step(Duration::days(365)), TimePeriod::Years(1));
        assert_eq!(TimePeriod::from_step(Duration::hours(6)), TimePeriod::Days(1));
        assert_eq!(TimePeriod::from_step(Duration::days(5)), TimePeriod::Days(5));
    }
}
