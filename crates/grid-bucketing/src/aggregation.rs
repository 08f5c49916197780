//! Reducers applied to the samples that fall in one bucket.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cube_common::{DatacubeError, Result};

/// Statistic used to collapse a bucket to one value.
///
/// Every reducer ignores missing (`NaN`) samples; a bucket with no valid
/// samples stays missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMethod {
    #[default]
    Mean,
    Median,
    Min,
    Max,
    Sum,
    /// Most frequent value, ties broken by the lowest value.
    Mode,
    /// First valid sample in traversal order.
    First,
    /// Last valid sample in traversal order.
    Last,
    /// Population standard deviation.
    Std,
    /// Population variance.
    Var,
}

impl AggregationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Mode => "mode",
            Self::First => "first",
            Self::Last => "last",
            Self::Std => "std",
            Self::Var => "var",
        }
    }

    /// Collapse `values` to a single value.
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let mut valid = values.iter().copied().filter(|v| !v.is_nan());

        match self {
            Self::First => valid.next().unwrap_or(f64::NAN),
            Self::Last => valid.last().unwrap_or(f64::NAN),
            Self::Min => valid.reduce(f64::min).unwrap_or(f64::NAN),
            Self::Max => valid.reduce(f64::max).unwrap_or(f64::NAN),
            Self::Sum => valid.reduce(|a, b| a + b).unwrap_or(f64::NAN),
            Self::Mean => {
                let (sum, count) = valid.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
            Self::Median => {
                let mut sorted: Vec<f64> = valid.collect();
                if sorted.is_empty() {
                    return f64::NAN;
                }
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Self::Mode => {
                let mut sorted: Vec<f64> = valid.collect();
                sorted.sort_by(f64::total_cmp);
                mode_of_sorted(&sorted)
            }
            Self::Std | Self::Var => {
                let samples: Vec<f64> = valid.collect();
                if samples.is_empty() {
                    return f64::NAN;
                }
                let n = samples.len() as f64;
                let mean = samples.iter().sum::<f64>() / n;
                let var = samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                if *self == Self::Std {
                    var.sqrt()
                } else {
                    var
                }
            }
        }
    }
}

/// Longest run in an ascending slice; the first (lowest) run wins ties.
fn mode_of_sorted(sorted: &[f64]) -> f64 {
    let mut best = f64::NAN;
    let mut best_len = 0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_len {
            best_len = j - i;
            best = sorted[i];
        }
        i = j;
    }
    best
}

impl FromStr for AggregationMethod {
    type Err = DatacubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "sum" => Ok(Self::Sum),
            "mode" | "majority" => Ok(Self::Mode),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "std" => Ok(Self::Std),
            "var" => Ok(Self::Var),
            other => Err(DatacubeError::value(format!(
                "unknown aggregation method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_mode_picks_most_frequent() {
        assert_eq!(AggregationMethod::Mode.reduce(&[3.0, 3.0, 1.0, 2.0]), 3.0);
    }

    #[test]
    fn test_mode_tie_breaks_to_lowest() {
        assert_eq!(AggregationMethod::Mode.reduce(&[1.0, 1.0, 2.0, 2.0]), 1.0);
        assert_eq!(AggregationMethod::Mode.reduce(&[2.0, 2.0, 1.0, 1.0]), 1.0);
        assert_eq!(AggregationMethod::Mode.reduce(&[42.0, 7.0, 42.0, 7.0, NAN]), 7.0);
    }

    #[test]
    fn test_reducers_ignore_missing() {
        let values = [1.0, NAN, 3.0, 8.0];
        assert_eq!(AggregationMethod::Mean.reduce(&values), 4.0);
        assert_eq!(AggregationMethod::Median.reduce(&values), 3.0);
        assert_eq!(AggregationMethod::Min.reduce(&values), 1.0);
        assert_eq!(AggregationMethod::Max.reduce(&values), 8.0);
        assert_eq!(AggregationMethod::Sum.reduce(&values), 12.0);
        assert_eq!(AggregationMethod::First.reduce(&[NAN, 5.0, 6.0]), 5.0);
        assert_eq!(AggregationMethod::Last.reduce(&[5.0, 6.0, NAN]), 6.0);
    }

    #[test]
    fn test_all_missing_stays_missing() {
        for method in [
            AggregationMethod::Mean,
            AggregationMethod::Median,
            AggregationMethod::Mode,
            AggregationMethod::Sum,
            AggregationMethod::Std,
            AggregationMethod::First,
        ] {
            assert!(method.reduce(&[NAN, NAN]).is_nan(), "{} should be NaN", method);
            assert!(method.reduce(&[]).is_nan(), "{} should be NaN", method);
        }
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(AggregationMethod::Median.reduce(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_population_statistics() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((AggregationMethod::Var.reduce(&values) - 4.0).abs() < 1e-12);
        assert!((AggregationMethod::Std.reduce(&values) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!("MEAN".parse::<AggregationMethod>().unwrap(), AggregationMethod::Mean);
        assert_eq!("majority".parse::<AggregationMethod>().unwrap(), AggregationMethod::Mode);
        let err = "harmonic".parse::<AggregationMethod>().unwrap_err();
        assert_eq!(err.code(), "ValueError");
    }
}
