//! The common grid every dataset is regridded onto.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cube_common::time::min_time_step;
use cube_common::{
    checked_axis_len, min_spacing, BoundingBox, DatacubeError, GriddedDataset, PeriodGrouper,
    Result, TimePeriod, LAT, LON,
};
use grid_bucketing::InterpolationMethod;

/// Slack so that a bound lying exactly on a grid step does not add a point.
const AXIS_EPSILON: f64 = 1e-9;

/// Parameters of a build.
///
/// Anything left `None` is derived from the registered datasets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Latitude spacing in degrees (default: coarsest native step)
    pub lat_resolution: Option<f64>,
    /// Longitude spacing in degrees (default: coarsest native step)
    pub lon_resolution: Option<f64>,
    /// Period of the time axis (default: from the coarsest native time step)
    pub time_resolution: Option<TimePeriod>,
    pub interpolation: InterpolationMethod,
    /// Replaces missing cells in the finished cube
    pub fill_value: Option<f64>,
    /// `(min_lat, max_lat)`
    pub lat_bounds: Option<(f64, f64)>,
    /// `(min_lon, max_lon)`
    pub lon_bounds: Option<(f64, f64)>,
    pub time_bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl BuildOptions {
    pub fn new(lat_resolution: f64, lon_resolution: f64) -> Self {
        Self {
            lat_resolution: Some(lat_resolution),
            lon_resolution: Some(lon_resolution),
            ..Self::default()
        }
    }

    pub fn with_time_resolution(mut self, period: TimePeriod) -> Self {
        self.time_resolution = Some(period);
        self
    }

    pub fn with_interpolation(mut self, method: InterpolationMethod) -> Self {
        self.interpolation = method;
        self
    }

    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = Some(fill_value);
        self
    }

    /// Restrict the grid to a region instead of the union of extents.
    pub fn with_region(mut self, region: &BoundingBox) -> Self {
        self.lat_bounds = Some((region.min_lat, region.max_lat));
        self.lon_bounds = Some((region.min_lon, region.max_lon));
        self
    }

    pub fn with_time_bounds(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_bounds = Some((start, end));
        self
    }
}

/// Coordinates shared by every variable of a unified datacube.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub lat: Vec<f64>,
    pub lon: Vec<f64>,
    pub time: Option<Vec<DateTime<Utc>>>,
    pub lat_resolution: f64,
    pub lon_resolution: f64,
    pub time_resolution: Option<TimePeriod>,
    grouper: Option<PeriodGrouper>,
}

impl TargetGrid {
    /// Derive the grid for `datasets` under `options`.
    pub fn derive<'a>(
        datasets: impl IntoIterator<Item = &'a GriddedDataset> + Clone,
        options: &BuildOptions,
    ) -> Result<Self> {
        let lat_resolution = resolve_resolution(
            "latitude",
            options.lat_resolution,
            datasets.clone().into_iter().map(|d| d.lat()),
        )?;
        let lon_resolution = resolve_resolution(
            "longitude",
            options.lon_resolution,
            datasets.clone().into_iter().map(|d| d.lon()),
        )?;

        let union = datasets
            .clone()
            .into_iter()
            .filter_map(GriddedDataset::extent)
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| DatacubeError::empty_dataset("no dataset has coordinates"))?;
        let (min_lat, max_lat) = resolve_bounds("latitude", options.lat_bounds, (union.min_lat, union.max_lat))?;
        let (min_lon, max_lon) = resolve_bounds("longitude", options.lon_bounds, (union.min_lon, union.max_lon))?;

        let timed: Vec<&[DateTime<Utc>]> =
            datasets.into_iter().filter_map(GriddedDataset::time).collect();
        let (time, time_resolution, grouper) = if timed.is_empty() {
            (None, None, None)
        } else {
            let period = options.time_resolution.unwrap_or_else(|| {
                let coarsest = timed.iter().filter_map(|t| min_time_step(t)).max();
                TimePeriod::from_step(coarsest.unwrap_or_else(|| chrono::Duration::days(1)))
            });
            let (start, end) = match options.time_bounds {
                Some((start, end)) if start <= end => (start, end),
                Some((start, end)) => {
                    return Err(DatacubeError::value(format!(
                        "time bounds are inverted: {} > {}",
                        start, end
                    )))
                }
                None => {
                    let start = timed.iter().filter_map(|t| t.first()).min();
                    let end = timed.iter().filter_map(|t| t.last()).max();
                    match (start, end) {
                        (Some(&s), Some(&e)) => (s, e),
                        _ => return Err(DatacubeError::empty_dataset("empty time axis")),
                    }
                }
            };

            let grouper = PeriodGrouper::new(period, start);
            let labels = (grouper.key(start)..=grouper.key(end))
                .map(|key| grouper.start(key))
                .collect::<Result<Vec<_>>>()?;
            (Some(labels), Some(period), Some(grouper))
        };

        let grid = Self {
            lat: axis_points(LAT, min_lat, max_lat, lat_resolution)?,
            lon: axis_points(LON, min_lon, max_lon, lon_resolution)?,
            time,
            lat_resolution,
            lon_resolution,
            time_resolution,
            grouper,
        };

        debug!(
            nlat = grid.lat.len(),
            nlon = grid.lon.len(),
            ntime = grid.time.as_ref().map_or(0, Vec::len),
            lat_resolution = grid.lat_resolution,
            lon_resolution = grid.lon_resolution,
            time_resolution = ?grid.time_resolution.map(|p| p.token()),
            "Derived target grid"
        );
        Ok(grid)
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    pub fn ntime(&self) -> usize {
        self.time.as_ref().map_or(0, Vec::len)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.lon[0],
            self.lat[0],
            self.lon[self.lon.len() - 1],
            self.lat[self.lat.len() - 1],
        )
    }

    /// For each target time step, the index of the earliest source sample
    /// falling in that period.
    pub fn time_sources(&self, source: &[DateTime<Utc>]) -> Vec<Option<usize>> {
        let (Some(labels), Some(grouper)) = (&self.time, &self.grouper) else {
            return Vec::new();
        };
        let Some(first) = labels.first().map(|t| grouper.key(*t)) else {
            return Vec::new();
        };

        let mut picks = vec![None; labels.len()];
        for (idx, t) in source.iter().enumerate() {
            let offset = grouper.key(*t) - first;
            if offset < 0 || offset as usize >= picks.len() {
                continue;
            }
            let slot = offset as usize;
            let earlier = match picks[slot] {
                Some(prev) => *t < source[prev],
                None => true,
            };
            if earlier {
                picks[slot] = Some(idx);
            }
        }
        picks
    }
}

/// `min + k * res` for `k = 0..=ceil((max - min) / res)`, so the last point
/// reaches at least `max`.
///
/// Fails with `Value` when the axis would exceed [`MAX_AXIS_LEN`](cube_common::MAX_AXIS_LEN) points.
pub fn axis_points(axis: &str, min: f64, max: f64, res: f64) -> Result<Vec<f64>> {
    let steps = ((max - min) / res - AXIS_EPSILON).ceil().max(0.0);
    let n = checked_axis_len(axis, steps + 1.0)?;
    Ok((0..n).map(|k| min + k as f64 * res).collect())
}

fn resolve_resolution<'a>(
    axis: &str,
    requested: Option<f64>,
    axes: impl Iterator<Item = &'a [f64]>,
) -> Result<f64> {
    let res = match requested {
        Some(res) => res,
        None => axes.filter_map(min_spacing).fold(None, |acc: Option<f64>, s| {
            Some(acc.map_or(s, |a| a.max(s)))
        })
        .ok_or_else(|| {
            DatacubeError::resolution(format!(
                "cannot derive a {} resolution from single-sample axes",
                axis
            ))
        })?,
    };
    if !(res.is_finite() && res > 0.0) {
        return Err(DatacubeError::value(format!(
            "{} resolution must be positive and finite, got {}",
            axis, res
        )));
    }
    Ok(res)
}

fn resolve_bounds(axis: &str, requested: Option<(f64, f64)>, union: (f64, f64)) -> Result<(f64, f64)> {
    let (min, max) = requested.unwrap_or(union);
    if !(min.is_finite() && max.is_finite() && min <= max) {
        return Err(DatacubeError::value(format!(
            "invalid {} bounds ({}, {})",
            axis, min, max
        )));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_utils::{continuous_dataset, monthly_times, regular_axis, temperature_dataset};

    #[test]
    fn test_axis_points_cover_max() {
        assert_eq!(axis_points(LAT, 0.0, 1.0, 0.5).unwrap(), vec![0.0, 0.5, 1.0]);
        assert_eq!(axis_points(LAT, 0.0, 1.1, 0.5).unwrap(), vec![0.0, 0.5, 1.0, 1.5]);
        assert_eq!(axis_points(LAT, 2.0, 2.0, 0.5).unwrap(), vec![2.0]);
        assert_eq!(axis_points(LAT, 0.75, 2.5, 0.1).unwrap().len(), 19);
    }

    #[test]
    fn test_tiny_resolution_is_value_error() {
        let err = axis_points(LON, 0.0, 2.0, 1e-300).unwrap_err();
        assert_eq!(err.code(), "ValueError");

        let ds = temperature_dataset("a", 0.0, 0.0, 2.0, 0.5, 1);
        let err = TargetGrid::derive([&ds], &BuildOptions::new(1e-9, 1e-9)).unwrap_err();
        assert_eq!(err.code(), "ValueError");
    }

    #[test]
    fn test_derive_is_deterministic() {
        let ds = temperature_dataset("a", 0.0, 0.0, 2.0, 0.5, 3);
        let options = BuildOptions::new(0.25, 0.25);
        let first = TargetGrid::derive([&ds], &options).unwrap();
        let second = TargetGrid::derive([&ds], &options).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_derive_coarsest_and_union() {
        let fine = temperature_dataset("a", 0.0, 0.0, 2.0, 0.5, 2);
        let coarse = temperature_dataset("b", 1.0, 1.0, 2.0, 1.0, 3);
        let grid = TargetGrid::derive([&fine, &coarse], &BuildOptions::default()).unwrap();

        assert_eq!(grid.lat_resolution, 1.0);
        assert_eq!(grid.lat[0], 0.25);
        assert!(*grid.lat.last().unwrap() >= 2.5);
        assert_eq!(grid.time_resolution, Some(TimePeriod::Months(1)));
        assert_eq!(
            grid.time.as_ref().unwrap()[0],
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(grid.ntime(), 3);
    }

    #[test]
    fn test_no_time_axis_when_all_static() {
        let ds = continuous_dataset(
            "elev",
            "z",
            regular_axis(0.0, 1.0, 3),
            regular_axis(0.0, 1.0, 3),
            None,
            |_, i, j| (i + j) as f64,
        );
        let grid = TargetGrid::derive([&ds], &BuildOptions::new(0.5, 0.5)).unwrap();
        assert!(grid.time.is_none());
        assert_eq!(grid.nlat(), 5);
        assert!(grid.time_sources(&[]).is_empty());
    }

    #[test]
    fn test_explicit_bounds_and_bad_resolution() {
        let ds = temperature_dataset("a", 0.0, 0.0, 2.0, 0.5, 2);
        let options = BuildOptions::new(0.5, 0.5).with_region(&BoundingBox::new(1.0, 1.0, 2.0, 1.5));
        let grid = TargetGrid::derive([&ds], &options).unwrap();
        assert_eq!(grid.lat, vec![1.0, 1.5]);
        assert_eq!(grid.lon, vec![1.0, 1.5, 2.0]);

        let err = TargetGrid::derive([&ds], &BuildOptions::new(0.0, 0.5)).unwrap_err();
        assert_eq!(err.code(), "ValueError");
    }

    #[test]
    fn test_time_sources_pick_earliest_in_period() {
        let ds = temperature_dataset("a", 0.0, 0.0, 1.0, 0.5, 2);
        let options = BuildOptions::new(0.5, 0.5).with_time_resolution(TimePeriod::Months(3));
        let grid = TargetGrid::derive([&ds], &options).unwrap();
        assert_eq!(grid.ntime(), 1);

        let mut source = monthly_times(2021, 1, 5);
        source.swap(0, 2);
        // Jan-Mar holds source indices 0 (Mar), 1 (Feb), 2 (Jan): Jan wins.
        assert_eq!(grid.time_sources(&source), vec![Some(2)]);
    }
}
