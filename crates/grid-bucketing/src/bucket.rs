//! The bucketing engine: group-by reductions over space and time.
//!
//! Spatial bins are contiguous intervals of a fixed size starting at the
//! minimum coordinate of each axis; every source cell lands in exactly one
//! bin. Temporal bins are calendar periods (see [`TimePeriod`]).
//!
//! Combined bucketing runs one pass over the output cells: each source time
//! sample of a period is first reduced spatially, then the per-sample results
//! are reduced temporally. Applying [`bucket_spatial`] and then
//! [`bucket_temporal`] runs the exact same reductions in the same order, so the
//! two paths agree cell for cell.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cube_common::time::PeriodGrouper;
use cube_common::{
    checked_axis_len, DatacubeError, GriddedDataset, Result, TimePeriod, Variable, LAT, LON,
};

use crate::aggregation::AggregationMethod;
use crate::policy::check_aggregation;

/// Slack for coordinates that sit on a bin edge up to rounding error.
const BIN_EPSILON: f64 = 1e-9;

/// What to bucket and how.
///
/// Spatial bucketing runs when both cell sizes are set, temporal bucketing
/// when a period is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub lat_cell_size: Option<f64>,
    pub lon_cell_size: Option<f64>,
    pub period: Option<TimePeriod>,
    pub spatial_method: AggregationMethod,
    pub temporal_method: AggregationMethod,
}

impl BucketSpec {
    pub fn spatial(lat_cell_size: f64, lon_cell_size: f64, method: AggregationMethod) -> Self {
        Self {
            lat_cell_size: Some(lat_cell_size),
            lon_cell_size: Some(lon_cell_size),
            period: None,
            spatial_method: method,
            temporal_method: method,
        }
    }

    pub fn temporal(period: TimePeriod, method: AggregationMethod) -> Self {
        Self {
            lat_cell_size: None,
            lon_cell_size: None,
            period: Some(period),
            spatial_method: method,
            temporal_method: method,
        }
    }

    pub fn combined(
        lat_cell_size: f64,
        lon_cell_size: f64,
        period: TimePeriod,
        spatial_method: AggregationMethod,
        temporal_method: AggregationMethod,
    ) -> Self {
        Self {
            lat_cell_size: Some(lat_cell_size),
            lon_cell_size: Some(lon_cell_size),
            period: Some(period),
            spatial_method,
            temporal_method,
        }
    }

    /// No bucketing at all: every cell is its own bin.
    pub fn identity() -> Self {
        Self {
            lat_cell_size: None,
            lon_cell_size: None,
            period: None,
            spatial_method: AggregationMethod::default(),
            temporal_method: AggregationMethod::default(),
        }
    }

    /// Both spatial cell sizes, if spatial bucketing is requested.
    pub fn cell_sizes(&self) -> Result<Option<(f64, f64)>> {
        match (self.lat_cell_size, self.lon_cell_size) {
            (Some(lat), Some(lon)) => {
                for (axis, size) in [("lat", lat), ("lon", lon)] {
                    if !(size.is_finite() && size > 0.0) {
                        return Err(DatacubeError::value(format!(
                            "{} cell size must be positive and finite, got {}",
                            axis, size
                        )));
                    }
                }
                Ok(Some((lat, lon)))
            }
            (None, None) => Ok(None),
            _ => Err(DatacubeError::value(
                "spatial bucketing needs both lat and lon cell sizes",
            )),
        }
    }
}

/// Output of the bucketing engine.
///
/// Coordinates are bin centers; `counts` records how many source cells fed
/// each output cell (laid out like a time-varying variable, or `[lat][lon]`
/// without a time axis).
#[derive(Debug, Clone, PartialEq)]
pub struct BucketedDataset {
    dataset: GriddedDataset,
    counts: Vec<u32>,
    lat_edges: Vec<f64>,
    lon_edges: Vec<f64>,
    spec: BucketSpec,
}

impl BucketedDataset {
    pub fn dataset(&self) -> &GriddedDataset {
        &self.dataset
    }

    pub fn into_dataset(self) -> GriddedDataset {
        self.dataset
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Contributing source cells for output cell `(t, i, j)`; `t` is ignored
    /// without a time axis.
    pub fn count(&self, t: usize, i: usize, j: usize) -> Option<u32> {
        let plane = self.dataset.plane_len();
        let t = if self.dataset.time().is_some() { t } else { 0 };
        self.counts
            .get(t * plane + i * self.dataset.nlon() + j)
            .copied()
    }

    pub fn lat_edges(&self) -> &[f64] {
        &self.lat_edges
    }

    pub fn lon_edges(&self) -> &[f64] {
        &self.lon_edges
    }

    pub fn spec(&self) -> &BucketSpec {
        &self.spec
    }
}

impl From<BucketedDataset> for GriddedDataset {
    fn from(bucketed: BucketedDataset) -> Self {
        bucketed.dataset
    }
}

impl From<&BucketedDataset> for GriddedDataset {
    fn from(bucketed: &BucketedDataset) -> Self {
        bucketed.dataset.clone()
    }
}

/// Aggregate into `lat_cell_size` × `lon_cell_size` bins.
pub fn bucket_spatial(
    dataset: &GriddedDataset,
    lat_cell_size: f64,
    lon_cell_size: f64,
    method: AggregationMethod,
) -> Result<BucketedDataset> {
    bucket_with_spec(
        dataset,
        &BucketSpec::spatial(lat_cell_size, lon_cell_size, method),
    )
}

/// Aggregate time samples into calendar periods.
pub fn bucket_temporal(
    dataset: &GriddedDataset,
    period: TimePeriod,
    method: AggregationMethod,
) -> Result<BucketedDataset> {
    bucket_with_spec(dataset, &BucketSpec::temporal(period, method))
}

/// Spatial and temporal aggregation in a single pass.
pub fn bucket(
    dataset: &GriddedDataset,
    lat_cell_size: f64,
    lon_cell_size: f64,
    period: TimePeriod,
    spatial_method: AggregationMethod,
    temporal_method: AggregationMethod,
) -> Result<BucketedDataset> {
    bucket_with_spec(
        dataset,
        &BucketSpec::combined(
            lat_cell_size,
            lon_cell_size,
            period,
            spatial_method,
            temporal_method,
        ),
    )
}

/// Run whatever bucketing `spec` asks for.
pub fn bucket_with_spec(dataset: &GriddedDataset, spec: &BucketSpec) -> Result<BucketedDataset> {
    let cell_sizes = spec.cell_sizes()?;

    if dataset.is_empty() {
        return Err(DatacubeError::empty_dataset(format!(
            "dataset '{}' has no variables or an empty axis",
            dataset.name()
        )));
    }

    if spec.period.is_some() && dataset.time().is_none() {
        return Err(DatacubeError::value(format!(
            "dataset '{}' has no time axis to bucket",
            dataset.name()
        )));
    }

    let spatial = cell_sizes.map(|_| spec.spatial_method);
    let temporal = spec.period.map(|_| spec.temporal_method);
    for var in dataset.variables() {
        if let Some(method) = spatial {
            check_aggregation(var, method)?;
        }
        if let (Some(method), true) = (temporal, var.has_time()) {
            check_aggregation(var, method)?;
        }
    }

    debug!(
        dataset = dataset.name(),
        nlat = dataset.nlat(),
        nlon = dataset.nlon(),
        ntime = dataset.ntime(),
        lat_cell_size = ?spec.lat_cell_size,
        lon_cell_size = ?spec.lon_cell_size,
        period = ?spec.period.map(|p| p.token()),
        "Bucketing dataset"
    );

    let (lat_bins, lon_bins) = match cell_sizes {
        Some((lat_size, lon_size)) => (
            AxisBins::uniform(LAT, dataset.lat(), lat_size)?,
            AxisBins::uniform(LON, dataset.lon(), lon_size)?,
        ),
        None => (
            AxisBins::identity(dataset.lat()),
            AxisBins::identity(dataset.lon()),
        ),
    };

    let time_bins = match (dataset.time(), spec.period) {
        (Some(times), Some(period)) => Some(TimeBins::periods(times, period)?),
        (Some(times), None) => Some(TimeBins::identity(times)),
        (None, _) => None,
    };

    let mut output = GriddedDataset::new(
        dataset.name(),
        lat_bins.coords.clone(),
        lon_bins.coords.clone(),
        time_bins.as_ref().map(|tb| tb.labels.clone()),
    )?;
    for (key, value) in dataset.attrs() {
        output.set_attr(key.clone(), value.clone());
    }
    if let Some((lat_size, lon_size)) = cell_sizes {
        output.set_attr("lat_cell_size", lat_size);
        output.set_attr("lon_cell_size", lon_size);
        output.set_attr("spatial_aggregation", spec.spatial_method.as_str());
    }
    if let Some(period) = spec.period {
        output.set_attr("time_period", period.token());
        output.set_attr("temporal_aggregation", spec.temporal_method.as_str());
    }

    let static_group = [vec![0usize]];
    for var in dataset.variables() {
        let (groups, temporal_method): (&[Vec<usize>], _) = match (&time_bins, var.has_time()) {
            (Some(tb), true) => (tb.members.as_slice(), temporal),
            _ => (&static_group[..], None),
        };
        let values = reduce_variable(
            var,
            dataset.nlon(),
            dataset.plane_len(),
            &lat_bins,
            &lon_bins,
            groups,
            spatial,
            temporal_method,
        );
        output.add_variable(var.with_values(values, var.has_time()))?;
    }

    let groups = match &time_bins {
        Some(tb) => tb.members.as_slice(),
        None => &static_group[..],
    };
    let counts = count_contributors(&lat_bins, &lon_bins, groups);

    info!(
        dataset = dataset.name(),
        nlat = output.nlat(),
        nlon = output.nlon(),
        ntime = output.ntime(),
        variables = output.variables().len(),
        "Bucketed dataset"
    );

    Ok(BucketedDataset {
        dataset: output,
        counts,
        lat_edges: lat_bins.edges,
        lon_edges: lon_bins.edges,
        spec: spec.clone(),
    })
}

/// Partition of one spatial axis.
struct AxisBins {
    coords: Vec<f64>,
    /// Source indices per bin, in source order.
    members: Vec<Vec<usize>>,
    edges: Vec<f64>,
}

impl AxisBins {
    fn uniform(name: &str, axis: &[f64], size: f64) -> Result<Self> {
        let min = axis.iter().copied().fold(f64::INFINITY, f64::min);
        let max = axis.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let n = checked_axis_len(name, ((max - min) / size + BIN_EPSILON).floor() + 1.0)?;

        let mut members = vec![Vec::new(); n];
        for (idx, &x) in axis.iter().enumerate() {
            let k = ((x - min) / size + BIN_EPSILON).floor() as usize;
            members[k.min(n - 1)].push(idx);
        }

        Ok(Self {
            coords: (0..n).map(|k| min + (k as f64 + 0.5) * size).collect(),
            members,
            edges: (0..=n).map(|k| min + k as f64 * size).collect(),
        })
    }

    fn identity(axis: &[f64]) -> Self {
        Self {
            coords: axis.to_vec(),
            members: (0..axis.len()).map(|i| vec![i]).collect(),
            edges: cell_edges(axis),
        }
    }

    fn len(&self) -> usize {
        self.coords.len()
    }
}

/// Edges between cell-centered samples, extrapolating half a step at each end.
fn cell_edges(axis: &[f64]) -> Vec<f64> {
    match axis.len() {
        0 => Vec::new(),
        1 => vec![axis[0], axis[0]],
        n => {
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(axis[0] - (axis[1] - axis[0]) / 2.0);
            edges.extend(axis.windows(2).map(|w| (w[0] + w[1]) / 2.0));
            edges.push(axis[n - 1] + (axis[n - 1] - axis[n - 2]) / 2.0);
            edges
        }
    }
}

/// Partition of the time axis.
struct TimeBins {
    labels: Vec<DateTime<Utc>>,
    /// Source time indices per output step.
    members: Vec<Vec<usize>>,
}

impl TimeBins {
    /// Contiguous periods from the first to the last occupied one.
    fn periods(times: &[DateTime<Utc>], period: TimePeriod) -> Result<Self> {
        let (Some(&first_time), Some(&last_time)) = (times.first(), times.last()) else {
            return Err(DatacubeError::empty_dataset("empty time axis"));
        };
        let grouper = PeriodGrouper::new(period, first_time);
        let first = grouper.key(first_time);
        let last = grouper.key(last_time);
        let n = (last - first + 1) as usize;

        let mut members = vec![Vec::new(); n];
        for (idx, t) in times.iter().enumerate() {
            members[(grouper.key(*t) - first) as usize].push(idx);
        }

        let labels = (first..=last)
            .map(|key| grouper.start(key))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { labels, members })
    }

    fn identity(times: &[DateTime<Utc>]) -> Self {
        Self {
            labels: times.to_vec(),
            members: (0..times.len()).map(|i| vec![i]).collect(),
        }
    }
}

/// Reduce one variable onto the output bins.
///
/// `groups[g]` lists the source layers feeding output layer `g`. A `None`
/// method means the axis is not bucketed and each bin holds exactly one
/// source sample.
#[allow(clippy::too_many_arguments)]
fn reduce_variable(
    var: &Variable,
    src_nlon: usize,
    src_plane: usize,
    lat_bins: &AxisBins,
    lon_bins: &AxisBins,
    groups: &[Vec<usize>],
    spatial: Option<AggregationMethod>,
    temporal: Option<AggregationMethod>,
) -> Vec<f64> {
    let out_nlat = lat_bins.len();
    let out_nlon = lon_bins.len();
    let mut output = vec![f64::NAN; groups.len() * out_nlat * out_nlon];

    output
        .par_chunks_mut(out_nlon)
        .enumerate()
        .for_each(|(row, out_row)| {
            let group = &groups[row / out_nlat];
            let lat_members = &lat_bins.members[row % out_nlat];

            let mut cell = Vec::new();
            let mut per_time = Vec::with_capacity(group.len());

            for (out, lon_members) in out_row.iter_mut().zip(&lon_bins.members) {
                per_time.clear();
                for &t in group {
                    let layer = var.layer(t, src_plane);
                    let value = match spatial {
                        Some(method) => {
                            cell.clear();
                            for &r in lat_members {
                                cell.extend(lon_members.iter().map(|&c| layer[r * src_nlon + c]));
                            }
                            method.reduce(&cell)
                        }
                        None => lat_members
                            .first()
                            .zip(lon_members.first())
                            .map_or(f64::NAN, |(&r, &c)| layer[r * src_nlon + c]),
                    };
                    per_time.push(value);
                }

                *out = match temporal {
                    Some(method) => method.reduce(&per_time),
                    None => per_time.first().copied().unwrap_or(f64::NAN),
                };
            }
        });

    output
}

fn count_contributors(lat_bins: &AxisBins, lon_bins: &AxisBins, groups: &[Vec<usize>]) -> Vec<u32> {
    let mut counts = Vec::with_capacity(groups.len() * lat_bins.len() * lon_bins.len());
    for group in groups {
        for lat_members in &lat_bins.members {
            for lon_members in &lon_bins.members {
                counts.push((group.len() * lat_members.len() * lon_members.len()) as u32);
            }
        }
    }
    counts
}
