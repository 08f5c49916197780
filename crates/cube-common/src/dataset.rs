//! In-memory gridded datasets.
//!
//! A [`GriddedDataset`] owns one coordinate registry (latitude, longitude and
//! an optional time axis) shared by every variable it holds. Values are stored
//! row-major as `[time][lat][lon]` (or `[lat][lon]` for time-invariant
//! variables), with `NaN` marking missing cells.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{DatacubeError, Result};

/// Latitude axis name.
pub const LAT: &str = "lat";
/// Longitude axis name.
pub const LON: &str = "lon";
/// Time axis name.
pub const TIME: &str = "time";

/// Largest number of points a derived coordinate axis may have.
pub const MAX_AXIS_LEN: usize = 1 << 24;

/// Free-form metadata attached to datasets and variables.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Mapping from class code to label.
pub type Codebook = BTreeMap<i64, String>;

/// Whether values are numeric measurements or class codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "codebook", rename_all = "lowercase")]
pub enum VariableKind {
    Continuous,
    Categorical(Codebook),
}

impl VariableKind {
    pub fn is_categorical(&self) -> bool {
        matches!(self, Self::Categorical(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Categorical(_) => "categorical",
        }
    }

    pub fn codebook(&self) -> Option<&Codebook> {
        match self {
            Self::Categorical(codebook) => Some(codebook),
            Self::Continuous => None,
        }
    }
}

/// A single named array on its dataset's grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: String,
    kind: VariableKind,
    has_time: bool,
    values: Vec<f64>,
    attrs: Attributes,
}

impl Variable {
    pub fn new(name: impl Into<String>, kind: VariableKind, has_time: bool, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            kind,
            has_time,
            values,
            attrs: Attributes::new(),
        }
    }

    /// Time-varying numeric variable.
    pub fn continuous(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, VariableKind::Continuous, true, values)
    }

    /// Time-invariant class-code variable.
    pub fn categorical(name: impl Into<String>, values: Vec<f64>, codebook: Codebook) -> Self {
        Self::new(name, VariableKind::Categorical(codebook), false, values)
    }

    /// Mark the variable as constant along time (values laid out `[lat][lon]`).
    pub fn time_invariant(mut self) -> Self {
        self.has_time = false;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Same name, kind and attributes over new values.
    pub fn with_values(&self, values: Vec<f64>, has_time: bool) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            has_time,
            values,
            attrs: self.attrs.clone(),
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &VariableKind {
        &self.kind
    }

    pub fn is_categorical(&self) -> bool {
        self.kind.is_categorical()
    }

    pub fn has_time(&self) -> bool {
        self.has_time
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Number of `[lat][lon]` layers.
    pub fn layer_count(&self, plane: usize) -> usize {
        if plane == 0 {
            0
        } else {
            self.values.len() / plane
        }
    }

    /// Borrow the `t`-th `[lat][lon]` layer.
    pub fn layer(&self, t: usize, plane: usize) -> &[f64] {
        &self.values[t * plane..(t + 1) * plane]
    }

    /// Count of non-missing cells.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }
}

/// A named collection of variables sharing one coordinate registry.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedDataset {
    name: String,
    lat: Vec<f64>,
    lon: Vec<f64>,
    time: Option<Vec<DateTime<Utc>>>,
    variables: Vec<Variable>,
    attrs: Attributes,
}

impl GriddedDataset {
    /// Create a dataset with the given axes and no variables.
    ///
    /// Coordinates must be finite and strictly monotonic; times strictly
    /// increasing.
    pub fn new(
        name: impl Into<String>,
        lat: Vec<f64>,
        lon: Vec<f64>,
        time: Option<Vec<DateTime<Utc>>>,
    ) -> Result<Self> {
        check_axis(LAT, &lat)?;
        check_axis(LON, &lon)?;
        if let Some(times) = &time {
            if times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(DatacubeError::value("time axis must be strictly increasing"));
            }
        }

        Ok(Self {
            name: name.into(),
            lat,
            lon,
            time,
            variables: Vec::new(),
            attrs: Attributes::new(),
        })
    }

    /// Register a variable after checking it fits the coordinate registry.
    pub fn add_variable(&mut self, variable: Variable) -> Result<()> {
        check_variable_name(variable.name())?;
        if self.variable(variable.name()).is_some() {
            return Err(DatacubeError::DuplicateName(format!(
                "{}/{}",
                self.name,
                variable.name()
            )));
        }

        if variable.has_time && self.time.is_none() {
            return Err(DatacubeError::value(format!(
                "variable '{}' varies in time but dataset '{}' has no time axis",
                variable.name, self.name
            )));
        }

        let expected = if variable.has_time {
            self.ntime() * self.plane_len()
        } else {
            self.plane_len()
        };
        if variable.values.len() != expected {
            return Err(DatacubeError::value(format!(
                "variable '{}' has {} values, expected {}",
                variable.name,
                variable.values.len(),
                expected
            )));
        }

        if variable.is_categorical()
            && variable
                .values
                .iter()
                .any(|v| !v.is_nan() && (v.fract() != 0.0 || !v.is_finite()))
        {
            return Err(DatacubeError::value(format!(
                "categorical variable '{}' holds non-integral codes",
                variable.name
            )));
        }

        self.variables.push(variable);
        Ok(())
    }

    /// Builder-style [`add_variable`](Self::add_variable).
    pub fn with_variable(mut self, variable: Variable) -> Result<Self> {
        self.add_variable(variable)?;
        Ok(self)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.attrs.insert(key.into(), value.into());
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lat(&self) -> &[f64] {
        &self.lat
    }

    pub fn lon(&self) -> &[f64] {
        &self.lon
    }

    pub fn time(&self) -> Option<&[DateTime<Utc>]> {
        self.time.as_deref()
    }

    pub fn nlat(&self) -> usize {
        self.lat.len()
    }

    pub fn nlon(&self) -> usize {
        self.lon.len()
    }

    /// Number of time samples, zero without a time axis.
    pub fn ntime(&self) -> usize {
        self.time.as_ref().map_or(0, Vec::len)
    }

    /// Cells in one `[lat][lon]` layer.
    pub fn plane_len(&self) -> usize {
        self.lat.len() * self.lon.len()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn into_variables(self) -> Vec<Variable> {
        self.variables
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// True with no variables or with an empty spatial axis.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
            || self.lat.is_empty()
            || self.lon.is_empty()
            || self.time.as_ref().is_some_and(Vec::is_empty)
    }

    /// True if any variable is categorical.
    pub fn is_categorical(&self) -> bool {
        self.variables.iter().any(Variable::is_categorical)
    }

    /// Bounding box of the coordinate samples.
    pub fn extent(&self) -> Option<BoundingBox> {
        let (lat_min, lat_max) = axis_range(&self.lat)?;
        let (lon_min, lon_max) = axis_range(&self.lon)?;
        Some(BoundingBox::new(lon_min, lat_min, lon_max, lat_max))
    }

    /// First and last timestamps.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let times = self.time.as_ref()?;
        Some((*times.first()?, *times.last()?))
    }

    /// Keep only the named variables. Unknown names are skipped.
    pub fn select_variables<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let variables: Vec<Variable> = self
            .variables
            .iter()
            .filter(|v| names.iter().any(|n| n.as_ref() == v.name))
            .cloned()
            .collect();

        if variables.is_empty() {
            return Err(DatacubeError::empty_dataset(format!(
                "none of the requested variables exist in '{}'",
                self.name
            )));
        }

        Ok(Self {
            variables,
            ..self.shallow_clone()
        })
    }

    /// Crop to the cells whose coordinates fall inside `bbox` (inclusive).
    pub fn clip(&self, bbox: &BoundingBox) -> Result<Self> {
        let lat_idx: Vec<usize> = (0..self.lat.len())
            .filter(|&i| self.lat[i] >= bbox.min_lat && self.lat[i] <= bbox.max_lat)
            .collect();
        let lon_idx: Vec<usize> = (0..self.lon.len())
            .filter(|&j| self.lon[j] >= bbox.min_lon && self.lon[j] <= bbox.max_lon)
            .collect();

        if lat_idx.is_empty() || lon_idx.is_empty() {
            return Err(DatacubeError::empty_dataset(format!(
                "region {:?} does not intersect dataset '{}'",
                bbox, self.name
            )));
        }

        let plane = self.plane_len();
        let nlon = self.lon.len();
        let variables = self
            .variables
            .iter()
            .map(|var| {
                let layers = var.layer_count(plane);
                let mut values = Vec::with_capacity(layers * lat_idx.len() * lon_idx.len());
                for t in 0..layers {
                    let layer = var.layer(t, plane);
                    for &i in &lat_idx {
                        values.extend(lon_idx.iter().map(|&j| layer[i * nlon + j]));
                    }
                }
                var.with_values(values, var.has_time)
            })
            .collect();

        Ok(Self {
            name: self.name.clone(),
            lat: lat_idx.iter().map(|&i| self.lat[i]).collect(),
            lon: lon_idx.iter().map(|&j| self.lon[j]).collect(),
            time: self.time.clone(),
            variables,
            attrs: self.attrs.clone(),
        })
    }

    fn shallow_clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
            time: self.time.clone(),
            variables: Vec::new(),
            attrs: self.attrs.clone(),
        }
    }
}

/// Minimum non-zero spacing between adjacent samples.
pub fn min_spacing(axis: &[f64]) -> Option<f64> {
    axis.windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .filter(|d| *d > 0.0)
        .min_by(|a, b| a.total_cmp(b))
}

/// Convert a computed point count for `axis` to `usize`, rejecting counts
/// that are not finite or exceed [`MAX_AXIS_LEN`].
pub fn checked_axis_len(axis: &str, count: f64) -> Result<usize> {
    if !count.is_finite() || count < 1.0 || count > MAX_AXIS_LEN as f64 {
        return Err(DatacubeError::value(format!(
            "{} axis would have {} points (limit {})",
            axis, count, MAX_AXIS_LEN
        )));
    }
    Ok(count as usize)
}

fn axis_range(axis: &[f64]) -> Option<(f64, f64)> {
    let first = *axis.first()?;
    let last = *axis.last()?;
    Some((first.min(last), first.max(last)))
}

fn check_axis(name: &str, axis: &[f64]) -> Result<()> {
    if axis.iter().any(|v| !v.is_finite()) {
        return Err(DatacubeError::value(format!(
            "{} coordinates must be finite",
            name
        )));
    }
    let increasing = axis.windows(2).all(|w| w[1] > w[0]);
    let decreasing = axis.windows(2).all(|w| w[1] < w[0]);
    if !(increasing || decreasing) {
        return Err(DatacubeError::value(format!(
            "{} coordinates must be strictly monotonic and unique",
            name
        )));
    }
    Ok(())
}

fn check_variable_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || [LAT, LON, TIME].contains(&name) {
        return Err(DatacubeError::value(format!(
            "invalid variable name '{}'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grid() -> GriddedDataset {
        GriddedDataset::new("cmip", vec![44.5, 44.0, 43.5], vec![-104.5, -104.0], None).unwrap()
    }

    #[test]
    fn test_rejects_non_monotonic_axis() {
        let err = GriddedDataset::new("bad", vec![1.0, 3.0, 2.0], vec![0.0], None).unwrap_err();
        assert_eq!(err.code(), "ValueError");
        let err = GriddedDataset::new("dup", vec![1.0, 1.0], vec![0.0], None).unwrap_err();
        assert_eq!(err.code(), "ValueError");
    }

    #[test]
    fn test_variable_shape_checked() {
        let mut ds = grid();
        let err = ds
            .add_variable(Variable::continuous("tas", vec![1.0; 5]).time_invariant())
            .unwrap_err();
        assert_eq!(err.code(), "ValueError");

        // timed variable without time axis
        let err = ds
            .add_variable(Variable::continuous("tas", vec![1.0; 6]))
            .unwrap_err();
        assert_eq!(err.code(), "ValueError");

        ds.add_variable(Variable::continuous("tas", vec![1.0; 6]).time_invariant())
            .unwrap();
        let err = ds
            .add_variable(Variable::continuous("tas", vec![2.0; 6]).time_invariant())
            .unwrap_err();
        assert_eq!(err.code(), "DuplicateNameError");
    }

    #[test]
    fn test_categorical_codes_must_be_integral() {
        let mut ds = grid();
        let err = ds
            .add_variable(Variable::categorical("evt", vec![1.5; 6], Codebook::new()))
            .unwrap_err();
        assert_eq!(err.code(), "ValueError");

        ds.add_variable(Variable::categorical(
            "evt",
            vec![1.0, 2.0, f64::NAN, 7.0, 7.0, 1.0],
            Codebook::new(),
        ))
        .unwrap();
        assert!(ds.is_categorical());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut ds = grid();
        for name in ["", "lat", "a/b"] {
            let var = Variable::continuous(name, vec![0.0; 6]).time_invariant();
            assert!(ds.add_variable(var).is_err());
        }
    }

    #[test]
    fn test_extent_handles_descending_axis() {
        let ds = grid();
        let bbox = ds.extent().unwrap();
        assert_eq!(bbox.min_lat, 43.5);
        assert_eq!(bbox.max_lat, 44.5);
        assert_eq!(bbox.min_lon, -104.5);
    }

    #[test]
    fn test_clip_keeps_inclusive_cells() {
        let ds = grid()
            .with_variable(
                Variable::continuous("tas", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).time_invariant(),
            )
            .unwrap();
        let clipped = ds
            .clip(&BoundingBox::new(-104.0, 43.5, -103.0, 44.0))
            .unwrap();
        assert_eq!(clipped.lat(), &[44.0, 43.5]);
        assert_eq!(clipped.lon(), &[-104.0]);
        assert_eq!(clipped.variable("tas").unwrap().values(), &[4.0, 6.0]);

        let err = ds.clip(&BoundingBox::new(10.0, 10.0, 11.0, 11.0)).unwrap_err();
        assert_eq!(err.code(), "EmptyDatasetError");
    }

    #[test]
    fn test_select_variables() {
        let time = vec![Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()];
        let ds = GriddedDataset::new("maca", vec![0.0], vec![0.0], Some(time))
            .unwrap()
            .with_variable(Variable::continuous("huss", vec![0.1]))
            .unwrap()
            .with_variable(Variable::continuous("tas", vec![280.0]))
            .unwrap();

        let selected = ds.select_variables(&["tas", "pr"]).unwrap();
        assert_eq!(selected.variable_names(), vec!["tas"]);
        assert!(ds.select_variables(&["pr"]).is_err());
    }

    #[test]
    fn test_min_spacing() {
        assert_eq!(min_spacing(&[0.0, 0.5, 1.5]), Some(0.5));
        assert_eq!(min_spacing(&[3.0, 2.0]), Some(1.0));
        assert_eq!(min_spacing(&[1.0]), None);
    }

    #[test]
    fn test_checked_axis_len() {
        assert_eq!(checked_axis_len(LAT, 19.0).unwrap(), 19);
        assert_eq!(checked_axis_len(LAT, (MAX_AXIS_LEN + 1) as f64).unwrap_err().code(), "ValueError");
        assert!(checked_axis_len(LON, f64::INFINITY).is_err());
        assert!(checked_axis_len(LON, 2.0 / 1e-300).is_err());
    }
}
