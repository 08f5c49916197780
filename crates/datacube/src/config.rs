//! Pipeline configuration.
//!
//! Loaded from YAML with `${VAR}` / `${VAR:-default}` substitution, then
//! overridden by `DATACUBE_*` environment variables.
//!
//! ```yaml
//! data_dir: ${DATA_ROOT:-data}
//! output_dir: data/processed
//! region:
//!   south: 43.480
//!   north: 44.652
//!   west: -104.705
//!   east: -103.264
//! time_resolution: ME
//! store:
//!   compression: blosc_lz4
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cube_common::{BoundingBox, Codebook, DatacubeError, Result, TimePeriod, VariableKind};
use grid_bucketing::{AggregationMethod, InterpolationMethod, ResamplingPolicy, StoreConfig};

use crate::grid::BuildOptions;

/// Geographic region processed by the pipeline, in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Default for RegionOfInterest {
    /// The Black Hills.
    fn default() -> Self {
        Self {
            south: 43.480,
            north: 44.652,
            west: -104.705,
            east: -103.264,
        }
    }
}

impl RegionOfInterest {
    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::from_edges(self.south, self.north, self.west, self.east)
    }

    /// Parse `"west south east north"`.
    pub fn from_bbox_string(s: &str) -> Result<Self> {
        Ok(BoundingBox::from_bbox_string(s)?.into())
    }

    pub fn validate(&self) -> Result<()> {
        let edges = [self.south, self.north, self.west, self.east];
        if edges.iter().any(|v| !v.is_finite()) {
            return Err(DatacubeError::value("region has non-finite edges"));
        }
        if self.south < -90.0 || self.north > 90.0 {
            return Err(DatacubeError::value(format!(
                "region latitudes out of range: south {} north {}",
                self.south, self.north
            )));
        }
        if self.south >= self.north {
            return Err(DatacubeError::value(format!(
                "region south ({}) must be below north ({})",
                self.south, self.north
            )));
        }
        if self.west >= self.east {
            return Err(DatacubeError::value(format!(
                "region west ({}) must be below east ({})",
                self.west, self.east
            )));
        }
        Ok(())
    }
}

impl From<BoundingBox> for RegionOfInterest {
    fn from(bbox: BoundingBox) -> Self {
        Self {
            south: bbox.min_lat,
            north: bbox.max_lat,
            west: bbox.min_lon,
            east: bbox.max_lon,
        }
    }
}

/// Top-level pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Raw inputs
    pub data_dir: PathBuf,
    /// Processed stores and cubes
    pub output_dir: PathBuf,
    pub region: RegionOfInterest,
    /// Default reducer for continuous variables
    pub numeric_aggregation: String,
    /// Default reducer for categorical variables
    pub categorical_aggregation: String,
    /// Default period token for temporal bucketing
    pub time_resolution: String,
    pub interpolation: String,
    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("data/processed"),
            region: RegionOfInterest::default(),
            numeric_aggregation: "mean".to_string(),
            categorical_aggregation: "mode".to_string(),
            time_resolution: "ME".to_string(),
            interpolation: "linear".to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults, a `.env` file if present, then `DATACUBE_*` overrides.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self {
            store: StoreConfig::from_env(),
            ..Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| DatacubeError::io(path, source))?;
        info!(path = %path.display(), "Loading pipeline config");
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let mut config: Self = serde_yaml::from_str(&expanded)
            .map_err(|e| DatacubeError::format(format!("invalid pipeline config: {}", e)))?;
        config.apply_env()?;
        config.validate()?;
        debug!(?config, "Pipeline config loaded");
        Ok(config)
    }

    /// Apply `DATACUBE_DATA_DIR`, `DATACUBE_OUTPUT_DIR` and `DATACUBE_REGION`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("DATACUBE_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DATACUBE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DATACUBE_REGION") {
            self.region = RegionOfInterest::from_bbox_string(&val)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;
        self.numeric_method()?;
        let categorical = self.categorical_method()?;
        if !VariableKind::Categorical(Codebook::new()).allows_aggregation(categorical) {
            return Err(DatacubeError::invalid_aggregation(categorical, "categorical_aggregation"));
        }
        self.time_period()?;
        self.interpolation_method()?;
        self.store.validate().map_err(DatacubeError::value)?;
        Ok(())
    }

    pub fn numeric_method(&self) -> Result<AggregationMethod> {
        self.numeric_aggregation.parse()
    }

    pub fn categorical_method(&self) -> Result<AggregationMethod> {
        self.categorical_aggregation.parse()
    }

    pub fn time_period(&self) -> Result<TimePeriod> {
        TimePeriod::parse(&self.time_resolution)
    }

    pub fn interpolation_method(&self) -> Result<InterpolationMethod> {
        self.interpolation.parse()
    }

    /// Build options covering the region, with the configured interpolation.
    pub fn build_options(&self, lat_resolution: f64, lon_resolution: f64) -> Result<BuildOptions> {
        Ok(BuildOptions::new(lat_resolution, lon_resolution)
            .with_time_resolution(self.time_period()?)
            .with_interpolation(self.interpolation_method()?)
            .with_region(&self.region.to_bbox()))
    }
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;
            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => {
                        return Err(DatacubeError::value(format!(
                            "unclosed variable substitution: ${{{}",
                            var_expr
                        )))
                    }
                }
            }
            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((name, default)) = expr.split_once(":-") {
        match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).map_err(|_| {
            DatacubeError::value(format!("environment variable {} not set", expr.trim()))
        })
    }
}
