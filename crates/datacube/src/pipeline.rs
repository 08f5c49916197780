//! Region pipeline: raw climate archives and vegetation rasters in
//! `data_dir`, one unified cube in `output_dir`.
//!
//! Each climate archive is clipped to the region and bucketed with the
//! numeric reducer and configured period. Each vegetation raster is
//! bucketed with the categorical reducer and then clipped. Everything is
//! registered under its input name and built at the cube resolution over
//! the region.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use cube_common::{DatacubeError, Result};
use ingestion::{CategoricalProcessor, ContinuousProcessor, ProcessOptions};

use crate::builder::DatacubeBuilder;
use crate::config::PipelineConfig;

/// A named input file. Relative paths are resolved against `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInput {
    pub name: String,
    pub path: PathBuf,
}

impl SourceInput {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// What to feed the pipeline and at which resolutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInputs {
    /// Continuous archives (Zarr or NetCDF)
    #[serde(default)]
    pub climate: Vec<SourceInput>,
    /// Categorical GeoTIFF rasters, with optional codebook sidecars
    #[serde(default)]
    pub vegetation: Vec<SourceInput>,
    /// Bucket size in degrees applied to every input
    pub bucket_size: f64,
    /// Cell size in degrees of the unified cube
    pub resolution: f64,
    /// Store name under `output_dir`, without the `.zarr` suffix
    pub cube_name: String,
}

impl PipelineInputs {
    pub fn new(bucket_size: f64, resolution: f64, cube_name: impl Into<String>) -> Self {
        Self {
            climate: Vec::new(),
            vegetation: Vec::new(),
            bucket_size,
            resolution,
            cube_name: cube_name.into(),
        }
    }

    pub fn with_climate(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.climate.push(SourceInput::new(name, path));
        self
    }

    pub fn with_vegetation(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.vegetation.push(SourceInput::new(name, path));
        self
    }
}

/// Process every input, build the cube over the configured region and save it.
///
/// Returns the path of the written store. Nothing is written unless the
/// build succeeds.
pub fn run_pipeline(config: &PipelineConfig, inputs: &PipelineInputs) -> Result<PathBuf> {
    config.validate()?;
    if inputs.climate.is_empty() && inputs.vegetation.is_empty() {
        return Err(DatacubeError::empty_dataset("pipeline has no inputs"));
    }
    if inputs.cube_name.is_empty() || inputs.cube_name.contains('/') {
        return Err(DatacubeError::value(format!(
            "invalid cube name '{}'",
            inputs.cube_name
        )));
    }

    let region = config.region.to_bbox();
    let numeric = config.numeric_method()?;
    let categorical = config.categorical_method()?;
    let period = config.time_period()?;
    let mut builder = DatacubeBuilder::new().with_store_config(config.store.clone());

    for input in &inputs.climate {
        let path = config.data_dir.join(&input.path);
        info!(name = %input.name, path = %path.display(), "Processing climate input");
        let options = ProcessOptions::spatial(inputs.bucket_size, inputs.bucket_size)
            .with_period(period)
            .with_methods(numeric, numeric);
        let bucketed = ContinuousProcessor::open(&path)?
            .clip_to_region(&region)?
            .process_to_datacube(&options)?;
        builder.add_dataset(input.name.clone(), bucketed)?;
    }

    for input in &inputs.vegetation {
        let path = config.data_dir.join(&input.path);
        info!(name = %input.name, path = %path.display(), "Processing vegetation input");
        let bucketed = CategoricalProcessor::open(&path)?.bucket_spatial(
            inputs.bucket_size,
            inputs.bucket_size,
            categorical,
        )?;
        builder.add_dataset(input.name.clone(), bucketed.dataset().clip(&region)?)?;
    }

    let options = config.build_options(inputs.resolution, inputs.resolution)?;
    let cube = builder.build_datacube(&options)?;
    info!(
        variables = cube.variable_names().len(),
        nlat = cube.grid().nlat(),
        nlon = cube.grid().nlon(),
        ntime = cube.grid().ntime(),
        "Built region cube"
    );

    fs::create_dir_all(&config.output_dir).map_err(|e| DatacubeError::io(&config.output_dir, e))?;
    let output = config.output_dir.join(format!("{}.zarr", inputs.cube_name));
    builder.save_datacube(&output)?;
    Ok(output)
}
