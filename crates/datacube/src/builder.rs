//! Registering processed datasets and merging them into one cube.

use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use cube_common::{DatacubeError, GriddedDataset, Result};
use grid_bucketing::{DatasetWriter, StoreConfig};
use ingestion::{detect_source_format, CategoricalProcessor, ContinuousProcessor, SourceFormat};

use crate::cube::UnifiedDatacube;
use crate::grid::{BuildOptions, TargetGrid};
use crate::regrid::regrid_dataset;

/// Name of the merged dataset inside a persisted cube.
pub const CUBE_NAME: &str = "datacube";

/// Lifecycle of a [`DatacubeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Nothing registered yet
    Empty,
    /// At least one dataset registered, no current build
    ReadyToBuild,
    /// A cube has been built from the current registry
    Built,
}

/// Collects named datasets and merges them onto a common grid.
///
/// ```text
/// Empty ─add─► ReadyToBuild ─build─► Built ─save─► Built
///                   ▲                  │
///                   └──────add─────────┘
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatacubeBuilder {
    datasets: Vec<(String, GriddedDataset)>,
    cube: Option<UnifiedDatacube>,
    store_config: StoreConfig,
}

impl DatacubeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for [`save_datacube`](Self::save_datacube).
    pub fn with_store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn state(&self) -> BuilderState {
        match (&self.cube, self.datasets.is_empty()) {
            (Some(_), _) => BuilderState::Built,
            (None, true) => BuilderState::Empty,
            (None, false) => BuilderState::ReadyToBuild,
        }
    }

    /// Register `dataset` under `name`.
    ///
    /// Pass a `&BucketedDataset` to keep the original; the builder stores
    /// its own copy. Registering after a build discards that build.
    pub fn add_dataset(&mut self, name: impl Into<String>, dataset: impl Into<GriddedDataset>) -> Result<()> {
        let name = name.into();
        let dataset = dataset.into();

        if name.is_empty() || name.contains('/') {
            return Err(DatacubeError::value(format!(
                "invalid dataset name '{}'",
                name
            )));
        }
        if self.datasets.iter().any(|(existing, _)| *existing == name) {
            return Err(DatacubeError::DuplicateName(name));
        }
        if dataset.is_empty() {
            return Err(DatacubeError::empty_dataset(format!(
                "dataset '{}' has no variables or an empty axis",
                name
            )));
        }

        if self.cube.take().is_some() {
            warn!(dataset = %name, "Dataset added after build; discarding built datacube");
        }
        info!(
            dataset = %name,
            nlat = dataset.nlat(),
            nlon = dataset.nlon(),
            ntime = dataset.ntime(),
            variables = ?dataset.variable_names(),
            "Registered dataset"
        );
        self.datasets.push((name, dataset));
        Ok(())
    }

    /// Read a dataset from disk and register it.
    ///
    /// Zarr stores are loaded as written; NetCDF archives go through the
    /// continuous processor and GeoTIFF rasters through the categorical
    /// processor's nearest-neighbour reprojection.
    pub fn load_dataset_from_file(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DatacubeError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "dataset file not found"),
            ));
        }

        let dataset = match detect_source_format(path) {
            SourceFormat::Zarr => grid_bucketing::load_dataset(path)?,
            SourceFormat::NetCdf => ContinuousProcessor::open(path)?.dataset().clone(),
            SourceFormat::GeoTiff => CategoricalProcessor::open(path)?.reproject_to_geographic()?,
            SourceFormat::Unknown => {
                return Err(DatacubeError::format(format!(
                    "unrecognised dataset format: {}",
                    path.display()
                )))
            }
        };
        self.add_dataset(name, dataset)
    }

    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn dataset(&self, name: &str) -> Option<&GriddedDataset> {
        self.datasets
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, ds)| ds)
    }

    pub fn datacube(&self) -> Option<&UnifiedDatacube> {
        self.cube.as_ref()
    }

    /// Regrid every registered dataset onto one grid and merge them.
    pub fn build_datacube(&mut self, options: &BuildOptions) -> Result<&UnifiedDatacube> {
        if self.datasets.is_empty() {
            return Err(DatacubeError::empty_dataset("no datasets registered"));
        }
        self.cube = None;

        let grid = TargetGrid::derive(self.datasets.iter().map(|(_, ds)| ds), options)?;
        info!(
            datasets = self.datasets.len(),
            nlat = grid.nlat(),
            nlon = grid.nlon(),
            ntime = grid.ntime(),
            interpolation = %options.interpolation,
            "Building datacube"
        );

        let mut cube = GriddedDataset::new(CUBE_NAME, grid.lat.clone(), grid.lon.clone(), grid.time.clone())?
            .with_attr("lat_resolution", grid.lat_resolution)
            .with_attr("lon_resolution", grid.lon_resolution)
            .with_attr(
                "time_resolution",
                grid.time_resolution.map_or(Value::Null, |p| Value::from(p.token())),
            )
            .with_attr("interpolation", options.interpolation.as_str())
            .with_attr(
                "fill_value",
                options.fill_value.map_or(Value::Null, Value::from),
            )
            .with_attr(
                "source_datasets",
                Value::from(self.dataset_names()),
            );

        for (name, dataset) in &self.datasets {
            for var in regrid_dataset(dataset, &grid, options.interpolation)? {
                let qualified = format!("{}_{}", name, var.name());
                if cube.variable(&qualified).is_some() {
                    return Err(DatacubeError::DuplicateName(qualified));
                }

                let source_variable = var.name().to_string();
                let var = match options.fill_value {
                    Some(fill) => {
                        let filled = var
                            .values()
                            .iter()
                            .map(|&v| if v.is_nan() { fill } else { v })
                            .collect();
                        var.with_values(filled, var.has_time())
                    }
                    None => var,
                };
                cube.add_variable(
                    var.renamed(qualified)
                        .with_attr("source_dataset", name.as_str())
                        .with_attr("source_variable", source_variable),
                )?;
            }
        }

        info!(
            variables = ?cube.variable_names(),
            "Built datacube"
        );

        let sources = self.datasets.iter().map(|(name, _)| name.clone()).collect();
        Ok(&*self.cube.insert(UnifiedDatacube {
            dataset: cube,
            grid,
            options: options.clone(),
            sources,
        }))
    }

    /// Persist the built cube.
    pub fn save_datacube(&self, path: impl AsRef<Path>) -> Result<()> {
        let cube = self.cube.as_ref().ok_or(DatacubeError::NoDatacubeBuilt)?;
        DatasetWriter::new(self.store_config.clone()).write(cube.dataset(), path)
    }
}
