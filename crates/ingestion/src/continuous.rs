//! Continuous climate archives (MACA / CMIP style lat × lon × time grids).

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use cube_common::time::resolution_label;
use cube_common::{BoundingBox, DatacubeError, GriddedDataset, Result, TimePeriod};
use grid_bucketing::{bucket_with_spec, AggregationMethod, BucketSpec, BucketedDataset};
use grid_bucketing::{DatasetWriter, StoreConfig};

use crate::resolution::NativeResolution;
use crate::source::{detect_source_format, SourceFormat};

/// Options for [`ContinuousProcessor::process_to_datacube`].
///
/// Spatial bucketing runs when both cell sizes are set, temporal bucketing
/// when `time_bucket_size` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Latitude bucket size in degrees
    pub lat_bucket_size: Option<f64>,
    /// Longitude bucket size in degrees
    pub lon_bucket_size: Option<f64>,
    /// Calendar period for temporal bucketing
    pub time_bucket_size: Option<TimePeriod>,
    pub spatial_agg_method: AggregationMethod,
    pub temporal_agg_method: AggregationMethod,
}

impl ProcessOptions {
    pub fn spatial(lat_bucket_size: f64, lon_bucket_size: f64) -> Self {
        Self {
            lat_bucket_size: Some(lat_bucket_size),
            lon_bucket_size: Some(lon_bucket_size),
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period: TimePeriod) -> Self {
        self.time_bucket_size = Some(period);
        self
    }

    pub fn with_methods(mut self, spatial: AggregationMethod, temporal: AggregationMethod) -> Self {
        self.spatial_agg_method = spatial;
        self.temporal_agg_method = temporal;
        self
    }

    fn to_spec(&self) -> Result<BucketSpec> {
        let spec = BucketSpec {
            lat_cell_size: self.lat_bucket_size,
            lon_cell_size: self.lon_bucket_size,
            period: self.time_bucket_size,
            spatial_method: self.spatial_agg_method,
            temporal_method: self.temporal_agg_method,
        };
        spec.cell_sizes()?;
        Ok(spec)
    }
}

/// Processor for one continuous archive.
#[derive(Debug, Clone)]
pub struct ContinuousProcessor {
    dataset: GriddedDataset,
    source: Option<PathBuf>,
    store_config: StoreConfig,
}

impl ContinuousProcessor {
    /// Open an archive from disk.
    ///
    /// Accepts Zarr stores written by this pipeline, and NetCDF files when
    /// the `netcdf` feature is enabled.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DatacubeError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "data file not found"),
            ));
        }

        let dataset = match detect_source_format(path) {
            SourceFormat::Zarr => grid_bucketing::load_dataset(path)?,
            SourceFormat::NetCdf => read_netcdf(path)?,
            SourceFormat::GeoTiff => {
                return Err(DatacubeError::value(format!(
                    "{} is a raster; use CategoricalProcessor",
                    path.display()
                )))
            }
            SourceFormat::Unknown => {
                return Err(DatacubeError::format(format!(
                    "unrecognised archive format: {}",
                    path.display()
                )))
            }
        };

        let mut processor = Self::from_dataset(dataset)?;
        processor.source = Some(path.to_path_buf());
        Ok(processor)
    }

    /// Wrap an in-memory dataset.
    pub fn from_dataset(dataset: GriddedDataset) -> Result<Self> {
        if let Some(var) = dataset.variables().iter().find(|v| v.is_categorical()) {
            return Err(DatacubeError::value(format!(
                "variable '{}' is categorical; use CategoricalProcessor",
                var.name()
            )));
        }

        info!(
            dataset = dataset.name(),
            nlat = dataset.nlat(),
            nlon = dataset.nlon(),
            ntime = dataset.ntime(),
            variables = ?dataset.variable_names(),
            "Loaded continuous dataset"
        );

        Ok(Self {
            dataset,
            source: None,
            store_config: StoreConfig::default(),
        })
    }

    /// Use `config` for [`save`](Self::save).
    pub fn with_store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn dataset(&self) -> &GriddedDataset {
        &self.dataset
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn native_resolution(&self) -> NativeResolution {
        NativeResolution::of(&self.dataset)
    }

    /// `daily`, `monthly`, `yearly`, `<n>-day` or `single-timepoint`.
    pub fn temporal_resolution_label(&self) -> String {
        self.dataset
            .time()
            .map_or_else(|| "single-timepoint".to_string(), resolution_label)
    }

    /// Restrict processing to the named variables.
    pub fn select_variables<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        self.dataset = self.dataset.select_variables(names)?;
        Ok(self)
    }

    /// Crop to a region of interest.
    pub fn clip_to_region(mut self, region: &BoundingBox) -> Result<Self> {
        region.validate()?;
        self.dataset = self.dataset.clip(region)?;
        debug!(
            dataset = self.dataset.name(),
            nlat = self.dataset.nlat(),
            nlon = self.dataset.nlon(),
            "Clipped to region"
        );
        Ok(self)
    }

    /// Bucket the archive as `options` asks.
    ///
    /// Requests finer than the native grid are rejected with a
    /// `ResolutionError`.
    pub fn process_to_datacube(&self, options: &ProcessOptions) -> Result<BucketedDataset> {
        let spec = options.to_spec()?;
        let native = self.native_resolution();

        if let Some((lat_size, lon_size)) = spec.cell_sizes()? {
            native.check_spatial(lat_size, lon_size)?;
        }
        if let Some(period) = spec.period {
            if self.dataset.time().is_none() {
                return Err(DatacubeError::value(format!(
                    "dataset '{}' has no time axis",
                    self.dataset.name()
                )));
            }
            native.check_period(period)?;
        }

        let bucketed = bucket_with_spec(&self.dataset, &spec)?;
        info!(
            dataset = self.dataset.name(),
            lat_bucket_size = ?options.lat_bucket_size,
            lon_bucket_size = ?options.lon_bucket_size,
            time_bucket_size = ?options.time_bucket_size.map(|p| p.token()),
            nlat = bucketed.dataset().nlat(),
            nlon = bucketed.dataset().nlon(),
            ntime = bucketed.dataset().ntime(),
            "Processed continuous dataset"
        );
        Ok(bucketed)
    }

    /// Persist a processed dataset.
    pub fn save(&self, dataset: &GriddedDataset, path: impl AsRef<Path>) -> Result<()> {
        DatasetWriter::new(self.store_config.clone()).write(dataset, path)
    }
}

#[cfg(feature = "netcdf")]
fn read_netcdf(path: &Path) -> Result<GriddedDataset> {
    crate::netcdf::read_netcdf(path)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf(path: &Path) -> Result<GriddedDataset> {
    Err(DatacubeError::format(format!(
        "{}: NetCDF input requires the `netcdf` feature",
        path.display()
    )))
}
