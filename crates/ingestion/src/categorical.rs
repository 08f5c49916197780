//! Categorical classification rasters (LANDFIRE EVT style).
//!
//! A raster arrives in a projected CRS with a fixed codebook. Before it can
//! join a datacube it is resampled onto a regular lat/lon grid with nearest
//! neighbour only, so class codes are never blended.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use cube_common::{Codebook, DatacubeError, GriddedDataset, Result, Variable};
use grid_bucketing::{bucket_spatial, AggregationMethod, BucketedDataset};
use grid_bucketing::{DatasetWriter, StoreConfig};
use projection::ProjectedCrs;

use crate::geotiff;

/// Affine transform of a north-up raster: pixel `(col, row)` has its
/// top-left corner at `(origin_x + col * pixel_width, origin_y - row * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Result<Self> {
        for (name, size) in [("pixel width", pixel_width), ("pixel height", pixel_height)] {
            if !(size.is_finite() && size > 0.0) {
                return Err(DatacubeError::value(format!(
                    "{} must be positive and finite, got {}",
                    name, size
                )));
            }
        }
        Ok(Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        })
    }

    /// Planar coordinates of a pixel center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional `(col, row)` of a planar point; pixel `k` covers `[k, k + 1)`.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// `(x_min, y_min, x_max, y_max)` of a `width` × `height` raster.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        (
            self.origin_x,
            self.origin_y - height as f64 * self.pixel_height,
            self.origin_x + width as f64 * self.pixel_width,
            self.origin_y,
        )
    }
}

/// Single-band raster of class codes in its source CRS.
///
/// Codes are stored row-major from the top (north) row; nodata is `NaN`.
#[derive(Debug, Clone)]
pub struct CategoricalRaster {
    name: String,
    variable: String,
    width: usize,
    height: usize,
    codes: Vec<f64>,
    transform: GeoTransform,
    crs: ProjectedCrs,
    codebook: Codebook,
}

impl CategoricalRaster {
    pub fn new(
        name: impl Into<String>,
        width: usize,
        height: usize,
        codes: Vec<f64>,
        transform: GeoTransform,
        crs: ProjectedCrs,
    ) -> Result<Self> {
        let name = name.into();
        if width == 0 || height == 0 {
            return Err(DatacubeError::empty_dataset(format!(
                "raster '{}' has no pixels",
                name
            )));
        }
        if codes.len() != width * height {
            return Err(DatacubeError::value(format!(
                "raster '{}' has {} codes for {}x{} pixels",
                name,
                codes.len(),
                width,
                height
            )));
        }
        if let Some(bad) = codes.iter().find(|c| c.is_finite() && c.fract() != 0.0) {
            return Err(DatacubeError::value(format!(
                "raster '{}' holds non-integral class code {}",
                name, bad
            )));
        }
        Ok(Self {
            name,
            variable: "evt".to_string(),
            width,
            height,
            codes,
            transform,
            crs,
            codebook: Codebook::new(),
        })
    }

    pub fn with_codebook(mut self, codebook: Codebook) -> Self {
        self.codebook = codebook;
        self
    }

    /// Name of the variable produced on reprojection (default `evt`).
    pub fn with_variable_name(mut self, variable: impl Into<String>) -> Self {
        self.variable = variable.into();
        self
    }

    /// Treat `nodata` as missing.
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        for code in self.codes.iter_mut().filter(|c| **c == nodata) {
            *code = f64::NAN;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn codes(&self) -> &[f64] {
        &self.codes
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> &ProjectedCrs {
        &self.crs
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    /// Code of the pixel containing planar point `(x, y)`.
    fn sample(&self, x: f64, y: f64) -> f64 {
        let (col, row) = self.transform.to_pixel(x, y);
        let (col, row) = (col.floor(), row.floor());
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return f64::NAN;
        }
        self.codes[row as usize * self.width + col as usize]
    }
}

/// Processor for one classification raster.
#[derive(Debug, Clone)]
pub struct CategoricalProcessor {
    raster: CategoricalRaster,
    store_config: StoreConfig,
}

impl CategoricalProcessor {
    /// Read a GeoTIFF and its `<raster>.codebook.json` sidecar, if any.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut raster = geotiff::read_geotiff(path)?;

        let sidecar = geotiff::codebook_path(path);
        if sidecar.exists() {
            raster = raster.with_codebook(geotiff::read_codebook(&sidecar)?);
        }
        Ok(Self::from_raster(raster))
    }

    /// Read a GeoTIFF with a caller-supplied codebook.
    pub fn open_with_codebook(path: impl AsRef<Path>, codebook: Codebook) -> Result<Self> {
        let raster = geotiff::read_geotiff(path.as_ref())?.with_codebook(codebook);
        Ok(Self::from_raster(raster))
    }

    pub fn from_raster(raster: CategoricalRaster) -> Self {
        info!(
            raster = raster.name(),
            width = raster.width(),
            height = raster.height(),
            crs = raster.crs().name(),
            classes = raster.codebook().len(),
            "Loaded categorical raster"
        );
        Self {
            raster,
            store_config: StoreConfig::default(),
        }
    }

    /// Use `config` for [`save`](Self::save).
    pub fn with_store_config(mut self, config: StoreConfig) -> Self {
        self.store_config = config;
        self
    }

    pub fn raster(&self) -> &CategoricalRaster {
        &self.raster
    }

    pub fn codebook(&self) -> &Codebook {
        self.raster.codebook()
    }

    /// Resample onto a regular lat/lon grid with nearest neighbour.
    ///
    /// The output keeps the source pixel count. Its extent is the geographic
    /// envelope of the raster; each output cell center is mapped back to
    /// the source pixel containing it. Cells outside the raster, or on
    /// nodata, are missing. Latitude runs north to south like the raster rows.
    pub fn reproject_to_geographic(&self) -> Result<GriddedDataset> {
        let raster = &self.raster;
        let (width, height) = (raster.width(), raster.height());

        let (lat, lon, codes) = if raster.crs().is_geographic() {
            let lon = (0..width)
                .map(|col| raster.transform().pixel_center(col, 0).0)
                .collect();
            let lat = (0..height)
                .map(|row| raster.transform().pixel_center(0, row).1)
                .collect();
            (lat, lon, raster.codes().to_vec())
        } else {
            let (x_min, y_min, x_max, y_max) = raster.transform().bounds(width, height);
            let (min_lon, min_lat, max_lon, max_lat) = raster
                .crs()
                .geographic_bounds(x_min, y_min, x_max, y_max)
                .ok_or_else(|| {
                    DatacubeError::value(format!(
                        "raster '{}' has no geographic footprint",
                        raster.name()
                    ))
                })?;

            let lat_step = (max_lat - min_lat) / height as f64;
            let lon_step = (max_lon - min_lon) / width as f64;
            let lat: Vec<f64> = (0..height)
                .map(|row| max_lat - (row as f64 + 0.5) * lat_step)
                .collect();
            let lon: Vec<f64> = (0..width)
                .map(|col| min_lon + (col as f64 + 0.5) * lon_step)
                .collect();

            let mut codes = vec![f64::NAN; width * height];
            codes
                .par_chunks_mut(width)
                .zip(lat.par_iter())
                .for_each(|(out_row, &cell_lat)| {
                    for (out, &cell_lon) in out_row.iter_mut().zip(&lon) {
                        if let Some((x, y)) = raster.crs().from_geographic(cell_lat, cell_lon) {
                            *out = raster.sample(x, y);
                        }
                    }
                });
            (lat, lon, codes)
        };

        let variable = Variable::categorical(raster.variable(), codes, raster.codebook().clone())
            .with_attr("long_name", "Existing vegetation type");
        let dataset = GriddedDataset::new(raster.name(), lat, lon, None)?
            .with_attr("crs", "EPSG:4326")
            .with_attr("source_crs", raster.crs().name())
            .with_attr("resampling", "nearest")
            .with_variable(variable)?;

        debug!(
            raster = raster.name(),
            source_crs = raster.crs().name(),
            extent = ?dataset.extent(),
            "Reprojected raster to geographic coordinates"
        );
        Ok(dataset)
    }

    /// Aggregate class codes into `lat_cell_size` × `lon_cell_size` bins.
    ///
    /// Only MODE is accepted; any other method fails before any work is done.
    pub fn bucket_spatial(
        &self,
        lat_cell_size: f64,
        lon_cell_size: f64,
        method: AggregationMethod,
    ) -> Result<BucketedDataset> {
        if method != AggregationMethod::Mode {
            return Err(DatacubeError::invalid_aggregation(method, self.raster.variable()));
        }
        let geographic = self.reproject_to_geographic()?;
        bucket_spatial(&geographic, lat_cell_size, lon_cell_size, method)
    }

    /// Persist a processed dataset.
    pub fn save(&self, dataset: &GriddedDataset, path: impl AsRef<Path>) -> Result<()> {
        DatasetWriter::new(self.store_config.clone()).write(dataset, path)
    }
}
