//! Source processors for the datacube pipeline.
//!
//! Each processor ingests one raw data family, reports its native
//! resolution, brings it onto geographic coordinates and hands it to the
//! bucketing engine.
//!
//! # Architecture
//!
//! ```text
//! NetCDF / Zarr ─► ContinuousProcessor ─┐
//!                                       ├─► grid_bucketing ─► BucketedDataset
//! GeoTIFF ──────► CategoricalProcessor ─┘
//!                   (nearest-neighbour reprojection, MODE only)
//! ```
//!
//! NetCDF input is behind the `netcdf` cargo feature.

pub mod categorical;
pub mod continuous;
pub mod geotiff;
#[cfg(feature = "netcdf")]
pub mod netcdf;
pub mod resolution;
pub mod source;

// Re-exports
pub use categorical::{CategoricalProcessor, CategoricalRaster, GeoTransform};
pub use continuous::{ContinuousProcessor, ProcessOptions};
pub use resolution::NativeResolution;
pub use source::{detect_source_format, SourceFormat};
