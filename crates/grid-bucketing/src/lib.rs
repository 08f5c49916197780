//! Grid Bucketing Engine
//!
//! Reduces gridded datasets onto coarser spatial bins and calendar periods,
//! resamples layers onto new coordinates, and persists datasets as
//! self-describing Zarr V3 stores.
//!
//! # Architecture
//!
//! ```text
//! GriddedDataset
//!      │
//!      ├─► bucket_spatial / bucket_temporal / bucket
//!      │         │
//!      │         ├─► check_aggregation (categorical → MODE only)
//!      │         │
//!      │         └─► per-row rayon reduction → BucketedDataset
//!      │
//!      ├─► regrid_layer (NEAREST / LINEAR / BILINEAR / CUBIC)
//!      │
//!      └─► DatasetWriter::write ─► staging dir ─► rename into place
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_bucketing::{bucket_spatial, AggregationMethod};
//!
//! let coarse = bucket_spatial(&dataset, 1.0, 1.0, AggregationMethod::Mean)?;
//! grid_bucketing::save_dataset(coarse.dataset(), "out/tas_1deg.zarr")?;
//! ```

pub mod aggregation;
pub mod bucket;
pub mod config;
pub mod policy;
pub mod regrid;
pub mod store;

pub use aggregation::AggregationMethod;
pub use bucket::{
    bucket, bucket_spatial, bucket_temporal, bucket_with_spec, BucketSpec, BucketedDataset,
};
pub use config::{StoreConfig, ZarrCompression};
pub use policy::{check_aggregation, check_interpolation, ResamplingPolicy};
pub use regrid::{
    bilinear_interpolate, cubic_interpolate, fractional_index, nearest_index, regrid_layer,
    InterpolationMethod, SourceAxes,
};
pub use store::{load_dataset, save_dataset, DatasetWriter};
