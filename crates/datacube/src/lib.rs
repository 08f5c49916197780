//! Unified datacube construction.
//!
//! Registers processed datasets from the source processors, regrids them
//! onto one latitude/longitude/time grid and persists the merged cube.
//!
//! # Architecture
//!
//! ```text
//!  ContinuousProcessor ─┐
//!                       ├─► DatacubeBuilder::add_dataset ─┐
//! CategoricalProcessor ─┘                                 │
//!  Zarr / NetCDF / GeoTIFF ─► load_dataset_from_file ─────┤
//!                                                         ▼
//!                         build_datacube: TargetGrid::derive
//!                                         regrid_dataset (per dataset)
//!                                         <dataset>_<variable> naming
//!                                                         │
//!                                                         ▼
//!                          UnifiedDatacube ─► save_datacube (Zarr)
//! ```
//!
//! [`run_pipeline`] drives the whole flow for a region from a
//! [`PipelineConfig`].
//!
//! # Example
//!
//! ```ignore
//! use datacube::{BuildOptions, DatacubeBuilder};
//!
//! let mut builder = DatacubeBuilder::new();
//! builder.add_dataset("maca", &maca_bucketed)?;
//! builder.add_dataset("landfire", &landfire_bucketed)?;
//! builder.build_datacube(&BuildOptions::new(0.1, 0.1))?;
//! builder.save_datacube("data/processed/black_hills.zarr")?;
//! ```

pub mod builder;
pub mod config;
pub mod cube;
pub mod grid;
pub mod logging;
pub mod pipeline;
pub mod regrid;

pub use builder::{BuilderState, DatacubeBuilder, CUBE_NAME};
pub use config::{PipelineConfig, RegionOfInterest};
pub use cube::UnifiedDatacube;
pub use grid::{axis_points, BuildOptions, TargetGrid};
pub use pipeline::{run_pipeline, PipelineInputs, SourceInput};
pub use regrid::regrid_dataset;
