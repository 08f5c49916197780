//! Common types and utilities shared across the datacube pipeline crates.
//!
//! - [`GriddedDataset`]: named variables on shared latitude/longitude/time axes
//! - [`VariableKind`]: continuous vs. categorical tagging of variables
//! - [`TimePeriod`]: calendar-aware temporal bucket lengths
//! - [`DatacubeError`]: the error taxonomy used by every pipeline stage

pub mod bbox;
pub mod dataset;
pub mod error;
pub mod time;

pub use bbox::BoundingBox;
pub use dataset::{
    checked_axis_len, min_spacing, Attributes, Codebook, GriddedDataset, Variable, VariableKind,
    LAT, LON, MAX_AXIS_LEN, TIME,
};
pub use error::{DatacubeError, Result};
pub use time::{PeriodGrouper, TimePeriod};
