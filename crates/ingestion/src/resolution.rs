//! Native grid resolution and the "no finer than native" rule.

use chrono::Duration;
use serde::Serialize;

use cube_common::time::min_time_step;
use cube_common::{min_spacing, DatacubeError, GriddedDataset, Result, TimePeriod};

/// Relative slack allowed when comparing a request against the native step.
const RESOLUTION_TOLERANCE: f64 = 1e-9;

/// Minimum non-zero spacing along each axis of a dataset.
///
/// An axis with a single sample has no spacing and imposes no limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NativeResolution {
    pub lat_step: Option<f64>,
    pub lon_step: Option<f64>,
    #[serde(skip)]
    pub time_step: Option<Duration>,
}

impl NativeResolution {
    pub fn of(dataset: &GriddedDataset) -> Self {
        Self {
            lat_step: min_spacing(dataset.lat()),
            lon_step: min_spacing(dataset.lon()),
            time_step: dataset.time().and_then(min_time_step),
        }
    }

    /// `(lat_step, lon_step, time_step)`.
    pub fn as_tuple(&self) -> (Option<f64>, Option<f64>, Option<Duration>) {
        (self.lat_step, self.lon_step, self.time_step)
    }

    /// Reject spatial cell sizes finer than the native grid.
    pub fn check_spatial(&self, lat_cell_size: f64, lon_cell_size: f64) -> Result<()> {
        check_axis("latitude", lat_cell_size, self.lat_step)?;
        check_axis("longitude", lon_cell_size, self.lon_step)
    }

    /// Reject periods that can be shorter than the native time step.
    pub fn check_period(&self, period: TimePeriod) -> Result<()> {
        let Some(step) = self.time_step else {
            return Ok(());
        };
        if period.min_duration() < step {
            return Err(DatacubeError::resolution(format!(
                "time period {} is finer than the native time step of {} days",
                period.token(),
                step.num_seconds() as f64 / 86_400.0
            )));
        }
        Ok(())
    }
}

fn check_axis(axis: &str, requested: f64, native: Option<f64>) -> Result<()> {
    match native {
        Some(native) if requested < native * (1.0 - RESOLUTION_TOLERANCE) => {
            Err(DatacubeError::resolution(format!(
                "{} cell size {} is finer than the native resolution {}",
                axis, requested, native
            )))
        }
        _ => Ok(()),
    }
}
