//! Coordinate reference system transformations.
//!
//! Implements the map projections the ingestion pipeline meets in practice
//! (CONUS Albers, Web Mercator, Lambert conformal) from scratch, without
//! external geodesy dependencies.

pub mod albers;
pub mod crs;
pub mod lambert;
pub mod mercator;

pub use albers::AlbersEqualArea;
pub use crs::{ProjectedCrs, ProjectionError};
pub use lambert::LambertConformal;
pub use mercator::WebMercator;

/// Wrap a longitude difference into [-π, π].
pub(crate) fn wrap_radians(mut dlon: f64) -> f64 {
    use std::f64::consts::PI;
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}
