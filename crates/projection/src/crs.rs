//! Coordinate reference systems recognised by raster ingestion.

use thiserror::Error;

use crate::{AlbersEqualArea, LambertConformal, WebMercator};

/// Errors raised while resolving a coordinate reference system.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("unsupported EPSG code: {0}")]
    UnsupportedEpsg(u32),

    #[error("invalid projection parameters: {0}")]
    InvalidParameters(String),
}

/// A planar or geographic CRS with forward/inverse transforms.
#[derive(Debug, Clone)]
pub enum ProjectedCrs {
    /// Longitude/latitude degrees (EPSG:4326 and friends).
    Geographic,
    WebMercator(WebMercator),
    Albers(AlbersEqualArea),
    Lambert(LambertConformal),
}

impl ProjectedCrs {
    /// Resolve a well-known EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self, ProjectionError> {
        match code {
            4326 | 4269 | 4258 => Ok(Self::Geographic),
            3857 | 900913 => Ok(Self::WebMercator(WebMercator::default())),
            5070 => Ok(Self::Albers(AlbersEqualArea::conus())),
            other => Err(ProjectionError::UnsupportedEpsg(other)),
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Geographic => "geographic",
            Self::WebMercator(_) => "web_mercator",
            Self::Albers(_) => "albers_conical_equal_area",
            Self::Lambert(_) => "lambert_conformal_conic",
        }
    }

    /// Planar `(x, y)` to `(lat, lon)` degrees. `None` when the point has no
    /// finite geographic position.
    pub fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let (lat, lon) = match self {
            Self::Geographic => (y, x),
            Self::WebMercator(p) => p.inverse(x, y),
            Self::Albers(p) => p.inverse(x, y),
            Self::Lambert(p) => p.inverse(x, y),
        };
        (lat.is_finite() && lon.is_finite() && lat.abs() <= 90.0).then_some((lat, lon))
    }

    /// `(lat, lon)` degrees to planar `(x, y)`.
    pub fn from_geographic(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        let (x, y) = match self {
            Self::Geographic => (lon, lat),
            Self::WebMercator(p) => p.forward(lat, lon),
            Self::Albers(p) => p.forward(lat, lon),
            Self::Lambert(p) => p.forward(lat, lon),
        };
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }

    /// Geographic envelope of a planar rectangle.
    ///
    /// Projected rectangles have curved edges in lat/lon, so corners alone
    /// are not enough: every edge is sampled.
    ///
    /// Returns `(min_lon, min_lat, max_lon, max_lat)`.
    pub fn geographic_bounds(
        &self,
        x_min: f64,
        y_min: f64,
        x_max: f64,
        y_max: f64,
    ) -> Option<(f64, f64, f64, f64)> {
        const STEPS: usize = 20;

        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lon = f64::MAX;
        let mut max_lon = f64::MIN;

        for t in 0..=STEPS {
            let frac = t as f64 / STEPS as f64;
            let x = x_min + frac * (x_max - x_min);
            let y = y_min + frac * (y_max - y_min);
            for (px, py) in [(x, y_min), (x, y_max), (x_min, y), (x_max, y)] {
                if let Some((lat, lon)) = self.to_geographic(px, py) {
                    min_lat = min_lat.min(lat);
                    max_lat = max_lat.max(lat);
                    min_lon = min_lon.min(lon);
                    max_lon = max_lon.max(lon);
                }
            }
        }

        (min_lat <= max_lat && min_lon <= max_lon).then_some((min_lon, min_lat, max_lon, max_lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_epsg() {
        assert!(ProjectedCrs::from_epsg(4326).unwrap().is_geographic());
        assert_eq!(ProjectedCrs::from_epsg(5070).unwrap().name(), "albers_conical_equal_area");
        assert!(matches!(
            ProjectedCrs::from_epsg(32613),
            Err(ProjectionError::UnsupportedEpsg(32613))
        ));
    }

    #[test]
    fn test_geographic_passthrough() {
        let crs = ProjectedCrs::Geographic;
        assert_eq!(crs.to_geographic(-104.0, 44.0), Some((44.0, -104.0)));
        assert_eq!(crs.to_geographic(0.0, 95.0), None);
    }

    #[test]
    fn test_albers_bounds_enclose_corners() {
        let crs = ProjectedCrs::from_epsg(5070).unwrap();
        let (x0, y0) = crs.from_geographic(43.5, -104.7).unwrap();
        let (x1, y1) = crs.from_geographic(44.6, -103.3).unwrap();
        let (min_lon, min_lat, max_lon, max_lat) = crs
            .geographic_bounds(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
            .unwrap();
        assert!(min_lon <= -104.7 + 1e-9 && max_lon >= -103.3 - 1e-9);
        assert!(min_lat <= 43.5 + 1e-9 && max_lat >= 44.6 - 1e-9);
    }
}
