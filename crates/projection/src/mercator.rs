//! Spherical (Web) Mercator, EPSG:3857.

use std::f64::consts::PI;

use crate::wrap_radians;

/// Pseudo-Mercator on the WGS84 semi-major axis sphere.
#[derive(Debug, Clone)]
pub struct WebMercator {
    /// Sphere radius (meters)
    pub radius: f64,
}

/// Latitude limit where projected y equals x at ±180°.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

impl Default for WebMercator {
    fn default() -> Self {
        Self { radius: 6378137.0 }
    }
}

impl WebMercator {
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg.clamp(-MAX_LATITUDE, MAX_LATITUDE) * to_rad;
        let x = self.radius * wrap_radians(lon_deg * to_rad);
        let y = self.radius * (PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }

    /// Projected meters to `(lat, lon)` in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let lat = 2.0 * (y / self.radius).exp().atan() - PI / 2.0;
        let lon = x / self.radius;
        (lat * to_deg, lon * to_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antimeridian_extent() {
        let proj = WebMercator::default();
        let (x, _) = proj.forward(0.0, 180.0);
        assert!((x - 20037508.342789244).abs() < 1e-6);
    }

    #[test]
    fn test_roundtrip() {
        let proj = WebMercator::default();
        let (x, y) = proj.forward(44.2, -103.7);
        let (lat, lon) = proj.inverse(x, y);
        assert!((lat - 44.2).abs() < 1e-9);
        assert!((lon - -103.7).abs() < 1e-9);
    }
}
