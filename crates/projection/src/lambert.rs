//! Lambert Conformal Conic projection.
//!
//! Maps a cone tangent or secant to the Earth's surface onto a flat plane.
//! Coordinates are meters relative to the projection origin (lat0, lon0),
//! plus optional false easting/northing, on a sphere.
//!
//! The projection parameters include:
//! - Reference latitude (lat0): latitude of the origin
//! - Central meridian (lon0)
//! - Standard parallel(s): latin1 and latin2 (equal for a tangent cone)

use std::f64::consts::PI;

use crate::wrap_radians;

/// Lambert Conformal Conic projection parameters.
#[derive(Debug, Clone)]
pub struct LambertConformal {
    /// Central meridian in radians
    pub lon0: f64,
    /// Latitude of origin in radians
    pub lat0: f64,
    /// First standard parallel in radians
    pub latin1: f64,
    /// Second standard parallel in radians
    pub latin2: f64,
    /// False easting (meters)
    pub false_easting: f64,
    /// False northing (meters)
    pub false_northing: f64,
    /// Earth radius (meters)
    pub earth_radius: f64,
    /// Cone constant (n)
    n: f64,
    /// F constant
    f: f64,
    /// Rho at the origin latitude
    rho0: f64,
}

impl LambertConformal {
    /// Create a projection from degrees on the WMO sphere.
    pub fn new(lat0_deg: f64, lon0_deg: f64, latin1_deg: f64, latin2_deg: f64) -> Self {
        Self::with_radius(lat0_deg, lon0_deg, latin1_deg, latin2_deg, 6371229.0)
    }

    pub fn with_radius(
        lat0_deg: f64,
        lon0_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        earth_radius: f64,
    ) -> Self {
        let to_rad = PI / 180.0;
        let lat0 = lat0_deg * to_rad;
        let lon0 = lon0_deg * to_rad;
        let latin1 = latin1_deg * to_rad;
        let latin2 = latin2_deg * to_rad;

        let n = if (latin1 - latin2).abs() < 1e-10 {
            // Tangent cone
            latin1.sin()
        } else {
            let ln_ratio = (latin1.cos() / latin2.cos()).ln();
            let tan_ratio =
                ((PI / 4.0 + latin2 / 2.0).tan() / (PI / 4.0 + latin1 / 2.0).tan()).ln();
            ln_ratio / tan_ratio
        };

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;
        let rho0 = earth_radius * f / (PI / 4.0 + lat0 / 2.0).tan().powf(n);

        Self {
            lon0,
            lat0,
            latin1,
            latin2,
            false_easting: 0.0,
            false_northing: 0.0,
            earth_radius,
            n,
            f,
            rho0,
        }
    }

    pub fn with_false_origin(mut self, false_easting: f64, false_northing: f64) -> Self {
        self.false_easting = false_easting;
        self.false_northing = false_northing;
        self
    }

    /// Geographic (degrees) to projected meters.
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let dlon = wrap_radians(lon_deg * to_rad - self.lon0);

        let rho = self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n);
        let theta = self.n * dlon;

        let x = rho * theta.sin() + self.false_easting;
        let y = self.rho0 - rho * theta.cos() + self.false_northing;
        (x, y)
    }

    /// Projected meters to `(lat, lon)` in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let x = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);

        let (rho, theta) = if self.n >= 0.0 {
            ((x * x + dy * dy).sqrt(), x.atan2(dy))
        } else {
            (-(x * x + dy * dy).sqrt(), (-x).atan2(-dy))
        };

        let lat =
            2.0 * ((self.earth_radius * self.f / rho).powf(1.0 / self.n)).atan() - PI / 2.0;
        let lon = self.lon0 + theta / self.n;

        (lat * to_deg, wrap_radians(lon) * to_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// HRRR-style CONUS cone.
    fn conus_lcc() -> LambertConformal {
        LambertConformal::new(38.5, -97.5, 38.5, 38.5)
    }

    #[test]
    fn test_origin_maps_to_zero() {
        let proj = conus_lcc();
        let (x, y) = proj.forward(38.5, -97.5);
        assert!(x.abs() < 1e-6, "x should be ~0, got {}", x);
        assert!(y.abs() < 1e-6, "y should be ~0, got {}", y);
    }

    #[test]
    fn test_roundtrip() {
        let proj = conus_lcc();
        let (x, y) = proj.forward(21.138123, -122.719528);
        let (lat, lon) = proj.inverse(x, y);
        assert!((lat - 21.138123).abs() < 1e-9, "lat roundtrip failed: {}", lat);
        assert!((lon - -122.719528).abs() < 1e-9, "lon roundtrip failed: {}", lon);
    }

    #[test]
    fn test_secant_cone_roundtrip() {
        let proj = LambertConformal::new(23.0, -96.0, 33.0, 45.0).with_false_origin(500.0, -250.0);
        let (x, y) = proj.forward(44.0, -103.5);
        let (lat, lon) = proj.inverse(x, y);
        assert!((lat - 44.0).abs() < 1e-9);
        assert!((lon - -103.5).abs() < 1e-9);
    }

    #[test]
    fn test_kansas_city_near_center() {
        let proj = conus_lcc();
        // Kansas City sits a few hundred km east of the central meridian
        let (x, y) = proj.forward(39.0, -94.5);
        assert!(x > 200_000.0 && x < 300_000.0, "unexpected x {}", x);
        assert!(y.abs() < 100_000.0, "unexpected y {}", y);
    }
}
