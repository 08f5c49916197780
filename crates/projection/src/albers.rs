//! Albers Equal-Area Conic projection on an ellipsoid.
//!
//! Used by USGS national products (LANDFIRE, NLCD) in the CONUS Albers
//! definition, EPSG:5070. Formulas follow Snyder, "Map Projections: A Working
//! Manual" (USGS PP 1395), pp. 101-102.

use std::f64::consts::PI;

use crate::wrap_radians;

/// Albers Equal-Area Conic projection parameters.
#[derive(Debug, Clone)]
pub struct AlbersEqualArea {
    /// Latitude of origin in radians
    pub lat0: f64,
    /// Central meridian in radians
    pub lon0: f64,
    /// First standard parallel in radians
    pub lat1: f64,
    /// Second standard parallel in radians
    pub lat2: f64,
    /// False easting (meters)
    pub false_easting: f64,
    /// False northing (meters)
    pub false_northing: f64,
    /// Semi-major axis (meters)
    pub a: f64,
    /// First eccentricity
    pub e: f64,
    n: f64,
    c: f64,
    rho0: f64,
}

impl AlbersEqualArea {
    /// Create a projection from degrees on the ellipsoid `(a, 1/f)`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lat0_deg: f64,
        lon0_deg: f64,
        lat1_deg: f64,
        lat2_deg: f64,
        false_easting: f64,
        false_northing: f64,
        semi_major_axis: f64,
        inverse_flattening: f64,
    ) -> Self {
        let to_rad = PI / 180.0;
        let lat0 = lat0_deg * to_rad;
        let lon0 = lon0_deg * to_rad;
        let lat1 = lat1_deg * to_rad;
        let lat2 = lat2_deg * to_rad;

        let f = 1.0 / inverse_flattening;
        let e = (2.0 * f - f * f).sqrt();

        let m1 = m(lat1, e);
        let m2 = m(lat2, e);
        let q0 = q(lat0, e);
        let q1 = q(lat1, e);
        let q2 = q(lat2, e);

        let n = if (lat1 - lat2).abs() < 1e-10 {
            lat1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = semi_major_axis * (c - n * q0).sqrt() / n;

        Self {
            lat0,
            lon0,
            lat1,
            lat2,
            false_easting,
            false_northing,
            a: semi_major_axis,
            e,
            n,
            c,
            rho0,
        }
    }

    /// CONUS Albers on NAD83 (EPSG:5070).
    pub fn conus() -> Self {
        Self::new(23.0, -96.0, 29.5, 45.5, 0.0, 0.0, 6378137.0, 298.257222101)
    }

    /// Geographic (degrees) to projected meters.
    pub fn forward(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let to_rad = PI / 180.0;
        let lat = lat_deg * to_rad;
        let dlon = wrap_radians(lon_deg * to_rad - self.lon0);

        let rho = self.a * (self.c - self.n * q(lat, self.e)).max(0.0).sqrt() / self.n;
        let theta = self.n * dlon;

        let x = rho * theta.sin() + self.false_easting;
        let y = self.rho0 - rho * theta.cos() + self.false_northing;
        (x, y)
    }

    /// Projected meters to geographic `(lat, lon)` in degrees.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let to_deg = 180.0 / PI;
        let x = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);

        let (rho, theta) = if self.n >= 0.0 {
            ((x * x + dy * dy).sqrt(), x.atan2(dy))
        } else {
            (-(x * x + dy * dy).sqrt(), (-x).atan2(-dy))
        };

        let q_val = (self.c - rho * rho * self.n * self.n / (self.a * self.a)) / self.n;
        let lat = self.latitude_from_q(q_val);
        let lon = self.lon0 + theta / self.n;

        (lat * to_deg, wrap_radians(lon) * to_deg)
    }

    /// Iterative inverse of `q` (Snyder eq. 3-16).
    fn latitude_from_q(&self, q_val: f64) -> f64 {
        let e = self.e;
        let e2 = e * e;

        // q at the poles
        let q_pole = 1.0 - (1.0 - e2) / (2.0 * e) * ((1.0 - e) / (1.0 + e)).ln();
        if (q_val.abs() - q_pole).abs() < 1e-12 {
            return (PI / 2.0).copysign(q_val);
        }

        let mut lat = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..25 {
            let sin_lat = lat.sin();
            let cos_lat = lat.cos();
            let es = 1.0 - e2 * sin_lat * sin_lat;
            let delta = es * es / (2.0 * cos_lat)
                * (q_val / (1.0 - e2) - sin_lat / es
                    + 1.0 / (2.0 * e) * ((1.0 - e * sin_lat) / (1.0 + e * sin_lat)).ln());
            lat += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        lat
    }
}

fn m(lat: f64, e: f64) -> f64 {
    let s = lat.sin();
    lat.cos() / (1.0 - e * e * s * s).sqrt()
}

fn q(lat: f64, e: f64) -> f64 {
    let s = lat.sin();
    let e2 = e * e;
    (1.0 - e2) * (s / (1.0 - e2 * s * s) - 1.0 / (2.0 * e) * ((1.0 - e * s) / (1.0 + e * s)).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_zero() {
        let proj = AlbersEqualArea::conus();
        let (x, y) = proj.forward(23.0, -96.0);
        assert!(x.abs() < 1e-6, "x should be 0, got {}", x);
        assert!(y.abs() < 1e-6, "y should be 0, got {}", y);
    }

    #[test]
    fn test_roundtrip_black_hills() {
        let proj = AlbersEqualArea::conus();
        let (x, y) = proj.forward(44.0, -103.5);
        // West of the central meridian, north of the origin
        assert!(x < 0.0);
        assert!(y > 2_000_000.0);

        let (lat, lon) = proj.inverse(x, y);
        assert!((lat - 44.0).abs() < 1e-9, "lat roundtrip failed: {}", lat);
        assert!((lon - -103.5).abs() < 1e-9, "lon roundtrip failed: {}", lon);
    }

    #[test]
    fn test_central_meridian_is_vertical() {
        let proj = AlbersEqualArea::conus();
        let (x_low, _) = proj.forward(30.0, -96.0);
        let (x_high, _) = proj.forward(48.0, -96.0);
        assert!(x_low.abs() < 1e-6);
        assert!(x_high.abs() < 1e-6);
    }
}
