//! Interpolation kernels for resampling a layer onto new coordinates.
//!
//! Kernels work on fractional indices into the source layer. Indices are
//! located on (possibly descending, possibly irregular) coordinate axes by
//! binary search with [`fractional_index`].

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use cube_common::{DatacubeError, Result};

/// Interpolation method for regridding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest source sample; the only method valid for class codes.
    Nearest,
    /// Alias of [`Bilinear`](Self::Bilinear).
    #[default]
    Linear,
    Bilinear,
    /// Catmull-Rom bicubic, falling back to bilinear near missing data.
    Cubic,
}

impl InterpolationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Bilinear => "bilinear",
            Self::Cubic => "cubic",
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = DatacubeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" => Ok(Self::Linear),
            "bilinear" => Ok(Self::Bilinear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            other => Err(DatacubeError::value(format!(
                "unknown interpolation method '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fractional position of `x` on a strictly monotonic axis, or `None` if `x`
/// lies outside the sampled range.
pub fn fractional_index(axis: &[f64], x: f64) -> Option<f64> {
    let n = axis.len();
    match n {
        0 => None,
        1 => (x == axis[0]).then_some(0.0),
        _ => {
            let ascending = axis[1] > axis[0];
            let (lo, hi) = if ascending {
                (axis[0], axis[n - 1])
            } else {
                (axis[n - 1], axis[0])
            };
            if !(x >= lo && x <= hi) {
                return None;
            }

            // first index whose sample lies beyond x
            let k = if ascending {
                axis.partition_point(|&v| v <= x)
            } else {
                axis.partition_point(|&v| v >= x)
            };
            let i0 = k.saturating_sub(1).min(n - 2);
            let frac = (x - axis[i0]) / (axis[i0 + 1] - axis[i0]);
            Some(i0 as f64 + frac)
        }
    }
}

/// Index of the sample closest to `x`, accepting targets up to `tolerance`
/// beyond either end of the axis.
pub fn nearest_index(axis: &[f64], x: f64, tolerance: f64) -> Option<usize> {
    let n = axis.len();
    if n == 0 || !x.is_finite() {
        return None;
    }

    let (first, last) = (axis[0], axis[n - 1]);
    let (lo, lo_idx, hi, hi_idx) = if last >= first {
        (first, 0, last, n - 1)
    } else {
        (last, n - 1, first, 0)
    };

    if x < lo {
        return (lo - x <= tolerance).then_some(lo_idx);
    }
    if x > hi {
        return (x - hi <= tolerance).then_some(hi_idx);
    }

    let pos = fractional_index(axis, x)?;
    let i0 = pos.floor() as usize;
    if i0 + 1 >= n {
        return Some(n - 1);
    }
    let d0 = (x - axis[i0]).abs();
    let d1 = (axis[i0 + 1] - x).abs();
    Some(if d1 < d0 { i0 + 1 } else { i0 })
}

/// Bilinear interpolation at fractional `(row, col)`.
///
/// Corners with zero weight do not contribute; any contributing missing
/// corner makes the result missing.
pub fn bilinear_interpolate(data: &[f64], width: usize, height: usize, row: f64, col: f64) -> f64 {
    if width == 0 || height == 0 || row < 0.0 || col < 0.0 {
        return f64::NAN;
    }
    let y0 = row.floor() as usize;
    let x0 = col.floor() as usize;
    if y0 >= height || x0 >= width {
        return f64::NAN;
    }
    let y1 = (y0 + 1).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);

    let yf = row - y0 as f64;
    let xf = col - x0 as f64;

    let corners = [
        (y0, x0, (1.0 - yf) * (1.0 - xf)),
        (y0, x1, (1.0 - yf) * xf),
        (y1, x0, yf * (1.0 - xf)),
        (y1, x1, yf * xf),
    ];

    let mut sum = 0.0;
    for (y, x, w) in corners {
        if w <= 0.0 {
            continue;
        }
        let v = data[y * width + x];
        if v.is_nan() {
            return f64::NAN;
        }
        sum += w * v;
    }
    sum
}

/// Bicubic (Catmull-Rom) interpolation at fractional `(row, col)`.
///
/// Uses the 16 surrounding samples, edge-clamped; falls back to bilinear if
/// any of them is missing.
pub fn cubic_interpolate(data: &[f64], width: usize, height: usize, row: f64, col: f64) -> f64 {
    if width == 0 || height == 0 || row < 0.0 || col < 0.0 {
        return f64::NAN;
    }
    let yi = row.floor() as i64;
    let xi = col.floor() as i64;
    if yi >= height as i64 || xi >= width as i64 {
        return f64::NAN;
    }

    let yf = row - yi as f64;
    let xf = col - xi as f64;

    let mut values = [[0.0f64; 4]; 4];
    for (j, row_values) in values.iter_mut().enumerate() {
        for (i, value) in row_values.iter_mut().enumerate() {
            let py = (yi + j as i64 - 1).clamp(0, height as i64 - 1) as usize;
            let px = (xi + i as i64 - 1).clamp(0, width as i64 - 1) as usize;
            *value = data[py * width + px];
            if value.is_nan() {
                return bilinear_interpolate(data, width, height, row, col);
            }
        }
    }

    let mut row_values = [0.0f64; 4];
    for (j, v) in row_values.iter_mut().enumerate() {
        *v = cubic_1d(values[j][0], values[j][1], values[j][2], values[j][3], xf);
    }
    cubic_1d(row_values[0], row_values[1], row_values[2], row_values[3], yf)
}

/// 1D Catmull-Rom spline.
fn cubic_1d(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;

    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;

    a * t3 + b * t2 + c * t + d
}

/// Source axes of a layer together with their nearest-neighbour tolerances.
#[derive(Debug, Clone, Copy)]
pub struct SourceAxes<'a> {
    pub lat: &'a [f64],
    pub lon: &'a [f64],
    /// Half the native latitude step.
    pub lat_tolerance: f64,
    /// Half the native longitude step.
    pub lon_tolerance: f64,
}

/// Resample one `[lat][lon]` layer onto the target coordinates.
///
/// Targets outside the source range are missing, except for NEAREST which
/// accepts them up to the axis tolerance.
pub fn regrid_layer(
    layer: &[f64],
    src: SourceAxes<'_>,
    dst_lat: &[f64],
    dst_lon: &[f64],
    method: InterpolationMethod,
) -> Vec<f64> {
    let width = src.lon.len();
    let height = src.lat.len();
    let nlon = dst_lon.len();

    let mut output = vec![f64::NAN; dst_lat.len() * nlon];
    if width == 0 || height == 0 || nlon == 0 {
        return output;
    }

    match method {
        InterpolationMethod::Nearest => {
            let cols: Vec<Option<usize>> = dst_lon
                .iter()
                .map(|&x| nearest_index(src.lon, x, src.lon_tolerance))
                .collect();
            output
                .par_chunks_mut(nlon)
                .zip(dst_lat.par_iter())
                .for_each(|(out_row, &y)| {
                    let Some(r) = nearest_index(src.lat, y, src.lat_tolerance) else {
                        return;
                    };
                    for (out, col) in out_row.iter_mut().zip(&cols) {
                        if let Some(c) = col {
                            *out = layer[r * width + c];
                        }
                    }
                });
        }
        InterpolationMethod::Linear | InterpolationMethod::Bilinear | InterpolationMethod::Cubic => {
            let cols: Vec<Option<f64>> = dst_lon
                .iter()
                .map(|&x| fractional_index(src.lon, x))
                .collect();
            let cubic = method == InterpolationMethod::Cubic;
            output
                .par_chunks_mut(nlon)
                .zip(dst_lat.par_iter())
                .for_each(|(out_row, &y)| {
                    let Some(r) = fractional_index(src.lat, y) else {
                        return;
                    };
                    for (out, col) in out_row.iter_mut().zip(&cols) {
                        if let Some(c) = *col {
                            *out = if cubic {
                                cubic_interpolate(layer, width, height, r, c)
                            } else {
                                bilinear_interpolate(layer, width, height, r, c)
                            };
                        }
                    }
                });
        }
    }

    output
}
