//! Synthetic dataset generators.
//!
//! Values are predictable functions of their indices so tests can compute
//! expected aggregates by hand.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use cube_common::{Codebook, GriddedDataset, Variable};

/// `n` coordinates `start, start + step, ...`.
pub fn regular_axis(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + i as f64 * step).collect()
}

/// `n` mid-month timestamps starting at `year`-`month`.
pub fn monthly_times(year: i32, month: u32, n: usize) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|k| {
            let m0 = (month - 1) as usize + k;
            let y = year + (m0 / 12) as i32;
            let m = (m0 % 12) as u32 + 1;
            Utc.with_ymd_and_hms(y, m, 15, 0, 0, 0).unwrap()
        })
        .collect()
}

/// `n` daily timestamps at midnight starting at `start`.
pub fn daily_times(start: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
    (0..n).map(|d| start + Duration::days(d as i64)).collect()
}

/// Creates a layer with predictable values: `row * 1000 + col`.
///
/// # Example
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(2, 3);
/// assert_eq!(grid, vec![0.0, 1.0, 2.0, 1000.0, 1001.0, 1002.0]);
/// ```
pub fn create_test_grid(nlat: usize, nlon: usize) -> Vec<f64> {
    let mut data = Vec::with_capacity(nlat * nlon);
    for row in 0..nlat {
        for col in 0..nlon {
            data.push((row * 1000 + col) as f64);
        }
    }
    data
}

/// Build a dataset with one continuous variable whose value at
/// `(t, lat index, lon index)` is `f(t, i, j)`.
///
/// Without `times` the variable is time-invariant and `t` is always 0.
pub fn continuous_dataset(
    name: &str,
    variable: &str,
    lat: Vec<f64>,
    lon: Vec<f64>,
    times: Option<Vec<DateTime<Utc>>>,
    f: impl Fn(usize, usize, usize) -> f64,
) -> GriddedDataset {
    let nt = times.as_ref().map_or(1, Vec::len);
    let mut values = Vec::with_capacity(nt * lat.len() * lon.len());
    for t in 0..nt {
        for i in 0..lat.len() {
            for j in 0..lon.len() {
                values.push(f(t, i, j));
            }
        }
    }

    let var = if times.is_some() {
        Variable::continuous(variable, values)
    } else {
        Variable::continuous(variable, values).time_invariant()
    };

    GriddedDataset::new(name, lat, lon, times)
        .expect("invalid generator axes")
        .with_variable(var.with_attr("units", "K"))
        .expect("generator variable does not fit its grid")
}

/// Monthly near-surface temperature (`tas`, Kelvin) over a square region.
///
/// Temperature falls 0.5 K per degree north, rises 0.1 K per degree east and
/// follows a seasonal cycle.
pub fn temperature_dataset(
    name: &str,
    south: f64,
    west: f64,
    extent: f64,
    step: f64,
    months: usize,
) -> GriddedDataset {
    let n = (extent / step).round() as usize;
    let lat = regular_axis(south + step / 2.0, step, n);
    let lon = regular_axis(west + step / 2.0, step, n);
    let times = monthly_times(2021, 1, months);

    let seasonal: Vec<f64> = times
        .iter()
        .map(|t| 10.0 * ((t.month0() as f64 - 6.0) / 12.0 * std::f64::consts::PI).cos())
        .collect();

    let (lat_c, lon_c) = (lat.clone(), lon.clone());
    continuous_dataset(name, "tas", lat, lon, Some(times), move |t, i, j| {
        285.0 - 0.5 * (lat_c[i] - 40.0) + 0.1 * (lon_c[j] + 100.0) + seasonal[t]
    })
}

/// Time-invariant categorical dataset with the given row-major class codes.
pub fn categorical_dataset(
    name: &str,
    lat: Vec<f64>,
    lon: Vec<f64>,
    codes: Vec<f64>,
    codebook: Codebook,
) -> GriddedDataset {
    GriddedDataset::new(name, lat, lon, None)
        .expect("invalid generator axes")
        .with_variable(Variable::categorical("evt", codes, codebook))
        .expect("generator variable does not fit its grid")
}
