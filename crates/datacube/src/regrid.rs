//! Resampling a registered dataset onto the target grid.

use tracing::debug;

use cube_common::{min_spacing, GriddedDataset, Result, Variable};
use grid_bucketing::{check_interpolation, regrid_layer, InterpolationMethod, SourceAxes};

use crate::grid::TargetGrid;

/// Regrid every variable of `dataset` onto `grid`.
///
/// Time-varying variables take, for each target period, the earliest source
/// sample inside it; periods without a sample are missing. Time-invariant
/// variables stay time-invariant.
pub fn regrid_dataset(
    dataset: &GriddedDataset,
    grid: &TargetGrid,
    method: InterpolationMethod,
) -> Result<Vec<Variable>> {
    for var in dataset.variables() {
        check_interpolation(var, method)?;
    }

    // NEAREST accepts targets up to half a native step beyond the edge
    // samples; single-sample axes fall back to half a target step.
    let src = SourceAxes {
        lat: dataset.lat(),
        lon: dataset.lon(),
        lat_tolerance: min_spacing(dataset.lat()).unwrap_or(grid.lat_resolution) / 2.0,
        lon_tolerance: min_spacing(dataset.lon()).unwrap_or(grid.lon_resolution) / 2.0,
    };
    let plane = dataset.plane_len();
    let target_plane = grid.nlat() * grid.nlon();

    let time_sources = match (dataset.time(), grid.time.is_some()) {
        (Some(times), true) => grid.time_sources(times),
        _ => Vec::new(),
    };

    let mut variables = Vec::with_capacity(dataset.variables().len());
    for var in dataset.variables() {
        let values = if var.has_time() {
            let mut values = Vec::with_capacity(time_sources.len() * target_plane);
            for source in &time_sources {
                match source {
                    Some(t) => values.extend(regrid_layer(
                        var.layer(*t, plane),
                        src,
                        &grid.lat,
                        &grid.lon,
                        method,
                    )),
                    None => values.extend(std::iter::repeat(f64::NAN).take(target_plane)),
                }
            }
            values
        } else {
            regrid_layer(var.layer(0, plane), src, &grid.lat, &grid.lon, method)
        };

        debug!(
            dataset = dataset.name(),
            variable = var.name(),
            method = %method,
            valid = values.iter().filter(|v| !v.is_nan()).count(),
            "Regridded variable"
        );
        variables.push(var.with_values(values, var.has_time()));
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::BuildOptions;
    use cube_common::DatacubeError;
    use test_utils::{categorical_dataset, continuous_dataset, regular_axis, vegetation_codebook};

    #[test]
    fn test_linear_on_plane() {
        let ds = continuous_dataset(
            "plane",
            "z",
            regular_axis(0.0, 1.0, 3),
            regular_axis(10.0, 1.0, 3),
            None,
            |_, i, j| 2.0 * i as f64 + j as f64,
        );
        let grid = TargetGrid::derive([&ds], &BuildOptions::new(0.5, 0.5)).unwrap();
        let vars = regrid_dataset(&ds, &grid, InterpolationMethod::Linear).unwrap();

        // lat 0.5, lon 11.5 → 2 * 0.5 + 1.5
        let z = vars[0].values();
        assert!((z[grid.nlon() + 3] - 2.5).abs() < 1e-12);
        assert!(!vars[0].has_time());
    }

    #[test]
    fn test_categorical_needs_nearest() {
        let ds = categorical_dataset(
            "landfire",
            vec![44.0, 44.5],
            vec![-104.0, -103.5],
            vec![1.0, 2.0, 3.0, 4.0],
            vegetation_codebook(),
        );
        let grid = TargetGrid::derive([&ds], &BuildOptions::new(0.25, 0.25)).unwrap();

        for method in [
            InterpolationMethod::Linear,
            InterpolationMethod::Bilinear,
            InterpolationMethod::Cubic,
        ] {
            assert!(matches!(
                regrid_dataset(&ds, &grid, method),
                Err(DatacubeError::InvalidInterpolation { .. })
            ));
        }

        let vars = regrid_dataset(&ds, &grid, InterpolationMethod::Nearest).unwrap();
        let codes = vars[0].values();
        assert!(vars[0].is_categorical());
        assert!(codes.iter().all(|c| [1.0, 2.0, 3.0, 4.0].contains(c)));
    }
}
