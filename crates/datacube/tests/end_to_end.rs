//! Two overlapping temperature products, bucketed and merged at 0.1°.

use chrono::{TimeZone, Utc};

use cube_common::TimePeriod;
use datacube::{BuildOptions, DatacubeBuilder};
use grid_bucketing::{bucket_spatial, load_dataset, AggregationMethod, InterpolationMethod};
use ingestion::{ContinuousProcessor, ProcessOptions};
use test_utils::{assert_approx_eq, init_test_tracing, scratch_dir, temperature_dataset};

/// Same surface as `temperature_dataset`.
fn tas(month0: usize, lat: f64, lon: f64) -> f64 {
    let seasonal = 10.0 * ((month0 as f64 - 6.0) / 12.0 * std::f64::consts::PI).cos();
    285.0 - 0.5 * (lat - 40.0) + 0.1 * (lon + 100.0) + seasonal
}

/// Fine product over [0, 2]² at 0.5° and coarse product over [0.5, 2.5]² at
/// 1.0°, both bucketed to 1.0°.
fn build(options: &BuildOptions) -> DatacubeBuilder {
    let fine = ContinuousProcessor::from_dataset(temperature_dataset("maca", 0.0, 0.0, 2.0, 0.5, 3))
        .unwrap()
        .process_to_datacube(&ProcessOptions::spatial(1.0, 1.0))
        .unwrap();
    let coarse =
        ContinuousProcessor::from_dataset(temperature_dataset("gridmet", 0.5, 0.5, 2.0, 1.0, 3))
            .unwrap()
            .process_to_datacube(&ProcessOptions::spatial(1.0, 1.0))
            .unwrap();

    assert_eq!(fine.dataset().lat(), &[0.75, 1.75]);
    assert_eq!(coarse.dataset().lat(), &[1.5, 2.5]);

    let mut builder = DatacubeBuilder::new();
    builder.add_dataset("maca", &fine).unwrap();
    builder.add_dataset("gridmet", &coarse).unwrap();
    builder.build_datacube(options).unwrap();
    builder
}

fn options() -> BuildOptions {
    BuildOptions::new(0.1, 0.1)
        .with_time_resolution(TimePeriod::Months(1))
        .with_interpolation(InterpolationMethod::Linear)
}

#[test]
fn test_overlapping_products_share_one_grid() {
    init_test_tracing();
    let builder = build(&options());
    let cube = builder.datacube().unwrap();
    let grid = cube.grid();

    assert_eq!(cube.variable_names(), vec!["maca_tas", "gridmet_tas"]);
    assert_eq!(grid.nlat(), 19);
    assert_eq!(grid.nlon(), 19);
    assert_approx_eq!(grid.lat[0], 0.75, 1e-12);
    assert_approx_eq!(grid.lat[18], 2.55, 1e-9);
    assert_eq!(
        grid.time.as_deref().unwrap(),
        &[
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap(),
        ]
    );

    let plane = grid.nlat() * grid.nlon();
    let at = |t: usize, i: usize, j: usize| t * plane + i * grid.nlon() + j;
    let maca = cube.variable("maca_tas").unwrap().values();
    let gridmet = cube.variable("gridmet_tas").unwrap().values();
    assert_eq!(maca.len(), 3 * plane);
    assert_eq!(gridmet.len(), 3 * plane);

    // Overlap: both products populated. Bin means sit a quarter degree
    // (maca) and half a degree (gridmet) south-west of their bin labels.
    for t in 0..3 {
        for (i, j) in [(8, 8), (9, 9), (8, 9)] {
            let (lat, lon) = (grid.lat[i], grid.lon[j]);
            assert_approx_eq!(maca[at(t, i, j)], tas(t, lat - 0.25, lon - 0.25), 1e-6);
            assert_approx_eq!(gridmet[at(t, i, j)], tas(t, lat - 0.5, lon - 0.5), 1e-6);
        }
    }

    // South-west corner is maca only; north-east edge lies beyond both.
    assert!(!maca[at(0, 0, 0)].is_nan());
    assert!(gridmet[at(0, 0, 0)].is_nan());
    assert!(maca[at(0, 18, 18)].is_nan());
    assert!(gridmet[at(0, 18, 18)].is_nan());
}

#[test]
fn test_fill_value_replaces_missing_edges() {
    let builder = build(&options().with_fill_value(-9999.0));
    let cube = builder.datacube().unwrap();
    let nlon = cube.grid().nlon();

    let gridmet = cube.variable("gridmet_tas").unwrap().values();
    assert!(gridmet.iter().all(|v| !v.is_nan()));
    assert_eq!(gridmet[0], -9999.0);
    assert_eq!(gridmet[18 * nlon + 18], -9999.0);
    assert!(gridmet[9 * nlon + 9] > 200.0);
    assert_eq!(cube.dataset().attrs()["fill_value"], -9999.0);
}

#[test]
fn test_saved_cube_carries_build_parameters() {
    let dir = scratch_dir();
    let path = dir.path().join("black_hills.zarr");
    let builder = build(&options());
    builder.save_datacube(&path).unwrap();

    let loaded = load_dataset(&path).unwrap();
    let attrs = loaded.attrs();
    assert_eq!(attrs["lat_resolution"], 0.1);
    assert_eq!(attrs["lon_resolution"], 0.1);
    assert_eq!(attrs["time_resolution"], "ME");
    assert_eq!(attrs["interpolation"], "linear");
    assert_eq!(attrs["source_datasets"], serde_json::json!(["maca", "gridmet"]));

    let var = loaded.variable("gridmet_tas").unwrap();
    assert_eq!(var.attrs()["source_dataset"], "gridmet");
    assert_eq!(var.attrs()["source_variable"], "tas");
}

#[test]
fn test_finer_than_native_bucket_is_rejected() {
    let err = ContinuousProcessor::from_dataset(temperature_dataset("maca", 0.0, 0.0, 2.0, 0.5, 3))
        .unwrap()
        .process_to_datacube(&ProcessOptions::spatial(0.25, 0.25))
        .unwrap_err();
    assert_eq!(err.code(), "ResolutionError");
}

#[test]
fn test_quarter_degree_buckets_leave_alternating_holes() {
    let source = temperature_dataset("maca", 0.0, 0.0, 2.0, 0.5, 3);
    let bucketed = bucket_spatial(&source, 0.25, 0.25, AggregationMethod::Mean).unwrap();
    let ds = bucketed.dataset();

    assert_eq!(ds.nlat(), 7);
    assert_eq!(ds.nlon(), 7);
    assert_eq!(ds.ntime(), 3);
    for (k, lat) in ds.lat().iter().enumerate() {
        assert_approx_eq!(*lat, 0.375 + 0.25 * k as f64, 1e-12);
    }

    // Source points at 0.25, 0.75, 1.25, 1.75 land in even bins only.
    let tas = ds.variable("tas").unwrap().values();
    let plane = ds.nlat() * ds.nlon();
    for t in 0..3 {
        for i in 0..7 {
            for j in 0..7 {
                let v = tas[t * plane + i * 7 + j];
                if i % 2 == 0 && j % 2 == 0 {
                    assert_eq!(bucketed.count(t, i, j), Some(1));
                    let src = source.variable("tas").unwrap().values();
                    assert_eq!(v, src[t * 16 + (i / 2) * 4 + j / 2]);
                } else {
                    assert_eq!(bucketed.count(t, i, j), Some(0));
                    assert!(v.is_nan(), "({}, {}, {}) should be missing", t, i, j);
                }
            }
        }
    }

    // The processor refuses the same request.
    let err = ContinuousProcessor::from_dataset(source)
        .unwrap()
        .process_to_datacube(&ProcessOptions::spatial(0.25, 0.25))
        .unwrap_err();
    assert_eq!(err.code(), "ResolutionError");
}
