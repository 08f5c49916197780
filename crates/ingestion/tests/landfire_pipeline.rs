//! GeoTIFF on disk → categorical processor → bucketed, persisted dataset.

use cube_common::DatacubeError;
use grid_bucketing::{load_dataset, AggregationMethod};
use ingestion::geotiff::{codebook_path, write_codebook, write_geotiff};
use ingestion::{CategoricalProcessor, CategoricalRaster, GeoTransform};
use projection::ProjectedCrs;
use test_utils::{scratch_dir, vegetation_codebook};

fn write_fixture(dir: &std::path::Path) -> std::path::PathBuf {
    // 8 x 8 geographic raster of 0.125° pixels; each 4 x 4 quadrant is
    // dominated by one class.
    let mut codes = Vec::with_capacity(64);
    for row in 0..8 {
        for col in 0..8 {
            let dominant = match (row < 4, col < 4) {
                (true, true) => 2.0,
                (true, false) => 3.0,
                (false, true) => 1.0,
                (false, false) => 4.0,
            };
            codes.push(if (row + col) % 5 == 0 { 5.0 } else { dominant });
        }
    }
    let raster = CategoricalRaster::new(
        "evt",
        8,
        8,
        codes,
        GeoTransform::new(-104.0, 44.5, 0.125, 0.125).unwrap(),
        ProjectedCrs::Geographic,
    )
    .unwrap();

    let path = dir.join("LF2022_EVT_220.tif");
    write_geotiff(&path, &raster, 4326, 0).unwrap();
    write_codebook(&codebook_path(&path), &vegetation_codebook()).unwrap();
    path
}

#[test]
fn test_open_bucket_save() {
    test_utils::init_test_tracing();
    let dir = scratch_dir();
    let path = write_fixture(dir.path());

    let processor = CategoricalProcessor::open(&path).unwrap();
    assert_eq!(processor.codebook(), &vegetation_codebook());

    let out = processor
        .bucket_spatial(0.5, 0.5, AggregationMethod::Mode)
        .unwrap();
    let ds = out.dataset();
    assert_eq!((ds.nlat(), ds.nlon()), (2, 2));
    assert_eq!(ds.variable("evt").unwrap().values(), &[1.0, 4.0, 2.0, 3.0]);

    let saved = dir.path().join("evt_0p5.zarr");
    processor.save(ds, &saved).unwrap();
    let loaded = load_dataset(&saved).unwrap();
    let evt = loaded.variable("evt").unwrap();
    assert!(evt.is_categorical());
    assert_eq!(evt.values(), ds.variable("evt").unwrap().values());
    assert_eq!(evt.kind().codebook(), Some(&vegetation_codebook()));
}

#[test]
fn test_majority_is_mode_and_mean_fails_fast() {
    let dir = scratch_dir();
    let processor = CategoricalProcessor::open(write_fixture(dir.path())).unwrap();

    let majority: AggregationMethod = "majority".parse().unwrap();
    assert!(processor.bucket_spatial(1.0, 1.0, majority).is_ok());

    for method in [AggregationMethod::Mean, AggregationMethod::Median, AggregationMethod::Sum] {
        let err = processor.bucket_spatial(1.0, 1.0, method).unwrap_err();
        assert!(matches!(err, DatacubeError::InvalidAggregation { .. }));
    }
}

#[test]
fn test_open_with_codebook_overrides_sidecar() {
    let dir = scratch_dir();
    let path = write_fixture(dir.path());

    let mut codebook = vegetation_codebook();
    codebook.insert(9, "Snow-Ice".to_string());
    let processor = CategoricalProcessor::open_with_codebook(&path, codebook.clone()).unwrap();
    assert_eq!(processor.codebook(), &codebook);
}
