//! Whole-dataset properties of the bucketing engine.

use cube_common::{DatacubeError, TimePeriod};
use grid_bucketing::{bucket, bucket_spatial, bucket_temporal, AggregationMethod};
use test_utils::{
    assert_values_eq, categorical_dataset, continuous_dataset, monthly_times, regular_axis,
    temperature_dataset, vegetation_codebook,
};

#[test]
fn test_reduce_100x100_to_10x10() {
    let ds = continuous_dataset(
        "fine",
        "tas",
        regular_axis(0.005, 0.01, 100),
        regular_axis(0.005, 0.01, 100),
        None,
        |_, i, j| (i / 10 * 10 + j / 10) as f64,
    );

    let coarse = bucket_spatial(&ds, 0.1, 0.1, AggregationMethod::Mean).unwrap();
    let out = coarse.dataset();
    assert_eq!(out.nlat(), 10);
    assert_eq!(out.nlon(), 10);
    assert!(coarse.counts().iter().all(|&c| c == 100));

    // Every source cell in a bin carries the same value, so the mean is exact.
    let expected: Vec<f64> = (0..100).map(|k| (k / 10 * 10 + k % 10) as f64).collect();
    assert_values_eq!(out.variable("tas").unwrap().values(), expected, 1e-9);
}

#[test]
fn test_bucketing_is_idempotent_at_same_resolution() {
    let ds = temperature_dataset("maca", 43.0, -105.0, 4.0, 0.5, 3);
    let once = bucket_spatial(&ds, 1.0, 1.0, AggregationMethod::Mean).unwrap();
    let twice = bucket_spatial(once.dataset(), 1.0, 1.0, AggregationMethod::Mean).unwrap();

    assert_eq!(once.dataset().nlat(), twice.dataset().nlat());
    assert_eq!(once.dataset().nlon(), twice.dataset().nlon());
    assert!(twice.counts().iter().all(|&c| c == 1));
    assert_values_eq!(
        once.dataset().variable("tas").unwrap().values(),
        twice.dataset().variable("tas").unwrap().values(),
        1e-12
    );
}

#[test]
fn test_combined_matches_sequential() {
    let ds = continuous_dataset(
        "cmip",
        "pr",
        regular_axis(40.25, 0.5, 6),
        regular_axis(-100.25, -0.5, 6),
        Some(monthly_times(2020, 1, 12)),
        |t, i, j| {
            if (t + i + j) % 7 == 0 {
                f64::NAN
            } else {
                (t * 31 + i * 7 + j) as f64 * 0.25
            }
        },
    );

    for method in [
        AggregationMethod::Mean,
        AggregationMethod::Median,
        AggregationMethod::Max,
        AggregationMethod::Sum,
        AggregationMethod::Std,
    ] {
        let combined = bucket(&ds, 1.0, 1.0, TimePeriod::Months(3), method, method).unwrap();
        let spatial = bucket_spatial(&ds, 1.0, 1.0, method).unwrap();
        let sequential = bucket_temporal(spatial.dataset(), TimePeriod::Months(3), method).unwrap();

        assert_eq!(combined.dataset().lat(), sequential.dataset().lat());
        assert_eq!(combined.dataset().lon(), sequential.dataset().lon());
        assert_eq!(combined.dataset().time(), sequential.dataset().time());
        assert_values_eq!(
            combined.dataset().variable("pr").unwrap().values(),
            sequential.dataset().variable("pr").unwrap().values(),
            0.0
        );
    }
}

#[test]
fn test_order_insensitive_methods_commute_on_complete_data() {
    let ds = temperature_dataset("maca", 43.0, -105.0, 2.0, 0.5, 12);
    for method in [AggregationMethod::Min, AggregationMethod::Max] {
        let st = bucket_temporal(
            bucket_spatial(&ds, 1.0, 1.0, method).unwrap().dataset(),
            TimePeriod::Months(12),
            method,
        )
        .unwrap();
        let ts = bucket_spatial(
            bucket_temporal(&ds, TimePeriod::Months(12), method).unwrap().dataset(),
            1.0,
            1.0,
            method,
        )
        .unwrap();
        assert_values_eq!(
            st.dataset().variable("tas").unwrap().values(),
            ts.dataset().variable("tas").unwrap().values(),
            1e-9
        );
    }
}

#[test]
fn test_categorical_guard() {
    let ds = categorical_dataset(
        "landfire",
        vec![44.25, 44.75],
        vec![-104.25, -103.75],
        vec![1.0, 2.0, 2.0, 3.0],
        vegetation_codebook(),
    );

    let err = bucket_spatial(&ds, 1.0, 1.0, AggregationMethod::Mean).unwrap_err();
    assert!(matches!(err, DatacubeError::InvalidAggregation { .. }));
    assert_eq!(err.code(), "InvalidAggregationError");

    let ok = bucket_spatial(&ds, 1.0, 1.0, AggregationMethod::Mode).unwrap();
    let evt = ok.dataset().variable("evt").unwrap();
    assert_eq!(evt.values(), &[2.0]);
    assert_eq!(evt.kind().codebook(), Some(&vegetation_codebook()));
}

#[test]
fn test_source_dataset_untouched() {
    let ds = temperature_dataset("maca", 43.0, -105.0, 2.0, 0.5, 2);
    let before = ds.clone();
    let _ = bucket(
        &ds,
        1.0,
        1.0,
        TimePeriod::Months(1),
        AggregationMethod::Mean,
        AggregationMethod::Max,
    )
    .unwrap();
    assert_eq!(ds.lat(), before.lat());
    assert_values_eq!(
        ds.variable("tas").unwrap().values(),
        before.variable("tas").unwrap().values(),
        0.0
    );
}
