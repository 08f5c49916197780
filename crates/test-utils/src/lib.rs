//! Shared test utilities for the datacube workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic dataset generators
//! - Region and codebook fixtures
//! - Float comparison macros
//! - Test tracing setup
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, temperature_dataset};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

/// Install a test-friendly tracing subscriber once per process.
///
/// Output goes through the libtest capture, so it only shows for failing
/// tests (or with `--nocapture`). `RUST_LOG` selects the level.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scratch directory removed when dropped.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("datacube-test-")
        .tempdir()
        .expect("failed to create scratch directory")
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f64, 1.0_f64, 0.001_f64);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Element-wise approximate equality of two value slices, treating two
/// missing (`NaN`) values as equal.
#[macro_export]
macro_rules! assert_values_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: &[f64] = &$left;
        let right: &[f64] = &$right;
        assert_eq!(left.len(), right.len(), "length mismatch");
        for (idx, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let both_missing = l.is_nan() && r.is_nan();
            if !both_missing && !((l - r).abs() <= $epsilon) {
                panic!("values differ at {}: {:?} vs {:?}", idx, l, r);
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.001);
    }

    #[test]
    fn test_assert_values_eq_matches_missing() {
        assert_values_eq!([1.0, f64::NAN], [1.0 + 1e-12, f64::NAN], 1e-9);
    }

    #[test]
    #[should_panic(expected = "values differ at 1")]
    fn test_assert_values_eq_reports_index() {
        assert_values_eq!([1.0, f64::NAN], [1.0, 2.0], 1e-9);
    }
}
