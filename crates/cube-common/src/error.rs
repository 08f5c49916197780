//! Error types for the datacube pipeline.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using DatacubeError.
pub type Result<T> = std::result::Result<T, DatacubeError>;

/// Primary error type for every pipeline stage.
///
/// Errors are raised at the offending call and never downgraded: coercing
/// categorical codes through a numeric reduction would corrupt their meaning.
#[derive(Debug, Error)]
pub enum DatacubeError {
    /// No data to process (no variables, or an empty coordinate axis).
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// Aggregation method is not valid for the variable's kind.
    #[error("aggregation '{method}' is not allowed for categorical variable '{variable}'")]
    InvalidAggregation { method: String, variable: String },

    /// Interpolation method is not valid for the variable's kind.
    #[error("interpolation '{method}' is not allowed for categorical variable '{variable}'")]
    InvalidInterpolation { method: String, variable: String },

    /// Requested bucket is finer than the native resolution.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A dataset (or qualified variable) name is already registered.
    #[error("name already registered: {0}")]
    DuplicateName(String),

    /// `save_datacube` called before `build_datacube`.
    #[error("no datacube has been built")]
    NoDatacubeBuilt,

    /// Filesystem failure (missing destination directory, unreadable source).
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed parameter values.
    #[error("invalid value: {0}")]
    Value(String),

    /// Malformed or unsupported file contents.
    #[error("format error: {0}")]
    Format(String),
}

impl DatacubeError {
    /// Create an EmptyDataset error.
    pub fn empty_dataset(msg: impl Into<String>) -> Self {
        Self::EmptyDataset(msg.into())
    }

    /// Create an InvalidAggregation error.
    pub fn invalid_aggregation(method: impl ToString, variable: impl Into<String>) -> Self {
        Self::InvalidAggregation {
            method: method.to_string(),
            variable: variable.into(),
        }
    }

    /// Create an InvalidInterpolation error.
    pub fn invalid_interpolation(method: impl ToString, variable: impl Into<String>) -> Self {
        Self::InvalidInterpolation {
            method: method.to_string(),
            variable: variable.into(),
        }
    }

    /// Create a Resolution error.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Create a Value error.
    pub fn value(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an Io error tied to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Taxonomy name of this error, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyDataset(_) => "EmptyDatasetError",
            Self::InvalidAggregation { .. } => "InvalidAggregationError",
            Self::InvalidInterpolation { .. } => "InvalidInterpolationError",
            Self::Resolution(_) => "ResolutionError",
            Self::DuplicateName(_) => "DuplicateNameError",
            Self::NoDatacubeBuilt => "NoDatacubeBuiltError",
            Self::Io { .. } | Self::Format(_) => "IOError",
            Self::Value(_) => "ValueError",
        }
    }
}

impl From<serde_json::Error> for DatacubeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(DatacubeError::NoDatacubeBuilt.code(), "NoDatacubeBuiltError");
        assert_eq!(
            DatacubeError::invalid_aggregation("mean", "evt").code(),
            "InvalidAggregationError"
        );
        assert_eq!(DatacubeError::format("bad header").code(), "IOError");
        assert_eq!(DatacubeError::value("nope").code(), "ValueError");
    }

    #[test]
    fn test_io_error_message_includes_path() {
        let err = DatacubeError::io(
            "/missing/dir/cube.zarr",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/missing/dir/cube.zarr"));
        assert!(msg.contains("no such directory"));
    }
}
