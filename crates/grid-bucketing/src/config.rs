//! Configuration for persisted Zarr stores.

use serde::{Deserialize, Serialize};

/// Layout and compression of stores written by [`DatasetWriter`](crate::DatasetWriter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk edge along the lat/lon dimensions.
    pub chunk_size: usize,

    /// Compression codec for Zarr arrays.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, keeping defaults for
    /// unset or unparsable values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DATACUBE_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("DATACUBE_COMPRESSION") {
            match ZarrCompression::parse(&val) {
                Some(compression) => config.compression = compression,
                None => tracing::warn!(value = %val, "Ignoring unknown DATACUBE_COMPRESSION"),
            }
        }

        if let Ok(val) = std::env::var("DATACUBE_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("DATACUBE_SHUFFLE") {
            config.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.compression_level == 0 || self.compression_level > 9 {
            return Err("compression_level must be 1-9".to_string());
        }

        Ok(())
    }
}

/// Compression codec for Zarr arrays. All codecs are lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// LZ4 compression.
    Lz4,
    /// Zstd compression.
    Zstd,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd.
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "lz4" => Some(Self::Lz4),
            "zstd" => Some(Self::Zstd),
            "blosc_lz4" => Some(Self::BloscLz4),
            "blosc_zstd" => Some(Self::BloscZstd),
            _ => None,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.chunk_size, 256);
        assert_eq!(config.compression, ZarrCompression::BloscZstd);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let config = StoreConfig {
            compression_level: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_parse() {
        assert_eq!(ZarrCompression::parse("BLOSC_LZ4"), Some(ZarrCompression::BloscLz4));
        assert_eq!(ZarrCompression::parse("none"), Some(ZarrCompression::None));
        assert_eq!(ZarrCompression::parse("gzip"), None);
    }

    #[test]
    fn test_deserialize_partial_yaml_like_json() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"compression": "lz4", "chunk_size": 64}"#).unwrap();
        assert_eq!(config.compression, ZarrCompression::Lz4);
        assert_eq!(config.chunk_size, 64);
        assert!(config.shuffle);
    }
}
