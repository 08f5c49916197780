//! Input format detection.

use std::path::Path;

/// Detected input format based on path shape and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Zarr directory store written by this pipeline
    Zarr,
    /// NetCDF archive (MACA / CMIP downloads)
    NetCdf,
    /// GeoTIFF classification raster (LANDFIRE)
    GeoTiff,
    /// Unknown format
    Unknown,
}

/// Detect the format of `path`.
pub fn detect_source_format(path: &Path) -> SourceFormat {
    if path.is_dir() {
        return SourceFormat::Zarr;
    }

    let lower = path.to_string_lossy().to_lowercase();
    if lower.ends_with(".zarr") {
        SourceFormat::Zarr
    } else if lower.ends_with(".nc") || lower.ends_with(".nc4") || lower.ends_with(".netcdf") {
        SourceFormat::NetCdf
    } else if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        SourceFormat::GeoTiff
    } else {
        SourceFormat::Unknown
    }
}
