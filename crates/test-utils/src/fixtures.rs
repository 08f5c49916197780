//! Common test fixtures for datacube tests.

use cube_common::{BoundingBox, Codebook};

/// Common regions of interest.
pub mod regions {
    use super::BoundingBox;

    /// Black Hills, South Dakota / Wyoming (WGS84).
    pub const BLACK_HILLS: BoundingBox = BoundingBox {
        min_lon: -104.705,
        min_lat: 43.480,
        max_lon: -103.264,
        max_lat: 44.652,
    };

    /// Continental United States.
    pub const CONUS: BoundingBox = BoundingBox {
        min_lon: -125.0,
        min_lat: 24.0,
        max_lon: -66.0,
        max_lat: 50.0,
    };

    /// A 2°×2° square starting at the origin.
    pub const UNIT_SQUARE: BoundingBox = BoundingBox {
        min_lon: 0.0,
        min_lat: 0.0,
        max_lon: 2.0,
        max_lat: 2.0,
    };
}

/// A small vegetation-type codebook.
pub fn vegetation_codebook() -> Codebook {
    [
        (1, "Open Water"),
        (2, "Ponderosa Pine Woodland"),
        (3, "Mixed Grass Prairie"),
        (4, "Developed"),
        (5, "Barren"),
    ]
    .into_iter()
    .map(|(code, label)| (code, label.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_hills_is_valid() {
        assert!(regions::BLACK_HILLS.validate().is_ok());
        assert!(regions::BLACK_HILLS.contains(-103.5, 44.0));
    }

    #[test]
    fn test_codebook_sorted_by_code() {
        let codes: Vec<i64> = vegetation_codebook().keys().copied().collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
    }
}
