//! The merged, single-grid output of a build.

use cube_common::{GriddedDataset, Variable};

use crate::grid::{BuildOptions, TargetGrid};

/// Every registered variable on one lat/lon/time grid, named
/// `<dataset>_<variable>`.
#[derive(Debug, Clone)]
pub struct UnifiedDatacube {
    pub(crate) dataset: GriddedDataset,
    pub(crate) grid: TargetGrid,
    pub(crate) options: BuildOptions,
    pub(crate) sources: Vec<String>,
}

impl UnifiedDatacube {
    pub fn dataset(&self) -> &GriddedDataset {
        &self.dataset
    }

    pub fn grid(&self) -> &TargetGrid {
        &self.grid
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Names of the contributing datasets, in registration order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.dataset.variable(name)
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.dataset.variable_names()
    }

    pub fn into_dataset(self) -> GriddedDataset {
        self.dataset
    }
}
