//! Which reductions and resamplers each kind of variable accepts.
//!
//! Class codes carry no numeric meaning, so averaging or interpolating them
//! fabricates classes that never existed. Categorical variables only accept
//! MODE aggregation and NEAREST interpolation.

use cube_common::{DatacubeError, Result, Variable, VariableKind};

use crate::aggregation::AggregationMethod;
use crate::regrid::InterpolationMethod;

/// Capability check shared by the bucketing engine and the builder.
pub trait ResamplingPolicy {
    fn allows_aggregation(&self, method: AggregationMethod) -> bool;
    fn allows_interpolation(&self, method: InterpolationMethod) -> bool;
}

impl ResamplingPolicy for VariableKind {
    fn allows_aggregation(&self, method: AggregationMethod) -> bool {
        match self {
            VariableKind::Continuous => true,
            VariableKind::Categorical(_) => method == AggregationMethod::Mode,
        }
    }

    fn allows_interpolation(&self, method: InterpolationMethod) -> bool {
        match self {
            VariableKind::Continuous => true,
            VariableKind::Categorical(_) => method == InterpolationMethod::Nearest,
        }
    }
}

/// Fail with `InvalidAggregation` if `variable` cannot be reduced by `method`.
pub fn check_aggregation(variable: &Variable, method: AggregationMethod) -> Result<()> {
    if variable.kind().allows_aggregation(method) {
        Ok(())
    } else {
        Err(DatacubeError::invalid_aggregation(method, variable.name()))
    }
}

/// Fail with `InvalidInterpolation` if `variable` cannot be resampled by `method`.
pub fn check_interpolation(variable: &Variable, method: InterpolationMethod) -> Result<()> {
    if variable.kind().allows_interpolation(method) {
        Ok(())
    } else {
        Err(DatacubeError::invalid_interpolation(method, variable.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_common::Codebook;

    #[test]
    fn test_categorical_only_allows_mode_and_nearest() {
        let kind = VariableKind::Categorical(Codebook::new());
        assert!(kind.allows_aggregation(AggregationMethod::Mode));
        assert!(!kind.allows_aggregation(AggregationMethod::Mean));
        assert!(!kind.allows_aggregation(AggregationMethod::First));
        assert!(kind.allows_interpolation(InterpolationMethod::Nearest));
        assert!(!kind.allows_interpolation(InterpolationMethod::Cubic));
    }

    #[test]
    fn test_continuous_allows_everything() {
        let kind = VariableKind::Continuous;
        assert!(kind.allows_aggregation(AggregationMethod::Mode));
        assert!(kind.allows_interpolation(InterpolationMethod::Linear));
    }

    #[test]
    fn test_check_reports_variable() {
        let var = Variable::categorical("evt", vec![1.0], Codebook::new());
        match check_aggregation(&var, AggregationMethod::Mean) {
            Err(DatacubeError::InvalidAggregation { method, variable }) => {
                assert_eq!(method, "mean");
                assert_eq!(variable, "evt");
            }
            other => panic!("expected InvalidAggregation, got {:?}", other),
        }
        assert_eq!(
            check_interpolation(&var, InterpolationMethod::Bilinear)
                .unwrap_err()
                .code(),
            "InvalidInterpolationError"
        );
    }
}
