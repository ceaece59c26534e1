//! Acceptance rules for completed fits.
//!
//! A fit is rejected when any *free* parameter
//! - has a relative standard error above the limit, or
//! - lies within the bound tolerance of either edge of its bounds.
//!
//! Held parameters are never checked.

use crate::errors::FitError;
use crate::fit::{ParameterName, RespirationFit};
use crate::outcome::{FitOutcome, RejectionReason};
use crate::parameters::{FitParameters, ParameterBounds, QualityParameters};
use crate::timeseries::FloatValue;

#[derive(Debug, Clone, PartialEq)]
pub struct QualityGate {
    relative_error_limit: FloatValue,
    bound_tolerance: FloatValue,
    sensitivity_bounds: ParameterBounds,
    reference_rate_bounds: ParameterBounds,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(&QualityParameters::default(), &FitParameters::default())
    }
}

impl QualityGate {
    pub fn new(quality: &QualityParameters, fit: &FitParameters) -> Self {
        Self {
            relative_error_limit: quality.relative_error_limit,
            bound_tolerance: quality.bound_tolerance,
            sensitivity_bounds: fit.sensitivity_bounds,
            reference_rate_bounds: fit.reference_rate_bounds,
        }
    }

    pub fn bounds(&self, parameter: ParameterName) -> ParameterBounds {
        match parameter {
            ParameterName::Sensitivity => self.sensitivity_bounds,
            ParameterName::ReferenceRate => self.reference_rate_bounds,
        }
    }

    /// Accept or reject a converged fit.
    ///
    /// Relative errors of all free parameters are checked before bound
    /// proximity, so the reported reason is deterministic.
    pub fn evaluate(&self, fit: &RespirationFit) -> Result<(), RejectionReason> {
        let free = fit.parameters().into_iter().filter(|(_, p)| p.free);

        for (parameter, estimate) in free.clone() {
            let stderr = estimate
                .stderr
                .ok_or(RejectionReason::MissingStandardError { parameter })?;
            let relative_error = (stderr / estimate.value).abs();
            // NaN relative errors fail this comparison too
            if !(relative_error <= self.relative_error_limit) {
                return Err(RejectionReason::RelativeErrorTooLarge {
                    parameter,
                    relative_error,
                    limit: self.relative_error_limit,
                });
            }
        }

        for (parameter, estimate) in free {
            if let Some(bound) = self
                .bounds(parameter)
                .nearby_edge(estimate.value, self.bound_tolerance)
            {
                return Err(RejectionReason::NearBound {
                    parameter,
                    value: estimate.value,
                    bound,
                });
            }
        }
        Ok(())
    }

    /// Fold a fit attempt on a window of `half_width_days` into an outcome.
    ///
    /// Solver failures become rejections carrying the solver message.
    pub fn assess(
        &self,
        attempt: Result<RespirationFit, FitError>,
        half_width_days: u32,
    ) -> FitOutcome {
        match attempt {
            Ok(fit) => match self.evaluate(&fit) {
                Ok(()) => FitOutcome::accepted(&fit, half_width_days),
                Err(reason) => FitOutcome::Rejected { reason },
            },
            Err(error) => FitOutcome::Rejected {
                reason: RejectionReason::FitFailed {
                    message: error.to_string(),
                },
            },
        }
    }
}
