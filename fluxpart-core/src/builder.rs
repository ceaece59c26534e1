//! Per-date reference rate models with adaptive windows.
//!
//! For each calendar date the window is widened through the configured
//! half-widths until it holds enough observations. That first adequate
//! window is fitted with the sensitivity held fixed, and the outcome is
//! recorded whatever the quality gate decides. A rejected fit is not retried
//! with a wider window: the narrowest adequate window is preferred for its
//! temporal locality.

use crate::errors::{FluxError, FluxResult};
use crate::fit::{LeastSquaresFitter, RespirationFitter};
use crate::outcome::{FitOutcome, ModelBank};
use crate::parameters::{ModelBankParameters, ParameterBounds, PartitionParameters};
use crate::quality::QualityGate;
use crate::timeseries::{FloatValue, ObservationSeries};
use crate::window::Window;
use chrono::NaiveDate;
use log::{debug, info, warn};

/// Builds the [`ModelBank`] of reference rate fits.
#[derive(Debug, Clone)]
pub struct AdaptiveWindowModelBuilder<F = LeastSquaresFitter> {
    parameters: ModelBankParameters,
    sensitivity_bounds: ParameterBounds,
    gate: QualityGate,
    fitter: F,
    parallel: bool,
}

impl AdaptiveWindowModelBuilder {
    pub fn from_parameters(parameters: &PartitionParameters) -> Self {
        Self::with_fitter(
            parameters,
            LeastSquaresFitter::from_parameters(parameters.fit.clone()),
        )
    }
}

impl<F: RespirationFitter> AdaptiveWindowModelBuilder<F> {
    /// Use a custom fitter in place of the least-squares solver.
    pub fn with_fitter(parameters: &PartitionParameters, fitter: F) -> Self {
        Self {
            parameters: parameters.model_bank.clone(),
            sensitivity_bounds: parameters.fit.sensitivity_bounds,
            gate: QualityGate::new(&parameters.quality, &parameters.fit),
            fitter,
            parallel: parameters.parallel,
        }
    }

    /// The narrowest window around `date` holding enough observations.
    pub fn select_window<'a>(&self, night: &'a ObservationSeries, date: NaiveDate) -> Option<Window<'a>> {
        self.parameters
            .window_half_widths
            .iter()
            .map(|&half_width| Window::extract(night, date, half_width))
            .find(|window| window.sample_count() >= self.parameters.min_observations)
    }

    /// Outcome of the fixed-sensitivity fit for a single date.
    pub fn fit_date(
        &self,
        night: &ObservationSeries,
        date: NaiveDate,
        fixed_sensitivity: FloatValue,
    ) -> FitOutcome {
        let Some(window) = self.select_window(night, date) else {
            return FitOutcome::InsufficientData;
        };

        let attempt = self
            .fitter
            .fit(window.flux(), window.temperature(), Some(fixed_sensitivity));
        let outcome = self.gate.assess(attempt, window.half_width_days());
        match &outcome {
            FitOutcome::Rejected { reason } => {
                debug!(
                    "{}: reference rate fit over ±{} days rejected, {}",
                    date,
                    window.half_width_days(),
                    reason
                )
            }
            FitOutcome::Accepted { reference_rate, .. } => {
                debug!(
                    "{}: reference rate {:.4} over ±{} days",
                    date,
                    reference_rate,
                    window.half_width_days()
                )
            }
            FitOutcome::InsufficientData => {}
        }
        outcome
    }

    /// Fit every calendar date spanned by `night` with the sensitivity held at
    /// `fixed_sensitivity`.
    pub fn build(&self, night: &ObservationSeries, fixed_sensitivity: FloatValue) -> FluxResult<ModelBank> {
        if !fixed_sensitivity.is_finite() {
            return Err(FluxError::InvalidParameter(format!(
                "fixed sensitivity must be finite, got {}",
                fixed_sensitivity
            )));
        }
        if !self.sensitivity_bounds.contains(fixed_sensitivity) {
            warn!(
                "Fixed sensitivity {:.2} K lies outside the fit bounds [{}, {}]",
                fixed_sensitivity, self.sensitivity_bounds.min, self.sensitivity_bounds.max
            );
        }

        let dates = night.calendar_dates();
        let bank = ModelBank::from_dates(&dates, self.parallel, |date| {
            self.fit_date(night, date, fixed_sensitivity)
        });

        let counts = bank.counts();
        info!(
            "Reference rate models for {} dates: {} accepted, {} rejected, {} without data",
            bank.len(),
            counts.accepted,
            counts.rejected,
            counts.insufficient_data
        );
        Ok(bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FitError;
    use crate::fit::{ParameterEstimate, ParameterName, RespirationFit};
    use crate::outcome::RejectionReason;
    use crate::respiration::ecosystem_respiration;
    use crate::timeseries::Observation;
    use chrono::{Days, NaiveTime};
    use ndarray::ArrayView1;
    use std::sync::Mutex;

    /// Records the number of observations handed to each fit.
    #[derive(Default)]
    struct RecordingFitter {
        sizes: Mutex<Vec<usize>>,
    }

    impl RespirationFitter for RecordingFitter {
        fn fit(
            &self,
            flux: ArrayView1<FloatValue>,
            _temperature: ArrayView1<FloatValue>,
            fixed_sensitivity: Option<FloatValue>,
        ) -> Result<RespirationFit, FitError> {
            self.sizes.lock().unwrap().push(flux.len());
            Ok(RespirationFit {
                sensitivity: ParameterEstimate::fixed(fixed_sensitivity.unwrap()),
                reference_rate: ParameterEstimate::free(0.25, Some(0.01)),
                n_observations: flux.len(),
                sum_squared_residuals: 0.0,
                evaluations: 1,
            })
        }
    }

    fn center() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 4, 15).unwrap()
    }

    /// Observations per day offset from `center()`.
    fn series(counts: &[(i64, u32)]) -> ObservationSeries {
        let observations = counts
            .iter()
            .flat_map(|&(offset, n)| {
                let date = if offset < 0 {
                    center() - Days::new(offset.unsigned_abs())
                } else {
                    center() + Days::new(offset as u64)
                };
                (0..n).map(move |i| {
                    let temperature = 278.0 + i as FloatValue;
                    Observation::new(
                        date.and_time(NaiveTime::from_hms_opt(i, 0, 0).unwrap()),
                        temperature,
                        ecosystem_respiration(temperature, 200.0, 0.3),
                        0.0,
                    )
                })
            })
            .collect();
        ObservationSeries::from_observations(observations).unwrap()
    }

    fn serial() -> PartitionParameters {
        PartitionParameters {
            parallel: false,
            ..PartitionParameters::default()
        }
    }

    #[test]
    fn stops_at_first_adequate_window() {
        // ±2 days hold 15 observations, ±3 days hold 22, ±7 days many more
        let night = series(&[
            (-7, 20),
            (-5, 20),
            (-3, 4),
            (-2, 3),
            (-1, 3),
            (0, 3),
            (1, 3),
            (2, 3),
            (3, 3),
            (5, 20),
            (7, 20),
        ]);
        let builder = AdaptiveWindowModelBuilder::with_fitter(&serial(), RecordingFitter::default());

        let outcome = builder.fit_date(&night, center(), 210.0);
        assert_eq!(*builder.fitter.sizes.lock().unwrap(), vec![22]);
        match outcome {
            FitOutcome::Accepted {
                window_half_width_days,
                n_observations,
                sensitivity,
                sensitivity_stderr,
                ..
            } => {
                assert_eq!(window_half_width_days, 3);
                assert_eq!(n_observations, 22);
                assert_eq!(sensitivity, 210.0);
                assert_eq!(sensitivity_stderr, None);
            }
            other => panic!("expected an accepted fit, got {:?}", other),
        }
    }

    #[test]
    fn insufficient_when_widest_window_is_too_sparse() {
        let night = series(&[(-6, 5), (0, 5), (6, 5), (9, 10)]);
        let builder = AdaptiveWindowModelBuilder::with_fitter(&serial(), RecordingFitter::default());

        assert_eq!(builder.fit_date(&night, center(), 200.0), FitOutcome::InsufficientData);
        assert!(builder.fitter.sizes.lock().unwrap().is_empty());
    }

    #[test]
    fn narrow_temperature_range_is_still_fitted() {
        // 24 observations on a single day spanning less than 5 K
        let night: Vec<Observation> = (0..24)
            .map(|hour| {
                let temperature = 285.0 + 0.1 * hour as FloatValue;
                Observation::new(
                    center().and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
                    temperature,
                    ecosystem_respiration(temperature, 200.0, 0.3),
                    0.0,
                )
            })
            .collect();
        let night = ObservationSeries::from_observations(night).unwrap();
        let builder = AdaptiveWindowModelBuilder::with_fitter(&serial(), RecordingFitter::default());

        let outcome = builder.fit_date(&night, center(), 200.0);
        assert!(outcome.is_accepted());
        assert_eq!(*builder.fitter.sizes.lock().unwrap(), vec![24]);
    }

    #[test]
    fn rejected_fit_is_not_retried_wider() {
        // Fluxes far below the model push the reference rate onto its lower bound
        let night: Vec<Observation> = (0..10u64)
            .flat_map(|day| {
                (0..5).map(move |hour| {
                    Observation::new(
                        (center() + Days::new(day))
                            .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
                        280.0 + hour as FloatValue,
                        -0.2,
                        0.0,
                    )
                })
            })
            .collect();
        let night = ObservationSeries::from_observations(night).unwrap();
        let builder = AdaptiveWindowModelBuilder::from_parameters(&serial());

        let outcome = builder.fit_date(&night, center(), 200.0);
        assert!(matches!(outcome, FitOutcome::Rejected { .. }));
        assert_eq!(
            builder.select_window(&night, center()).map(|w| w.half_width_days()),
            Some(3)
        );
    }

    #[test]
    fn reference_rate_on_lower_bound_is_rejected() {
        let night: Vec<Observation> = (0..30)
            .map(|i| {
                Observation::new(
                    center().and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::minutes(30 * i),
                    280.0 + 0.3 * i as FloatValue,
                    -0.05,
                    0.0,
                )
            })
            .collect();
        let night = ObservationSeries::from_observations(night).unwrap();
        let builder = AdaptiveWindowModelBuilder::from_parameters(&serial());

        let outcome = builder.fit_date(&night, center(), 200.0);
        assert!(
            matches!(
                outcome,
                FitOutcome::Rejected {
                    reason: RejectionReason::NearBound {
                        parameter: ParameterName::ReferenceRate,
                        ..
                    } | RejectionReason::RelativeErrorTooLarge {
                        parameter: ParameterName::ReferenceRate,
                        ..
                    }
                }
            ),
            "expected a reference rate rejection, got {:?}",
            outcome
        );
    }

    #[test]
    fn build_is_idempotent_and_order_independent() {
        let night = series(&[
            (-4, 6),
            (-3, 6),
            (-2, 6),
            (-1, 6),
            (0, 6),
            (1, 6),
            (2, 6),
            (3, 6),
            (4, 6),
        ]);
        let sequential = AdaptiveWindowModelBuilder::from_parameters(&serial());
        let parallel = AdaptiveWindowModelBuilder::from_parameters(&PartitionParameters::default());

        let first = sequential.build(&night, 200.0).unwrap();
        let second = sequential.build(&night, 200.0).unwrap();
        let third = parallel.build(&night, 200.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(first.len(), 9);
        assert!(first.get(&center()).unwrap().is_accepted());
    }

    /// Hourly records in three blocks ten days apart: well-behaved respiration,
    /// fluxes above the reference rate bound, and negative fluxes.
    fn mixed_quality_series() -> ObservationSeries {
        let observations: Vec<Observation> = [(0u64, 0.3), (10, 1.5), (20, FloatValue::NAN)]
            .into_iter()
            .flat_map(|(first_day, reference_rate)| {
                (first_day..first_day + 4).flat_map(move |day| {
                    (0..24).map(move |hour| {
                        let temperature = 278.0 + 0.5 * hour as FloatValue;
                        let flux = if reference_rate.is_nan() {
                            -0.2
                        } else {
                            ecosystem_respiration(temperature, 200.0, reference_rate)
                        };
                        Observation::new(
                            (center() + Days::new(day))
                                .and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()),
                            temperature,
                            flux,
                            0.0,
                        )
                    })
                })
            })
            .collect();
        ObservationSeries::from_observations(observations).unwrap()
    }

    #[test]
    fn repeated_builds_agree_on_rejection_reasons() {
        let night = mixed_quality_series();
        let sequential = AdaptiveWindowModelBuilder::from_parameters(&serial());
        let parallel = AdaptiveWindowModelBuilder::from_parameters(&PartitionParameters::default());

        let first = sequential.build(&night, 200.0).unwrap();
        let second = sequential.build(&night, 200.0).unwrap();
        let third = parallel.build(&night, 200.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);

        let reasons: Vec<&RejectionReason> = first
            .iter()
            .filter_map(|(_, outcome)| match outcome {
                FitOutcome::Rejected { reason } => Some(reason),
                _ => None,
            })
            .collect();
        assert!(reasons.iter().any(|reason| matches!(
            reason,
            RejectionReason::NearBound {
                parameter: ParameterName::ReferenceRate,
                ..
            }
        )));
        assert!(reasons.iter().any(|reason| matches!(
            reason,
            RejectionReason::RelativeErrorTooLarge {
                parameter: ParameterName::ReferenceRate,
                ..
            }
        )));
        assert!(first.get(&(center() + Days::new(1))).unwrap().is_accepted());
        assert!(matches!(
            first.get(&(center() + Days::new(11))),
            Some(FitOutcome::Rejected {
                reason: RejectionReason::NearBound { .. }
            })
        ));
        assert!(matches!(
            first.get(&(center() + Days::new(21))),
            Some(FitOutcome::Rejected {
                reason: RejectionReason::RelativeErrorTooLarge { .. }
            })
        ));
    }

    #[test]
    fn non_finite_sensitivity_is_an_error() {
        let night = series(&[(0, 24)]);
        let builder = AdaptiveWindowModelBuilder::from_parameters(&serial());
        assert!(matches!(
            builder.build(&night, FloatValue::NAN),
            Err(FluxError::InvalidParameter(_))
        ));
    }
}
