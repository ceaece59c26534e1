//! Series-wide temperature sensitivity estimate.
//!
//! For every calendar date a fixed-width window is fitted with both
//! parameters free. The sensitivities of the accepted fits are reduced to a
//! median and a standard deviation; dates that were rejected or lacked data
//! contribute nothing.

use crate::errors::{FluxError, FluxResult};
use crate::fit::{LeastSquaresFitter, RespirationFitter};
use crate::outcome::{FitOutcome, ModelBank};
use crate::parameters::{PartitionParameters, SensitivityParameters};
use crate::quality::QualityGate;
use crate::timeseries::{FloatValue, ObservationSeries};
use crate::window::Window;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Robust summary of the per-date sensitivity estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivitySummary {
    /// unit: K
    pub median: FloatValue,
    /// Sample standard deviation, `None` when only one date was accepted
    /// unit: K
    pub standard_deviation: Option<FloatValue>,
    /// Dates with an accepted fit
    pub n_accepted: usize,
    /// Dates examined
    pub n_dates: usize,
}

impl SensitivitySummary {
    /// Summarise a set of accepted sensitivities.
    ///
    /// Returns `None` for an empty set.
    pub fn from_values(values: &[FloatValue], n_dates: usize) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(FloatValue::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let n = values.len() as FloatValue;
        let standard_deviation = (values.len() > 1).then(|| {
            let mean = values.iter().sum::<FloatValue>() / n;
            let ss: FloatValue = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Some(Self {
            median,
            standard_deviation,
            n_accepted: values.len(),
            n_dates,
        })
    }
}

/// Estimates the temperature sensitivity shared by the whole series.
#[derive(Debug, Clone)]
pub struct TemperatureSensitivityEstimator<F = LeastSquaresFitter> {
    parameters: SensitivityParameters,
    gate: QualityGate,
    fitter: F,
    parallel: bool,
}

impl TemperatureSensitivityEstimator {
    pub fn from_parameters(parameters: &PartitionParameters) -> Self {
        Self::with_fitter(
            parameters,
            LeastSquaresFitter::from_parameters(parameters.fit.clone()),
        )
    }
}

impl<F: RespirationFitter> TemperatureSensitivityEstimator<F> {
    /// Use a custom fitter in place of the least-squares solver.
    pub fn with_fitter(parameters: &PartitionParameters, fitter: F) -> Self {
        Self {
            parameters: parameters.sensitivity.clone(),
            gate: QualityGate::new(&parameters.quality, &parameters.fit),
            fitter,
            parallel: parameters.parallel,
        }
    }

    /// Outcome of the free-sensitivity fit for a single date.
    pub fn fit_date(&self, night: &ObservationSeries, date: NaiveDate) -> FitOutcome {
        let half_width = self.parameters.window_half_width_days;
        let window = Window::extract(night, date, half_width);

        let enough_samples = window.sample_count() >= self.parameters.min_observations;
        let enough_spread = window
            .temperature_range()
            .is_some_and(|range| range >= self.parameters.min_temperature_range);
        if !(enough_samples && enough_spread) {
            return FitOutcome::InsufficientData;
        }

        let attempt = self.fitter.fit(window.flux(), window.temperature(), None);
        let outcome = self.gate.assess(attempt, half_width);
        if let FitOutcome::Rejected { reason } = &outcome {
            debug!("{}: sensitivity fit rejected, {}", date, reason);
        }
        outcome
    }

    /// Outcomes of every calendar date spanned by `night`.
    pub fn outcomes(&self, night: &ObservationSeries) -> ModelBank {
        let dates = night.calendar_dates();
        ModelBank::from_dates(&dates, self.parallel, |date| self.fit_date(night, date))
    }

    /// Median and spread of the accepted per-date sensitivities.
    ///
    /// Fails when no date produced an accepted fit.
    pub fn estimate(&self, night: &ObservationSeries) -> FluxResult<SensitivitySummary> {
        let outcomes = self.outcomes(night);
        let values: Vec<FloatValue> = outcomes.iter().filter_map(|(_, o)| o.sensitivity()).collect();
        let counts = outcomes.counts();

        let summary = SensitivitySummary::from_values(&values, outcomes.len()).ok_or(
            FluxError::NoAcceptedSensitivity {
                n_dates: outcomes.len(),
            },
        )?;

        info!(
            "Temperature sensitivity from {} of {} dates ({} rejected, {} without data): median={:.2} K, sd={}",
            counts.accepted,
            outcomes.len(),
            counts.rejected,
            counts.insufficient_data,
            summary.median,
            summary
                .standard_deviation
                .map_or("n/a".to_string(), |sd| format!("{:.2} K", sd)),
        );
        if summary.n_accepted < 3 {
            warn!(
                "Temperature sensitivity rests on only {} accepted date(s)",
                summary.n_accepted
            );
        }
        Ok(summary)
    }
}
