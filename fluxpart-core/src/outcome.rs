//! Per-date fit outcomes and the model bank that collects them.

use crate::fit::{ParameterName, RespirationFit};
use crate::timeseries::FloatValue;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a fit was not accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The solver failed before producing a fit
    FitFailed { message: String },
    /// The covariance of a free parameter could not be estimated
    MissingStandardError { parameter: ParameterName },
    RelativeErrorTooLarge {
        parameter: ParameterName,
        relative_error: FloatValue,
        limit: FloatValue,
    },
    NearBound {
        parameter: ParameterName,
        value: FloatValue,
        bound: FloatValue,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::FitFailed { message } => write!(f, "fit failed: {}", message),
            RejectionReason::MissingStandardError { parameter } => {
                write!(f, "no standard error for {}", parameter)
            }
            RejectionReason::RelativeErrorTooLarge {
                parameter,
                relative_error,
                limit,
            } => write!(
                f,
                "relative error of {} is {:.3} (limit {})",
                parameter, relative_error, limit
            ),
            RejectionReason::NearBound {
                parameter,
                value,
                bound,
            } => write!(f, "{} = {} is pinned against bound {}", parameter, value, bound),
        }
    }
}

/// Result of processing one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    Accepted {
        sensitivity: FloatValue,
        /// `None` when the sensitivity was held fixed
        sensitivity_stderr: Option<FloatValue>,
        reference_rate: FloatValue,
        reference_rate_stderr: FloatValue,
        window_half_width_days: u32,
        n_observations: usize,
    },
    Rejected {
        reason: RejectionReason,
    },
    /// Too few observations, or too little temperature variation, to attempt a fit
    InsufficientData,
}

impl FitOutcome {
    /// Build an accepted outcome from a fit that passed the quality gate.
    pub(crate) fn accepted(fit: &RespirationFit, window_half_width_days: u32) -> Self {
        FitOutcome::Accepted {
            sensitivity: fit.sensitivity.value,
            sensitivity_stderr: fit.sensitivity.stderr,
            reference_rate: fit.reference_rate.value,
            reference_rate_stderr: fit.reference_rate.stderr.unwrap_or(FloatValue::NAN),
            window_half_width_days,
            n_observations: fit.n_observations,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, FitOutcome::Accepted { .. })
    }

    pub fn sensitivity(&self) -> Option<FloatValue> {
        match self {
            FitOutcome::Accepted { sensitivity, .. } => Some(*sensitivity),
            _ => None,
        }
    }

    pub fn reference_rate(&self) -> Option<FloatValue> {
        match self {
            FitOutcome::Accepted { reference_rate, .. } => Some(*reference_rate),
            _ => None,
        }
    }
}

/// Counts of each outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub accepted: usize,
    pub rejected: usize,
    pub insufficient_data: usize,
}

/// Mapping from calendar date to fit outcome, one entry per date.
///
/// Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelBank {
    outcomes: BTreeMap<NaiveDate, FitOutcome>,
}

impl ModelBank {
    /// Evaluate `f` for every date, on the rayon pool when `parallel` is set.
    ///
    /// Each evaluation only reads shared input, so the result does not depend
    /// on the execution order.
    pub fn from_dates<F>(dates: &[NaiveDate], parallel: bool, f: F) -> Self
    where
        F: Fn(NaiveDate) -> FitOutcome + Sync + Send,
    {
        let outcomes = if parallel {
            dates.par_iter().map(|&date| (date, f(date))).collect()
        } else {
            dates.iter().map(|&date| (date, f(date))).collect()
        };
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, date: &NaiveDate) -> Option<&FitOutcome> {
        self.outcomes.get(date)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &FitOutcome)> {
        self.outcomes.iter()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.outcomes.keys()
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.outcomes
            .values()
            .fold(OutcomeCounts::default(), |mut counts, outcome| {
                match outcome {
                    FitOutcome::Accepted { .. } => counts.accepted += 1,
                    FitOutcome::Rejected { .. } => counts.rejected += 1,
                    FitOutcome::InsufficientData => counts.insufficient_data += 1,
                }
                counts
            })
    }

    /// Fraction of dates with an accepted fit; zero for an empty bank
    pub fn acceptance_fraction(&self) -> FloatValue {
        if self.is_empty() {
            return 0.0;
        }
        self.counts().accepted as FloatValue / self.len() as FloatValue
    }

    /// Reference rate of every date, `None` where the fit was not accepted
    pub fn reference_rates(&self) -> impl Iterator<Item = (NaiveDate, Option<FloatValue>)> + '_ {
        self.outcomes
            .iter()
            .map(|(date, outcome)| (*date, outcome.reference_rate()))
    }
}

impl IntoIterator for ModelBank {
    type Item = (NaiveDate, FitOutcome);
    type IntoIter = std::collections::btree_map::IntoIter<NaiveDate, FitOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}
