use chrono::NaiveDateTime;
use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FluxError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Observation series is empty")]
    EmptySeries,
    #[error("Duplicate timestamp {0} in observation series")]
    DuplicateTimestamp(NaiveDateTime),
    #[error("No date produced an accepted temperature sensitivity fit ({n_dates} dates examined)")]
    NoAcceptedSensitivity { n_dates: usize },
    #[error("No date produced an accepted reference rate fit ({n_dates} dates examined)")]
    NoAcceptedReferenceRate { n_dates: usize },
}

/// Failure of a single nonlinear fit.
///
/// These are local to one date and never abort a run; they are folded into a
/// rejected [`FitOutcome`](crate::outcome::FitOutcome).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Too few observations to fit: {n_observations} observations for {n_parameters} free parameters")]
    TooFewObservations {
        n_observations: usize,
        n_parameters: usize,
    },
    #[error("Model produced non-finite residuals")]
    NonFiniteResiduals,
    #[error("Fit did not converge within {evaluations} model evaluations")]
    DidNotConverge { evaluations: usize },
}

/// Convenience type for `Result<T, FluxError>`.
pub type FluxResult<T> = Result<T, FluxError>;
