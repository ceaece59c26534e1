//! Windowed nonlinear regression engine for partitioning eddy-covariance
//! net ecosystem exchange.
//!
//! Nighttime observations carry respiration only. They are used to
//! 1. estimate a series-wide temperature sensitivity from short windows
//!    around every date ([`sensitivity::TemperatureSensitivityEstimator`]), and
//! 2. fit, for every date, the reference respiration rate with that
//!    sensitivity held fixed over an adaptively widened window
//!    ([`builder::AdaptiveWindowModelBuilder`]).
//!
//! The resulting [`outcome::ModelBank`] records one [`outcome::FitOutcome`]
//! per calendar date.

pub mod builder;
pub mod errors;
pub mod fit;
pub mod outcome;
pub mod parameters;
pub mod quality;
pub mod respiration;
pub mod sensitivity;
pub mod timeseries;
pub mod window;

pub use builder::AdaptiveWindowModelBuilder;
pub use errors::{FitError, FluxError, FluxResult};
pub use outcome::{FitOutcome, ModelBank, RejectionReason};
pub use parameters::PartitionParameters;
pub use sensitivity::{SensitivitySummary, TemperatureSensitivityEstimator};
pub use timeseries::{FloatValue, Observation, ObservationSeries};
