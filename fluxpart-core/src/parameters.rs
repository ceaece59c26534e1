//! Partitioning parameters
//!
//! Every constant the regression engine consumes lives here with its default.
//! All structs deserialize with `#[serde(default)]`, so a configuration file
//! only needs to name the values it overrides.

use crate::errors::{FluxError, FluxResult};
use crate::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]` a fitted parameter is constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub min: FloatValue,
    pub max: FloatValue,
}

impl ParameterBounds {
    pub const fn new(min: FloatValue, max: FloatValue) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: FloatValue) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn clamp(&self, value: FloatValue) -> FloatValue {
        value.clamp(self.min, self.max)
    }

    /// The bound edge that `value` lies within `rtol` (relative to the edge) of.
    ///
    /// Uses `|value - edge| <= rtol * |edge|`, with no absolute tolerance.
    pub fn nearby_edge(&self, value: FloatValue, rtol: FloatValue) -> Option<FloatValue> {
        [self.min, self.max]
            .into_iter()
            .find(|edge| (value - edge).abs() <= rtol * edge.abs())
    }

    /// Finite edges with `min < max`; `name` labels the error.
    pub fn validate(&self, name: &str) -> FluxResult<()> {
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(FluxError::InvalidParameter(format!(
                "{} bounds must be finite with min < max, got [{}, {}]",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Parameters of the bounded least-squares fit of the respiration model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParameters {
    /// Bounds of the temperature sensitivity $E_0$ when free
    /// unit: K
    /// default: [50, 500]
    pub sensitivity_bounds: ParameterBounds,

    /// Bounds of the reference rate $R_{10}$
    /// unit: flux units
    /// default: [1e-7, 1]
    pub reference_rate_bounds: ParameterBounds,

    /// Initial guess of $E_0$
    /// default: 300
    pub sensitivity_guess: FloatValue,

    /// Initial guess of $R_{10}$
    /// default: 0.2
    pub reference_rate_guess: FloatValue,

    /// Model evaluation budget of the solver
    /// default: 2000
    pub max_evaluations: usize,

    /// Relative convergence tolerance on the cost and the parameter step
    /// default: 1e-10
    pub tolerance: FloatValue,
}

impl Default for FitParameters {
    fn default() -> Self {
        Self {
            sensitivity_bounds: ParameterBounds::new(50.0, 500.0),
            reference_rate_bounds: ParameterBounds::new(1e-7, 1.0),
            sensitivity_guess: 300.0,
            reference_rate_guess: 0.2,
            max_evaluations: 2000,
            tolerance: 1e-10,
        }
    }
}

/// Acceptance thresholds applied to every completed fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityParameters {
    /// Maximum `stderr / value` of a free parameter
    /// default: 0.5
    pub relative_error_limit: FloatValue,

    /// Relative distance to a bound edge under which a free parameter is
    /// considered pinned
    /// default: 0.01
    pub bound_tolerance: FloatValue,
}

impl Default for QualityParameters {
    fn default() -> Self {
        Self {
            relative_error_limit: 0.5,
            bound_tolerance: 0.01,
        }
    }
}

/// Window settings for the series-wide temperature sensitivity estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityParameters {
    /// default: 7
    pub window_half_width_days: u32,

    /// Minimum number of complete observations in a window
    /// default: 20
    pub min_observations: usize,

    /// Minimum `max - min` temperature spread in a window
    /// unit: K
    /// default: 5
    pub min_temperature_range: FloatValue,
}

impl Default for SensitivityParameters {
    fn default() -> Self {
        Self {
            window_half_width_days: 7,
            min_observations: 20,
            min_temperature_range: 5.0,
        }
    }
}

/// Window-widening settings for the per-date reference rate models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelBankParameters {
    /// Half-widths tried in order until one holds enough observations
    /// default: [2, 3, 4, 5, 6, 7]
    pub window_half_widths: Vec<u32>,

    /// Minimum number of complete observations in a window
    /// default: 20
    pub min_observations: usize,
}

impl Default for ModelBankParameters {
    fn default() -> Self {
        Self {
            window_half_widths: (2..=7).collect(),
            min_observations: 20,
        }
    }
}

/// All settings of a partitioning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionParameters {
    pub fit: FitParameters,
    pub quality: QualityParameters,
    pub sensitivity: SensitivityParameters,
    pub model_bank: ModelBankParameters,

    /// Fit dates on the rayon thread pool
    /// default: true
    pub parallel: bool,
}

impl Default for PartitionParameters {
    fn default() -> Self {
        Self {
            fit: FitParameters::default(),
            quality: QualityParameters::default(),
            sensitivity: SensitivityParameters::default(),
            model_bank: ModelBankParameters::default(),
            parallel: true,
        }
    }
}

impl PartitionParameters {
    /// Check the parameters for internal consistency.
    pub fn validate(&self) -> FluxResult<()> {
        let fit = &self.fit;
        fit.sensitivity_bounds.validate("sensitivity")?;
        fit.reference_rate_bounds.validate("reference rate")?;
        if !fit.sensitivity_bounds.contains(fit.sensitivity_guess) {
            return Err(FluxError::InvalidParameter(format!(
                "sensitivity guess {} lies outside its bounds",
                fit.sensitivity_guess
            )));
        }
        if !fit.reference_rate_bounds.contains(fit.reference_rate_guess) {
            return Err(FluxError::InvalidParameter(format!(
                "reference rate guess {} lies outside its bounds",
                fit.reference_rate_guess
            )));
        }
        if fit.max_evaluations == 0 {
            return Err(FluxError::InvalidParameter(
                "max_evaluations must be positive".to_string(),
            ));
        }
        if !(fit.tolerance > 0.0) {
            return Err(FluxError::InvalidParameter(
                "tolerance must be positive".to_string(),
            ));
        }

        let quality = &self.quality;
        if !(quality.relative_error_limit > 0.0) || !(quality.bound_tolerance >= 0.0) {
            return Err(FluxError::InvalidParameter(format!(
                "quality thresholds must be positive, got relative_error_limit={} bound_tolerance={}",
                quality.relative_error_limit, quality.bound_tolerance
            )));
        }

        if self.sensitivity.min_observations == 0 || self.model_bank.min_observations == 0 {
            return Err(FluxError::InvalidParameter(
                "min_observations must be positive".to_string(),
            ));
        }
        if !(self.sensitivity.min_temperature_range >= 0.0) {
            return Err(FluxError::InvalidParameter(format!(
                "min_temperature_range must be non-negative, got {}",
                self.sensitivity.min_temperature_range
            )));
        }

        let widths = &self.model_bank.window_half_widths;
        if widths.is_empty() || widths.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(FluxError::InvalidParameter(format!(
                "window_half_widths must be non-empty and strictly increasing, got {:?}",
                widths
            )));
        }
        Ok(())
    }
}
