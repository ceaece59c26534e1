//! Ecosystem respiration model
//!
//! Lloyd & Taylor (1994) temperature response:
//! $$ R = R_{10} \exp\left(E_0 \left(\frac{1}{T_{ref} - T_0} - \frac{1}{T - T_0}\right)\right) $$
//!
//! Where:
//! - $R_{10}$ is the respiration rate at the reference temperature
//! - $E_0$ is the temperature sensitivity
//! - $T_{ref}$ = 283.15 K (10 °C)
//! - $T_0$ = 227.13 K
//!
//! # References
//!
//! Lloyd, J., and J. A. Taylor. 1994. 'On the Temperature Dependence of Soil
//! Respiration'. Functional Ecology 8 (3): 315–23. <https://doi.org/10.2307/2389824>

use crate::timeseries::FloatValue;

/// Reference temperature at which the respiration equals the reference rate
/// unit: K
pub const REFERENCE_TEMPERATURE: FloatValue = 283.15;

/// Temperature at which the respiration approaches zero
/// unit: K
pub const TEMPERATURE_OFFSET: FloatValue = 227.13;

/// Temperature-dependent part of the exponent, $1/(T_{ref} - T_0) - 1/(T - T_0)$.
///
/// Singular at `temperature == TEMPERATURE_OFFSET` and overflows just below it;
/// callers are expected to screen such temperatures out.
#[inline]
pub fn temperature_response(temperature: FloatValue) -> FloatValue {
    1.0 / (REFERENCE_TEMPERATURE - TEMPERATURE_OFFSET) - 1.0 / (temperature - TEMPERATURE_OFFSET)
}

/// Predicted respiration flux
///
/// # Arguments
/// * `temperature` - unit: K
/// * `sensitivity` - $E_0$, unit: K
/// * `reference_rate` - $R_{10}$, in flux units
#[inline]
pub fn ecosystem_respiration(
    temperature: FloatValue,
    sensitivity: FloatValue,
    reference_rate: FloatValue,
) -> FloatValue {
    reference_rate * (sensitivity * temperature_response(temperature)).exp()
}

/// Partial derivatives of [`ecosystem_respiration`] with respect to
/// `(sensitivity, reference_rate)`.
#[inline]
pub fn ecosystem_respiration_gradient(
    temperature: FloatValue,
    sensitivity: FloatValue,
    reference_rate: FloatValue,
) -> (FloatValue, FloatValue) {
    let response = temperature_response(temperature);
    let scale = (sensitivity * response).exp();
    (reference_rate * scale * response, scale)
}
