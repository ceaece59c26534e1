//! GPP light response
//!
//! Rectangular hyperbola of Lasslop et al. (2008):
//! $$ GPP = \frac{\alpha \cdot PPFD \cdot GP_{max}}{\alpha \cdot PPFD + GP_{max}} $$
//!
//! Where:
//! - $\alpha$ approximates the canopy light utilization efficiency
//! - $GP_{max}$ is the asymptotic gross photosynthesis rate in optimal light
//!
//! Both parameters are negative: uptake is a negative flux in the NEE sign
//! convention.
//!
//! # References
//!
//! Lasslop, G., M. Reichstein, J. Kattge, and D. Papale. 2008. 'Influences of
//! Observation Errors in Eddy Flux Data on Inverse Model Parameter
//! Estimation'. Biogeosciences 5 (5): 1311–24. <https://doi.org/10.5194/bg-5-1311-2008>

use fluxpart_core::errors::{FluxError, FluxResult};
use fluxpart_core::parameters::ParameterBounds;
use fluxpart_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Gross primary productivity at a given light level
///
/// # Arguments
/// * `ppfd` - photosynthetic photon flux density, unit: µmol m-2 s-1
/// * `alpha` - unit: µmol-1 m2 s1
/// * `gp_max` - in flux units
pub fn gpp_light_response(ppfd: FloatValue, alpha: FloatValue, gp_max: FloatValue) -> FloatValue {
    (alpha * ppfd * gp_max) / (alpha * ppfd + gp_max)
}

/// Admissible ranges of the light-response parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightResponseParameters {
    /// default: [-0.02, -1e-7]
    pub alpha_bounds: ParameterBounds,
    /// default: [-5, -1e-8]
    pub gp_max_bounds: ParameterBounds,
}

impl Default for LightResponseParameters {
    fn default() -> Self {
        Self {
            alpha_bounds: ParameterBounds::new(-0.02, -1e-7),
            gp_max_bounds: ParameterBounds::new(-5.0, -1e-8),
        }
    }
}

impl LightResponseParameters {
    pub fn validate(&self) -> FluxResult<()> {
        self.alpha_bounds.validate("alpha")?;
        self.gp_max_bounds.validate("gp_max")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightResponse {
    alpha: FloatValue,
    gp_max: FloatValue,
}

impl LightResponse {
    /// Create a light response, checking both parameters against `bounds`.
    pub fn new(
        alpha: FloatValue,
        gp_max: FloatValue,
        bounds: &LightResponseParameters,
    ) -> FluxResult<Self> {
        if !bounds.alpha_bounds.contains(alpha) {
            return Err(FluxError::InvalidParameter(format!(
                "alpha {} outside [{}, {}]",
                alpha, bounds.alpha_bounds.min, bounds.alpha_bounds.max
            )));
        }
        if !bounds.gp_max_bounds.contains(gp_max) {
            return Err(FluxError::InvalidParameter(format!(
                "gp_max {} outside [{}, {}]",
                gp_max, bounds.gp_max_bounds.min, bounds.gp_max_bounds.max
            )));
        }
        Ok(Self { alpha, gp_max })
    }

    pub fn alpha(&self) -> FloatValue {
        self.alpha
    }

    pub fn gp_max(&self) -> FloatValue {
        self.gp_max
    }

    pub fn calculate_gpp(&self, ppfd: FloatValue) -> FloatValue {
        gpp_light_response(ppfd, self.alpha, self.gp_max)
    }
}
