//! Nighttime selection
//!
//! Photosynthesis is inactive when the photosynthetically active radiation is
//! below a threshold, so the measured net flux of those records is ecosystem
//! respiration only.

use fluxpart_core::timeseries::{FloatValue, Observation, ObservationSeries};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NightFilter {
    /// Records at or above this radiation are daytime
    /// unit: µmol m-2 s-1
    /// default: 20
    pub radiation_threshold: FloatValue,
}

impl Default for NightFilter {
    fn default() -> Self {
        Self {
            radiation_threshold: 20.0,
        }
    }
}

impl NightFilter {
    pub fn new(radiation_threshold: FloatValue) -> Self {
        Self {
            radiation_threshold,
        }
    }

    /// Radiation strictly below the threshold, with temperature and flux present.
    ///
    /// A missing radiation value never counts as night.
    pub fn is_night(&self, observation: &Observation) -> bool {
        observation.radiation < self.radiation_threshold && observation.is_complete()
    }

    pub fn apply(&self, series: &ObservationSeries) -> ObservationSeries {
        let night = series.filter(|o| self.is_night(o));
        info!(
            "Night filter kept {} of {} records (radiation < {})",
            night.len(),
            series.len(),
            self.radiation_threshold
        );
        night
    }
}
