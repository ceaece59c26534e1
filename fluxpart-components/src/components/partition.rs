//! Partitioning of the full NEE series into TER and GPP.
//!
//! $$ TER = R(T; E_0, R_{10}(date)) \qquad GPP = NEE - TER $$

use crate::components::reference_rate::ReferenceRateSeries;
use chrono::NaiveDateTime;
use fluxpart_core::respiration::ecosystem_respiration;
use fluxpart_core::timeseries::{FloatValue, ObservationSeries};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartitionedFlux {
    pub timestamp: NaiveDateTime,
    pub nee: Option<FloatValue>,
    pub ter: Option<FloatValue>,
    pub gpp: Option<FloatValue>,
}

/// Split every observation of `series` into respiration and photosynthesis.
///
/// TER is missing when the temperature is missing or the date has no
/// reference rate; GPP is additionally missing when NEE is.
pub fn partition_fluxes(
    series: &ObservationSeries,
    sensitivity: FloatValue,
    reference_rates: &ReferenceRateSeries,
) -> Vec<PartitionedFlux> {
    series
        .iter()
        .map(|observation| {
            let nee = Some(observation.flux).filter(|f| f.is_finite());
            let ter = reference_rates
                .get(observation.timestamp.date())
                .filter(|_| observation.temperature.is_finite())
                .map(|r| ecosystem_respiration(observation.temperature, sensitivity, r))
                .filter(|t| t.is_finite());
            let gpp = nee.zip(ter).map(|(nee, ter)| nee - ter);
            PartitionedFlux {
                timestamp: observation.timestamp,
                nee,
                ter,
                gpp,
            }
        })
        .collect()
}
