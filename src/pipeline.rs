//! The end-to-end partitioning run.

use crate::config::Config;
use fluxpart_components::components::{
    interpolate_reference_rates, partition_fluxes, PartitionedFlux, ReferenceRateSeries,
};
use fluxpart_core::errors::{FluxError, FluxResult};
use fluxpart_core::outcome::ModelBank;
use fluxpart_core::sensitivity::{SensitivitySummary, TemperatureSensitivityEstimator};
use fluxpart_core::timeseries::ObservationSeries;
use fluxpart_core::AdaptiveWindowModelBuilder;
use log::{info, warn};

/// Below this share of accepted dates the reference rates are mostly interpolated
const LOW_ACCEPTANCE_FRACTION: f64 = 0.5;

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub summary: SensitivitySummary,
    pub model_bank: ModelBank,
    pub reference_rates: ReferenceRateSeries,
    pub fluxes: Vec<PartitionedFlux>,
}

impl PartitionReport {
    pub fn acceptance_fraction(&self) -> f64 {
        self.model_bank.acceptance_fraction()
    }
}

/// Partition `series` into respiration and photosynthesis.
///
/// The night filter selects the respiration-only records, from which the
/// series-wide sensitivity and then the per-date reference rates are fitted.
/// The interpolated daily rates are applied to every record of `series`.
pub fn run(series: &ObservationSeries, config: &Config) -> FluxResult<PartitionReport> {
    if series.is_empty() {
        return Err(FluxError::EmptySeries);
    }
    let night = config.night_filter.apply(series);
    if night.is_empty() {
        warn!("No nighttime records below {}", config.night_filter.radiation_threshold);
        return Err(FluxError::EmptySeries);
    }

    let parameters = &config.parameters;
    let summary = TemperatureSensitivityEstimator::from_parameters(parameters).estimate(&night)?;
    let model_bank = AdaptiveWindowModelBuilder::from_parameters(parameters).build(&night, summary.median)?;

    let acceptance = model_bank.acceptance_fraction();
    if acceptance < LOW_ACCEPTANCE_FRACTION {
        warn!(
            "Only {:.0}% of dates have an accepted reference rate fit",
            100.0 * acceptance
        );
    }

    let reference_rates = interpolate_reference_rates(&model_bank)?;
    let fluxes = partition_fluxes(series, summary.median, &reference_rates);
    info!(
        "Partitioned {} records, {} with GPP",
        fluxes.len(),
        fluxes.iter().filter(|f| f.gpp.is_some()).count()
    );

    Ok(PartitionReport {
        summary,
        model_bank,
        reference_rates,
        fluxes,
    })
}
