mod light_response;
mod night_filter;
mod partition;
mod reference_rate;

pub use light_response::{gpp_light_response, LightResponse, LightResponseParameters};
pub use night_filter::NightFilter;
pub use partition::{partition_fluxes, PartitionedFlux};
pub use reference_rate::{interpolate_reference_rates, DailyReferenceRate, ReferenceRateSeries};
