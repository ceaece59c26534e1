//! Downstream components of the flux partitioning.
//!
//! The regression engine in `fluxpart-core` only sees nighttime data and
//! produces one reference-rate fit per date. The components here prepare its
//! input and turn its output into partitioned fluxes:
//! - [`components::NightFilter`] selects the respiration-only records
//! - [`components::interpolate_reference_rates`] fills gaps in the daily reference rate
//! - [`components::partition_fluxes`] splits NEE into TER and GPP
//! - [`components::LightResponse`] evaluates the GPP light-response curve

pub mod components;
