//! Run configuration
//!
//! Read from a TOML file where every table and field is optional:
//!
//! ```toml
//! temperature_unit = "celsius"
//!
//! [columns]
//! timestamp = "TIMESTAMP_END"
//! temperature = "TA_F"
//!
//! [night_filter]
//! radiation_threshold = 10.0
//!
//! [parameters]
//! parallel = false
//!
//! [parameters.sensitivity]
//! window_half_width_days = 5
//! ```

use anyhow::{Context, Result};
use fluxpart_components::components::{LightResponseParameters, NightFilter};
use fluxpart_core::parameters::PartitionParameters;
use fluxpart_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Offset between the Celsius and Kelvin scales
const ZERO_CELSIUS: FloatValue = 273.15;

/// Source column names of the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    /// default: TIMESTAMP_END
    pub timestamp: String,
    /// Air temperature
    /// default: TA
    pub temperature: String,
    /// Photosynthetically active radiation
    /// default: PAR
    pub radiation: String,
    /// Net ecosystem exchange
    /// default: NEE
    pub flux: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            timestamp: "TIMESTAMP_END".to_string(),
            temperature: "TA".to_string(),
            radiation: "PAR".to_string(),
            flux: "NEE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Kelvin,
    Celsius,
}

impl TemperatureUnit {
    /// Convert an input temperature to Kelvin.
    pub fn to_kelvin(self, value: FloatValue) -> FloatValue {
        match self {
            TemperatureUnit::Kelvin => value,
            TemperatureUnit::Celsius => value + ZERO_CELSIUS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub columns: ColumnNames,
    /// chrono format string of the timestamp column.
    ///
    /// When unset, ISO-like (`2020-01-31 23:30:00`, `2020-01-31T23:30`) and
    /// compact FLUXNET (`202001312330`) timestamps are recognised.
    pub timestamp_format: Option<String>,
    /// default: kelvin
    pub temperature_unit: TemperatureUnit,
    pub night_filter: NightFilter,
    /// Admissible GPP light-response parameters.
    ///
    /// Not used by the partitioning run itself; callers evaluating GPP from
    /// fitted light-response parameters check them against these bounds with
    /// [`fluxpart_components::components::LightResponse::new`].
    pub light_response: LightResponseParameters,
    pub parameters: PartitionParameters,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("parsing configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        self.parameters.validate()?;
        self.light_response.validate()?;
        if !self.night_filter.radiation_threshold.is_finite() {
            anyhow::bail!(
                "night filter radiation threshold must be finite, got {}",
                self.night_filter.radiation_threshold
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use fluxpart_components::components::LightResponse;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.columns.timestamp, "TIMESTAMP_END");
        assert_eq!(config.night_filter.radiation_threshold, 20.0);
        assert!(config.parameters.parallel);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_toml_str(
            r#"
            temperature_unit = "celsius"
            timestamp_format = "%Y%m%d%H%M"

            [columns]
            temperature = "TA_F"

            [parameters.model_bank]
            min_observations = 12
            "#,
        )
        .unwrap();

        assert_eq!(config.temperature_unit, TemperatureUnit::Celsius);
        assert_eq!(config.timestamp_format.as_deref(), Some("%Y%m%d%H%M"));
        assert_eq!(config.columns.temperature, "TA_F");
        assert_eq!(config.columns.flux, "NEE");
        assert_eq!(config.parameters.model_bank.min_observations, 12);
        assert_eq!(config.parameters.sensitivity.min_observations, 20);
    }

    #[test]
    fn inconsistent_bounds_are_rejected() {
        let result = Config::from_toml_str(
            r#"
            [light_response.alpha_bounds]
            min = -0.001
            max = -0.02
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn light_response_bounds_apply_to_new_responses() {
        let config = Config::from_toml_str(
            r#"
            [light_response.gp_max_bounds]
            min = -2.0
            max = -0.1
            "#,
        )
        .unwrap();
        let bounds = &config.light_response;
        assert_eq!(bounds.alpha_bounds, LightResponseParameters::default().alpha_bounds);

        let response = LightResponse::new(-0.002, -1.5, bounds).unwrap();
        assert_eq!((response.alpha(), response.gp_max()), (-0.002, -1.5));
        // Allowed by the default bounds, outside the configured ones
        assert!(LightResponse::new(-0.002, -3.0, bounds).is_err());
        assert!(LightResponse::new(-0.002, -3.0, &LightResponseParameters::default()).is_ok());
    }

    #[test]
    fn celsius_conversion() {
        assert_relative_eq!(TemperatureUnit::Celsius.to_kelvin(10.0), 283.15);
        assert_eq!(TemperatureUnit::Kelvin.to_kelvin(283.15), 283.15);
    }
}
