//! Reading the site table and writing results.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use fluxpart_components::components::{PartitionedFlux, ReferenceRateSeries};
use fluxpart_core::outcome::ModelBank;
use fluxpart_core::timeseries::{FloatValue, Observation, ObservationSeries};
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Cell contents read as a missing value
const MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "nan"];
/// Fill value used by FLUXNET-style tables
const MISSING_FILL: FloatValue = -9999.0;

/// Timestamp layouts tried when no format is configured
const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y%m%d%H%M",
];

/// Read observations from a CSV file, renaming the configured columns.
pub fn read_observations(path: &Path, config: &Config) -> Result<ObservationSeries> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let series = read_observations_from(file, config)
        .with_context(|| format!("reading observations from {}", path.display()))?;
    info!(
        "Read {} observations ({} to {}) from {}",
        series.len(),
        series.first_date().map_or("-".to_string(), |d| d.to_string()),
        series.last_date().map_or("-".to_string(), |d| d.to_string()),
        path.display()
    );
    Ok(series)
}

/// Read observations from any CSV source.
///
/// Rows may appear in any order; duplicate timestamps are an error.
pub fn read_observations_from<R: Read>(source: R, config: &Config) -> Result<ObservationSeries> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let headers = reader.headers().context("reading CSV headers")?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("CSV missing '{}' column", name))
    };
    let columns = &config.columns;
    let timestamp_idx = column(&columns.timestamp)?;
    let temperature_idx = column(&columns.temperature)?;
    let radiation_idx = column(&columns.radiation)?;
    let flux_idx = column(&columns.flux)?;

    let mut observations = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {}", row_no))?;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let timestamp = parse_timestamp(cell(timestamp_idx), config.timestamp_format.as_deref())
            .with_context(|| format!("CSV row {}", row_no))?;
        let temperature = parse_value(cell(temperature_idx))
            .with_context(|| format!("CSV row {}, '{}'", row_no, columns.temperature))?;
        let radiation = parse_value(cell(radiation_idx))
            .with_context(|| format!("CSV row {}, '{}'", row_no, columns.radiation))?;
        let flux = parse_value(cell(flux_idx))
            .with_context(|| format!("CSV row {}, '{}'", row_no, columns.flux))?;

        observations.push(Observation::new(
            timestamp,
            config.temperature_unit.to_kelvin(temperature),
            flux,
            radiation,
        ));
    }
    debug!("Parsed {} CSV rows", observations.len());

    Ok(ObservationSeries::from_observations(observations)?)
}

/// Parse a numeric cell; missing markers become NaN.
fn parse_value(token: &str) -> Result<FloatValue> {
    if MISSING_TOKENS.contains(&token) {
        return Ok(FloatValue::NAN);
    }
    let value: FloatValue = token
        .parse()
        .with_context(|| format!("'{}' is not a number", token))?;
    if value == MISSING_FILL {
        Ok(FloatValue::NAN)
    } else {
        Ok(value)
    }
}

fn parse_timestamp(token: &str, format: Option<&str>) -> Result<NaiveDateTime> {
    if let Some(format) = format {
        return NaiveDateTime::parse_from_str(token, format)
            .with_context(|| format!("timestamp '{}' does not match '{}'", token, format));
    }
    match TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(token, format).ok())
    {
        Some(timestamp) => Ok(timestamp),
        None => bail!("unrecognised timestamp '{}'", token),
    }
}

fn write_csv<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the partitioned fluxes; missing values are left empty.
pub fn write_partitioned_fluxes(path: &Path, fluxes: &[PartitionedFlux]) -> Result<()> {
    write_csv(path, fluxes)?;
    info!("Wrote {} partitioned records to {}", fluxes.len(), path.display());
    Ok(())
}

/// Write the daily reference rates with an interpolation flag.
pub fn write_reference_rates(path: &Path, rates: &ReferenceRateSeries) -> Result<()> {
    write_csv(path, rates.iter())?;
    info!("Wrote {} daily reference rates to {}", rates.len(), path.display());
    Ok(())
}

/// Write the per-date fit outcomes as a JSON object keyed by date.
pub fn write_model_bank(path: &Path, bank: &ModelBank) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, bank)
        .with_context(|| format!("writing {}", path.display()))?;
    writer.flush()?;
    info!("Wrote model bank of {} dates to {}", bank.len(), path.display());
    Ok(())
}
