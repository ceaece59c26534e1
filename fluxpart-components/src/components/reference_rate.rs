//! Daily reference rate series
//!
//! Dates without an accepted fit are filled by linear interpolation in time
//! between the nearest accepted dates. Dates before the first or after the
//! last accepted date take the nearest accepted value.

use fluxpart_core::errors::{FluxError, FluxResult};
use fluxpart_core::outcome::ModelBank;
use fluxpart_core::timeseries::FloatValue;
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyReferenceRate {
    pub date: NaiveDate,
    pub reference_rate: FloatValue,
    /// The value was filled rather than fitted
    pub interpolated: bool,
}

/// Gap-free daily reference rates, ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRateSeries {
    values: Vec<DailyReferenceRate>,
}

impl ReferenceRateSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<FloatValue> {
        self.values
            .binary_search_by_key(&date, |v| v.date)
            .ok()
            .map(|i| self.values[i].reference_rate)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DailyReferenceRate> {
        self.values.iter()
    }

    pub fn n_interpolated(&self) -> usize {
        self.values.iter().filter(|v| v.interpolated).count()
    }
}

/// Fill the reference rate of every date in `bank`.
///
/// Fails when no date has an accepted fit.
pub fn interpolate_reference_rates(bank: &ModelBank) -> FluxResult<ReferenceRateSeries> {
    let known: Vec<(NaiveDate, FloatValue)> = bank
        .reference_rates()
        .filter_map(|(date, rate)| rate.map(|r| (date, r)))
        .collect();
    let (Some(first), Some(last)) = (known.first().copied(), known.last().copied()) else {
        return Err(FluxError::NoAcceptedReferenceRate { n_dates: bank.len() });
    };

    let values: Vec<DailyReferenceRate> = bank
        .reference_rates()
        .map(|(date, rate)| match rate {
            Some(reference_rate) => DailyReferenceRate {
                date,
                reference_rate,
                interpolated: false,
            },
            None => DailyReferenceRate {
                date,
                reference_rate: interpolate(&known, date),
                interpolated: true,
            },
        })
        .collect();

    let leading = values.iter().take_while(|v| v.date < first.0).count();
    let trailing = values.iter().rev().take_while(|v| v.date > last.0).count();
    if leading + trailing > 0 {
        warn!(
            "Reference rate held constant for {} leading and {} trailing date(s) without an accepted fit",
            leading, trailing
        );
    }

    let series = ReferenceRateSeries { values };
    info!(
        "Reference rates for {} dates, {} filled by interpolation",
        series.len(),
        series.n_interpolated()
    );
    Ok(series)
}

/// Linear interpolation in time over `known`, which is sorted and non-empty.
fn interpolate(known: &[(NaiveDate, FloatValue)], date: NaiveDate) -> FloatValue {
    let idx = known.partition_point(|(d, _)| *d < date);
    if idx == 0 {
        return known[0].1;
    }
    if idx == known.len() {
        return known[idx - 1].1;
    }
    let (d0, r0) = known[idx - 1];
    let (d1, r1) = known[idx];
    let span = (d1 - d0).num_days() as FloatValue;
    let offset = (date - d0).num_days() as FloatValue;
    r0 + (r1 - r0) * offset / span
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;
    use fluxpart_core::outcome::{FitOutcome, RejectionReason};
    use is_close::is_close;

    fn date(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 1).unwrap() + Days::new(offset)
    }

    fn accepted(reference_rate: FloatValue) -> FitOutcome {
        FitOutcome::Accepted {
            sensitivity: 200.0,
            sensitivity_stderr: None,
            reference_rate,
            reference_rate_stderr: 0.01,
            window_half_width_days: 2,
            n_observations: 30,
        }
    }

    fn bank(outcomes: Vec<FitOutcome>) -> ModelBank {
        let dates: Vec<NaiveDate> = (0..outcomes.len() as u64).map(date).collect();
        ModelBank::from_dates(&dates, false, |d| {
            outcomes[(d - date(0)).num_days() as usize].clone()
        })
    }

    #[test]
    fn fills_interior_gaps_linearly() {
        let rejected = FitOutcome::Rejected {
            reason: RejectionReason::FitFailed {
                message: "Model produced non-finite residuals".to_string(),
            },
        };
        let series = interpolate_reference_rates(&bank(vec![
            accepted(0.2),
            FitOutcome::InsufficientData,
            rejected,
            FitOutcome::InsufficientData,
            accepted(0.6),
        ]))
        .unwrap();

        assert_eq!(series.len(), 5);
        assert_eq!(series.n_interpolated(), 3);
        assert!(is_close!(series.get(date(1)).unwrap(), 0.3));
        assert!(is_close!(series.get(date(2)).unwrap(), 0.4));
        assert!(is_close!(series.get(date(3)).unwrap(), 0.5));
        assert_eq!(series.get(date(4)), Some(0.6));
        assert_eq!(series.get(date(9)), None);
    }

    #[test]
    fn edges_take_nearest_value() {
        let series = interpolate_reference_rates(&bank(vec![
            FitOutcome::InsufficientData,
            FitOutcome::InsufficientData,
            accepted(0.25),
            accepted(0.35),
            FitOutcome::InsufficientData,
        ]))
        .unwrap();

        assert_eq!(series.get(date(0)), Some(0.25));
        assert_eq!(series.get(date(1)), Some(0.25));
        assert_eq!(series.get(date(4)), Some(0.35));
    }

    #[test]
    fn no_accepted_fit_is_an_error() {
        let result = interpolate_reference_rates(&bank(vec![FitOutcome::InsufficientData; 4]));
        assert_eq!(result, Err(FluxError::NoAcceptedReferenceRate { n_dates: 4 }));
    }
}
