//! Observation series
//!
//! An [`ObservationSeries`] holds the measured half-hourly (or any other
//! resolution) records of a site as column arrays, ordered by timestamp.
//! The calendar date of every record is precomputed so that windows can be
//! located with binary searches.

use crate::errors::{FluxError, FluxResult};
use chrono::{Days, NaiveDate, NaiveDateTime};
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Range;

pub type FloatValue = f64;

/// A single measured record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    /// unit: K
    pub temperature: FloatValue,
    /// Net ecosystem exchange
    /// unit: flux units (e.g. mg CO2 m-2 s-1)
    pub flux: FloatValue,
    /// Photosynthetically active radiation
    /// unit: µmol m-2 s-1
    pub radiation: FloatValue,
}

impl Observation {
    pub fn new(
        timestamp: NaiveDateTime,
        temperature: FloatValue,
        flux: FloatValue,
        radiation: FloatValue,
    ) -> Self {
        Self {
            timestamp,
            temperature,
            flux,
            radiation,
        }
    }

    /// Both the temperature and the flux are finite.
    pub fn is_complete(&self) -> bool {
        self.temperature.is_finite() && self.flux.is_finite()
    }
}

/// A time-ordered, uniquely-timestamped collection of observations.
///
/// Missing values are stored as NaN. Serialized as a list of observations;
/// deserializing goes through [`ObservationSeries::from_observations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Observation>", into = "Vec<Observation>")]
pub struct ObservationSeries {
    timestamps: Vec<NaiveDateTime>,
    dates: Vec<NaiveDate>,
    temperature: Array1<FloatValue>,
    flux: Array1<FloatValue>,
    radiation: Array1<FloatValue>,
}

impl Default for ObservationSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationSeries {
    pub fn new() -> Self {
        Self {
            timestamps: Vec::new(),
            dates: Vec::new(),
            temperature: Array1::zeros(0),
            flux: Array1::zeros(0),
            radiation: Array1::zeros(0),
        }
    }

    /// Build a series from unordered observations.
    ///
    /// Observations are sorted by timestamp. Two observations sharing a
    /// timestamp are an error.
    pub fn from_observations(mut observations: Vec<Observation>) -> FluxResult<Self> {
        observations.sort_by_key(|o| o.timestamp);
        if let Some(pair) = observations
            .windows(2)
            .find(|pair| pair[0].timestamp == pair[1].timestamp)
        {
            return Err(FluxError::DuplicateTimestamp(pair[0].timestamp));
        }
        Ok(Self::from_sorted(observations))
    }

    fn from_sorted(observations: Vec<Observation>) -> Self {
        let timestamps: Vec<NaiveDateTime> = observations.iter().map(|o| o.timestamp).collect();
        let dates = timestamps.iter().map(|t| t.date()).collect();
        Self {
            timestamps,
            dates,
            temperature: observations.iter().map(|o| o.temperature).collect(),
            flux: observations.iter().map(|o| o.flux).collect(),
            radiation: observations.iter().map(|o| o.radiation).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Calendar date of every observation
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn temperature(&self) -> ArrayView1<FloatValue> {
        self.temperature.view()
    }

    pub fn flux(&self) -> ArrayView1<FloatValue> {
        self.flux.view()
    }

    pub fn radiation(&self) -> ArrayView1<FloatValue> {
        self.radiation.view()
    }

    pub fn get(&self, index: usize) -> Option<Observation> {
        let timestamp = *self.timestamps.get(index)?;
        Some(Observation {
            timestamp,
            temperature: self.temperature[index],
            flux: self.flux[index],
            radiation: self.radiation[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Keep the observations matching `predicate`, preserving order.
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(&Observation) -> bool,
    {
        Self::from_sorted(self.iter().filter(|o| predicate(o)).collect())
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    /// Every calendar date from the first observation's date through the last
    /// observation's date, at daily frequency.
    ///
    /// Dates without any observation are included.
    pub fn calendar_dates(&self) -> Vec<NaiveDate> {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => first.iter_days().take_while(|d| *d <= last).collect(),
            _ => Vec::new(),
        }
    }

    /// Index range of the observations whose date lies in `[start, end]`.
    ///
    /// Returns an empty range when `start > end` or nothing matches.
    pub fn date_range(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let lower = self.dates.partition_point(|d| *d < start);
        let upper = self.dates.partition_point(|d| *d <= end);
        lower..upper.max(lower)
    }

    /// Index range of the observations within `half_width_days` of `center`.
    pub fn centered_range(&self, center: NaiveDate, half_width_days: u32) -> Range<usize> {
        let days = Days::new(u64::from(half_width_days));
        let start = center.checked_sub_days(days).unwrap_or(NaiveDate::MIN);
        let end = center.checked_add_days(days).unwrap_or(NaiveDate::MAX);
        self.date_range(start, end)
    }

    pub(crate) fn temperature_slice(&self, range: Range<usize>) -> ArrayView1<FloatValue> {
        self.temperature.slice(s![range])
    }

    pub(crate) fn flux_slice(&self, range: Range<usize>) -> ArrayView1<FloatValue> {
        self.flux.slice(s![range])
    }
}

impl TryFrom<Vec<Observation>> for ObservationSeries {
    type Error = FluxError;

    fn try_from(observations: Vec<Observation>) -> FluxResult<Self> {
        Self::from_observations(observations)
    }
}

impl From<ObservationSeries> for Vec<Observation> {
    fn from(series: ObservationSeries) -> Self {
        series.iter().collect()
    }
}
