//! Date-centred windows into an observation series.
//!
//! A [`Window`] is a zero-cost view: it borrows the parent series and records
//! the contiguous index range whose calendar dates satisfy
//! `center - half_width <= date <= center + half_width`.

use crate::timeseries::{FloatValue, Observation, ObservationSeries};
use chrono::NaiveDate;
use ndarray::{ArrayView1, Zip};
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct Window<'a> {
    series: &'a ObservationSeries,
    center: NaiveDate,
    half_width_days: u32,
    range: Range<usize>,
}

impl<'a> Window<'a> {
    /// Extract the window of `half_width_days` around `center`.
    ///
    /// An empty window is returned when no observation falls in range.
    pub fn extract(series: &'a ObservationSeries, center: NaiveDate, half_width_days: u32) -> Self {
        Self {
            series,
            center,
            half_width_days,
            range: series.centered_range(center, half_width_days),
        }
    }

    pub fn center(&self) -> NaiveDate {
        self.center
    }

    pub fn half_width_days(&self) -> u32 {
        self.half_width_days
    }

    /// Number of observations in the window, complete or not
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn temperature(&self) -> ArrayView1<'a, FloatValue> {
        self.series.temperature_slice(self.range.clone())
    }

    pub fn flux(&self) -> ArrayView1<'a, FloatValue> {
        self.series.flux_slice(self.range.clone())
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + 'a {
        let series = self.series;
        self.range.clone().filter_map(move |i| series.get(i))
    }

    /// Number of observations with both a finite temperature and a finite flux.
    ///
    /// Only these take part in a fit.
    pub fn sample_count(&self) -> usize {
        Zip::from(&self.temperature())
            .and(&self.flux())
            .fold(0, |count, t, f| {
                count + usize::from(t.is_finite() && f.is_finite())
            })
    }

    /// `max - min` of the temperatures of the complete observations.
    ///
    /// Returns `None` when the window has no complete observation.
    pub fn temperature_range(&self) -> Option<FloatValue> {
        let (min, max) = Zip::from(&self.temperature()).and(&self.flux()).fold(
            (FloatValue::INFINITY, FloatValue::NEG_INFINITY),
            |(min, max), &t, f| {
                if t.is_finite() && f.is_finite() {
                    (min.min(t), max.max(t))
                } else {
                    (min, max)
                }
            },
        );
        (min <= max).then(|| max - min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveTime};

    fn series() -> ObservationSeries {
        let start = NaiveDate::from_ymd_opt(2020, 5, 1).unwrap();
        let observations: Vec<Observation> = (0..10u64)
            .flat_map(|day| {
                let date = start + Days::new(day);
                (0..3).map(move |hour| {
                    Observation::new(
                        date.and_time(NaiveTime::from_hms_opt(hour, 30, 0).unwrap()),
                        280.0 + day as f64,
                        0.2,
                        0.0,
                    )
                })
            })
            .collect();
        ObservationSeries::from_observations(observations).unwrap()
    }

    #[test]
    fn extract_inclusive_bounds() {
        let series = series();
        let center = NaiveDate::from_ymd_opt(2020, 5, 5).unwrap();
        let window = Window::extract(&series, center, 2);
        assert_eq!(window.center(), center);
        assert_eq!(window.half_width_days(), 2);

        assert_eq!(window.len(), 15);
        for obs in window.iter() {
            let date = obs.timestamp.date();
            assert!(date >= center - Days::new(2) && date <= center + Days::new(2));
        }
        assert_eq!(window.temperature_range(), Some(4.0));
    }

    #[test]
    fn zero_half_width() {
        let series = series();
        let window = Window::extract(&series, NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(), 0);
        assert_eq!(window.len(), 3);
        assert_eq!(window.temperature_range(), Some(0.0));
    }

    #[test]
    fn empty_outside_series() {
        let series = series();
        let window = Window::extract(&series, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), 7);
        assert!(window.is_empty());
        assert_eq!(window.sample_count(), 0);
        assert_eq!(window.temperature_range(), None);
    }

    #[test]
    fn sample_count_skips_missing_values() {
        let start = NaiveDate::from_ymd_opt(2020, 5, 1).unwrap();
        let series: Vec<Observation> = [
            (280.0, 0.1),
            (FloatValue::NAN, 0.1),
            (281.0, FloatValue::NAN),
            (290.0, 0.3),
        ]
        .iter()
        .enumerate()
        .map(|(hour, &(t, f))| {
            Observation::new(
                start.and_time(NaiveTime::from_hms_opt(hour as u32, 0, 0).unwrap()),
                t,
                f,
                0.0,
            )
        })
        .collect();
        let series = ObservationSeries::from_observations(series).unwrap();

        let window = Window::extract(&series, start, 1);
        assert_eq!(window.len(), 4);
        assert_eq!(window.sample_count(), 2);
        assert_eq!(window.temperature_range(), Some(10.0));
    }
}
