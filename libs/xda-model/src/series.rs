//! Data series
//!
//! A time-ordered run of samples for one channel.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::types::SeriesInfo;

/// One sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataPoint {
    pub time: NaiveDateTime,
    pub value: f64,
}

impl DataPoint {
    pub fn new(time: NaiveDateTime, value: f64) -> Self {
        Self { time, value }
    }
}

/// Samples of one channel, ordered by time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSeries {
    pub series_info: Option<SeriesInfo>,
    pub points: Vec<DataPoint>,
}

impl DataSeries {
    pub fn new(series_info: SeriesInfo) -> Self {
        Self {
            series_info: Some(series_info),
            points: Vec::new(),
        }
    }

    pub fn with_points(series_info: Option<SeriesInfo>, points: Vec<DataPoint>) -> Self {
        Self {
            series_info,
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Channel name from the series info, if any
    pub fn name(&self) -> Option<&str> {
        self.series_info.as_ref().map(|info| info.channel_name())
    }

    pub fn start_time(&self) -> Option<NaiveDateTime> {
        self.points.first().map(|p| p.time)
    }

    pub fn end_time(&self) -> Option<NaiveDateTime> {
        self.points.last().map(|p| p.time)
    }

    /// Samples per second over the whole series
    ///
    /// Returns 0.0 for fewer than two samples or a zero-length span.
    pub fn sample_rate(&self) -> f64 {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return 0.0;
        };
        if self.points.len() < 2 {
            return 0.0;
        }

        let span = (end - start)
            .num_nanoseconds()
            .map(|ns| ns as f64 / 1e9)
            .unwrap_or(0.0);
        if span <= 0.0 {
            return 0.0;
        }

        (self.points.len() - 1) as f64 / span
    }

    /// Points with `start <= time <= end`, same series info
    pub fn to_sub_series(&self, start: NaiveDateTime, end: NaiveDateTime) -> DataSeries {
        let from = self.points.partition_point(|p| p.time < start);
        let to = self.points.partition_point(|p| p.time <= end);

        DataSeries {
            series_info: self.series_info.clone(),
            points: if from < to {
                self.points[from..to].to_vec()
            } else {
                Vec::new()
            },
        }
    }

    /// Merge several series into one time-ordered series
    ///
    /// When two samples share a timestamp the one from the later series in
    /// `series` wins. The series info of the first input is kept.
    pub fn merge<'a, I>(series: I) -> DataSeries
    where
        I: IntoIterator<Item = &'a DataSeries>,
    {
        let mut series_info = None;
        let mut points: Vec<DataPoint> = Vec::new();

        for s in series {
            if series_info.is_none() {
                series_info = s.series_info.clone();
            }
            points.extend_from_slice(&s.points);
        }

        // Stable: equal timestamps stay in input order
        points.sort_by(|a, b| a.time.cmp(&b.time));

        let mut merged: Vec<DataPoint> = Vec::with_capacity(points.len());
        for point in points {
            match merged.last_mut() {
                Some(last) if last.time == point.time => *last = point,
                _ => merged.push(point),
            }
        }

        DataSeries {
            series_info,
            points: merged,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t(ms: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            + Duration::milliseconds(ms)
    }

    fn series(samples: &[(i64, f64)]) -> DataSeries {
        DataSeries::with_points(
            None,
            samples.iter().map(|&(ms, v)| DataPoint::new(t(ms), v)).collect(),
        )
    }

    #[test]
    fn test_merge_interleaves_by_time() {
        let a = series(&[(0, 1.0), (2, 3.0)]);
        let b = series(&[(1, 2.0), (3, 4.0)]);

        let merged = DataSeries::merge([&a, &b]);
        let values: Vec<f64> = merged.points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_merge_later_series_wins_on_equal_time() {
        let a = series(&[(0, 1.0), (1, 1.0)]);
        let b = series(&[(1, 9.0), (2, 9.0)]);

        let merged = DataSeries::merge([&a, &b]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.points[1].value, 9.0);
    }

    #[test]
    fn test_sub_series_is_inclusive() {
        let s = series(&[(0, 0.0), (1, 1.0), (2, 2.0), (3, 3.0)]);

        let sub = s.to_sub_series(t(1), t(2));
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.start_time(), Some(t(1)));
        assert_eq!(sub.end_time(), Some(t(2)));

        assert!(s.to_sub_series(t(5), t(9)).is_empty());
        assert!(s.to_sub_series(t(2), t(1)).is_empty());
    }

    #[test]
    fn test_sample_rate() {
        // 1 kHz
        let s = series(&[(0, 0.0), (1, 0.0), (2, 0.0), (3, 0.0)]);
        assert!((s.sample_rate() - 1000.0).abs() < 1e-9);

        assert_eq!(series(&[(0, 0.0)]).sample_rate(), 0.0);
        assert_eq!(series(&[(0, 0.0), (0, 1.0)]).sample_rate(), 0.0);
    }
}
