//! Time-series builder
//!
//! Loads every event of a meter that overlaps the requested window, merges
//! the channels across events and derives per-cycle RMS and phase series.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use common::config_loader::get_config_value;
use sqlx::SqlitePool;
use tracing::debug;
use xda_model::{to_vi_cycle_data_group, DataGroup, DataSeries, Event, Meter, VIDataGroup};

use crate::error::Result;
use crate::repository;

pub const SYSTEM_FREQUENCY_SETTING: &str = "SystemFrequency";
pub const TIME_TOLERANCE_SETTING: &str = "TimeTolerance";

/// Insertion-ordered series keyed by channel name
///
/// The first value stored under a key is kept.
#[derive(Debug, Clone, Default)]
pub struct SeriesMap {
    entries: Vec<(String, DataSeries)>,
    index: HashMap<String, usize>,
}

impl SeriesMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_add<F>(&mut self, key: impl Into<String>, make: F) -> &DataSeries
    where
        F: FnOnce() -> DataSeries,
    {
        let key = key.into();
        let idx = match self.index.get(&key) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.index.insert(key.clone(), idx);
                self.entries.push((key, make()));
                idx
            },
        };
        &self.entries[idx].1
    }

    pub fn get(&self, key: &str) -> Option<&DataSeries> {
        self.index.get(key).map(|&idx| &self.entries[idx].1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataSeries)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Nominal frequency: `Setting.SystemFrequency` > `XDA_SYSTEM_FREQUENCY` > `default`
pub async fn system_frequency(pool: &SqlitePool, default: f64) -> Result<f64> {
    let db_value = repository::setting(pool, SYSTEM_FREQUENCY_SETTING).await?;
    let frequency = get_config_value(db_value.as_deref(), "XDA_SYSTEM_FREQUENCY", default);
    Ok(if frequency.is_finite() && frequency > 0.0 {
        frequency
    } else {
        default
    })
}

/// Sag correlation tolerance in seconds: `Setting.TimeTolerance` > `XDA_TIME_TOLERANCE` > `default`
pub async fn time_tolerance(pool: &SqlitePool, default: f64) -> Result<f64> {
    let db_value = repository::setting(pool, TIME_TOLERANCE_SETTING).await?;
    let tolerance = get_config_value(db_value.as_deref(), "XDA_TIME_TOLERANCE", default);
    Ok(if tolerance.is_finite() && tolerance >= 0.0 {
        tolerance
    } else {
        default
    })
}

pub fn seconds(secs: f64) -> Duration {
    Duration::nanoseconds((secs * 1e9).round() as i64)
}

/// Series export for one event's meter
///
/// The window defaults to the event's own span when either bound is absent.
pub async fn build_data_series(
    pool: &SqlitePool,
    event: &Event,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    default_frequency: f64,
) -> Result<SeriesMap> {
    let start = start.unwrap_or(event.start_time);
    let end = end.unwrap_or(event.end_time);

    let meter = repository::get_meter(pool, event.meter_id).await?;
    let frequency = system_frequency(pool, default_frequency).await?;

    query_event_data(pool, &meter, start, end, frequency).await
}

pub async fn query_event_data(
    pool: &SqlitePool,
    meter: &Meter,
    start: NaiveDateTime,
    end: NaiveDateTime,
    system_frequency: f64,
) -> Result<SeriesMap> {
    let events = repository::events_in_window(pool, meter.id, start, end).await?;

    let mut groups = Vec::with_capacity(events.len());
    for event in &events {
        let blobs = repository::channel_data(pool, event.id).await?;
        groups.push(DataGroup::from_data(meter, &blobs)?);
    }
    debug!(
        "Meter {}: {} events overlap {} .. {}",
        meter.asset_key,
        groups.len(),
        start,
        end
    );

    Ok(merge_groups(groups, start, end, system_frequency))
}

/// Merge groups per channel name and append the derived cycle series
pub fn merge_groups(
    mut groups: Vec<DataGroup>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    system_frequency: f64,
) -> SeriesMap {
    // Groups without samples sort last
    groups.sort_by_key(|g| (g.start_time().is_none(), g.start_time()));

    let mut by_name: Vec<(String, Vec<&DataSeries>)> = Vec::new();
    for series in groups.iter().flat_map(|g| g.data_series()) {
        let Some(name) = series.name() else {
            continue;
        };
        match by_name.iter_mut().find(|(n, _)| n == name) {
            Some((_, list)) => list.push(series),
            None => by_name.push((name.to_string(), vec![series])),
        }
    }

    let mut merged_group = DataGroup::new();
    for (_, list) in &by_name {
        merged_group.add(DataSeries::merge(list.iter().copied()));
    }

    let mut map = SeriesMap::new();
    for series in merged_group.data_series() {
        if let Some(name) = series.name() {
            map.get_or_add(name, || series.to_sub_series(start, end));
        }
    }

    let vi_cycles = to_vi_cycle_data_group(&VIDataGroup::new(&merged_group), system_frequency);
    for cycles in vi_cycles.cycle_data_groups() {
        let Some(name) = cycles.channel_name() else {
            continue;
        };
        map.get_or_add(format!("{} RMS", name), || cycles.rms.to_sub_series(start, end));
        map.get_or_add(format!("{} Angle", name), || {
            cycles.phase.to_sub_series(start, end)
        });
    }

    map
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::test_utils::memory_pool;
    use std::f64::consts::PI;
    use xda_model::codec::encode_time_domain;
    use xda_model::{Channel, DataPoint, SeriesInfo};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn info(name: &str, kind: &str, phase: &str) -> Option<SeriesInfo> {
        Some(SeriesInfo::new(Channel {
            id: 1,
            meter_id: 1,
            name: name.to_string(),
            measurement_type: kind.to_string(),
            measurement_characteristic: "Instantaneous".to_string(),
            phase: phase.to_string(),
        }))
    }

    /// 960 Hz sampling (16 samples per 60 Hz cycle) starting at `offset` samples
    fn wave(name: &str, offset: i64, count: i64) -> DataSeries {
        let step_ns = 1e9 / 960.0;
        let points = (offset..offset + count)
            .map(|k| {
                let time = t0() + Duration::nanoseconds((k as f64 * step_ns).round() as i64);
                DataPoint::new(time, (2.0 * PI * k as f64 / 16.0).cos())
            })
            .collect();
        DataSeries::with_points(info(name, "Voltage", "AN"), points)
    }

    fn group(series: Vec<DataSeries>) -> DataGroup {
        let mut g = DataGroup::new();
        for s in series {
            g.add(s);
        }
        g
    }

    #[test]
    fn test_series_map_first_insert_wins() {
        let mut map = SeriesMap::new();
        map.get_or_add("VA", || DataSeries::with_points(None, vec![DataPoint::new(t0(), 1.0)]));
        map.get_or_add("VA", DataSeries::default);
        map.get_or_add("IA", DataSeries::default);

        assert_eq!(map.len(), 2);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["VA", "IA"]);
        assert_eq!(map.get("VA").unwrap().len(), 1);
    }

    #[test]
    fn test_merge_groups_joins_events_and_adds_cycle_series() {
        // Second event recorded first in the list; ordering is by start time
        let later = group(vec![wave("VA", 32, 32)]);
        let earlier = group(vec![wave("VA", 0, 40)]);
        let end = t0() + Duration::seconds(1);

        let map = merge_groups(vec![later, earlier], t0(), end, 60.0);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["VA", "VA RMS", "VA Angle"]);

        let va = map.get("VA").unwrap();
        assert_eq!(va.len(), 64);
        assert_eq!(va.start_time(), Some(t0()));

        let rms = map.get("VA RMS").unwrap();
        assert_eq!(rms.len(), 64 - 16 + 1);
        assert!((rms.points[0].value - 1.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_merge_groups_truncates_to_window() {
        let g = group(vec![wave("VA", 0, 64)]);
        let start = t0() + Duration::milliseconds(10);
        let end = t0() + Duration::milliseconds(20);

        let map = merge_groups(vec![g], start, end, 60.0);
        for (_, series) in map.iter() {
            assert!(series.points.iter().all(|p| p.time >= start && p.time <= end));
        }
        assert!(!map.get("VA").unwrap().is_empty());
    }

    #[test]
    fn test_non_vi_channels_get_no_cycle_series() {
        let mut freq = wave("Frequency", 0, 64);
        freq.series_info = info("Frequency", "Frequency", "None");

        let map = merge_groups(vec![group(vec![freq])], t0(), t0() + Duration::seconds(1), 60.0);
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Frequency"]);
    }

    #[test]
    fn test_no_events_gives_empty_map() {
        let map = merge_groups(Vec::new(), t0(), t0(), 60.0);
        assert!(map.is_empty());
    }
    async fn put_setting(pool: &SqlitePool, name: &str, value: Option<&str>, default: Option<&str>) {
        sqlx::query("INSERT OR REPLACE INTO Setting (Name, Value, DefaultValue) VALUES (?, ?, ?)")
            .bind(name)
            .bind(value)
            .bind(default)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn clear_setting(pool: &SqlitePool, name: &str) {
        sqlx::query("DELETE FROM Setting WHERE Name = ?")
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_system_frequency_sources() {
        let pool = memory_pool().await.unwrap();

        put_setting(&pool, SYSTEM_FREQUENCY_SETTING, Some("50"), None).await;
        assert_eq!(system_frequency(&pool, 60.0).await.unwrap(), 50.0);

        put_setting(&pool, SYSTEM_FREQUENCY_SETTING, None, Some("50")).await;
        assert_eq!(system_frequency(&pool, 60.0).await.unwrap(), 50.0);

        put_setting(&pool, SYSTEM_FREQUENCY_SETTING, Some("0"), None).await;
        assert_eq!(system_frequency(&pool, 60.0).await.unwrap(), 60.0);

        put_setting(&pool, SYSTEM_FREQUENCY_SETTING, Some("-50"), None).await;
        assert_eq!(system_frequency(&pool, 60.0).await.unwrap(), 60.0);

        clear_setting(&pool, SYSTEM_FREQUENCY_SETTING).await;
        std::env::set_var("XDA_SYSTEM_FREQUENCY", "50");
        let from_env = system_frequency(&pool, 60.0).await.unwrap();
        std::env::remove_var("XDA_SYSTEM_FREQUENCY");
        assert_eq!(from_env, 50.0);

        assert_eq!(system_frequency(&pool, 60.0).await.unwrap(), 60.0);
    }

    #[tokio::test]
    async fn test_time_tolerance_sources() {
        let pool = memory_pool().await.unwrap();

        put_setting(&pool, TIME_TOLERANCE_SETTING, Some("1.5"), None).await;
        assert_eq!(time_tolerance(&pool, 0.0).await.unwrap(), 1.5);

        put_setting(&pool, TIME_TOLERANCE_SETTING, Some("0"), None).await;
        assert_eq!(time_tolerance(&pool, 2.0).await.unwrap(), 0.0);

        put_setting(&pool, TIME_TOLERANCE_SETTING, Some("-1"), None).await;
        assert_eq!(time_tolerance(&pool, 2.0).await.unwrap(), 2.0);

        clear_setting(&pool, TIME_TOLERANCE_SETTING).await;
        std::env::set_var("XDA_TIME_TOLERANCE", "0.25");
        let from_env = time_tolerance(&pool, 2.0).await.unwrap();
        std::env::remove_var("XDA_TIME_TOLERANCE");
        assert_eq!(from_env, 0.25);

        assert_eq!(time_tolerance(&pool, 2.0).await.unwrap(), 2.0);
    }

    #[tokio::test]
    async fn test_stored_frequency_sets_cycle_length() {
        let pool = memory_pool().await.unwrap();
        sqlx::query("INSERT INTO Meter (ID, AssetKey, Name) VALUES (1, 'M1-KEY', 'M1')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO Channel (ID, MeterID, MeasurementTypeID, MeasurementCharacteristicID, PhaseID, Name)
             VALUES (1, 1, 1, 1, 1, 'VA')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let va = wave("VA", 0, 48);
        let times: Vec<NaiveDateTime> = va.points.iter().map(|p| p.time).collect();
        let values: Vec<f64> = va.points.iter().map(|p| p.value).collect();
        let start = times[0];
        let end = times[47];
        sqlx::query(
            "INSERT INTO Event (ID, MeterID, LineID, EventTypeID, StartTime, EndTime) VALUES (1, 1, NULL, 1, ?, ?)",
        )
        .bind(start)
        .bind(end)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO ChannelData (EventID, TimeDomainData) VALUES (1, ?)")
            .bind(encode_time_domain(&times, &[(1, values.as_slice())]).unwrap())
            .execute(&pool)
            .await
            .unwrap();

        let meter = repository::get_meter(&pool, 1).await.unwrap();

        let nominal = query_event_data(&pool, &meter, start, end, 60.0).await.unwrap();
        assert_eq!(nominal.get("VA RMS").unwrap().len(), 48 - 16 + 1);

        put_setting(&pool, SYSTEM_FREQUENCY_SETTING, Some("50"), None).await;
        let frequency = system_frequency(&pool, 60.0).await.unwrap();
        let fifty = query_event_data(&pool, &meter, start, end, frequency).await.unwrap();
        // 960 / 50 rounds to 19 samples per cycle
        assert_eq!(fifty.get("VA RMS").unwrap().len(), 48 - 19 + 1);
    }
}
