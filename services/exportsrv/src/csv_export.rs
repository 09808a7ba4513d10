//! CSV serialization and the export dispatcher
//!
//! Loading is async and happens first; writing is synchronous against any
//! `std::io::Write` so it can run on a blocking task feeding the response
//! body. Every writer checks the cancellation token between rows.

use std::io::Write;

use chrono::{NaiveDateTime, Timelike};
use common::numfmt::format_f64;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use xda_model::HarmonicTable;

use crate::config::ExportConfig;
use crate::error::{ExportError, Result};
use crate::repository::{self, ResultTable};
use crate::request::{ExportRequest, RequestParameters};
use crate::series_builder::{self, SeriesMap};

/// Data loaded for one export, ready to be written
#[derive(Debug, Clone)]
pub enum ExportPayload {
    /// Nothing to write (unknown type, or no data for the mode)
    Empty,
    Series(SeriesMap),
    Stats(ResultTable),
    CorrelatedSags(ResultTable),
    Harmonics(HarmonicTable),
}

/// Run the queries for a parsed request
pub async fn load_export(
    pool: &SqlitePool,
    request: &ExportRequest,
    settings: &ExportConfig,
) -> Result<ExportPayload> {
    match request {
        ExportRequest::Unknown(raw) => {
            debug!("Ignoring export with type {:?}", raw);
            Ok(ExportPayload::Empty)
        },
        ExportRequest::Csv {
            event_id,
            start,
            end,
        } => {
            let event = repository::get_event(pool, *event_id).await?;
            let series = series_builder::build_data_series(
                pool,
                &event,
                *start,
                *end,
                settings.default_system_frequency,
            )
            .await?;
            Ok(ExportPayload::Series(series))
        },
        ExportRequest::Stats { event_id } => {
            let table = repository::scalar_stats(pool, *event_id)
                .await?
                .ok_or_else(|| {
                    ExportError::NotFound(format!("Scalar statistics for event {}", event_id))
                })?;
            Ok(ExportPayload::Stats(table))
        },
        ExportRequest::CorrelatedSags { event_id } => {
            let event = repository::get_event(pool, *event_id).await?;
            let tolerance =
                series_builder::time_tolerance(pool, settings.default_time_tolerance_secs).await?;
            let margin = series_builder::seconds(tolerance);
            let table = repository::time_correlated_sags(
                pool,
                event.start_time - margin,
                event.end_time + margin,
            )
            .await?;
            Ok(ExportPayload::CorrelatedSags(table))
        },
        ExportRequest::Harmonics { event_id } => {
            let rows = repository::snapshot_harmonics(pool, *event_id).await?;
            Ok(ExportPayload::Harmonics(HarmonicTable::from_rows(rows)?))
        },
    }
}

/// Write a loaded payload as CSV
pub fn write_payload<W: Write>(
    payload: &ExportPayload,
    out: W,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(out);

    match payload {
        ExportPayload::Empty => {},
        ExportPayload::Series(series) => write_series(&mut writer, series, cancel)?,
        ExportPayload::Stats(table) | ExportPayload::CorrelatedSags(table) => {
            write_table(&mut writer, table, cancel)?
        },
        ExportPayload::Harmonics(table) => write_harmonics(&mut writer, table, cancel)?,
    }

    writer.flush()?;
    Ok(())
}

/// Parse, load and write in one call
///
/// Unknown or missing `type` writes zero bytes.
pub async fn export_to_writer<W: Write>(
    pool: &SqlitePool,
    params: &RequestParameters,
    settings: &ExportConfig,
    out: W,
) -> Result<()> {
    let request = ExportRequest::parse(params)?;
    let payload = load_export(pool, &request, settings).await?;
    write_payload(&payload, out, &CancellationToken::new())
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ExportError::Cancelled)
    } else {
        Ok(())
    }
}

/// `MM/dd/yyyy HH:mm:ss.fffffff`
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    format!("{}.{}", time.format("%m/%d/%Y %H:%M:%S"), sub_second(time))
}

/// Seven-digit fraction of the second (100 ns ticks)
pub fn sub_second(time: &NaiveDateTime) -> String {
    // leap-second nanos run past 1e9; clamp to the last tick
    format!("{:07}", (time.nanosecond() / 100).min(9_999_999))
}

/// One row per sample index up to the longest channel. The timestamp comes
/// from the first channel, or from the first later channel that still has a
/// sample once the first one runs out.
fn write_series<W: Write>(
    writer: &mut csv::Writer<W>,
    series: &SeriesMap,
    cancel: &CancellationToken,
) -> Result<()> {
    if series.is_empty() {
        return Ok(());
    }

    let mut header = vec!["TimeStamp".to_string(), "SubSecond".to_string()];
    header.extend(series.keys().map(str::to_string));
    writer.write_record(&header)?;

    let columns: Vec<_> = series.iter().map(|(_, s)| &s.points).collect();
    let rows = columns.iter().map(|points| points.len()).max().unwrap_or(0);
    let mut record: Vec<String> = Vec::with_capacity(header.len());

    for i in 0..rows {
        check_cancelled(cancel)?;

        record.clear();
        match columns.iter().find_map(|points| points.get(i)) {
            Some(point) => {
                record.push(format_timestamp(&point.time));
                record.push(sub_second(&point.time));
            },
            None => record.extend([String::new(), String::new()]),
        }
        for points in &columns {
            record.push(points.get(i).map(|p| format_f64(p.value)).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    Ok(())
}

fn write_table<W: Write>(
    writer: &mut csv::Writer<W>,
    table: &ResultTable,
    cancel: &CancellationToken,
) -> Result<()> {
    if table.columns.is_empty() {
        return Ok(());
    }

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        check_cancelled(cancel)?;
        writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
    }
    Ok(())
}

fn write_harmonics<W: Write>(
    writer: &mut csv::Writer<W>,
    table: &HarmonicTable,
    cancel: &CancellationToken,
) -> Result<()> {
    if table.is_empty() {
        return Ok(());
    }

    let mut header = vec!["Harmonic".to_string()];
    for spectrum in table.spectra() {
        header.push(format!("{} Mag", spectrum.channel));
        header.push(format!("{} Ang", spectrum.channel));
    }
    writer.write_record(&header)?;

    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for n in 1..=table.harmonic_count() {
        check_cancelled(cancel)?;

        record.clear();
        record.push(xda_model::harmonics::harmonic_label(n));
        for phasor in table.row(n) {
            match phasor {
                Some(p) => {
                    record.push(format_f64(p.magnitude));
                    record.push(format_f64(p.angle));
                },
                None => {
                    record.push("0".to_string());
                    record.push("0".to_string());
                },
            }
        }
        writer.write_record(&record)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use xda_model::{DataPoint, DataSeries};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_nano_opt(12, 0, 0, 123_456_700)
            .unwrap()
    }

    fn render(payload: &ExportPayload) -> String {
        let mut out = Vec::new();
        write_payload(payload, &mut out, &CancellationToken::new()).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn series(values: &[f64]) -> DataSeries {
        DataSeries::with_points(
            None,
            values
                .iter()
                .enumerate()
                .map(|(i, v)| DataPoint::new(t0() + Duration::milliseconds(i as i64), *v))
                .collect(),
        )
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(&t0()), "03/01/2024 12:00:00.1234567");
        assert_eq!(sub_second(&t0()), "1234567");

        let whole = NaiveDate::from_ymd_opt(2024, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(format_timestamp(&whole), "12/31/2024 23:59:59.0000000");
    }

    #[test]
    fn test_series_shorter_channel_renders_empty() {
        let mut map = SeriesMap::new();
        map.get_or_add("VA", || series(&[1.0, 2.0, 3.0]));
        map.get_or_add("IA", || series(&[0.5, -1.0]));

        let text = render(&ExportPayload::Series(map));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "TimeStamp,SubSecond,VA,IA");
        assert_eq!(lines[1], "03/01/2024 12:00:00.1234567,1234567,1,0.5");
        assert!(lines[3].ends_with(",3,"));
    }

    #[test]
    fn test_series_longer_later_channel_sets_row_count() {
        let mut map = SeriesMap::new();
        map.get_or_add("VA", || series(&[1.0, 2.0]));
        map.get_or_add("IA", || series(&[0.5, -1.0, 4.0]));

        let text = render(&ExportPayload::Series(map));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "03/01/2024 12:00:00.1244567,1244567,2,-1");
        assert_eq!(lines[3], "03/01/2024 12:00:00.1254567,1254567,,4");
    }

    #[test]
    fn test_empty_series_map_writes_nothing() {
        assert_eq!(render(&ExportPayload::Series(SeriesMap::new())), "");
        assert_eq!(render(&ExportPayload::Empty), "");
    }

    #[test]
    fn test_table_quotes_and_nulls() {
        let table = ResultTable {
            columns: vec!["EventID".into(), "Name".into(), "Value".into()],
            rows: vec![vec![Some("7".into()), Some("a,b".into()), None]],
        };
        let text = render(&ExportPayload::Stats(table));
        assert_eq!(text, "EventID,Name,Value\r\n7,\"a,b\",\r\n");
    }

    #[test]
    fn test_table_without_columns_writes_nothing() {
        assert_eq!(render(&ExportPayload::CorrelatedSags(ResultTable::default())), "");
    }

    #[test]
    fn test_harmonics_missing_entries_are_zero() {
        let table = HarmonicTable::from_rows(vec![
            (
                "Voltage AN".to_string(),
                r#"{"H1": {"Magnitude": 120.5, "Angle": 0.25}, "H2": {"Magnitude": 3, "Angle": -1}}"#
                    .to_string(),
            ),
            (
                "Current AN".to_string(),
                r#"{"H1": {"Magnitude": 10, "Angle": 0}}"#.to_string(),
            ),
        ])
        .unwrap();

        let text = render(&ExportPayload::Harmonics(table));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Harmonic,Voltage AN Mag,Voltage AN Ang,Current AN Mag,Current AN Ang",
                "H1,120.5,0.25,10,0",
                "H2,3,-1,0,0",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_type_writes_zero_bytes() {
        let pool = common::test_utils::memory_pool().await.unwrap();
        let settings = ExportConfig::default();

        for pairs in [vec![("type", "pdf"), ("eventId", "1")], vec![("eventId", "1")]] {
            let params = RequestParameters::from_pairs(pairs.into_iter().map(|(k, v)| (k, v.to_string())));
            let mut out = Vec::new();
            export_to_writer(&pool, &params, &settings, &mut out).await.unwrap();
            assert!(out.is_empty());
        }
    }

    #[tokio::test]
    async fn test_stats_without_row_is_not_found() {
        let pool = common::test_utils::memory_pool().await.unwrap();
        let params = RequestParameters::from_pairs([("type", "stats".to_string()), ("eventId", "9".to_string())]);
        let mut out = Vec::new();
        let result = export_to_writer(&pool, &params, &ExportConfig::default(), &mut out).await;
        assert!(matches!(result, Err(ExportError::NotFound(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_cancelled_token_stops_writing() {
        let mut map = SeriesMap::new();
        map.get_or_add("VA", || series(&[1.0, 2.0]));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut out = Vec::new();
        let result = write_payload(&ExportPayload::Series(map), &mut out, &cancel);
        assert!(matches!(result, Err(ExportError::Cancelled)));
    }
}
