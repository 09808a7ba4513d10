//! Repository - SQLite queries behind the exports
//!
//! Every function borrows a connection from the pool for a single statement.

use chrono::NaiveDateTime;
use common::numfmt::format_f64;
use sqlx::{sqlite::SqliteRow, Column, Row, SqlitePool, TypeInfo, ValueRef};
use xda_model::{Channel, Event, Meter};

use crate::error::{ExportError, Result};

/// Column names plus stringified cells, as read from an ad hoc query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultTable {
    fn from_rows(rows: &[SqliteRow], fallback_columns: &[&str]) -> Result<Self> {
        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => fallback_columns.iter().map(|c| c.to_string()).collect(),
        };
        let rows = rows.iter().map(row_cells).collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }
}

/// Render each column of a row by its stored type; NULL stays `None`
fn row_cells(row: &SqliteRow) -> Result<Vec<Option<String>>> {
    let mut cells = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        let type_name = {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                cells.push(None);
                continue;
            }
            raw.type_info().name().to_string()
        };

        let cell = match type_name.as_str() {
            "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(i)?.to_string(),
            "REAL" | "NUMERIC" => format_f64(row.try_get_unchecked::<f64, _>(i)?),
            "BLOB" => common::hex::binary_literal(&row.try_get_unchecked::<Vec<u8>, _>(i)?),
            _ => row.try_get_unchecked::<String, _>(i)?,
        };
        cells.push(Some(cell));
    }
    Ok(cells)
}

// ============================================================================
// Events, meters, channels
// ============================================================================

pub async fn get_event(pool: &SqlitePool, event_id: i64) -> Result<Event> {
    sqlx::query_as::<_, Event>(
        "SELECT ID, MeterID, LineID, EventTypeID, StartTime, EndTime FROM Event WHERE ID = ?",
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ExportError::NotFound(format!("Event {}", event_id)))
}

/// Meter with all of its channels
pub async fn get_meter(pool: &SqlitePool, meter_id: i64) -> Result<Meter> {
    let mut meter = sqlx::query_as::<_, Meter>("SELECT ID, AssetKey, Name FROM Meter WHERE ID = ?")
        .bind(meter_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ExportError::NotFound(format!("Meter {}", meter_id)))?;

    meter.channels = sqlx::query_as::<_, Channel>(
        r#"
        SELECT
            Channel.ID,
            Channel.MeterID,
            Channel.Name,
            MeasurementType.Name AS MeasurementType,
            MeasurementCharacteristic.Name AS MeasurementCharacteristic,
            Phase.Name AS Phase
        FROM Channel
        JOIN MeasurementType ON Channel.MeasurementTypeID = MeasurementType.ID
        JOIN MeasurementCharacteristic ON Channel.MeasurementCharacteristicID = MeasurementCharacteristic.ID
        JOIN Phase ON Channel.PhaseID = Phase.ID
        WHERE Channel.MeterID = ?
        ORDER BY Channel.ID
        "#,
    )
    .bind(meter_id)
    .fetch_all(pool)
    .await?;

    Ok(meter)
}

/// Events of a meter overlapping `[start, end]`
pub async fn events_in_window(
    pool: &SqlitePool,
    meter_id: i64,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<Event>> {
    let events = sqlx::query_as::<_, Event>(
        r#"
        SELECT ID, MeterID, LineID, EventTypeID, StartTime, EndTime
        FROM Event
        WHERE MeterID = ? AND EndTime >= ? AND StartTime <= ?
        ORDER BY StartTime, ID
        "#,
    )
    .bind(meter_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;
    Ok(events)
}

/// Stored time-domain blocks of one event
pub async fn channel_data(pool: &SqlitePool, event_id: i64) -> Result<Vec<Vec<u8>>> {
    let blobs = sqlx::query_scalar::<_, Vec<u8>>(
        "SELECT TimeDomainData FROM ChannelData WHERE EventID = ? ORDER BY ID",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;
    Ok(blobs)
}

// ============================================================================
// Settings
// ============================================================================

/// Raw `Setting.Value`, falling back to `DefaultValue`
pub async fn setting(pool: &SqlitePool, name: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, Option<String>>(
        "SELECT COALESCE(Value, DefaultValue) FROM Setting WHERE Name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(value.flatten())
}

// ============================================================================
// Export queries
// ============================================================================

/// The event's row of `OpenSEEScalarStatView`, if any
pub async fn scalar_stats(pool: &SqlitePool, event_id: i64) -> Result<Option<ResultTable>> {
    let row = sqlx::query("SELECT * FROM OpenSEEScalarStatView WHERE EventID = ?")
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => Ok(Some(ResultTable::from_rows(&[row], &[])?)),
        None => Ok(None),
    }
}

const TIME_CORRELATED_SAGS_SQL: &str = r#"
    SELECT
        Event.ID AS EventID,
        EventType.Name AS EventType,
        ROUND(Disturbance.PerUnitMagnitude * 100.0, 1) AS SagMagnitudePercent,
        ROUND(Disturbance.DurationSeconds * 1000.0, 0) AS SagDurationMilliseconds,
        ROUND(Disturbance.DurationCycles, 2) AS SagDurationCycles,
        Disturbance.StartTime AS StartTime,
        Meter.Name AS MeterName,
        MeterLine.LineName AS LineName
    FROM Disturbance
    JOIN Event ON Disturbance.EventID = Event.ID
    JOIN EventType ON Event.EventTypeID = EventType.ID
    JOIN EventType DisturbanceType ON Disturbance.EventTypeID = DisturbanceType.ID
    JOIN Phase ON Disturbance.PhaseID = Phase.ID
    JOIN Meter ON Event.MeterID = Meter.ID
    LEFT JOIN MeterLine ON MeterLine.MeterID = Event.MeterID AND MeterLine.LineID = Event.LineID
    WHERE
        DisturbanceType.Name = 'Sag' AND
        Phase.Name = 'Worst' AND
        Disturbance.StartTime BETWEEN ? AND ?
    ORDER BY Disturbance.StartTime, Event.ID
"#;

const TIME_CORRELATED_SAGS_COLUMNS: &[&str] = &[
    "EventID",
    "EventType",
    "SagMagnitudePercent",
    "SagDurationMilliseconds",
    "SagDurationCycles",
    "StartTime",
    "MeterName",
    "LineName",
];

/// Worst-phase sag disturbances starting within `[start, end]`, any meter
pub async fn time_correlated_sags(
    pool: &SqlitePool,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<ResultTable> {
    let rows = sqlx::query(TIME_CORRELATED_SAGS_SQL)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;
    ResultTable::from_rows(&rows, TIME_CORRELATED_SAGS_COLUMNS)
}

/// `(channel label, spectral JSON)` per harmonic snapshot of the event
pub async fn snapshot_harmonics(pool: &SqlitePool, event_id: i64) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        r#"
        SELECT
            MeasurementType.Name || ' ' || Phase.Name AS Channel,
            SpectralData
        FROM SnapshotHarmonics
        JOIN Channel ON Channel.ID = SnapshotHarmonics.ChannelID
        JOIN MeasurementType ON Channel.MeasurementTypeID = MeasurementType.ID
        JOIN Phase ON Channel.PhaseID = Phase.ID
        WHERE SnapshotHarmonics.EventID = ?
        ORDER BY SnapshotHarmonics.ID
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use common::test_utils::memory_pool;

    #[tokio::test]
    async fn test_row_cells_render_by_type() {
        let pool = memory_pool().await.unwrap();
        let row = sqlx::query("SELECT 7 AS a, 2.5 AS b, 3.0 AS c, 'x,y' AS d, NULL AS e")
            .fetch_one(&pool)
            .await
            .unwrap();

        let table = ResultTable::from_rows(&[row], &[]).unwrap();
        assert_eq!(table.columns, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(
            table.rows[0],
            vec![
                Some("7".to_string()),
                Some("2.5".to_string()),
                Some("3".to_string()),
                Some("x,y".to_string()),
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_blob_cell_renders_as_binary_literal() {
        let pool = memory_pool().await.unwrap();
        let row = sqlx::query("SELECT X'1F8B0A' AS raw")
            .fetch_one(&pool)
            .await
            .unwrap();

        let table = ResultTable::from_rows(&[row], &[]).unwrap();
        assert_eq!(table.rows[0], vec![Some("0x1F8B0A".to_string())]);
    }

    #[tokio::test]
    async fn test_setting_falls_back_to_default_value() {
        let pool = memory_pool().await.unwrap();
        sqlx::query("INSERT INTO Setting (Name, Value, DefaultValue) VALUES ('SystemFrequency', NULL, '50'), ('TimeTolerance', '0.5', '0')")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(setting(&pool, "SystemFrequency").await.unwrap().as_deref(), Some("50"));
        assert_eq!(setting(&pool, "TimeTolerance").await.unwrap().as_deref(), Some("0.5"));
        assert_eq!(setting(&pool, "Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_event_is_not_found() {
        let pool = memory_pool().await.unwrap();
        assert!(matches!(
            get_event(&pool, 404).await,
            Err(ExportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_sags_keep_header_columns() {
        let pool = memory_pool().await.unwrap();
        let t = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let table = time_correlated_sags(&pool, t, t).await.unwrap();
        assert!(table.rows.is_empty());
        assert_eq!(table.columns.len(), TIME_CORRELATED_SAGS_COLUMNS.len());
    }
}
