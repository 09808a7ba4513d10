//! Test database schema utilities
//!
//! SQLite rendition of the openXDA tables the export service reads.
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::test_utils::{memory_pool, schema};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let pool = memory_pool().await.unwrap();
//!     // lookup rows (Voltage, Current, AN, ...) are already present
//! }
//! ```

use anyhow::Result;
use sqlx::SqlitePool;

// ============================================================================
// Lookup tables
// ============================================================================

pub const MEASUREMENT_TYPE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS MeasurementType (
        ID INTEGER PRIMARY KEY,
        Name TEXT NOT NULL UNIQUE
    )
"#;

pub const MEASUREMENT_CHARACTERISTIC_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS MeasurementCharacteristic (
        ID INTEGER PRIMARY KEY,
        Name TEXT NOT NULL UNIQUE
    )
"#;

pub const PHASE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Phase (
        ID INTEGER PRIMARY KEY,
        Name TEXT NOT NULL UNIQUE
    )
"#;

pub const EVENT_TYPE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS EventType (
        ID INTEGER PRIMARY KEY,
        Name TEXT NOT NULL UNIQUE
    )
"#;

// ============================================================================
// Assets
// ============================================================================

pub const METER_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Meter (
        ID INTEGER PRIMARY KEY,
        AssetKey TEXT NOT NULL UNIQUE,
        Name TEXT NOT NULL
    )
"#;

pub const LINE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Line (
        ID INTEGER PRIMARY KEY,
        AssetKey TEXT NOT NULL UNIQUE
    )
"#;

pub const METER_LINE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS MeterLine (
        ID INTEGER PRIMARY KEY,
        MeterID INTEGER NOT NULL REFERENCES Meter(ID),
        LineID INTEGER NOT NULL REFERENCES Line(ID),
        LineName TEXT NOT NULL DEFAULT ''
    )
"#;

pub const CHANNEL_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Channel (
        ID INTEGER PRIMARY KEY,
        MeterID INTEGER NOT NULL REFERENCES Meter(ID),
        MeasurementTypeID INTEGER NOT NULL REFERENCES MeasurementType(ID),
        MeasurementCharacteristicID INTEGER NOT NULL REFERENCES MeasurementCharacteristic(ID),
        PhaseID INTEGER NOT NULL REFERENCES Phase(ID),
        Name TEXT NOT NULL,
        HarmonicGroup INTEGER NOT NULL DEFAULT 0
    )
"#;

// ============================================================================
// Events and measurements
// ============================================================================

pub const EVENT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Event (
        ID INTEGER PRIMARY KEY,
        MeterID INTEGER NOT NULL REFERENCES Meter(ID),
        LineID INTEGER REFERENCES Line(ID),
        EventTypeID INTEGER REFERENCES EventType(ID),
        StartTime TEXT NOT NULL,
        EndTime TEXT NOT NULL
    )
"#;

/// One compressed time-domain block per row (see `xda_model::codec`)
pub const CHANNEL_DATA_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS ChannelData (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        EventID INTEGER NOT NULL REFERENCES Event(ID),
        TimeDomainData BLOB NOT NULL
    )
"#;

pub const DISTURBANCE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Disturbance (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        EventID INTEGER NOT NULL REFERENCES Event(ID),
        EventTypeID INTEGER NOT NULL REFERENCES EventType(ID),
        PhaseID INTEGER NOT NULL REFERENCES Phase(ID),
        PerUnitMagnitude REAL NOT NULL,
        DurationSeconds REAL NOT NULL,
        DurationCycles REAL NOT NULL,
        StartTime TEXT NOT NULL,
        EndTime TEXT NOT NULL
    )
"#;

pub const SNAPSHOT_HARMONICS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS SnapshotHarmonics (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        EventID INTEGER NOT NULL REFERENCES Event(ID),
        ChannelID INTEGER NOT NULL REFERENCES Channel(ID),
        SpectralData TEXT NOT NULL
    )
"#;

pub const EVENT_STAT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS EventStat (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        EventID INTEGER NOT NULL UNIQUE REFERENCES Event(ID),
        VPeak REAL,
        VAMax REAL,
        VBMax REAL,
        VCMax REAL,
        VAMin REAL,
        VBMin REAL,
        VCMin REAL,
        IPeak REAL,
        IAMax REAL,
        IBMax REAL,
        ICMax REAL,
        IA2t REAL,
        IB2t REAL,
        IC2t REAL,
        InitialMW REAL,
        FinalMW REAL,
        PQViewID TEXT
    )
"#;

pub const SCALAR_STAT_VIEW: &str = r#"
    CREATE VIEW IF NOT EXISTS OpenSEEScalarStatView AS
    SELECT
        EventID,
        VPeak AS "V Peak",
        VAMax AS "VA Max",
        VBMax AS "VB Max",
        VCMax AS "VC Max",
        VAMin AS "VA Min",
        VBMin AS "VB Min",
        VCMin AS "VC Min",
        IPeak AS "I Peak",
        IAMax AS "IA Max",
        IBMax AS "IB Max",
        ICMax AS "IC Max",
        IA2t AS "IA I2t",
        IB2t AS "IB I2t",
        IC2t AS "IC I2t",
        InitialMW AS "Initial MW",
        FinalMW AS "Final MW",
        PQViewID AS "PQView ID"
    FROM EventStat
"#;

// ============================================================================
// System tables
// ============================================================================

pub const SETTING_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS Setting (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        Name TEXT NOT NULL UNIQUE,
        Value TEXT,
        DefaultValue TEXT
    )
"#;

pub const ADDITIONAL_FIELD_VALUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS AdditionalFieldValue (
        ID INTEGER PRIMARY KEY AUTOINCREMENT,
        ParentTableID INTEGER NOT NULL,
        AdditionalFieldID INTEGER NOT NULL,
        Value TEXT
    )
"#;

/// Lookup rows every openXDA database carries
pub const LOOKUP_ROWS: &[&str] = &[
    "INSERT OR IGNORE INTO MeasurementType (ID, Name) VALUES (1, 'Voltage'), (2, 'Current'), (3, 'Power')",
    "INSERT OR IGNORE INTO MeasurementCharacteristic (ID, Name) VALUES (1, 'Instantaneous'), (2, 'RMS'), (3, 'AngleFund')",
    "INSERT OR IGNORE INTO Phase (ID, Name) VALUES (1, 'AN'), (2, 'BN'), (3, 'CN'), (4, 'AB'), (5, 'BC'), (6, 'CA'), (7, 'RES'), (8, 'Worst'), (9, 'None')",
    "INSERT OR IGNORE INTO EventType (ID, Name) VALUES (1, 'Fault'), (2, 'Sag'), (3, 'Swell'), (4, 'Interruption'), (5, 'Other')",
];

/// All DDL in dependency order
pub const XDA_SCHEMA: &[&str] = &[
    MEASUREMENT_TYPE_TABLE,
    MEASUREMENT_CHARACTERISTIC_TABLE,
    PHASE_TABLE,
    EVENT_TYPE_TABLE,
    METER_TABLE,
    LINE_TABLE,
    METER_LINE_TABLE,
    CHANNEL_TABLE,
    EVENT_TABLE,
    CHANNEL_DATA_TABLE,
    DISTURBANCE_TABLE,
    SNAPSHOT_HARMONICS_TABLE,
    EVENT_STAT_TABLE,
    SCALAR_STAT_VIEW,
    SETTING_TABLE,
    ADDITIONAL_FIELD_VALUE_TABLE,
];

/// Initialize the openXDA schema and lookup rows
pub async fn init_xda_schema(pool: &SqlitePool) -> Result<()> {
    for ddl in XDA_SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    for insert in LOOKUP_ROWS {
        sqlx::query(insert).execute(pool).await?;
    }
    Ok(())
}

/// Replace the scalar stat view, for tests that need a specific column set
pub async fn replace_scalar_stat_view(pool: &SqlitePool, select: &str) -> Result<()> {
    sqlx::query("DROP VIEW IF EXISTS OpenSEEScalarStatView")
        .execute(pool)
        .await?;
    sqlx::query(&format!("CREATE VIEW OpenSEEScalarStatView AS {}", select))
        .execute(pool)
        .await?;
    Ok(())
}
