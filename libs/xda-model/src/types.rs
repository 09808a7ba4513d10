//! Core openXDA records
//!
//! Row types read from the database. Column names follow the openXDA schema,
//! field names follow Rust conventions.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A recorded disturbance on one meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Event {
    #[sqlx(rename = "ID")]
    pub id: i64,
    #[sqlx(rename = "MeterID")]
    pub meter_id: i64,
    #[sqlx(rename = "LineID")]
    pub line_id: Option<i64>,
    #[sqlx(rename = "EventTypeID")]
    pub event_type_id: Option<i64>,
    #[sqlx(rename = "StartTime")]
    pub start_time: NaiveDateTime,
    #[sqlx(rename = "EndTime")]
    pub end_time: NaiveDateTime,
}

/// A measurement channel and its classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Channel {
    #[sqlx(rename = "ID")]
    pub id: i64,
    #[sqlx(rename = "MeterID")]
    pub meter_id: i64,
    #[sqlx(rename = "Name")]
    pub name: String,
    /// `Voltage`, `Current`, ...
    #[sqlx(rename = "MeasurementType")]
    pub measurement_type: String,
    /// `Instantaneous`, `RMS`, ...
    #[sqlx(rename = "MeasurementCharacteristic")]
    pub measurement_characteristic: String,
    /// `AN`, `BN`, `CN`, `AB`, `BC`, `CA`, `RES`, ...
    #[sqlx(rename = "Phase")]
    pub phase: String,
}

impl Channel {
    pub fn is_instantaneous(&self) -> bool {
        self.measurement_characteristic
            .eq_ignore_ascii_case("Instantaneous")
    }
}

/// Recording device; owns its channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meter {
    #[sqlx(rename = "ID")]
    pub id: i64,
    #[sqlx(rename = "AssetKey")]
    pub asset_key: String,
    #[sqlx(rename = "Name")]
    pub name: String,
    #[sqlx(skip)]
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Meter {
    pub fn channel(&self, id: i64) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }
}

/// Metadata carried by a data series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub channel: Channel,
}

impl SeriesInfo {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel.name
    }
}
