//! Export request parsing
//!
//! Query parameter names are case-insensitive (`eventID` and `eventId` are the
//! same key). Everything the export needs is parsed here, before any database
//! work, so malformed input fails fast with a 400.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{ExportError, Result};

/// Case-insensitive view over the request's query string
///
/// When a name repeats, the first value wins.
#[derive(Debug, Clone, Default)]
pub struct RequestParameters {
    values: HashMap<String, String>,
}

impl RequestParameters {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values = HashMap::new();
        for (k, v) in pairs {
            values
                .entry(k.as_ref().to_ascii_lowercase())
                .or_insert_with(|| v.into());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }
}

/// Supported values of the `type` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    Csv,
    Stats,
    Harmonics,
    CorrelatedSags,
}

impl ExportType {
    /// Matching is exact; `CSV` is not `csv`
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "csv" => Some(Self::Csv),
            "stats" => Some(Self::Stats),
            "harmonics" => Some(Self::Harmonics),
            "correlatedsags" => Some(Self::CorrelatedSags),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Stats => "stats",
            Self::Harmonics => "harmonics",
            Self::CorrelatedSags => "correlatedsags",
        }
    }
}

/// A fully parsed export request
#[derive(Debug, Clone, PartialEq)]
pub enum ExportRequest {
    /// Missing or unrecognized `type`; nothing is written
    Unknown(Option<String>),
    Csv {
        event_id: i64,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    Stats {
        event_id: i64,
    },
    Harmonics {
        event_id: i64,
    },
    CorrelatedSags {
        event_id: i64,
    },
}

impl ExportRequest {
    pub fn parse(params: &RequestParameters) -> Result<Self> {
        let raw_type = params.get("type");
        let Some(export_type) = raw_type.and_then(ExportType::from_param) else {
            return Ok(Self::Unknown(raw_type.map(str::to_string)));
        };

        let event_id = parse_event_id(params)?;
        Ok(match export_type {
            ExportType::Csv => Self::Csv {
                event_id,
                start: optional_date(params, "startDate")?,
                end: optional_date(params, "endDate")?,
            },
            ExportType::Stats => Self::Stats { event_id },
            ExportType::Harmonics => Self::Harmonics { event_id },
            ExportType::CorrelatedSags => Self::CorrelatedSags { event_id },
        })
    }

    pub fn export_type(&self) -> Option<ExportType> {
        match self {
            Self::Unknown(_) => None,
            Self::Csv { .. } => Some(ExportType::Csv),
            Self::Stats { .. } => Some(ExportType::Stats),
            Self::Harmonics { .. } => Some(ExportType::Harmonics),
            Self::CorrelatedSags { .. } => Some(ExportType::CorrelatedSags),
        }
    }
}

fn parse_event_id(params: &RequestParameters) -> Result<i64> {
    let raw = params
        .get("eventId")
        .ok_or_else(|| ExportError::invalid_parameter("eventId", "missing"))?;
    raw.trim()
        .parse::<i64>()
        .map_err(|e| ExportError::invalid_parameter("eventId", format!("'{}': {}", raw, e)))
}

fn optional_date(params: &RequestParameters, name: &str) -> Result<Option<NaiveDateTime>> {
    match params.get(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| ExportError::invalid_parameter(name, format!("unrecognized date '{}'", raw))),
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse the date forms clients send; offsets are converted to UTC
pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// `<Meter>_<EventType>_Event_<eventID>.csv`, missing parts left empty
///
/// Characters that cannot appear in a quoted header parameter become `_`.
pub fn download_file_name(params: &RequestParameters) -> String {
    let name = format!(
        "{}_{}_Event_{}.csv",
        params.get_or_empty("Meter"),
        params.get_or_empty("EventType"),
        params.get_or_empty("eventId"),
    );
    name.chars()
        .map(|c| {
            if c == '"' || c == '\\' || c.is_control() || !c.is_ascii() {
                '_'
            } else {
                c
            }
        })
        .collect()
}
