//! ExportSrv Library
//!
//! OpenSEE CSV export for openXDA events.
//!
//! ## Architecture
//!
//! - `request`: query parameter parsing, export type selection
//! - `repository`: SQLite queries (events, channels, settings, stats, sags, harmonics)
//! - `series_builder`: merges an event window into named series plus cycle data
//! - `csv_export`: loads a payload and writes it as CSV
//! - `stream`: blocking CSV writer feeding a streamed response body
//! - `routes`: the download endpoint and the additional field value API

// Core modules
pub mod app;
pub mod config;
pub mod csv_export;
pub mod error;
pub mod exception_logger;
pub mod repository;
pub mod request;
pub mod routes;
pub mod series_builder;
pub mod stream;

// Re-export commonly used types
pub use csv_export::{export_to_writer, load_export, write_payload, ExportPayload};
pub use error::{ExportError, Result};
pub use exception_logger::{ExceptionLogger, TracingExceptionLogger};
pub use request::{ExportRequest, ExportType, RequestParameters};
pub use series_builder::SeriesMap;

// Re-export app state and initialization
pub use app::{create_app_state, AppState};
pub use config::ExportsrvConfig;

// Re-export route creation
pub use routes::{create_routes, ApiDoc};
