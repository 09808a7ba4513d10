//! openXDA export basic library
//!
//! Provides functions shared by the export services, including:
//! - logging (console, daily rolling files, API access log)
//! - SQLite client
//! - API response envelope
//! - startup helpers and configuration fallbacks
//! - CSV cell number and binary formatting

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub mod api_types;
pub mod config_loader;
pub mod hex;
pub mod logging;
pub mod numfmt;
pub mod service_bootstrap;

pub use api_types::SuccessResponse;
pub use numfmt::format_f64;

/// Default API host
pub const DEFAULT_API_HOST: &str = "0.0.0.0";
