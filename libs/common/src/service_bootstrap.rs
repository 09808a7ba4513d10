//! Service startup helpers: identity, banner, logging

use crate::logging::{self, LogConfig};
use tracing::info;

/// Who is starting
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub name: String,
    /// Crate version of the binary
    pub version: String,
    pub description: String,
    pub default_port: u16,
}

impl ServiceInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }

    fn banner_lines(&self) -> Vec<String> {
        vec![
            String::new(),
            " ╔═╗ ╔═╗ ╔═╗ ╦═╗ ╦ ╦ ╦  ╦ ╦ ╔═╗ ╔═╗ ╦ ╦ ╦".to_string(),
            format!(" {} v{}", self.name.to_uppercase(), self.version),
            format!(" {}", self.description),
            format!(" Default port {}", self.default_port),
            String::new(),
        ]
    }
}

/// Log the startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    for line in service.banner_lines() {
        info!("{}", line);
    }
}

/// Logging settings a service takes from its own configuration
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Log root; `XDA_LOG_DIR` takes precedence
    pub dir: Option<String>,
    pub level: String,
    pub enable_api_log: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
            enable_api_log: true,
        }
    }
}

impl LoggingOptions {
    /// Files land in `{root}/{service}/`
    pub fn to_log_config(&self, service: &ServiceInfo) -> LogConfig {
        logging::init_log_root(self.dir.as_deref());
        LogConfig {
            level: self.level.clone(),
            enable_api_log: self.enable_api_log,
            ..LogConfig::for_service(&service.name)
        }
    }
}

/// Install logging for `service`
pub fn init_logging(service: &ServiceInfo, options: &LoggingOptions) -> anyhow::Result<()> {
    logging::init_with_config(options.to_log_config(service))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
