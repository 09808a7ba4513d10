//! Service configuration
//!
//! Layered with figment: compiled defaults, then the YAML file, then
//! `EXPORTSRV_*` environment variables (`__` separates nesting, e.g.
//! `EXPORTSRV_API__PORT=8080`).

use std::path::{Path, PathBuf};

use errors::{XdaError, XdaResult};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 6012;
pub const DEFAULT_CONFIG_PATH: &str = "config/exportsrv.yaml";
pub const ENV_PREFIX: &str = "EXPORTSRV_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "exportsrv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: common::DEFAULT_API_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// openXDA SQLite database
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/openxda.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Option<String>,
    pub level: String,
    pub enable_api_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
            enable_api_log: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    /// Used when the `SystemFrequency` setting is absent
    pub default_system_frequency: f64,
    /// Used when the `TimeTolerance` setting is absent
    pub default_time_tolerance_secs: f64,
    /// Answer an unknown `type` with 400 instead of an empty 200
    pub strict_export_type: bool,
    /// Bytes buffered before a chunk is handed to the response body
    pub stream_chunk_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_system_frequency: 60.0,
            default_time_tolerance_secs: 0.0,
            strict_export_type: true,
            stream_chunk_size: 8192,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportsrvConfig {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub export: ExportConfig,
}

impl ExportsrvConfig {
    /// Load from `path` (or the default location) and the environment
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load(path: Option<&Path>) -> XdaResult<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_with_env_prefix(&path, ENV_PREFIX)
    }

    fn load_with_env_prefix(path: &Path, prefix: &str) -> XdaResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(prefix).split("__"))
            .extract()
            .map_err(|e| XdaError::Configuration(format!("Failed to load configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> XdaResult<()> {
        if self.api.port == 0 {
            return Err(invalid("api.port", "must be non-zero"));
        }
        let f = self.export.default_system_frequency;
        if !f.is_finite() || f <= 0.0 {
            return Err(invalid("export.default_system_frequency", "must be positive"));
        }
        let tol = self.export.default_time_tolerance_secs;
        if !tol.is_finite() || tol < 0.0 {
            return Err(invalid(
                "export.default_time_tolerance_secs",
                "must be zero or positive",
            ));
        }
        if self.export.stream_chunk_size == 0 {
            return Err(invalid("export.stream_chunk_size", "must be non-zero"));
        }
        if self.database.path.trim().is_empty() {
            return Err(invalid("database.path", "must not be empty"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn invalid(field: &str, reason: &str) -> XdaError {
    XdaError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
