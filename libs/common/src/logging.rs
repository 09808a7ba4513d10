//! Logging for the export services
//!
//! Console output plus two files per service and day: the business log and
//! the API access log (events on the `api_access` target). Files are written
//! through `tracing_appender` non-blocking workers. The filter is reloadable.
//! A housekeeping task gzips old files and prunes old archives.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Target used by [`http_request_logger`]; routed to its own file
pub const API_ACCESS_TARGET: &str = "api_access";

/// Env var overriding the configured log root
pub const LOG_DIR_ENV: &str = "XDA_LOG_DIR";

/// Size at which a day's file continues in a numbered part: 100MB
const MAX_PART_SIZE: u64 = 100 * 1024 * 1024;

const DAY: Duration = Duration::from_secs(86_400);

static WORKER_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Resolve the log root once: `XDA_LOG_DIR` > `configured` > `logs`
pub fn init_log_root(configured: Option<&str>) -> &'static Path {
    LOG_ROOT.get_or_init(|| resolve_log_root(configured))
}

/// Current log root, resolving it without configuration if needed
pub fn log_root() -> &'static Path {
    LOG_ROOT.get_or_init(|| resolve_log_root(None))
}

fn resolve_log_root(configured: Option<&str>) -> PathBuf {
    if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    configured.map_or_else(|| PathBuf::from("logs"), PathBuf::from)
}

// ============================================================================
// Formatting
// ============================================================================

/// `2024-03-01T12:00:00.000123Z [INFO] message key=value`
struct LevelTagFormat;

fn level_tag(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("[ERROR]", "\x1b[31m"),
        Level::WARN => ("[WARN]", "\x1b[33m"),
        Level::INFO => ("[INFO]", "\x1b[32m"),
        Level::DEBUG => ("[DEBUG]", "\x1b[34m"),
        Level::TRACE => ("[TRACE]", "\x1b[35m"),
    }
}

impl<S, N> FormatEvent<S, N> for LevelTagFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let (tag, color) = level_tag(*event.metadata().level());
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        if writer.has_ansi_escapes() {
            write!(writer, "{} {}{}\x1b[0m ", stamp, color, tag)?;
        } else {
            write!(writer, "{} {} ", stamp, tag)?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

// ============================================================================
// Daily log files
// ============================================================================

struct OpenLogFile {
    day: String,
    part: u32,
    size: u64,
    file: File,
}

/// `{YYYYMMDD}_{service}{suffix}[.{part}].log`, reopened when the day changes
/// and split into parts past `max_size`
struct DailyLogFile {
    dir: PathBuf,
    stem: String,
    max_size: u64,
    current: Mutex<Option<OpenLogFile>>,
}

impl DailyLogFile {
    fn new(dir: &Path, service: &str, suffix: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            stem: format!("{}{}", service, suffix),
            max_size: MAX_PART_SIZE,
            current: Mutex::new(None),
        })
    }

    fn file_name(day: &str, stem: &str, part: u32) -> String {
        match part {
            0 => format!("{}_{}.log", day, stem),
            n => format!("{}_{}.{}.log", day, stem, n),
        }
    }

    fn open(&self, day: String, part: u32) -> io::Result<OpenLogFile> {
        let path = self.dir.join(Self::file_name(&day, &self.stem, part));
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(OpenLogFile {
            day,
            part,
            size,
            file,
        })
    }

    fn write_record(&self, buf: &[u8]) -> io::Result<usize> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current = self
            .current
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;

        let next = match current.as_ref() {
            None => Some((today, 0)),
            Some(open) if open.day != today => Some((today, 0)),
            Some(open) if open.size + buf.len() as u64 > self.max_size => {
                Some((open.day.clone(), open.part + 1))
            },
            Some(_) => None,
        };
        if let Some((day, part)) = next {
            *current = Some(self.open(day, part)?);
        }

        let Some(open) = current.as_mut() else {
            return Ok(0);
        };
        let written = open.file.write(buf)?;
        open.size += written as u64;
        Ok(written)
    }
}

/// Writer handed to the non-blocking appender
struct DailyLogWriter(DailyLogFile);

impl Write for DailyLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.current.lock() {
            Ok(mut current) => current.as_mut().map_or(Ok(()), |open| open.file.flush()),
            Err(_) => Err(io::Error::other("log file lock poisoned")),
        }
    }
}

fn non_blocking_file(
    dir: &Path,
    service: &str,
    suffix: &str,
) -> io::Result<tracing_appender::non_blocking::NonBlocking> {
    let file = DailyLogFile::new(dir, service, suffix)?;
    let (writer, guard) = tracing_appender::non_blocking(DailyLogWriter(file));
    match WORKER_GUARDS.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }
    Ok(writer)
}

// ============================================================================
// Initialization
// ============================================================================

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub service_name: String,
    /// Directory holding this service's files
    pub log_dir: PathBuf,
    /// Filter directive used when RUST_LOG is unset
    pub level: String,
    /// JSON lines in the business log
    pub json: bool,
    pub enable_api_log: bool,
    pub retention: RetentionPolicy,
}

impl LogConfig {
    pub fn for_service(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            log_dir: log_root().join(service_name),
            level: "info".to_string(),
            json: false,
            enable_api_log: true,
            retention: RetentionPolicy::default(),
        }
    }

    /// RUST_LOG wins over `level`; the access target is always pinned
    fn filter_directive(&self, rust_log: Option<&str>) -> String {
        let api = if self.enable_api_log { "info" } else { "off" };
        match rust_log {
            Some(env) if env.contains(API_ACCESS_TARGET) => env.to_string(),
            Some(env) => format!("{},{}={}", env, API_ACCESS_TARGET, api),
            None => format!("{},{}={},sqlx=warn", self.level, API_ACCESS_TARGET, api),
        }
    }
}

/// Install the global subscriber
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = config.filter_directive(rust_log.as_deref());
    let (filter_layer, handle) = reload::Layer::new(EnvFilter::try_new(&directive)?);
    let _ = FILTER_HANDLE.set(handle);

    let console = fmt::layer().event_format(LevelTagFormat).boxed();

    let business_writer = non_blocking_file(&config.log_dir, &config.service_name, "")?;
    let business_only = filter::filter_fn(|meta| meta.target() != API_ACCESS_TARGET);
    let business = if config.json {
        fmt::layer()
            .json()
            .with_writer(business_writer)
            .with_filter(business_only)
            .boxed()
    } else {
        fmt::layer()
            .with_ansi(false)
            .event_format(LevelTagFormat)
            .with_writer(business_writer)
            .with_filter(business_only)
            .boxed()
    };

    let access = if config.enable_api_log {
        let access_writer = non_blocking_file(&config.log_dir, &config.service_name, "_api")?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .event_format(LevelTagFormat)
                .with_writer(access_writer)
                .with_filter(filter::filter_fn(|meta| meta.target() == API_ACCESS_TARGET))
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(business)
        .with(access)
        .try_init()?;

    tracing::info!(
        "Logging {} to {} (filter {})",
        config.service_name,
        config.log_dir.display(),
        directive
    );
    spawn_housekeeping(config.log_dir, config.service_name, config.retention);
    Ok(())
}

/// Swap the active filter, e.g. `"info,exportsrv=debug"`
pub fn set_log_level(directive: &str) -> Result<(), String> {
    let handle = FILTER_HANDLE
        .get()
        .ok_or_else(|| "logging is not initialized".to_string())?;
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| format!("invalid filter '{}': {}", directive, e))?;
    handle
        .reload(filter)
        .map_err(|e| format!("filter reload failed: {}", e))?;
    tracing::info!("Log filter set to {}", directive);
    Ok(())
}

// ============================================================================
// Housekeeping
// ============================================================================

/// When plain logs are gzipped and when archives are deleted
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub compress_after: Duration,
    pub delete_after: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            compress_after: DAY * 7,
            delete_after: DAY * 365,
        }
    }
}

fn spawn_housekeeping(dir: PathBuf, service: String, policy: RetentionPolicy) {
    // --validate initializes logging before any runtime work is scheduled
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + Duration::from_secs(60),
            DAY,
        );
        loop {
            ticker.tick().await;
            if let Err(e) = archive_old_logs(&dir, &service, policy, SystemTime::now()) {
                tracing::error!("Log housekeeping failed for {}: {}", service, e);
            }
        }
    });
}

/// Gzip this service's `.log` files past `compress_after`, drop `.log.gz`
/// files past `delete_after`. Returns how many files were touched.
fn archive_old_logs(
    dir: &Path,
    service: &str,
    policy: RetentionPolicy,
    now: SystemTime,
) -> io::Result<usize> {
    let marker = format!("_{}", service);
    let mut touched = 0;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.contains(&marker) {
            continue;
        }
        let age = now
            .duration_since(fs::metadata(&path)?.modified()?)
            .unwrap_or(Duration::ZERO);

        if name.ends_with(".log") && age >= policy.compress_after {
            gzip_file(&path)?;
            fs::remove_file(&path)?;
            touched += 1;
        } else if name.ends_with(".log.gz") && age > policy.delete_after {
            fs::remove_file(&path)?;
            touched += 1;
        }
    }
    Ok(touched)
}

fn gzip_file(path: &Path) -> io::Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(".gz");
    let mut encoder = GzEncoder::new(File::create(target)?, Compression::best());
    io::copy(&mut File::open(path)?, &mut encoder)?;
    encoder.finish()?;
    Ok(())
}

// ============================================================================
// HTTP request logging
// ============================================================================

/// Axum middleware writing one `api_access` line per request
///
/// The query string is kept: an export download is fully described by it.
///
/// ```rust,ignore
/// Router::new()
///     .route("/health", get(health))
///     .layer(axum::middleware::from_fn(common::logging::http_request_logger))
/// ```
#[cfg(feature = "axum")]
pub async fn http_request_logger(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = std::time::Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let query = uri.query().unwrap_or("-");
    if response.status().is_server_error() {
        tracing::warn!(
            target: "api_access",
            %method, path = %uri.path(), query, status, elapsed_ms,
            "HTTP request"
        );
    } else {
        tracing::info!(
            target: "api_access",
            %method, path = %uri.path(), query, status, elapsed_ms,
            "HTTP request"
        );
    }
    response
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(
            DailyLogFile::file_name("20240301", "exportsrv", 0),
            "20240301_exportsrv.log"
        );
        assert_eq!(
            DailyLogFile::file_name("20240301", "exportsrv_api", 2),
            "20240301_exportsrv_api.2.log"
        );
    }

    #[test]
    fn test_oversized_day_continues_in_next_part() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = DailyLogFile::new(dir.path(), "svc", "").unwrap();
        file.max_size = 8;

        file.write_record(b"12345").unwrap();
        file.write_record(b"67890").unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].ends_with("_svc.1.log"));
        assert!(names[1].ends_with("_svc.log"));
    }

    #[test]
    fn test_filter_directive_priority() {
        let config = LogConfig {
            level: "debug".to_string(),
            ..LogConfig::for_service("exportsrv")
        };
        assert_eq!(
            config.filter_directive(None),
            "debug,api_access=info,sqlx=warn"
        );
        assert_eq!(config.filter_directive(Some("warn")), "warn,api_access=info");
        assert_eq!(
            config.filter_directive(Some("warn,api_access=off")),
            "warn,api_access=off"
        );

        let quiet = LogConfig {
            enable_api_log: false,
            ..config
        };
        assert_eq!(quiet.filter_directive(Some("info")), "info,api_access=off");
    }

    #[test]
    fn test_archive_compresses_then_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("20240301_svc.log");
        fs::write(&log, "line\n").unwrap();
        fs::write(dir.path().join("20240301_other.log"), "line\n").unwrap();

        let now = SystemTime::now();
        let policy = RetentionPolicy::default();
        assert_eq!(archive_old_logs(dir.path(), "svc", policy, now).unwrap(), 0);

        let later = now + DAY * 8;
        assert_eq!(archive_old_logs(dir.path(), "svc", policy, later).unwrap(), 1);
        assert!(!log.exists());
        assert!(dir.path().join("20240301_svc.log.gz").exists());
        assert!(dir.path().join("20240301_other.log").exists());

        let much_later = now + DAY * 400;
        assert_eq!(archive_old_logs(dir.path(), "svc", policy, much_later).unwrap(), 1);
        assert!(!dir.path().join("20240301_svc.log.gz").exists());
    }

    #[test]
    fn test_set_level_before_init_fails() {
        if FILTER_HANDLE.get().is_none() {
            assert!(set_log_level("debug").is_err());
        }
    }
}
