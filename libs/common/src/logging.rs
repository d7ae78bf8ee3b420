//! Unified logging module for MeterLink services
//!
//! Console output plus an optional daily rolling log file written through a
//! non-blocking `tracing-appender` worker. `RUST_LOG` always wins over the
//! configured levels.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use errors::{config_error, MeterError, MeterResult};
use parking_lot::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment variable overriding the log root directory
pub const LOG_DIR_ENV: &str = "METERLINK_LOG_DIR";

/// Log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] target: message`
///
/// Example output: `2025-12-02T00:50:44.809123Z [INFO] metersrv::connection: Connection opened`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
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
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        write!(writer, "{}: ", event.metadata().target())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writers alive for the life of the process
static GUARDS: Mutex<Vec<WorkerGuard>> = parking_lot::const_mutex(Vec::new());

// ============================================================================
// Log Root Directory
// ============================================================================

static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the log root directory
///
/// Priority:
/// 1. `METERLINK_LOG_DIR` environment variable
/// 2. `config_dir` parameter
/// 3. Default value "logs"
pub fn init_log_root(config_dir: Option<&str>) -> PathBuf {
    LOG_ROOT
        .get_or_init(|| {
            std::env::var(LOG_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    config_dir
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("logs"))
                })
        })
        .clone()
}

/// Get the log root directory, falling back to env or "logs" if never initialized
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logs"))
    })
}

// ============================================================================
// Daily rolling file writer
// ============================================================================

struct RollingState {
    date: String,
    file: File,
}

/// Daily rolling file writer with naming format: `{YYYYMMDD}_{service}.log`
#[derive(Clone)]
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    state: Arc<Mutex<RollingState>>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        fs::create_dir_all(&log_dir)?;
        let date = today();
        let file = open_log_file(&log_dir, &date, &service_name)?;

        Ok(Self {
            service_name,
            log_dir,
            state: Arc::new(Mutex::new(RollingState { date, file })),
        })
    }

    fn roll_if_needed(&self, state: &mut RollingState) -> std::io::Result<()> {
        let today = today();
        let deleted = !log_file_path(&self.log_dir, &state.date, &self.service_name).exists();
        if state.date != today || deleted {
            fs::create_dir_all(&self.log_dir)?;
            state.file = open_log_file(&self.log_dir, &today, &self.service_name)?;
            state.date = today;
        }
        Ok(())
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

fn log_file_path(log_dir: &std::path::Path, date: &str, service_name: &str) -> PathBuf {
    log_dir.join(format!("{}_{}.log", date, service_name))
}

fn open_log_file(log_dir: &std::path::Path, date: &str, service_name: &str) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(log_dir, date, service_name))
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.state.lock();
        self.roll_if_needed(&mut state)?;
        state.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.state.lock().file.flush()
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "metersrv"), used in the file name and default filter
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    pub console_level: Level,
    pub file_level: Level,
    /// Write a log file in addition to the console
    pub enable_file: bool,
    /// JSON lines in the log file instead of the bracketed format
    pub enable_json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_file: true,
            enable_json: false,
        }
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> MeterResult<()> {
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "info,{}=debug,sml_codec=info",
            config.service_name.replace('-', "_")
        )
    });
    let env_filter = EnvFilter::try_new(&filter_str)
        .map_err(|e| config_error!("Invalid log filter '{}': {}", filter_str, e))?;

    let console_layer = fmt::layer()
        .with_ansi(true)
        .event_format(BracketedLevelFormat)
        .with_filter(LevelFilter::from_level(config.console_level))
        .boxed();

    let file_layer = if config.enable_file {
        let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
        let (non_blocking, guard) = tracing_appender::non_blocking(writer);
        GUARDS.lock().push(guard);

        let layer = if config.enable_json {
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_target(true)
                .with_filter(LevelFilter::from_level(config.file_level))
                .boxed()
        } else {
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(BracketedLevelFormat)
                .with_filter(LevelFilter::from_level(config.file_level))
                .boxed()
        };
        Some(layer)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MeterError::Internal(format!("Logging already initialized: {}", e)))?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);
    Ok(())
}

/// Console-only initialization at a given level
pub fn init(level: &str) -> MeterResult<()> {
    let level: Level = level
        .parse()
        .map_err(|_| MeterError::InvalidParameter {
            param: "level".into(),
            reason: format!("unknown log level '{}'", level),
        })?;
    init_with_config(LogConfig {
        console_level: level,
        enable_file: false,
        ..Default::default()
    })
}
