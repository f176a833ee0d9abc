//! Structured logging with tracing
//!
//! Sets up:
//! - Console logging, text or JSON per `LOG_FORMAT`
//! - File logging with daily rotation, always JSON, pruned to
//!   `LOG_RETENTION_DAYS` files
//! - Log levels from `RUST_LOG`

use super::config::{LogFormat, MonitoringConfig};
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub const LOG_FILE_PREFIX: &str = "nuri.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn console_layer(format: LogFormat) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Text => layer.with_file(true).with_line_number(true).boxed(),
    }
}

/// Daily `nuri.log.YYYY-MM-DD` files under `log_dir`.
pub fn file_appender(config: &MonitoringConfig) -> Result<RollingFileAppender, InitError> {
    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX);
    if let Some(max) = config.max_log_files() {
        builder = builder.max_log_files(max);
    }
    builder.build(&config.log_dir)
}

/// Initialize the global tracing subscriber.
///
/// Returns the file writer guard when file logging is on; dropping it stops
/// file logging, so keep it for the lifetime of the process.
pub fn init_tracing(config: &MonitoringConfig) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    if !config.enabled {
        return Ok(None);
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.enable_console_logging {
        layers.push(console_layer(config.log_format));
    }

    let mut guard = None;
    if config.enable_file_logging {
        config.ensure_log_dir()?;
        let (writer, file_guard) = non_blocking(file_appender(config)?);
        layers.push(fmt::layer().with_writer(writer).with_ansi(false).json().boxed());
        guard = Some(file_guard);
    }

    // a subscriber may already be installed (tests)
    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init();

    Ok(guard)
}
