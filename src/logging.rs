//! Structured logging backed by `tracing`.
//!
//! One global subscriber: a stdout layer and, when the data directory is
//! writable, a daily-rotated `bot.log`. Each answered question runs inside an
//! `ask` span carrying the question, the executed SQL and the answer; the
//! span's close event is logged with its timing.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "video_stats_bot=info,warn";
const LEVEL_ENV: &str = "VIDEO_STATS_LOG_LEVEL";
const LOG_FILE_PREFIX: &str = "bot.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Where the rotated log files go.
pub fn log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("video-stats-bot")
        .join("logs")
}

/// `RUST_LOG` wins over `VIDEO_STATS_LOG_LEVEL`; blank values are skipped.
fn filter_directive(rust_log: Option<String>, level: Option<String>) -> String {
    rust_log
        .into_iter()
        .chain(level)
        .find(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

fn build_filter() -> EnvFilter {
    let directive = filter_directive(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        std::env::var(LEVEL_ENV).ok(),
    );
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("[video-stats-bot][WARN] Invalid log filter '{}': {}", directive, err);
        EnvFilter::new(DEFAULT_FILTER)
    })
}

/// Install the global subscriber. Later calls return the first result.
///
/// Returns the log file directory, or `None` when logging is stdout only.
pub fn init_logging() -> Option<&'static Path> {
    LOG_DIR.get_or_init(install).as_deref()
}

fn install() -> Option<PathBuf> {
    let dir = log_dir();
    let file_layer = match std::fs::create_dir_all(&dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            LOG_GUARD.set(guard).ok();
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(writer),
            )
        }
        Err(err) => {
            eprintln!(
                "[video-stats-bot][WARN] Failed to create log directory {}: {}",
                dir.display(),
                err
            );
            None
        }
    };
    let file_dir = file_layer.is_some().then_some(dir);

    let stdout_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE);

    let installed = tracing_subscriber::registry()
        .with(build_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if let Err(err) = installed {
        eprintln!("[video-stats-bot][WARN] Global subscriber already set: {}", err);
    }

    match &file_dir {
        Some(dir) => info!("Logging initialized, daily files under {}", dir.display()),
        None => warn!("Logging initialized without file sink (stdout only)"),
    }
    file_dir
}
