//! Tracing setup for the agent process.
//!
//! Two shapes, picked by the deployment environment:
//! - **Production**: JSON records into a daily-rolling file under
//!   `/var/log/lookout`, plus a compact no-color copy on stdout for the
//!   systemd journal.
//! - **Development**: pretty stdout with span open/close events, so the
//!   per-boot session span brackets everything a run logs.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fallback level filter when `RUST_LOG` is unset.
const ENV_LOG_LEVEL: &str = "LOOKOUT_LOG_LEVEL";

// The non-blocking writers stop flushing once their guard drops, so the
// guards live for the whole process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static STDOUT_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber for this run.
///
/// Filtering honors `RUST_LOG` when set, then `LOOKOUT_LOG_LEVEL`, then
/// defaults to `info`.
///
/// # Errors
///
/// Returns an error when the level filter does not parse.
pub fn init(is_production: bool) -> anyhow::Result<()> {
    let log_level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .context("invalid log filter")?;

    if is_production {
        init_production(env_filter);
    } else {
        init_development(env_filter);
    }
    Ok(())
}

fn init_production(env_filter: EnvFilter) {
    let log_dir = log_directory();
    if !log_dir.exists() {
        // Logging to stdout still works if this fails; don't refuse to boot.
        std::fs::create_dir_all(&log_dir).ok();
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "lookout");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    // Files get the full structured record; the journal copy stays compact
    // and color-free.
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_target(true);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_stdout)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);
}

fn init_development(env_filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .init();
}

fn log_directory() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/var/log/lookout")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "lookout")
            .map(|dirs| dirs.data_dir().join("logs"))
            .unwrap_or_else(|| PathBuf::from("./logs"))
    }
}
