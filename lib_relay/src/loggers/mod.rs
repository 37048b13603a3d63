//! # Logging Setup
//!
//! Installs the process-wide `tracing` subscriber used by the relay binaries:
//!
//! - a human readable console layer with targets and ANSI colours, and
//! - a JSON layer written through a non-blocking, daily rolling file appender.
//!
//! `RUST_LOG` wins over the configured level when it is set.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Default level when neither the caller nor `RUST_LOG` picks one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Builds the level filter: `RUST_LOG` first, then `level`, then `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

/// # Setup Logging
///
/// Creates `log_dir` if needed and installs the global subscriber. Log files
/// are named `<app_name>.<date>`.
///
/// The returned guard flushes the file writer when dropped; keep it alive in
/// `main` for the life of the process.
///
/// # Errors
/// Fails when the directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging(log_dir: impl AsRef<Path>, level: &str, app_name: &str) -> io::Result<WorkerGuard> {
    let log_dir = log_dir.as_ref();
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, app_name);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    Registry::default()
        .with(env_filter(level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(guard)
}
