//! Structured logging setup
//!
//! - `pretty` output for interactive use, `json` for log shippers
//! - console (stderr), a daily-rolling file, or both
//! - `RUST_LOG` overrides the configured level
//!
//! Console logs go to stderr so that stdout carries only the cycle summaries.

use crate::config::LoggingConfig;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const LOG_FILE_NAME: &str = "ccusage-agent.log";

/// Install the global subscriber. The returned guard must be held until exit
/// so buffered file output is flushed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.output.as_str() {
        "file" => init_file_logging(env_filter, &config.format, &config.directory),
        "both" => init_combined_logging(env_filter, &config.format, &config.directory),
        _ => {
            init_console_logging(env_filter, &config.format);
            None
        }
    }
}

fn init_console_logging(filter: EnvFilter, format: &str) {
    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .try_init()
                .ok();
        }
        _ => {
            subscriber
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(false)
                        .with_ansi(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init()
                .ok();
        }
    }
}

fn init_file_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> Option<WorkerGuard> {
    let Some(writer) = file_writer(log_dir) else {
        init_console_logging(filter, format);
        return None;
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .try_init()
                .ok();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .ok();
        }
    }

    Some(guard)
}

fn init_combined_logging(filter: EnvFilter, format: &str, log_dir: &Path) -> Option<WorkerGuard> {
    let Some(writer) = file_writer(log_dir) else {
        init_console_logging(filter, format);
        return None;
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        "json" => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(non_blocking))
                .try_init()
                .ok();
        }
        _ => {
            subscriber
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
                .try_init()
                .ok();
        }
    }

    Some(guard)
}

/// Daily-rolling appender in `log_dir`, or `None` when the directory cannot
/// be created.
fn file_writer(log_dir: &Path) -> Option<tracing_appender::rolling::RollingFileAppender> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!(
            "Warning: cannot create log directory {}: {}. Logging to console.",
            log_dir.display(),
            e
        );
        return None;
    }
    Some(tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME))
}
