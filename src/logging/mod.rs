/*!
 * Logging Module
 * Subscriber setup: rolling files, error file and console
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub use config::{LogConfig, LogLevel};

/// Writer guards; buffered lines are flushed when these drop.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Initialize the logging system. Keep the returned guards alive for the
/// lifetime of the process.
pub fn init() -> LogGuards {
    let cfg = LogConfig::from_env();

    if let Err(e) = std::fs::create_dir_all(&cfg.directory) {
        eprintln!("cannot create log directory {}: {}", cfg.directory, e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&cfg.directory, "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily(&cfg.directory, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.filter_directive()));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cfg.is_production() {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        let error_layer = fmt::layer()
            .json()
            .with_writer(error_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let error_layer = fmt::layer()
            .with_writer(error_writer)
            .with_target(true)
            .with_ansi(false)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .init();
    }

    tracing::info!(
        environment = %cfg.environment,
        level = %cfg.level,
        "Logging initialized"
    );

    LogGuards {
        _guards: vec![file_guard, error_guard, console_guard],
    }
}

/// Short, non-reversible form of a secret for log lines
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(6).collect();
    if secret.chars().count() <= 6 {
        "***".to_string()
    } else {
        format!("{}***", prefix)
    }
}
