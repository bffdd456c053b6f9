//! Structured Logger
//!
//! Wraps `tracing` with console output on stderr (stdout carries command
//! results), an optional rolling NDJSON file, and `RUST_LOG` level control.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global logger. `RUST_LOG` overrides `level` when set.
///
/// With `log_dir`, events are also written to `enclave.log.YYYY-MM-DD` there.
/// Calling this twice is harmless; the first subscriber stays installed.
pub fn init_logger(level: &str, json: bool, log_dir: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = log_dir.map(|dir| {
        let appender = RollingFileAppender::new(Rotation::DAILY, dir, "enclave.log");
        fmt::layer().json().with_writer(appender).with_ansi(false)
    });

    let (json_console, plain_console) = if json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (
            None,
            Some(fmt::layer().with_writer(std::io::stderr).with_target(false).with_ansi(true)),
        )
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_console)
        .with(plain_console)
        .with(file_layer)
        .try_init();
}
