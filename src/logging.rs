//! tracing setup: a rolling log file plus, in text mode, a console mirror.
//!
//! stdout carries only the JSON run summary, so the console mirror writes
//! to stderr.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose per-statement chatter is capped at `warn`
const NOISY_TARGETS: &[&str] = &["sqlx"];

fn file_appender(config: &AppConfig) -> RollingFileAppender {
    match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    }
}

/// Directive string for `log_level`, `RUST_LOG` aside
pub fn filter_directives(log_level: &str) -> String {
    let mut directives = log_level.to_string();
    for target in NOISY_TARGETS {
        directives.push_str(&format!(",{}=warn", target));
    }
    directives
}

/// Install the global subscriber. Keep the guard alive until exit or
/// buffered lines are lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(config));

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let console_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(true);
        registry.with(file_layer).with(console_layer).init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_caps_sqlx() {
        assert_eq!(filter_directives("debug"), "debug,sqlx=warn");
    }
}
