//! Tracing setup.
//!
//! Everything goes to stderr: stdout carries streamed answer tokens and
//! JSON output, and a log line mixed into either would corrupt it.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Install the global tracing subscriber.
///
/// The filter is taken from `log_level` when given, else `RUST_LOG`,
/// else `info`. ANSI color is dropped when `no_color` is set or the
/// `NO_COLOR` environment variable is present.
///
/// Calling this twice in one process is an error; the subscriber is
/// global.
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| AppError::Config(format!("Invalid log filter '{}': {}", level, e)))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let ansi = !no_color && std::env::var_os("NO_COLOR").is_none();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(ansi),
        )
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        let result = init_logging(Some("not[a]filter"), true);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
