//! Logging setup shared by the binaries

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `LoggingConfig::filter`. Calling this
/// twice is harmless; the second subscriber is ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.filter);

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Filter from `RUST_LOG` if it parses, else the configured one, else `info`
fn build_filter(rust_log: Option<&str>, configured: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_wins_over_config() {
        let filter = build_filter(Some("model_vault=trace"), "model_vault=debug");
        assert_eq!(filter.to_string(), "model_vault=trace");
    }

    #[test]
    fn test_config_filter_used_without_rust_log() {
        let filter = build_filter(None, "model_vault=debug");
        assert_eq!(filter.to_string(), "model_vault=debug");
    }

    #[test]
    fn test_unparsable_filters_fall_back_to_info() {
        let filter = build_filter(Some("model_vault=loud"), "model_vault=noisy");
        assert_eq!(filter.to_string(), "info");
    }
}
