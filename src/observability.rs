//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::types::ObservabilityConfig;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing with default settings.
///
/// Log format defaults to plain text and can be switched to JSON via
/// `ISOLATE_LOG_FORMAT=json`. Filter defaults to `info` if `RUST_LOG` is unset.
pub fn init_tracing() {
    init_tracing_with(&ObservabilityConfig::default());
}

/// Initialize tracing subscriber once for the process.
///
/// `RUST_LOG` takes precedence over `config.log_level`; JSON output is used
/// when either `config.json_logs` or `ISOLATE_LOG_FORMAT=json` asks for it.
pub fn init_tracing_with(config: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
        let json = config.json_logs || json_format_requested();

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact())
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

fn json_format_requested() -> bool {
    std::env::var("ISOLATE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing_with(&ObservabilityConfig {
            log_level: "debug".to_string(),
            json_logs: true,
        });
    }
}
