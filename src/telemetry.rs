use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Structured JSON logs on stdout, filtered by `RUST_LOG` (default `info`).
///
/// `log` records from actix and the request logger are forwarded into the same
/// subscriber. Calling this twice is harmless: the second install is ignored.
pub fn init_telemetry() {
    let env_filter = env_filter();

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json();

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Telemetry already initialized");
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_telemetry_is_idempotent() {
        init_telemetry();
        init_telemetry();
    }

    #[test]
    fn test_env_filter_builds() {
        assert!(!env_filter().to_string().is_empty());
    }
}
