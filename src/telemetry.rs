use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

/// Filter directive to use: `--verbose` wins, then `RUST_LOG`, then the
/// configured level.
fn build_filter(log_level: &str, verbose: bool) -> Result<EnvFilter, TelemetryError> {
    let level = if verbose { "debug" } else { log_level };
    if !verbose {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
    }
    EnvFilter::try_new(level).map_err(|source| TelemetryError::EnvFilter {
        value: level.to_string(),
        source,
    })
}

/// Install the global subscriber, logging compactly to stderr.
pub fn init(log_level: &str, verbose: bool) -> Result<(), TelemetryError> {
    let env_filter = build_filter(log_level, verbose)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_builds_debug_filter() {
        let filter = build_filter("gym_score=loud", true).unwrap();
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_invalid_level_reports_value() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = build_filter("gym_score=loud", false).unwrap_err();
        assert!(err.to_string().contains("gym_score=loud"));
    }
}
