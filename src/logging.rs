//! Logging
//!
//! Structured logging via the `tracing` crate. The filter comes from the
//! `GROVE_LOG` environment variable when set, otherwise from the level
//! the caller passes (typically "off" unless the CLI ran with
//! `--verbose`).

use crate::error::{RepoError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize the global subscriber. Safe to call once per process.
pub fn init_logging(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_env("GROVE_LOG") {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| RepoError::Config(format!("invalid log level {level:?}: {e}")))?,
    };

    Registry::default()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| RepoError::Config(format!("failed to initialize logging: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        std::env::remove_var("GROVE_LOG");
        // "no-such-level!" is not a valid filter directive
        assert!(matches!(
            init_logging("no-such-level!"),
            Err(RepoError::Config(_))
        ));
    }
}
