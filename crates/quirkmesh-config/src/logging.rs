use tracing_subscriber::EnvFilter;

use crate::{ConfigError, LoggingSettings};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter. Fails if a subscriber is
/// already installed or the configured filter does not parse.
pub fn init_tracing(settings: &LoggingSettings) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter).map_err(|e| ConfigError::Validation {
            field: "logging.filter".into(),
            reason: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}
