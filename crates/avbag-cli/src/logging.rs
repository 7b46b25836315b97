use crate::config::{LogFormat, LoggingConfig};
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber on stderr. `RUST_LOG` takes precedence over
/// the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| anyhow!("invalid log level '{}': {e}", config.level))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
