use crate::util::errors::{Error, Result};
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

/// Initialize tracing
///
/// `RUST_LOG` takes precedence over the configured default directive.
pub fn init(default_directive: &str) -> Result<()> {
    // Setup tracing layers
    let logger = tracing_subscriber::fmt::layer().compact();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| Error::ConfigError(format!("invalid log level {:?}: {}", default_directive, e)))?;

    let collector = Registry::default().with(logger).with(env_filter);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)
        .map_err(|e| Error::ConfigError(format!("failed to install tracing subscriber: {}", e)))
}
