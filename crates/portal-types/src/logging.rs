//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::Settings;
use crate::error::PortalError;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `settings.log_level` is used.
pub fn init_tracing(settings: &Settings) -> Result<(), PortalError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| PortalError::Config(format!("Failed to set tracing subscriber: {e}")))
}
