use crate::errors::AutomationError;
use std::env;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn level_from_env() -> Level {
    env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            "trace" => Level::TRACE,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO)
}

/// Install a stderr subscriber. `LOG_LEVEL` sets the default level,
/// `RUST_LOG` directives refine it per module.
pub fn init_logging() -> Result<(), AutomationError> {
    let filter = EnvFilter::from_default_env().add_directive(level_from_env().into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|e| AutomationError::Internal(format!("logging already initialized: {e}")))
}
