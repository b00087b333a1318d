mod applier_tests;

use crate::applier::FieldApplier;
use crate::config::AgentSettings;
use crate::injector::{InjectorTimings, ValueInjector};
use crate::locator::ElementLocator;
use crate::platforms::memory::MemoryEngine;
use crate::platforms::DomEngine;
use std::sync::Arc;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

/// Short delays and a small budget, for runs on a paused clock.
pub fn fast_settings() -> AgentSettings {
    AgentSettings {
        max_attempts: 3,
        retry_delay_ms: 100,
        page_load_timeout_ms: 1_000,
        initial_delay_ms: 0,
        panel_open_timeout_ms: 500,
        option_panel_timeout_ms: 500,
        ..AgentSettings::default()
    }
}

pub fn shared(engine: &MemoryEngine) -> Arc<dyn DomEngine> {
    Arc::new(engine.clone())
}

pub fn applier_for(engine: Arc<dyn DomEngine>) -> FieldApplier {
    FieldApplier::new(
        ElementLocator::new(engine.clone()),
        ValueInjector::new(engine, InjectorTimings::default()),
    )
}
