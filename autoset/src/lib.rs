//! Settings convergence for reactive web pages
//!
//! This crate keeps a set of form controls on a single-page web application
//! at a desired configuration. Controls are located through data-driven
//! strategies, written through the path the page's framework observes, read
//! back, and retried under a bounded schedule until every enabled setting
//! holds or the attempt budget is spent.

use std::sync::Arc;

pub mod applier;
pub mod config;
pub mod convergence;
pub mod element;
pub mod errors;
pub mod field;
pub mod injector;
pub mod locator;
pub mod logging;
pub mod navigation;
pub mod page;
pub mod panel;
pub mod platforms;
pub mod presets;
pub mod selector;
pub mod session;
pub mod status;
#[cfg(test)]
mod tests;
pub mod utils;
pub mod wait;

pub use applier::{FieldApplier, FieldOutcome, Miss};
pub use config::{
    AgentSettings, ConfigStore, DesiredConfig, FieldSetting, JsonFileStore, MemoryConfigStore,
};
pub use convergence::{
    AttemptBudget, Convergence, ConvergenceLoop, ConvergenceState, Generation, RunGuard,
    RunOutcome, RunReport, RunState, SweepReport,
};
pub use element::{DomEvent, Element, ElementImpl, ElementSummary};
pub use errors::AutomationError;
pub use field::{
    ControlKind, FieldKind, FieldSpec, FieldValue, NumericControl, SelectControl, SwitchControl,
};
pub use injector::{InjectorTimings, ValueInjector};
pub use locator::{ElementLocator, LocateStrategy, LocatedControl};
pub use logging::init_logging;
pub use navigation::NavigationWatcher;
pub use page::{PageProbe, PageSpec};
pub use panel::{PanelGateway, PanelSpec, PanelTimings};
pub use platforms::DomEngine;
pub use selector::Selector;
pub use session::AgentSession;
pub use status::{
    RecordingStatusSink, StatusDetail, StatusSink, StatusUpdate, TracingStatusSink,
    WatchStatusSink,
};

/// A session for the AI Studio prompt page: the preset catalogue, the run
/// settings panel, page readiness and focus restoration.
pub fn studio_session(
    engine: Arc<dyn DomEngine>,
    store: Arc<dyn ConfigStore>,
    sink: Arc<dyn StatusSink>,
    settings: AgentSettings,
) -> Result<AgentSession, AutomationError> {
    let fields: Arc<[FieldSpec]> = presets::catalogue().into();
    let convergence = ConvergenceLoop::new(engine, fields, sink, settings)?
        .with_panel(presets::run_settings_panel())
        .with_page(presets::studio_page());
    Ok(AgentSession::new(convergence, store))
}
