//! Keeps the settings of a real AI Studio tab converged.
//!
//! Load the page script into the tab, point it at the bridge address, then:
//!
//! ```sh
//! AUTOSET_BRIDGE_ADDR=127.0.0.1:17373 AUTOSET_CONFIG=settings.json cargo run --example live_page
//! ```

use autoset::platforms::bridge::{BridgeEngine, DEFAULT_BRIDGE_ADDR};
use autoset::{
    init_logging, studio_session, AgentSettings, DomEngine, JsonFileStore, NavigationWatcher,
    TracingStatusSink,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let settings = AgentSettings::from_env()?;
    let addr = std::env::var("AUTOSET_BRIDGE_ADDR").unwrap_or_else(|_| DEFAULT_BRIDGE_ADDR.into());
    let config = std::env::var("AUTOSET_CONFIG").unwrap_or_else(|_| "autoset.json".into());

    let bridge = BridgeEngine::start(&addr).await?;
    info!("Waiting for the page script to connect");
    bridge.ready(Duration::from_secs(300)).await?;

    let engine: Arc<dyn DomEngine> = Arc::new(bridge.clone());
    let poll = settings.navigation_poll_interval();
    let session = Arc::new(studio_session(
        engine.clone(),
        Arc::new(JsonFileStore::new(config)),
        Arc::new(TracingStatusSink),
        settings,
    )?);

    let stop = CancellationToken::new();
    let watcher = NavigationWatcher::new(engine, session.clone(), poll).spawn(stop.clone());
    if let Some(run) = session.on_navigation(&bridge.page_url()) {
        let report = run.await?;
        info!(outcome = ?report.outcome, attempts = report.attempts_used, "First run finished");
    }

    tokio::signal::ctrl_c().await?;
    stop.cancel();
    session.shutdown();
    watcher.await?;
    bridge.shutdown();
    Ok(())
}
