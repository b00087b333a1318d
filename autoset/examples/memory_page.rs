//! Runs the agent once against the in-memory rendition of the prompt page.
//!
//! ```sh
//! LOG_LEVEL=debug cargo run --example memory_page
//! ```

use autoset::platforms::memory::fixtures::StudioPage;
use autoset::{init_logging, studio_session, AgentSettings, MemoryConfigStore, TracingStatusSink};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;

    let page = StudioPage::new();
    let settings = AgentSettings::from_env()?;
    let session = studio_session(
        Arc::new(page.engine.clone()),
        Arc::new(MemoryConfigStore::new()),
        Arc::new(TracingStatusSink),
        settings,
    )?;

    let report = session.restart().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!(
        "temperature={} topP={} mediaResolution={}",
        page.engine.value_of(page.temperature.number),
        page.engine.value_of(page.top_p.number),
        page.engine.text_of(page.media_resolution.selected_text),
    );
    Ok(())
}
