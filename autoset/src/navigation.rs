use crate::platforms::DomEngine;
use crate::session::AgentSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Turns page identity changes of a single-page app into session restarts.
///
/// The watcher samples [`DomEngine::page_url`] and fires once per change,
/// never for a repeated sample of the same URL.
pub struct NavigationWatcher {
    engine: Arc<dyn DomEngine>,
    session: Arc<AgentSession>,
    interval: Duration,
}

impl NavigationWatcher {
    pub fn new(engine: Arc<dyn DomEngine>, session: Arc<AgentSession>, interval: Duration) -> Self {
        Self {
            engine,
            session,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Poll until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last = self.engine.page_url();
            debug!(url = %last, "Watching for navigation");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
                let url = self.engine.page_url();
                if url != last {
                    info!(from = %last, to = %url, "Navigation detected");
                    // the handle is dropped, the run keeps going detached
                    let _ = self.session.on_navigation(&url);
                    last = url;
                }
            }
        })
    }
}
