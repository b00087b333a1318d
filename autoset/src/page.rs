use crate::config::AgentSettings;
use crate::platforms::DomEngine;
use crate::selector::Selector;
use crate::wait::{sleep_or_cancel, wait_for, WaitOptions, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Markers of a usable page and the element that should own focus after a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSpec {
    /// Every selector must match before the page counts as loaded.
    pub ready_selectors: Vec<Selector>,
    pub focus_target: Option<Selector>,
}

pub struct PageProbe {
    engine: Arc<dyn DomEngine>,
    spec: PageSpec,
    load_timeout: Duration,
    poll_interval: Duration,
    focus_delay: Duration,
}

impl PageProbe {
    pub fn new(engine: Arc<dyn DomEngine>, spec: PageSpec, settings: &AgentSettings) -> Self {
        Self {
            engine,
            spec,
            load_timeout: settings.page_load_timeout(),
            poll_interval: settings.page_poll_interval(),
            focus_delay: settings.focus_restore_delay(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.spec.ready_selectors.iter().all(|selector| {
            matches!(self.engine.find_element(selector, None), Ok(Some(_)))
        })
    }

    /// Wait for the page to render. A timeout is logged and reported as
    /// `false`; callers proceed either way.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> bool {
        let options = WaitOptions::new(self.load_timeout, self.poll_interval);
        match wait_for(self.engine.as_ref(), options, cancel, || self.is_ready().then_some(())).await {
            WaitOutcome::Found(()) => {
                debug!("Page ready");
                true
            }
            WaitOutcome::TimedOut => {
                warn!(timeout = ?self.load_timeout, "Page load timeout, continuing anyway");
                false
            }
            WaitOutcome::Cancelled => false,
        }
    }

    /// Hand focus back to the prompt input after a short delay.
    pub async fn restore_focus(&self, cancel: &CancellationToken) -> bool {
        let Some(selector) = &self.spec.focus_target else {
            return false;
        };
        let target = match self.engine.find_element(selector, None) {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!("Prompt input not found for focus restore");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Focus target lookup failed");
                return false;
            }
        };
        if !sleep_or_cancel(self.focus_delay, cancel).await {
            return false;
        }
        match target.focus() {
            Ok(()) => {
                info!("Focus restored to prompt input");
                true
            }
            Err(e) => {
                warn!(error = %e, "Focus restore failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::memory::{fixtures, ElementSpec, MemoryEngine};
    use tokio::time::Instant;

    fn probe(engine: &MemoryEngine) -> PageProbe {
        PageProbe::new(
            Arc::new(engine.clone()),
            crate::presets::studio_page(),
            &AgentSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_late_rendering() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        let late = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            fixtures::prompt_input(&late);
            let body = late.body();
            late.append(body, ElementSpec::new("h3").text("Temperature"));
        });

        let started = Instant::now();
        assert!(probe(&engine).wait_until_ready(&CancellationToken::new()).await);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_load_timeout() {
        let engine = MemoryEngine::new(fixtures::PAGE_URL);
        fixtures::prompt_input(&engine);
        assert!(!probe(&engine).wait_until_ready(&CancellationToken::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn focus_goes_back_to_the_prompt() {
        let page = fixtures::StudioPage::new();
        page.engine.element(page.temperature.number).click().unwrap();
        assert!(probe(&page.engine).restore_focus(&CancellationToken::new()).await);
        assert_eq!(page.engine.focused(), Some(page.prompt));
    }
}
