use crate::config::AgentSettings;
use crate::errors::AutomationError;
use crate::platforms::DomEngine;
use crate::selector::Selector;
use crate::wait::{sleep_or_cancel, wait_for, WaitOptions, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the settings panel lives and how to reveal it.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelSpec {
    pub container: Selector,
    pub toggle: Selector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelTimings {
    pub open_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl From<&AgentSettings> for PanelTimings {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            open_timeout: settings.panel_open_timeout(),
            poll_interval: settings.wait_poll_interval(),
            settle_delay: settings.settle_delay(),
        }
    }
}

/// Makes the settings panel visible for the duration of a run.
///
/// A gateway belongs to one run; it remembers whether it opened the panel
/// so that [`PanelGateway::release`] only undoes its own action.
pub struct PanelGateway {
    engine: Arc<dyn DomEngine>,
    spec: PanelSpec,
    timings: PanelTimings,
    opened_by_us: bool,
}

impl PanelGateway {
    pub fn new(engine: Arc<dyn DomEngine>, spec: PanelSpec, timings: PanelTimings) -> Self {
        Self {
            engine,
            spec,
            timings,
            opened_by_us: false,
        }
    }

    pub fn opened_by_us(&self) -> bool {
        self.opened_by_us
    }

    fn panel_visible(&self) -> Result<bool, AutomationError> {
        match self.engine.find_element(&self.spec.container, None)? {
            Some(panel) => panel.is_visible(),
            None => Ok(false),
        }
    }

    /// `true` once the panel is visible. A missing toggle or a panel that
    /// never appears yields `false`; the run carries on regardless.
    pub async fn ensure_visible(&mut self, cancel: &CancellationToken) -> Result<bool, AutomationError> {
        if self.panel_visible()? {
            return Ok(true);
        }
        let Some(toggle) = self.engine.find_element(&self.spec.toggle, None)? else {
            warn!(toggle = %self.spec.toggle, "Settings panel hidden and no toggle found");
            return Ok(false);
        };
        debug!("Opening settings panel");
        toggle.click()?;

        let options = WaitOptions::new(self.timings.open_timeout, self.timings.poll_interval);
        let outcome = wait_for(self.engine.as_ref(), options, cancel, || {
            self.panel_visible().ok().filter(|visible| *visible)
        })
        .await;
        match outcome {
            WaitOutcome::Found(_) => {
                self.opened_by_us = true;
                info!("Settings panel opened");
                Ok(sleep_or_cancel(self.timings.settle_delay, cancel).await)
            }
            WaitOutcome::TimedOut => {
                warn!(timeout = ?self.timings.open_timeout, "Settings panel did not become visible");
                Ok(false)
            }
            WaitOutcome::Cancelled => Ok(false),
        }
    }

    /// Close the panel if this gateway opened it. Returns whether a close
    /// was issued.
    pub fn release(&mut self) -> Result<bool, AutomationError> {
        if !std::mem::take(&mut self.opened_by_us) {
            return Ok(false);
        }
        if !self.panel_visible()? {
            return Ok(false);
        }
        match self.engine.find_element(&self.spec.toggle, None)? {
            Some(toggle) => {
                toggle.click()?;
                debug!("Settings panel closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
