//! The retry engine: sweeps every enabled field until all of them hold their
//! desired value or the attempt budget runs out.

use crate::applier::{FieldApplier, FieldOutcome};
use crate::config::{AgentSettings, DesiredConfig};
use crate::errors::AutomationError;
use crate::field::{FieldSpec, FieldValue};
use crate::injector::{InjectorTimings, ValueInjector};
use crate::locator::ElementLocator;
use crate::page::{PageProbe, PageSpec};
use crate::panel::{PanelGateway, PanelSpec, PanelTimings};
use crate::platforms::DomEngine;
use crate::status::{StatusDetail, StatusSink};
use crate::wait::sleep_or_cancel;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Running,
    Converged,
    Exhausted,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Converged,
    Exhausted,
    /// A newer run took over; nothing was reported.
    Superseded,
}

/// Per-field standing within one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Convergence {
    Converged,
    Pending,
    Unreachable,
}

impl From<&FieldOutcome> for Convergence {
    fn from(outcome: &FieldOutcome) -> Self {
        match outcome {
            FieldOutcome::Converged => Convergence::Converged,
            FieldOutcome::Unreachable(miss) if miss.is_unreachable() => Convergence::Unreachable,
            FieldOutcome::Unreachable(_) => Convergence::Pending,
        }
    }
}

/// `key -> Converged | Pending | Unreachable`, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceState {
    entries: Vec<(String, Convergence)>,
}

impl ConvergenceState {
    pub fn new<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            entries: keys
                .into_iter()
                .map(|k| (k.to_string(), Convergence::Pending))
                .collect(),
        }
    }

    pub fn record(&mut self, key: &str, convergence: Convergence) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = convergence,
            None => self.entries.push((key.to_string(), convergence)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Convergence> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }

    pub fn converged_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, c)| *c == Convergence::Converged)
            .count()
    }

    pub fn all_converged(&self) -> bool {
        self.converged_count() == self.total_count()
    }

    /// Keys not yet converged, in field order.
    pub fn pending_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, c)| *c != Convergence::Converged)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn detail(&self) -> StatusDetail {
        StatusDetail {
            converged_count: self.converged_count(),
            total_count: self.total_count(),
            pending_keys: self.pending_keys(),
        }
    }
}

/// Sweeps allowed for one run and the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl AttemptBudget {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Result<Self, AutomationError> {
        if max_attempts == 0 {
            return Err(AutomationError::InvalidArgument(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            attempts_used: 0,
            max_attempts,
            retry_delay,
        })
    }

    /// Count a failed sweep; `true` while another sweep is allowed.
    pub fn consume(&mut self) -> bool {
        self.attempts_used = self.attempts_used.saturating_add(1);
        self.attempts_used < self.max_attempts
    }
}

/// Outcome of every enabled field in one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub attempt: u32,
    pub outcomes: Vec<(String, FieldOutcome)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Failed sweeps counted against the budget.
    pub attempts_used: u32,
    /// State after the last completed sweep.
    pub state: ConvergenceState,
    pub sweeps: Vec<SweepReport>,
}

/// The session-wide run counter. Starting a run advances it, which turns
/// every older [`RunGuard`] stale.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    current: Arc<AtomicU64>,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Start a new generation and hand out its guard.
    pub fn advance(&self) -> RunGuard {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        RunGuard {
            generation,
            current: self.current.clone(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Proof that a run is still the newest one.
#[derive(Debug, Clone)]
pub struct RunGuard {
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl RunGuard {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.current.load(Ordering::SeqCst) == self.generation
    }

    /// Wakes every wait of this run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Drives the enabled fields of a [`DesiredConfig`] to convergence.
pub struct ConvergenceLoop {
    engine: Arc<dyn DomEngine>,
    fields: Arc<[FieldSpec]>,
    applier: FieldApplier,
    sink: Arc<dyn StatusSink>,
    settings: AgentSettings,
    panel: Option<PanelSpec>,
    page: Option<PageProbe>,
}

impl ConvergenceLoop {
    pub fn new(
        engine: Arc<dyn DomEngine>,
        fields: Arc<[FieldSpec]>,
        sink: Arc<dyn StatusSink>,
        settings: AgentSettings,
    ) -> Result<Self, AutomationError> {
        settings.validate()?;
        let applier = FieldApplier::new(
            ElementLocator::new(engine.clone()),
            ValueInjector::new(engine.clone(), InjectorTimings::from(&settings)),
        );
        Ok(Self {
            engine,
            fields,
            applier,
            sink,
            settings,
            panel: None,
            page: None,
        })
    }

    /// Reveal this panel before every sweep.
    pub fn with_panel(mut self, panel: PanelSpec) -> Self {
        self.panel = Some(panel);
        self
    }

    /// Wait for page readiness before the first sweep and restore focus at
    /// the end of the run.
    pub fn with_page(mut self, page: PageSpec) -> Self {
        self.page = Some(PageProbe::new(self.engine.clone(), page, &self.settings));
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    fn emit(&self, guard: &RunGuard, state: RunState, detail: &StatusDetail) -> bool {
        if !guard.is_current() {
            return false;
        }
        self.sink.on_status_change(state, detail);
        true
    }

    fn superseded(
        &self,
        guard: &RunGuard,
        attempts_used: u32,
        state: ConvergenceState,
        sweeps: Vec<SweepReport>,
    ) -> RunReport {
        debug!(generation = guard.generation(), "Run superseded");
        RunReport {
            outcome: RunOutcome::Superseded,
            attempts_used,
            state,
            sweeps,
        }
    }

    /// One run: sweep, wait, sweep again, until every enabled field
    /// converges or the budget is spent. Stops without side effects as soon
    /// as `guard` goes stale.
    #[instrument(level = "info", skip_all, fields(generation = guard.generation()))]
    pub async fn run(&self, config: &DesiredConfig, guard: &RunGuard) -> RunReport {
        let cancel = guard.cancellation_token();
        let targets: Vec<(&FieldSpec, &FieldValue)> = self
            .fields
            .iter()
            .filter_map(|field| config.desired(&field.key).map(|value| (field, value)))
            .collect();
        let mut state = ConvergenceState::new(targets.iter().map(|(f, _)| f.key.as_str()));
        let mut sweeps = Vec::new();
        // validated in `new`
        let mut budget = AttemptBudget {
            attempts_used: 0,
            max_attempts: self.settings.max_attempts.max(1),
            retry_delay: self.settings.retry_delay(),
        };

        if !self.emit(guard, RunState::Running, &state.detail()) {
            return self.superseded(guard, 0, state, sweeps);
        }
        if targets.is_empty() {
            info!("No enabled settings, nothing to do");
            self.emit(guard, RunState::Converged, &state.detail());
            return RunReport {
                outcome: RunOutcome::Converged,
                attempts_used: 0,
                state,
                sweeps,
            };
        }

        if let Some(page) = &self.page {
            page.wait_until_ready(cancel).await;
        }
        let mut gateway = self.panel.clone().map(|spec| {
            PanelGateway::new(self.engine.clone(), spec, PanelTimings::from(&self.settings))
        });

        let outcome = loop {
            if !guard.is_current() {
                return self.superseded(guard, budget.attempts_used, state, sweeps);
            }
            let attempt = budget.attempts_used + 1;
            info!(attempt, max = budget.max_attempts, "Sweep");

            if let Some(gateway) = gateway.as_mut() {
                if let Err(e) = gateway.ensure_visible(cancel).await {
                    warn!(error = %e, "Could not check the settings panel");
                }
            }

            let mut sweep_state = ConvergenceState::new(targets.iter().map(|(f, _)| f.key.as_str()));
            let mut outcomes = Vec::with_capacity(targets.len());
            for (field, value) in &targets {
                if !guard.is_current() {
                    return self.superseded(guard, budget.attempts_used, state, sweeps);
                }
                let outcome = self.applier.apply(field, value, cancel).await;
                sweep_state.record(&field.key, Convergence::from(&outcome));
                outcomes.push((field.key.clone(), outcome));
            }
            if !guard.is_current() {
                return self.superseded(guard, budget.attempts_used, state, sweeps);
            }
            state = sweep_state;
            sweeps.push(SweepReport { attempt, outcomes });

            if state.all_converged() {
                info!(attempt, "All settings converged");
                self.emit(guard, RunState::Converged, &state.detail());
                break RunOutcome::Converged;
            }
            if !budget.consume() {
                warn!(
                    attempts = budget.attempts_used,
                    pending = ?state.pending_keys(),
                    "Attempt budget exhausted"
                );
                self.emit(guard, RunState::Exhausted, &state.detail());
                break RunOutcome::Exhausted;
            }
            self.emit(guard, RunState::Running, &state.detail());
            if !sleep_or_cancel(budget.retry_delay, cancel).await {
                return self.superseded(guard, budget.attempts_used, state, sweeps);
            }
        };

        if self.settings.close_panel_after_run {
            if let Some(gateway) = gateway.as_mut() {
                if let Err(e) = gateway.release() {
                    warn!(error = %e, "Could not close the settings panel");
                }
            }
        }
        if let Some(page) = &self.page {
            if guard.is_current() {
                page.restore_focus(cancel).await;
            }
        }

        RunReport {
            outcome,
            attempts_used: budget.attempts_used,
            state,
            sweeps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::applier::Miss;

    #[test]
    fn misses_map_onto_convergence() {
        assert_eq!(
            Convergence::from(&FieldOutcome::Unreachable(Miss::NotFound)),
            Convergence::Unreachable
        );
        assert_eq!(
            Convergence::from(&FieldOutcome::Unreachable(Miss::Disabled)),
            Convergence::Unreachable
        );
        assert_eq!(
            Convergence::from(&FieldOutcome::Unreachable(Miss::WriteRejected)),
            Convergence::Pending
        );
        assert_eq!(
            Convergence::from(&FieldOutcome::Unreachable(Miss::Fault("boom".into()))),
            Convergence::Pending
        );
    }

    #[test]
    fn budget_allows_exactly_max_sweeps() {
        let mut budget = AttemptBudget::new(3, Duration::from_millis(10)).unwrap();
        assert!(budget.consume());
        assert!(budget.consume());
        assert!(!budget.consume());
        assert_eq!(budget.attempts_used, 3);
        assert!(AttemptBudget::new(0, Duration::ZERO).is_err());
    }

    #[test]
    fn advancing_the_generation_stales_older_guards() {
        let generation = Generation::new();
        let first = generation.advance();
        assert!(first.is_current());
        let second = generation.advance();
        assert!(!first.is_current());
        assert!(second.is_current());
        second.cancel();
        assert!(!second.is_current());
        assert_eq!(generation.current(), 2);
    }

    #[test]
    fn state_tracks_pending_keys_in_order() {
        let mut state = ConvergenceState::new(["temperature", "topP", "mediaResolution"]);
        state.record("topP", Convergence::Converged);
        state.record("mediaResolution", Convergence::Unreachable);
        assert_eq!(state.converged_count(), 1);
        assert_eq!(state.pending_keys(), vec!["temperature", "mediaResolution"]);
        assert_eq!(state.get("mediaResolution"), Some(Convergence::Unreachable));
        assert!(!state.all_converged());
    }
}
