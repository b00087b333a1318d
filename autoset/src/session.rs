use crate::config::{ConfigStore, DesiredConfig};
use crate::convergence::{ConvergenceLoop, Generation, RunGuard, RunOutcome, RunReport, RunState};
use crate::wait::sleep_or_cancel;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Default)]
struct Slot {
    guard: Option<RunGuard>,
    running: bool,
    last_outcome: Option<RunOutcome>,
}

/// One agent per page: owns the generation token and at most one live run.
///
/// Every [`AgentSession::restart`] supersedes the run before it; the old
/// run's waits wake immediately and its remaining steps become no-ops.
pub struct AgentSession {
    convergence: Arc<ConvergenceLoop>,
    store: Arc<dyn ConfigStore>,
    generation: Generation,
    slot: Arc<Mutex<Slot>>,
    activated: Arc<AtomicBool>,
}

impl AgentSession {
    pub fn new(convergence: ConvergenceLoop, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            convergence: Arc::new(convergence),
            store,
            generation: Generation::new(),
            slot: Arc::new(Mutex::new(Slot::default())),
            activated: Arc::new(AtomicBool::new(false)),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    /// `Running` while a run is in flight, otherwise how the last one ended.
    pub fn state(&self) -> RunState {
        let slot = self.slot();
        if slot.running {
            return RunState::Running;
        }
        match slot.last_outcome {
            Some(RunOutcome::Converged) => RunState::Converged,
            Some(RunOutcome::Exhausted) => RunState::Exhausted,
            Some(RunOutcome::Superseded) | None => RunState::Idle,
        }
    }

    /// Start a fresh run, superseding any run in flight. The first run of a
    /// session waits the initial delay before touching the page.
    #[instrument(level = "info", skip(self))]
    pub fn restart(&self) -> JoinHandle<RunReport> {
        // generation and slot change together so a finishing run never
        // observes one without the other
        let (guard, previous) = {
            let mut slot = self.slot();
            let guard = self.generation.advance();
            slot.running = true;
            let previous = slot.guard.replace(guard.clone());
            (guard, previous)
        };
        if let Some(previous) = previous {
            debug!(generation = previous.generation(), "Cancelling previous run");
            previous.cancel();
        }
        info!(generation = guard.generation(), "Starting run");

        let convergence = self.convergence.clone();
        let store = self.store.clone();
        let slot = self.slot.clone();
        let first = !self.activated.swap(true, Ordering::SeqCst);
        let initial_delay = convergence.settings().initial_delay();

        tokio::spawn(async move {
            let config = match store.load(convergence.fields()).await {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, "Could not load configuration, using defaults");
                    DesiredConfig::template(convergence.fields())
                }
            };
            let report = if first
                && !sleep_or_cancel(initial_delay, guard.cancellation_token()).await
            {
                RunReport {
                    outcome: RunOutcome::Superseded,
                    attempts_used: 0,
                    state: Default::default(),
                    sweeps: Vec::new(),
                }
            } else {
                convergence.run(&config, &guard).await
            };
            let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_current() {
                slot.running = false;
                slot.last_outcome = Some(report.outcome);
            }
            drop(slot);
            report
        })
    }

    /// React to a page identity change. Runs restart on matching pages;
    /// elsewhere the current run is stopped.
    pub fn on_navigation(&self, url: &str) -> Option<JoinHandle<RunReport>> {
        if url.starts_with(&self.convergence.settings().page_url_prefix) {
            info!(url, "Page changed, restarting");
            Some(self.restart())
        } else {
            debug!(url, "Left the target page, stopping");
            self.cancel_current(false);
            None
        }
    }

    fn cancel_current(&self, retire: bool) {
        let mut slot = self.slot();
        slot.running = false;
        if retire {
            // later continuations of any run see a newer generation
            let _ = self.generation.advance();
        }
        if let Some(guard) = slot.guard.take() {
            guard.cancel();
        }
    }

    /// Stop the current run for good.
    pub fn shutdown(&self) {
        self.cancel_current(true);
    }
}
