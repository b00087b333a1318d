//! Run state notifications.

use crate::convergence::RunState;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDetail {
    pub converged_count: usize,
    pub total_count: usize,
    pub pending_keys: Vec<String>,
}

/// A state transition together with its detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: RunState,
    pub detail: StatusDetail,
}

/// Receives every state transition of a run, synchronously.
pub trait StatusSink: Send + Sync {
    fn on_status_change(&self, state: RunState, detail: &StatusDetail);
}

/// Logs transitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn on_status_change(&self, state: RunState, detail: &StatusDetail) {
        match state {
            RunState::Exhausted => warn!(
                converged = detail.converged_count,
                total = detail.total_count,
                pending = ?detail.pending_keys,
                "Gave up before every setting converged"
            ),
            _ => info!(
                ?state,
                converged = detail.converged_count,
                total = detail.total_count,
                "Run status"
            ),
        }
    }
}

/// Publishes the latest update on a watch channel for a presentation layer.
#[derive(Debug)]
pub struct WatchStatusSink {
    tx: watch::Sender<Option<StatusUpdate>>,
}

impl WatchStatusSink {
    pub fn new() -> (Self, watch::Receiver<Option<StatusUpdate>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StatusUpdate>> {
        self.tx.subscribe()
    }
}

impl StatusSink for WatchStatusSink {
    fn on_status_change(&self, state: RunState, detail: &StatusDetail) {
        // no receivers is fine, the value is kept for later subscribers
        self.tx.send_replace(Some(StatusUpdate {
            state,
            detail: detail.clone(),
        }));
    }
}

/// Keeps every update in memory.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn states(&self) -> Vec<RunState> {
        self.updates().into_iter().map(|u| u.state).collect()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.updates().pop()
    }
}

impl StatusSink for RecordingStatusSink {
    fn on_status_change(&self, state: RunState, detail: &StatusDetail) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StatusUpdate {
                state,
                detail: detail.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_sink_keeps_the_latest_update() {
        let (sink, rx) = WatchStatusSink::new();
        sink.on_status_change(RunState::Running, &StatusDetail::default());
        sink.on_status_change(
            RunState::Converged,
            &StatusDetail {
                converged_count: 2,
                total_count: 2,
                pending_keys: vec![],
            },
        );
        let latest = rx.borrow().clone().unwrap();
        assert_eq!(latest.state, RunState::Converged);
        assert_eq!(latest.detail.converged_count, 2);
    }

    #[test]
    fn detail_serializes_in_camel_case() {
        let detail = StatusDetail {
            converged_count: 1,
            total_count: 3,
            pending_keys: vec!["topP".into()],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["pendingKeys"][0], "topP");
        assert_eq!(json["totalCount"], 3);
    }
}
