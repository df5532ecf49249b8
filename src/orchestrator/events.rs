//! Progress events
//!
//! Per-run pub/sub for progress reporting. Publishing never blocks and never
//! fails; events without subscribers are dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::drift::Verdict;
use crate::prompt::ViewType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SheetEvent {
    RunStarted { design_id: String, total: usize },
    ViewStarted { view_type: ViewType, index: usize, total: usize },
    ViewCompleted { view_type: ViewType, attempts: u32 },
    ViewFailed { view_type: ViewType, error: String },
    Cancelled { completed: usize, total: usize },
    BaselineSaved { design_id: String, version: u64 },
    ModificationStarted { design_id: String, baseline_version: u64, affected: Vec<ViewType> },
    DriftChecked { view_type: ViewType, score: f64, verdict: Verdict, attempt: u32 },
    StrictnessRaised { level: String, attempt: u32 },
    ModificationCommitted { design_id: String, version: u64 },
    ModificationRejected { design_id: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SheetEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn publish(&self, event: SheetEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SheetEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
