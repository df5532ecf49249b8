//! Orchestrator Module
//!
//! Sequential, seed-locked sheet generation with progress events and
//! cooperative cancellation.

mod sheet;
pub mod events;
mod cancel;

pub use sheet::{FailureCause, PartialSheet, RunContext, RunOptions, SheetOrchestrator, SheetResult};
pub use events::{EventBus, SheetEvent};
pub use cancel::CancelFlag;
