//! archsheet
//!
//! Consistent architectural visualization sheets:
//! - Design DNA normalization into one canonical spec
//! - Seed-locked, deterministic per-view prompts
//! - Sequential, rate-limit-aware generation with resumable partial results
//! - Append-only baseline versions
//! - Bounded modifications validated by visual drift checks

pub mod baseline;
pub mod config;
pub mod delta;
pub mod dna;
pub mod drift;
pub mod error;
pub mod generation;
pub mod modification;
pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod telemetry;
pub mod utils;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use delta::{ModifyRequest, Strictness, ToggleValue};
pub use dna::{normalize, ContextDefaults, DesignDna};
pub use error::{ModifyError, SheetError, StoreError, ValidationError};
pub use orchestrator::{CancelFlag, RunContext, RunOptions, SheetEvent, SheetResult};
pub use prompt::{build_view_spec, ViewSpec, ViewType};
pub use service::SheetService;
