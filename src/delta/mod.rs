//! Delta Module
//!
//! Modification requests and their translation into targeted regeneration
//! plans.

mod request;
mod builder;

pub use request::{ModifyRequest, Strictness, ToggleValue};
pub use builder::{build_delta, infer_aspects, Delta, DeltaPlan};
