//! Design DNA Module
//!
//! Canonical design description, its normalizer, and the helpers that turn
//! loosely-structured upstream output into normalizer input.

mod types;
mod normalizer;
pub mod lenient;
pub mod extract;

pub use types::{DesignDna, Dimensions, Fenestration, Material, Orientation, Roof};
pub use normalizer::{normalize, ContextDefaults, DEFAULT_FLOOR_HEIGHT_M, DEFAULT_STYLE, MAX_FLOORS};
pub use lenient::{parse_lenient, Lenient};
pub use extract::{BriefExtractor, DesignProposal};

#[cfg(test)]
pub(crate) use types::fixtures;
