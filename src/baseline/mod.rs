//! Baseline Module
//!
//! Immutable, versioned records of accepted sheets and their persistence.

mod artifact;
mod repository;
mod memory;
mod sqlite;
mod store;

pub use artifact::{BaselineArtifact, BaselineView};
pub use repository::ArtifactRepository;
pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;
pub use store::BaselineStore;
