//! Artifact persistence seam
//!
//! Records are keyed by `(design_id, version)`. `put` is a conditional
//! insert: it never replaces an existing record.

use async_trait::async_trait;

use super::artifact::BaselineArtifact;
use crate::error::RepositoryError;

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Insert `artifact` unless its `(design_id, version)` already exists.
    async fn put(&self, artifact: &BaselineArtifact) -> Result<(), RepositoryError>;

    async fn get(&self, design_id: &str, version: u64) -> Result<Option<BaselineArtifact>, RepositoryError>;

    /// Versions of `design_id` in ascending order.
    async fn list_versions(&self, design_id: &str) -> Result<Vec<u64>, RepositoryError>;
}
