use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::artifact::BaselineArtifact;
use super::repository::ArtifactRepository;
use crate::error::RepositoryError;

/// Process-local repository.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<String, BTreeMap<u64, BaselineArtifact>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryRepository {
    async fn put(&self, artifact: &BaselineArtifact) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let versions = records.entry(artifact.design_id.clone()).or_default();
        if versions.contains_key(&artifact.version) {
            return Err(RepositoryError::Conflict {
                key: artifact.design_id.clone(),
                version: artifact.version,
            });
        }
        versions.insert(artifact.version, artifact.clone());
        Ok(())
    }

    async fn get(&self, design_id: &str, version: u64) -> Result<Option<BaselineArtifact>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(design_id).and_then(|v| v.get(&version)).cloned())
    }

    async fn list_versions(&self, design_id: &str) -> Result<Vec<u64>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records
            .get(design_id)
            .map(|v| v.keys().copied().collect())
            .unwrap_or_default())
    }
}
