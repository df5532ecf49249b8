//! Baseline Store
//!
//! Append-only versioning over an [`ArtifactRepository`]. Existing versions
//! are never rewritten: a save creates the next version, and a modification
//! commits exactly `parent + 1` or reports a conflict.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::artifact::{BaselineArtifact, BaselineView};
use super::repository::ArtifactRepository;
use crate::delta::Delta;
use crate::error::{RepositoryError, StoreError};
use crate::orchestrator::SheetResult;
use crate::prompt::ViewType;

const DEFAULT_SAVE_ATTEMPTS: u32 = 5;

#[derive(Clone)]
pub struct BaselineStore {
    repo: Arc<dyn ArtifactRepository>,
    save_attempts: u32,
}

impl BaselineStore {
    pub fn new(repo: Arc<dyn ArtifactRepository>) -> Self {
        Self {
            repo,
            save_attempts: DEFAULT_SAVE_ATTEMPTS,
        }
    }

    pub fn with_save_attempts(mut self, attempts: u32) -> Self {
        self.save_attempts = attempts.max(1);
        self
    }

    /// Persist a completed sheet as the next version of its design.
    pub async fn save(&self, sheet: &SheetResult) -> Result<BaselineArtifact, StoreError> {
        let views: BTreeMap<ViewType, BaselineView> = sheet
            .views
            .iter()
            .map(|v| (v.view_type, BaselineView::from(v)))
            .collect();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let latest = self.latest_version(&sheet.design_id).await?;
            let artifact = BaselineArtifact {
                design_id: sheet.design_id.clone(),
                version: latest.map_or(1, |v| v + 1),
                parent_version: latest,
                dna: sheet.dna.clone(),
                dna_fingerprint: sheet.dna.fingerprint(),
                seed: sheet.seed,
                views: views.clone(),
                applied_deltas: Vec::new(),
                created_at: Utc::now(),
            };

            match self.repo.put(&artifact).await {
                Ok(()) => {
                    info!(
                        "Saved baseline {} v{} ({} views)",
                        artifact.design_id,
                        artifact.version,
                        artifact.views.len()
                    );
                    return Ok(artifact);
                }
                Err(RepositoryError::Conflict { version, .. }) if attempt < self.save_attempts => {
                    warn!(
                        "Baseline {} v{} taken concurrently; retrying ({}/{})",
                        sheet.design_id, version, attempt, self.save_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Commit the successor of `parent`: unaffected views carried over,
    /// `replaced` views swapped in, `delta` appended to the history.
    pub async fn commit_successor(
        &self,
        parent: &BaselineArtifact,
        replaced: BTreeMap<ViewType, BaselineView>,
        delta: Delta,
    ) -> Result<BaselineArtifact, StoreError> {
        let mut views = parent.views.clone();
        views.extend(replaced);
        let mut applied_deltas = parent.applied_deltas.clone();
        applied_deltas.push(delta);

        let artifact = BaselineArtifact {
            design_id: parent.design_id.clone(),
            version: parent.version + 1,
            parent_version: Some(parent.version),
            dna: parent.dna.clone(),
            dna_fingerprint: parent.dna_fingerprint.clone(),
            seed: parent.seed,
            views,
            applied_deltas,
            created_at: Utc::now(),
        };
        self.repo.put(&artifact).await?;
        info!(
            "Committed baseline {} v{} (parent v{})",
            artifact.design_id, artifact.version, parent.version
        );
        Ok(artifact)
    }

    /// Load a specific version, or the latest when `version` is `None`.
    pub async fn load(&self, design_id: &str, version: Option<u64>) -> Result<BaselineArtifact, StoreError> {
        let not_found = || StoreError::NotFound {
            design_id: design_id.to_string(),
            version,
        };
        let target = match version {
            Some(v) => v,
            None => self.latest_version(design_id).await?.ok_or_else(not_found)?,
        };
        self.repo.get(design_id, target).await?.ok_or_else(not_found)
    }

    pub async fn versions(&self, design_id: &str) -> Result<Vec<u64>, StoreError> {
        Ok(self.repo.list_versions(design_id).await?)
    }

    async fn latest_version(&self, design_id: &str) -> Result<Option<u64>, StoreError> {
        Ok(self.repo.list_versions(design_id).await?.into_iter().max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::InMemoryRepository;
    use crate::delta::Delta;
    use crate::dna::fixtures::brick_house;
    use crate::generation::{GeneratedView, ImageRef};

    fn sheet(design_id: &str) -> SheetResult {
        let dna = brick_house();
        let view = |view_type, image: &str| GeneratedView {
            view_type,
            image: ImageRef::new(image),
            seed: dna.seed,
            prompt: format!("prompt for {view_type}"),
            attempts: 1,
            perceptual_hash: None,
            generated_at: Utc::now(),
        };
        SheetResult {
            design_id: design_id.to_string(),
            seed: dna.seed,
            views: vec![
                view(ViewType::ElevationSouth, "mem://s"),
                view(ViewType::ExteriorFront, "mem://f"),
            ],
            dna,
            consistency_score: 1.0,
            baseline_version: None,
        }
    }

    fn store() -> BaselineStore {
        BaselineStore::new(Arc::new(InMemoryRepository::new()))
    }

    #[tokio::test]
    async fn test_save_then_load_latest() {
        let store = store();
        let saved = store.save(&sheet("house")).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(saved.parent_version, None);

        let loaded = store.load("house", None).await.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.dna_fingerprint, brick_house().fingerprint());
    }

    #[tokio::test]
    async fn test_sequential_saves_increase_versions() {
        let store = store();
        for expected in 1..=3 {
            assert_eq!(store.save(&sheet("house")).await.unwrap().version, expected);
        }
        assert_eq!(store.versions("house").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(store.load("house", Some(2)).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = store();
        assert!(matches!(
            store.load("nope", None).await,
            Err(StoreError::NotFound { version: None, .. })
        ));
        store.save(&sheet("house")).await.unwrap();
        assert!(matches!(
            store.load("house", Some(9)).await,
            Err(StoreError::NotFound { version: Some(9), .. })
        ));
    }

    #[tokio::test]
    async fn test_successor_conflict_leaves_versions_intact() {
        let store = store();
        let base = store.save(&sheet("house")).await.unwrap();

        let mut replaced = BTreeMap::new();
        replaced.insert(
            ViewType::ElevationSouth,
            BaselineView {
                image: ImageRef::new("mem://s2"),
                perceptual_hash: None,
                prompt: "new".into(),
            },
        );
        let next = store
            .commit_successor(&base, replaced.clone(), Delta::default())
            .await
            .unwrap();
        assert_eq!(next.version, 2);
        assert_eq!(next.views[&ViewType::ExteriorFront].image, ImageRef::new("mem://f"));
        assert_eq!(next.views[&ViewType::ElevationSouth].image, ImageRef::new("mem://s2"));
        assert_eq!(next.applied_deltas.len(), 1);

        let err = store
            .commit_successor(&base, replaced, Delta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { version: 2, .. }));
        assert_eq!(store.versions("house").await.unwrap(), vec![1, 2]);
        assert_eq!(store.load("house", Some(1)).await.unwrap(), base);
    }
}
