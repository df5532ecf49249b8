use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::delta::Delta;
use crate::dna::DesignDna;
use crate::drift::PerceptualHash;
use crate::generation::{GeneratedView, ImageRef};
use crate::prompt::ViewType;

/// Accepted image of one view inside a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineView {
    pub image: ImageRef,
    pub perceptual_hash: Option<PerceptualHash>,
    pub prompt: String,
}

impl From<&GeneratedView> for BaselineView {
    fn from(view: &GeneratedView) -> Self {
        Self {
            image: view.image.clone(),
            perceptual_hash: view.perceptual_hash,
            prompt: view.prompt.clone(),
        }
    }
}

/// Immutable, versioned record of a design's accepted views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineArtifact {
    pub design_id: String,
    /// Starts at 1; each save or accepted modification adds one.
    pub version: u64,
    pub parent_version: Option<u64>,
    pub dna: DesignDna,
    pub dna_fingerprint: String,
    pub seed: u64,
    pub views: BTreeMap<ViewType, BaselineView>,
    /// Modifications layered onto `dna`, oldest first.
    #[serde(default)]
    pub applied_deltas: Vec<Delta>,
    pub created_at: DateTime<Utc>,
}

impl BaselineArtifact {
    pub fn view_types(&self) -> Vec<ViewType> {
        self.views.keys().copied().collect()
    }

    pub fn view(&self, view_type: ViewType) -> Option<&BaselineView> {
        self.views.get(&view_type)
    }
}
