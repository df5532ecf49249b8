//! Drift Detector
//!
//! Scores a regenerated view against its baseline image and applies the
//! accept/retry/reject policy.

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::task;
use tracing::debug;

use super::edges::edge_alignment;
use super::phash::PerceptualHash;
use super::ssim::{aligned_pair, mean_ssim};
use crate::error::ConfigError;
use crate::prompt::ViewType;

/// Longest side images are reduced to before SSIM and edge comparison.
const WORKING_SIDE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Retry,
    Rejected,
}

impl Verdict {
    fn severity(self) -> u8 {
        match self {
            Verdict::Accepted => 0,
            Verdict::Retry => 1,
            Verdict::Rejected => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    /// Scores at or above this are accepted.
    pub accept: f64,
    /// Scores below this are rejected outright; between the two, retry.
    pub floor: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            accept: 0.9,
            floor: 0.7,
        }
    }
}

impl DriftThresholds {
    pub fn verdict(&self, score: f64) -> Verdict {
        if score >= self.accept {
            Verdict::Accepted
        } else if score >= self.floor {
            Verdict::Retry
        } else {
            Verdict::Rejected
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.accept) || !in_unit(self.floor) {
            return Err(ConfigError::Invalid {
                key: "drift.thresholds".into(),
                reason: "thresholds must lie in [0, 1]".into(),
            });
        }
        if self.floor > self.accept {
            return Err(ConfigError::Invalid {
                key: "drift.thresholds.floor".into(),
                reason: format!("floor {} exceeds accept {}", self.floor, self.accept),
            });
        }
        Ok(())
    }
}

/// Relative weights of the metrics in the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftWeights {
    pub ssim: f64,
    pub phash: f64,
    pub edges: f64,
    /// Dilation radius for edge matching.
    pub edge_tolerance_px: u32,
}

impl Default for DriftWeights {
    fn default() -> Self {
        Self {
            ssim: 0.6,
            phash: 0.4,
            edges: 0.0,
            edge_tolerance_px: 3,
        }
    }
}

impl DriftWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.ssim, self.phash, self.edges];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || all.iter().sum::<f64>() <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "drift.weights".into(),
                reason: "weights must be non-negative with a positive sum".into(),
            });
        }
        Ok(())
    }

    fn combine(&self, ssim: f64, phash: f64, edges: Option<f64>) -> f64 {
        let mut total = self.ssim * ssim + self.phash * phash;
        let mut weight = self.ssim + self.phash;
        if let Some(f1) = edges {
            total += self.edges * f1;
            weight += self.edges;
        }
        if weight <= 0.0 {
            return 0.0;
        }
        (total / weight).clamp(0.0, 1.0)
    }
}

/// Per-view weight in a report's consistency score. Views not listed weigh 1.0.
pub type ViewWeights = BTreeMap<ViewType, f64>;

/// Weighted mean of view scores; 1.0 when nothing was compared. Falls back to
/// the plain mean when every compared view weighs zero.
fn consistency(views: &[ViewDrift], weights: &ViewWeights) -> f64 {
    if views.is_empty() {
        return 1.0;
    }
    let weight = |v: &ViewDrift| weights.get(&v.view_type).copied().unwrap_or(1.0);
    let total: f64 = views.iter().map(weight).sum();
    if total <= 0.0 {
        return views.iter().map(|v| v.score).sum::<f64>() / views.len() as f64;
    }
    views.iter().map(|v| weight(v) * v.score).sum::<f64>() / total
}

/// Drift of one regenerated view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDrift {
    pub view_type: ViewType,
    pub ssim: f64,
    pub phash_similarity: f64,
    /// Present when edge alignment carries weight.
    pub edge_f1: Option<f64>,
    pub score: f64,
    pub verdict: Verdict,
    pub attempt: u32,
}

/// Per-view drift of one modification attempt plus the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub design_id: String,
    pub baseline_version: u64,
    pub views: Vec<ViewDrift>,
    /// Weighted mean score over views; 1.0 when nothing was compared.
    pub consistency_score: f64,
    pub verdict: Verdict,
    pub thresholds: DriftThresholds,
    pub created_at: DateTime<Utc>,
}

impl DriftReport {
    /// Report with every view weighted equally.
    pub fn new(
        design_id: impl Into<String>,
        baseline_version: u64,
        views: Vec<ViewDrift>,
        thresholds: DriftThresholds,
    ) -> Self {
        Self::weighted(design_id, baseline_version, views, thresholds, &ViewWeights::new())
    }

    pub fn weighted(
        design_id: impl Into<String>,
        baseline_version: u64,
        views: Vec<ViewDrift>,
        thresholds: DriftThresholds,
        weights: &ViewWeights,
    ) -> Self {
        let consistency_score = consistency(&views, weights);
        let verdict = views
            .iter()
            .map(|v| v.verdict)
            .max_by_key(|v| v.severity())
            .unwrap_or(Verdict::Accepted);
        Self {
            design_id: design_id.into(),
            baseline_version,
            views,
            consistency_score,
            verdict,
            thresholds,
            created_at: Utc::now(),
        }
    }

    /// The lowest-scoring view, if any.
    pub fn worst(&self) -> Option<&ViewDrift> {
        self.views.iter().min_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn view(&self, view_type: ViewType) -> Option<&ViewDrift> {
        self.views.iter().find(|v| v.view_type == view_type)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, json).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftDetector {
    pub thresholds: DriftThresholds,
    pub weights: DriftWeights,
}

impl DriftDetector {
    pub fn new(thresholds: DriftThresholds, weights: DriftWeights) -> Self {
        Self { thresholds, weights }
    }

    /// Compare synchronously. CPU-bound; prefer [`DriftDetector::compare`]
    /// from async code.
    pub fn score(
        &self,
        view_type: ViewType,
        generated: &DynamicImage,
        baseline: &DynamicImage,
        attempt: u32,
    ) -> ViewDrift {
        let (gen_gray, base_gray) = aligned_pair(generated, baseline, WORKING_SIDE);
        let ssim = mean_ssim(&gen_gray, &base_gray);
        let phash_similarity = PerceptualHash::of(generated).similarity(&PerceptualHash::of(baseline));
        let edge_f1 = (self.weights.edges > 0.0)
            .then(|| edge_alignment(&gen_gray, &base_gray, self.weights.edge_tolerance_px).f1);

        let score = self.weights.combine(ssim, phash_similarity, edge_f1);
        let verdict = self.thresholds.verdict(score);
        debug!(
            "Drift {} attempt {}: ssim={:.3} phash={:.3} edges={:?} score={:.3} -> {:?}",
            view_type, attempt, ssim, phash_similarity, edge_f1, score, verdict
        );
        ViewDrift {
            view_type,
            ssim,
            phash_similarity,
            edge_f1,
            score,
            verdict,
            attempt,
        }
    }

    pub async fn compare(
        &self,
        view_type: ViewType,
        generated: DynamicImage,
        baseline: DynamicImage,
        attempt: u32,
    ) -> ViewDrift {
        let detector = *self;
        let scored = task::spawn_blocking(move || detector.score(view_type, &generated, &baseline, attempt)).await;
        match scored {
            Ok(drift) => drift,
            // scoring panicked: nothing comparable came out of this view
            Err(_) => ViewDrift {
                view_type,
                ssim: 0.0,
                phash_similarity: 0.0,
                edge_f1: None,
                score: 0.0,
                verdict: Verdict::Rejected,
                attempt,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn pattern(seed: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
            Luma([((x * 31 + y * 17 + seed) ^ (x * y)) as u8])
        }))
    }

    #[test]
    fn test_verdict_bands() {
        let t = DriftThresholds::default();
        assert_eq!(t.verdict(0.95), Verdict::Accepted);
        assert_eq!(t.verdict(0.9), Verdict::Accepted);
        assert_eq!(t.verdict(0.8), Verdict::Retry);
        assert_eq!(t.verdict(0.7), Verdict::Retry);
        assert_eq!(t.verdict(0.69), Verdict::Rejected);
    }

    #[test]
    fn test_identical_images_accept() {
        let detector = DriftDetector::default();
        let img = pattern(0);
        let drift = detector.score(ViewType::ElevationSouth, &img, &img, 1);
        assert!((drift.score - 1.0).abs() < 1e-9);
        assert_eq!(drift.verdict, Verdict::Accepted);
        assert_eq!(drift.edge_f1, None);
    }

    #[test]
    fn test_inverted_image_rejected() {
        let detector = DriftDetector::default();
        let img = pattern(0);
        let mut inverted = img.clone();
        inverted.invert();
        let drift = detector.score(ViewType::ElevationSouth, &inverted, &img, 1);
        assert_eq!(drift.verdict, Verdict::Rejected, "score {}", drift.score);
    }

    #[test]
    fn test_edges_weight_enables_metric() {
        let detector = DriftDetector::new(
            DriftThresholds::default(),
            DriftWeights {
                edges: 0.2,
                ..DriftWeights::default()
            },
        );
        let img = pattern(3);
        let drift = detector.score(ViewType::SectionLong, &img, &img, 1);
        assert_eq!(drift.edge_f1, Some(1.0));
    }

    #[test]
    fn test_validation() {
        assert!(DriftThresholds { accept: 0.6, floor: 0.7 }.validate().is_err());
        assert!(DriftThresholds { accept: 1.2, floor: 0.7 }.validate().is_err());
        assert!(DriftThresholds::default().validate().is_ok());
        let zero = DriftWeights { ssim: 0.0, phash: 0.0, edges: 0.0, edge_tolerance_px: 1 };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_report_aggregate_takes_worst_verdict() {
        let view = |view_type, score, verdict| ViewDrift {
            view_type,
            ssim: score,
            phash_similarity: score,
            edge_f1: None,
            score,
            verdict,
            attempt: 1,
        };
        let report = DriftReport::new(
            "d",
            1,
            vec![
                view(ViewType::ElevationSouth, 0.95, Verdict::Accepted),
                view(ViewType::ExteriorFront, 0.75, Verdict::Retry),
            ],
            DriftThresholds::default(),
        );
        assert_eq!(report.verdict, Verdict::Retry);
        assert!((report.consistency_score - 0.85).abs() < 1e-9);
        assert_eq!(report.worst().map(|v| v.view_type), Some(ViewType::ExteriorFront));
    }

    #[test]
    fn test_view_weights_shift_consistency() {
        let view = |view_type, score| ViewDrift {
            view_type,
            ssim: score,
            phash_similarity: score,
            edge_f1: None,
            score,
            verdict: DriftThresholds::default().verdict(score),
            attempt: 1,
        };
        let views = vec![
            view(ViewType::ElevationSouth, 1.0),
            view(ViewType::Interior, 0.7),
        ];
        let weights = ViewWeights::from([(ViewType::ElevationSouth, 3.0)]);
        let report = DriftReport::weighted("d", 1, views.clone(), DriftThresholds::default(), &weights);
        assert!((report.consistency_score - 0.925).abs() < 1e-9);

        let zero = ViewWeights::from([(ViewType::ElevationSouth, 0.0), (ViewType::Interior, 0.0)]);
        let report = DriftReport::weighted("d", 1, views, DriftThresholds::default(), &zero);
        assert!((report.consistency_score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_report_saves_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("drift.json");
        let report = DriftReport::new("d", 3, Vec::new(), DriftThresholds::default());
        report.save(&path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let back: DriftReport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.baseline_version, 3);
        assert_eq!(back.verdict, Verdict::Accepted);
    }
}
