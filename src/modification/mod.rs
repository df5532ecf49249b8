//! Modification Engine
//!
//! Applies a bounded edit to an accepted baseline:
//! load baseline, build delta, regenerate affected views against their
//! baseline images, check drift, then commit a successor version only if
//! every affected view is accepted. Views in the retry band are regenerated
//! with a stricter lock up to a configured number of retries.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

use crate::baseline::{BaselineArtifact, BaselineStore, BaselineView};
use crate::delta::{build_delta, DeltaPlan, ModifyRequest, Strictness};
use crate::drift::{DriftDetector, DriftReport, PerceptualHash, Verdict, ViewDrift, ViewWeights};
use crate::error::ModifyError;
use crate::generation::{GeneratedView, GenerationClient, GenerationKnobs, ImageFetcher, SleepReason};
use crate::orchestrator::{RunContext, SheetEvent};
use crate::prompt::{ViewSpec, ViewType};

/// Influence added to the reference image on every retry.
const STRENGTH_STEP: f32 = 0.1;
const MAX_STRENGTH: f32 = 0.95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModificationSettings {
    /// Retries allowed for views in the retry band.
    pub max_retries: u32,
    /// Where drift reports are written, one file per attempt.
    pub report_dir: Option<PathBuf>,
    /// Weights of regenerated views in the report's consistency score.
    pub view_weights: ViewWeights,
}

impl Default for ModificationSettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            report_dir: None,
            view_weights: ViewWeights::new(),
        }
    }
}

/// Outcome of an accepted modification.
#[derive(Debug, Clone)]
pub struct ModifyResult {
    pub design_id: String,
    pub parent_version: u64,
    /// The newly committed baseline.
    pub artifact: BaselineArtifact,
    pub regenerated: Vec<GeneratedView>,
    pub carried: Vec<ViewType>,
    pub report: DriftReport,
    pub attempts: u32,
    pub strictness: Strictness,
}

impl ModifyResult {
    pub fn new_version(&self) -> u64 {
        self.artifact.version
    }
}

struct Candidate {
    view: GeneratedView,
    drift: ViewDrift,
}

pub struct ModificationEngine {
    client: Arc<GenerationClient>,
    store: BaselineStore,
    fetcher: Arc<dyn ImageFetcher>,
    detector: DriftDetector,
    settings: ModificationSettings,
}

impl ModificationEngine {
    pub fn new(
        client: Arc<GenerationClient>,
        store: BaselineStore,
        fetcher: Arc<dyn ImageFetcher>,
        detector: DriftDetector,
    ) -> Self {
        Self {
            client,
            store,
            fetcher,
            detector,
            settings: ModificationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ModificationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn modify(&self, request: &ModifyRequest, ctx: &RunContext) -> Result<ModifyResult, ModifyError> {
        request.validate()?;
        let baseline = self.store.load(&request.design_id, request.baseline_version).await?;
        let mut plan = build_delta(&baseline, request)?;
        info!(
            "Modifying {} v{}: {} affected, {} carried ({})",
            baseline.design_id,
            baseline.version,
            plan.affected.len(),
            plan.carried.len(),
            plan.delta.summary
        );
        ctx.emit(SheetEvent::ModificationStarted {
            design_id: baseline.design_id.clone(),
            baseline_version: baseline.version,
            affected: plan.affected_views(),
        });

        let references = self.baseline_images(&baseline, &plan).await?;
        let mut strength = request
            .image_strength
            .unwrap_or_else(|| plan.strictness.reference_strength());
        let mut accepted: BTreeMap<ViewType, Candidate> = BTreeMap::new();
        let mut latest: BTreeMap<ViewType, ViewDrift> = BTreeMap::new();
        let max_attempts = self.settings.max_retries + 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let knobs = GenerationKnobs {
                guidance: plan.strictness.guidance(),
                strength: Some(strength),
                ..self.client.default_knobs().clone()
            };
            let todo: Vec<&ViewSpec> = plan
                .affected
                .iter()
                .filter(|s| !accepted.contains_key(&s.view_type))
                .collect();

            let mut retry = Vec::new();
            for (i, spec) in todo.into_iter().enumerate() {
                if ctx.cancel.is_cancelled() {
                    warn!("Modification of {} cancelled", baseline.design_id);
                    return Err(ModifyError::Cancelled);
                }
                if i > 0 && !ctx.options.inter_call_delay.is_zero() {
                    self.client
                        .sleeper()
                        .sleep(ctx.options.inter_call_delay, SleepReason::Pacing)
                        .await;
                }

                let Some((reference, base_image)) = references.get(&spec.view_type) else {
                    continue;
                };
                let view_knobs = GenerationKnobs {
                    reference_image: Some(reference.image.clone()),
                    ..knobs.clone()
                };
                let view = self
                    .client
                    .generate_with(spec, &view_knobs)
                    .await
                    .map_err(|source| ModifyError::Generation {
                        view: spec.view_type,
                        source,
                    })?;

                let generated = self.fetcher.fetch(&view.image).await?;
                let hash = phash(generated.clone()).await;
                let drift = self
                    .detector
                    .compare(spec.view_type, generated, base_image.clone(), attempt)
                    .await;
                ctx.emit(SheetEvent::DriftChecked {
                    view_type: spec.view_type,
                    score: drift.score,
                    verdict: drift.verdict,
                    attempt,
                });
                latest.insert(spec.view_type, drift.clone());

                let view = GeneratedView {
                    perceptual_hash: hash,
                    ..view
                };
                match drift.verdict {
                    Verdict::Accepted => {
                        accepted.insert(spec.view_type, Candidate { view, drift });
                    }
                    Verdict::Retry => retry.push(drift),
                    Verdict::Rejected => {
                        let report = self.report(&baseline, &latest, attempt).await;
                        return Err(self.reject(&baseline, drift, report, ctx));
                    }
                }
            }

            let report = self.report(&baseline, &latest, attempt).await;
            if retry.is_empty() {
                return self.commit(&baseline, plan, accepted, report, attempt, ctx).await;
            }
            if attempt >= max_attempts {
                let worst_idx = (0..retry.len())
                    .min_by(|&a, &b| retry[a].score.total_cmp(&retry[b].score))
                    .unwrap_or(0);
                let worst = retry.swap_remove(worst_idx);
                warn!(
                    "{} still drifting after {} retries",
                    worst.view_type, self.settings.max_retries
                );
                return Err(self.reject(&baseline, worst, report, ctx));
            }

            plan = tighten(plan);
            // never loosen a lock the caller already set above the cap
            strength = (strength + STRENGTH_STEP)
                .max(plan.strictness.reference_strength())
                .min(MAX_STRENGTH.max(strength));
            warn!(
                "{} view(s) in retry band on attempt {}; raising lock to {} (strength {:.2})",
                retry.len(),
                attempt,
                plan.strictness,
                strength
            );
            ctx.emit(SheetEvent::StrictnessRaised {
                level: plan.strictness.to_string(),
                attempt: attempt + 1,
            });
        }
    }

    /// Baseline image ref and decoded pixels for every affected view.
    async fn baseline_images(
        &self,
        baseline: &BaselineArtifact,
        plan: &DeltaPlan,
    ) -> Result<BTreeMap<ViewType, (BaselineView, DynamicImage)>, ModifyError> {
        let mut out = BTreeMap::new();
        for view_type in plan.affected_views() {
            if let Some(view) = baseline.view(view_type) {
                let pixels = self.fetcher.fetch(&view.image).await?;
                out.insert(view_type, (view.clone(), pixels));
            }
        }
        Ok(out)
    }

    async fn report(
        &self,
        baseline: &BaselineArtifact,
        latest: &BTreeMap<ViewType, ViewDrift>,
        attempt: u32,
    ) -> DriftReport {
        let report = DriftReport::weighted(
            baseline.design_id.clone(),
            baseline.version,
            latest.values().cloned().collect(),
            self.detector.thresholds,
            &self.settings.view_weights,
        );
        if let Some(dir) = &self.settings.report_dir {
            let path = dir.join(format!(
                "{}-v{}-attempt{}.json",
                baseline.design_id, baseline.version, attempt
            ));
            if let Err(e) = report.save(&path).await {
                warn!("Failed to write drift report {}: {}", path.display(), e);
            }
        }
        report
    }

    fn reject(&self, baseline: &BaselineArtifact, drift: ViewDrift, report: DriftReport, ctx: &RunContext) -> ModifyError {
        warn!(
            "Modification of {} v{} rejected: {} scored {:.3}",
            baseline.design_id, baseline.version, drift.view_type, drift.score
        );
        ctx.emit(SheetEvent::ModificationRejected {
            design_id: baseline.design_id.clone(),
            reason: format!("{} drifted (score {:.3})", drift.view_type, drift.score),
        });
        ModifyError::DriftRejected {
            view: drift.view_type,
            score: drift.score,
            report: Box::new(report),
        }
    }

    async fn commit(
        &self,
        baseline: &BaselineArtifact,
        plan: DeltaPlan,
        accepted: BTreeMap<ViewType, Candidate>,
        report: DriftReport,
        attempts: u32,
        ctx: &RunContext,
    ) -> Result<ModifyResult, ModifyError> {
        let replaced = accepted
            .values()
            .map(|c| (c.view.view_type, BaselineView::from(&c.view)))
            .collect();
        let artifact = self
            .store
            .commit_successor(baseline, replaced, plan.delta.clone())
            .await?;
        ctx.emit(SheetEvent::ModificationCommitted {
            design_id: artifact.design_id.clone(),
            version: artifact.version,
        });
        info!(
            "Modification of {} accepted after {} attempt(s): v{} -> v{} (consistency {:.3})",
            baseline.design_id, attempts, baseline.version, artifact.version, report.consistency_score
        );
        debug_assert!(accepted.values().all(|c| c.drift.verdict == Verdict::Accepted));

        Ok(ModifyResult {
            design_id: artifact.design_id.clone(),
            parent_version: baseline.version,
            regenerated: accepted.into_values().map(|c| c.view).collect(),
            carried: plan.carried,
            report,
            attempts,
            strictness: plan.strictness,
            artifact,
        })
    }
}

fn tighten(plan: DeltaPlan) -> DeltaPlan {
    match plan.tightened() {
        Some(next) => next,
        None => plan,
    }
}

async fn phash(image: DynamicImage) -> Option<PerceptualHash> {
    task::spawn_blocking(move || PerceptualHash::of(&image)).await.ok()
}
