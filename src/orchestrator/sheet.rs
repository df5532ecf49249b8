//! Sheet Orchestrator
//!
//! Generates the requested views of one design strictly in sequence, all
//! from the same DNA and seed. A fatal failure or cancellation stops the run
//! and hands back a [`PartialSheet`] that can be resumed.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{info, warn};

use super::cancel::CancelFlag;
use super::events::{EventBus, SheetEvent};
use crate::baseline::BaselineStore;
use crate::dna::{DesignDna, MAX_FLOORS};
use crate::drift::PerceptualHash;
use crate::error::{GenerationError, SheetError, ValidationError};
use crate::generation::{GeneratedView, GenerationClient, GenerationKnobs, ImageFetcher, ImageRef, SleepReason};
use crate::prompt::{build_view_spec, ViewType};

/// Per-run switches, passed explicitly with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Pause between successful generation calls.
    pub inter_call_delay: Duration,
    pub compute_hashes: bool,
    pub save_baseline: bool,
    /// Overrides the client's default knobs.
    pub knobs: Option<GenerationKnobs>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            inter_call_delay: Duration::from_secs(2),
            compute_hashes: true,
            save_baseline: true,
            knobs: None,
        }
    }
}

/// Everything a single run needs besides its inputs.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub options: RunOptions,
    pub cancel: CancelFlag,
    pub events: Option<EventBus>,
}

impl RunContext {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn emit(&self, event: SheetEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// A fully generated sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetResult {
    pub design_id: String,
    pub dna: DesignDna,
    pub seed: u64,
    /// In requested order.
    pub views: Vec<GeneratedView>,
    /// Always 1.0 for a freshly generated sheet: there is nothing to drift from.
    pub consistency_score: f64,
    /// Set once the sheet has been saved as a baseline.
    pub baseline_version: Option<u64>,
}

impl SheetResult {
    pub fn view(&self, view_type: ViewType) -> Option<&GeneratedView> {
        self.views.iter().find(|v| v.view_type == view_type)
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone)]
pub enum FailureCause {
    Generation(GenerationError),
    Cancelled,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Generation(e) => write!(f, "{e}"),
            FailureCause::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// What a stopped run obtained and what it still owes.
#[derive(Debug, Clone)]
pub struct PartialSheet {
    pub design_id: String,
    pub dna: DesignDna,
    pub requested: Vec<ViewType>,
    pub completed: Vec<GeneratedView>,
    /// The view whose call failed; `None` when cancelled between views.
    pub failed_view: Option<ViewType>,
    /// Views never attempted.
    pub pending: Vec<ViewType>,
    pub cause: FailureCause,
}

impl PartialSheet {
    pub fn total(&self) -> usize {
        self.requested.len()
    }

    /// Views a resume must still generate, in requested order.
    pub fn remaining(&self) -> Vec<ViewType> {
        self.failed_view.iter().chain(self.pending.iter()).copied().collect()
    }
}

pub struct SheetOrchestrator {
    client: Arc<GenerationClient>,
    store: BaselineStore,
    fetcher: Option<Arc<dyn ImageFetcher>>,
}

impl SheetOrchestrator {
    pub fn new(client: Arc<GenerationClient>, store: BaselineStore) -> Self {
        Self {
            client,
            store,
            fetcher: None,
        }
    }

    /// Image access used to hash each generated view.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub async fn run_generation(
        &self,
        design_id: &str,
        dna: &DesignDna,
        view_types: &[ViewType],
        ctx: &RunContext,
    ) -> Result<SheetResult, SheetError> {
        validate_views(design_id, dna, view_types)?;
        info!(
            "Generating sheet {} ({} views, seed {})",
            design_id,
            view_types.len(),
            dna.seed
        );
        ctx.emit(SheetEvent::RunStarted {
            design_id: design_id.to_string(),
            total: view_types.len(),
        });

        let partial = PartialSheet {
            design_id: design_id.to_string(),
            dna: dna.clone(),
            requested: view_types.to_vec(),
            completed: Vec::new(),
            failed_view: None,
            pending: view_types.to_vec(),
            cause: FailureCause::Cancelled,
        };
        self.drive(partial, ctx).await
    }

    /// Generate only the views a stopped run still owes, with the same DNA
    /// and seed, then assemble and save the full sheet.
    pub async fn resume_generation(&self, partial: PartialSheet, ctx: &RunContext) -> Result<SheetResult, SheetError> {
        info!(
            "Resuming sheet {}: {} of {} views outstanding",
            partial.design_id,
            partial.remaining().len(),
            partial.total()
        );
        let pending = partial.remaining();
        let partial = PartialSheet {
            failed_view: None,
            pending,
            ..partial
        };
        self.drive(partial, ctx).await
    }

    async fn drive(&self, mut state: PartialSheet, ctx: &RunContext) -> Result<SheetResult, SheetError> {
        let todo = std::mem::take(&mut state.pending);
        let total = state.total();
        let knobs = ctx
            .options
            .knobs
            .clone()
            .unwrap_or_else(|| self.client.default_knobs().clone());

        for (i, view_type) in todo.iter().copied().enumerate() {
            if ctx.cancel.is_cancelled() {
                warn!(
                    "Sheet {} cancelled with {}/{} views done",
                    state.design_id,
                    state.completed.len(),
                    total
                );
                ctx.emit(SheetEvent::Cancelled {
                    completed: state.completed.len(),
                    total,
                });
                state.pending = todo[i..].to_vec();
                state.cause = FailureCause::Cancelled;
                return Err(SheetError::PartialFailure(Box::new(state)));
            }

            if i > 0 && !ctx.options.inter_call_delay.is_zero() {
                self.client
                    .sleeper()
                    .sleep(ctx.options.inter_call_delay, SleepReason::Pacing)
                    .await;
            }

            ctx.emit(SheetEvent::ViewStarted {
                view_type,
                index: state.completed.len(),
                total,
            });
            let spec = build_view_spec(&state.dna, view_type);
            match self.client.generate_with(&spec, &knobs).await {
                Ok(mut view) => {
                    if ctx.options.compute_hashes {
                        view.perceptual_hash = self.hash(&view.image).await;
                    }
                    ctx.emit(SheetEvent::ViewCompleted {
                        view_type,
                        attempts: view.attempts,
                    });
                    state.completed.push(view);
                }
                Err(e) => {
                    warn!("Sheet {} stopped at {}: {}", state.design_id, view_type, e);
                    ctx.emit(SheetEvent::ViewFailed {
                        view_type,
                        error: e.to_string(),
                    });
                    state.failed_view = Some(view_type);
                    state.pending = todo[i + 1..].to_vec();
                    state.cause = FailureCause::Generation(e);
                    return Err(SheetError::PartialFailure(Box::new(state)));
                }
            }
        }

        let mut views = state.completed;
        views.sort_by_key(|v| state.requested.iter().position(|r| *r == v.view_type));
        let mut sheet = SheetResult {
            design_id: state.design_id,
            seed: state.dna.seed,
            dna: state.dna,
            views,
            consistency_score: 1.0,
            baseline_version: None,
        };

        if ctx.options.save_baseline {
            let artifact = self.store.save(&sheet).await?;
            sheet.baseline_version = Some(artifact.version);
            ctx.emit(SheetEvent::BaselineSaved {
                design_id: artifact.design_id,
                version: artifact.version,
            });
        }
        info!("Sheet {} complete with {} views", sheet.design_id, sheet.views.len());
        Ok(sheet)
    }

    async fn hash(&self, image: &ImageRef) -> Option<PerceptualHash> {
        let fetcher = self.fetcher.as_ref()?;
        match fetcher.fetch(image).await {
            Ok(pixels) => task::spawn_blocking(move || PerceptualHash::of(&pixels)).await.ok(),
            Err(e) => {
                warn!("Could not hash {}: {}", image, e);
                None
            }
        }
    }
}

/// Reject view requests that cannot produce a coherent sheet.
fn validate_views(design_id: &str, dna: &DesignDna, view_types: &[ViewType]) -> Result<(), ValidationError> {
    if design_id.trim().is_empty() {
        return Err(ValidationError::new("design_id", "must not be empty"));
    }
    if view_types.is_empty() {
        return Err(ValidationError::new("view_types", "at least one view is required"));
    }
    let mut seen = HashSet::new();
    for view in view_types {
        if !seen.insert(view) {
            return Err(ValidationError::new("view_types", format!("duplicate view `{view}`")));
        }
    }
    if dna.dimensions.floor_count == 0 || dna.dimensions.floor_count > MAX_FLOORS {
        return Err(ValidationError::new(
            "floor_count",
            format!("must lie in 1..={MAX_FLOORS}"),
        ));
    }
    if view_types.contains(&ViewType::FloorPlanUpper) && dna.dimensions.floor_count < 2 {
        return Err(ValidationError::new(
            "view_types",
            "upper floor plan requested for a single-storey design",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::InMemoryRepository;
    use crate::dna::fixtures::brick_house;
    use crate::generation::{
        ImageProvider, ImageRequest, ImageResponse, ProviderFailure, RecordingSleeper,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a script, then succeeds forever.
    struct Scripted {
        script: Mutex<VecDeque<ProviderFailure>>,
        prompts: Mutex<Vec<String>>,
        /// Raise the flag once this many calls have been made.
        cancel_after: Mutex<Option<(usize, CancelFlag)>>,
    }

    impl Scripted {
        fn new(failures: Vec<ProviderFailure>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(failures.into()),
                prompts: Mutex::new(Vec::new()),
                cancel_after: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ImageProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, ProviderFailure> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            if let Some(failure) = self.script.lock().unwrap().pop_front() {
                return Err(failure);
            }
            let n = self.prompts.lock().unwrap().len();
            if let Some((after, flag)) = self.cancel_after.lock().unwrap().as_ref() {
                if n >= *after {
                    flag.cancel();
                }
            }
            Ok(ImageResponse {
                image: ImageRef::new(format!("mem://img-{n}")),
                seed: Some(request.seed),
            })
        }
    }

    fn orchestrator(provider: Arc<Scripted>, sleeper: Arc<RecordingSleeper>) -> SheetOrchestrator {
        let client = GenerationClient::new(provider).with_sleeper(sleeper);
        SheetOrchestrator::new(Arc::new(client), BaselineStore::new(Arc::new(InMemoryRepository::new())))
    }

    const VIEWS: [ViewType; 3] = [ViewType::FloorPlanGround, ViewType::ElevationSouth, ViewType::ExteriorFront];

    #[tokio::test]
    async fn test_full_run_saves_baseline_and_paces() {
        let sleeper = Arc::new(RecordingSleeper::new());
        let orch = orchestrator(Scripted::new(vec![]), sleeper.clone());
        let sheet = orch
            .run_generation("house", &brick_house(), &VIEWS, &RunContext::default())
            .await
            .unwrap();

        assert_eq!(sheet.views.len(), 3);
        assert_eq!(sheet.baseline_version, Some(1));
        assert_eq!(sheet.consistency_score, 1.0);
        assert!(sheet.views.iter().all(|v| v.seed == 42));
        assert_eq!(sheet.views.iter().map(|v| v.view_type).collect::<Vec<_>>(), VIEWS.to_vec());
        assert_eq!(sleeper.pacing().len(), 2);
        assert!(sleeper.backoffs().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_rejected_up_front() {
        let provider = Scripted::new(vec![]);
        let orch = orchestrator(provider.clone(), Arc::new(RecordingSleeper::new()));
        let ctx = RunContext::default();
        let dna = brick_house();

        let empty = orch.run_generation("house", &dna, &[], &ctx).await;
        assert!(matches!(empty, Err(SheetError::Validation(_))));

        let dup = [ViewType::ElevationSouth, ViewType::ElevationSouth];
        assert!(matches!(orch.run_generation("house", &dna, &dup, &ctx).await, Err(SheetError::Validation(_))));

        let mut bungalow = dna.clone();
        bungalow.dimensions.floor_count = 1;
        let upper = [ViewType::FloorPlanUpper];
        assert!(matches!(
            orch.run_generation("house", &bungalow, &upper, &ctx).await,
            Err(SheetError::Validation(_))
        ));

        let mut tower = dna.clone();
        tower.dimensions.floor_count = 50_000_000;
        assert!(matches!(
            orch.run_generation("house", &tower, &[ViewType::SectionLong], &ctx).await,
            Err(SheetError::Validation(_))
        ));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_error_returns_partial_then_resume() {
        let provider = Scripted::new(vec![ProviderFailure::Quota("out of credit".into())]);
        let orch = orchestrator(provider.clone(), Arc::new(RecordingSleeper::new()));
        let ctx = RunContext::default();

        // first call fails; nothing is completed yet
        let err = orch.run_generation("house", &brick_house(), &VIEWS, &ctx).await.unwrap_err();
        let SheetError::PartialFailure(partial) = err else {
            panic!("expected partial failure");
        };
        assert!(partial.completed.is_empty());
        assert_eq!(partial.failed_view, Some(ViewType::FloorPlanGround));
        assert_eq!(partial.pending, vec![ViewType::ElevationSouth, ViewType::ExteriorFront]);
        assert!(matches!(partial.cause, FailureCause::Generation(GenerationError::Provider { .. })));

        let sheet = orch.resume_generation(*partial, &ctx).await.unwrap();
        assert_eq!(sheet.views.len(), 3);
        assert_eq!(sheet.views[0].view_type, ViewType::FloorPlanGround);
        assert_eq!(sheet.baseline_version, Some(1));
    }

    #[tokio::test]
    async fn test_cancellation_keeps_obtained_views() {
        let cancel = CancelFlag::new();
        let provider = Scripted::new(vec![]);
        *provider.cancel_after.lock().unwrap() = Some((1, cancel.clone()));
        let orch = orchestrator(provider, Arc::new(RecordingSleeper::new()));

        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let ctx = RunContext::default().with_cancel(cancel).with_events(bus);

        let err = orch
            .run_generation("house", &brick_house(), &VIEWS, &ctx)
            .await
            .unwrap_err();
        let SheetError::PartialFailure(partial) = err else {
            panic!("expected partial failure");
        };
        assert!(matches!(partial.cause, FailureCause::Cancelled));
        assert_eq!(partial.completed.len(), 1);
        assert_eq!(partial.failed_view, None);
        assert_eq!(partial.pending, vec![ViewType::ElevationSouth, ViewType::ExteriorFront]);

        let mut saw_cancelled = false;
        while let Ok(event) = rx.try_recv() {
            saw_cancelled |= matches!(event, SheetEvent::Cancelled { completed: 1, total: 3 });
        }
        assert!(saw_cancelled);
    }
}
