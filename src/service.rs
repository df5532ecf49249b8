//! Sheet Service
//!
//! Caller-facing entry point. Owns one generation client, one baseline store
//! and one progress bus, and is safe to share across tasks via `Arc` so that
//! independent designs can run concurrently.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

use crate::baseline::{ArtifactRepository, BaselineArtifact, BaselineStore, InMemoryRepository, SqliteRepository};
use crate::config::{PipelineConfig, ProviderConfig, StorageBackend};
use crate::delta::ModifyRequest;
use crate::dna::{normalize, BriefExtractor, ContextDefaults, DesignDna};
use crate::drift::DriftDetector;
use crate::error::{ConfigError, ModifyError, SheetError, StoreError};
use crate::generation::{
    GenerationClient, ImageFetcher, ImageResolver, OpenAiImageProvider, OpenAiTextProvider,
};
use crate::modification::{ModificationEngine, ModificationSettings, ModifyResult};
use crate::orchestrator::{EventBus, PartialSheet, RunContext, RunOptions, SheetEvent, SheetOrchestrator, SheetResult};
use crate::prompt::ViewType;

pub struct SheetService {
    orchestrator: SheetOrchestrator,
    engine: ModificationEngine,
    extractor: BriefExtractor,
    store: BaselineStore,
    events: EventBus,
    project: ContextDefaults,
    default_views: Vec<ViewType>,
    options: RunOptions,
}

impl SheetService {
    pub fn new(
        client: Arc<GenerationClient>,
        repo: Arc<dyn ArtifactRepository>,
        fetcher: Arc<dyn ImageFetcher>,
        detector: DriftDetector,
    ) -> Self {
        let store = BaselineStore::new(repo);
        let orchestrator = SheetOrchestrator::new(client.clone(), store.clone()).with_fetcher(fetcher.clone());
        let extractor = BriefExtractor::new(client.clone(), ProviderConfig::default().text_model);
        let engine = ModificationEngine::new(client, store.clone(), fetcher, detector);
        Self {
            orchestrator,
            engine,
            extractor,
            store,
            events: EventBus::new(),
            project: ContextDefaults::default(),
            default_views: vec![ViewType::FloorPlanGround, ViewType::ElevationSouth, ViewType::ExteriorFront],
            options: RunOptions::default(),
        }
    }

    pub fn with_modification(mut self, settings: ModificationSettings) -> Self {
        self.engine = self.engine.with_settings(settings);
        self
    }

    pub fn with_project_defaults(mut self, project: ContextDefaults) -> Self {
        self.project = project;
        self
    }

    /// Chat model used to turn free-text briefs into a raw design.
    pub fn with_text_model(mut self, model: impl Into<String>) -> Self {
        self.extractor = self.extractor.with_model(model);
        self
    }

    pub fn with_default_views(mut self, views: Vec<ViewType>) -> Self {
        self.default_views = views;
        self
    }

    pub fn with_run_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Wire the HTTP providers, storage backend and image resolver described
    /// by `config`.
    pub async fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; provider calls will be unauthenticated",
                config.provider.api_key_env
            );
        }

        let images = OpenAiImageProvider::new(
            config.provider.base_url.clone(),
            api_key.clone(),
            config.provider.image_model.clone(),
        )
        .with_rate_limit(config.provider.requests_per_minute);
        let text = OpenAiTextProvider::new(config.provider.base_url.clone(), api_key)
            .with_rate_limit(config.provider.requests_per_minute);
        let client = GenerationClient::new(Arc::new(images))
            .with_text(Arc::new(text))
            .with_policy(config.retry.policy())
            .with_timeout(Duration::from_secs(config.provider.timeout_secs))
            .with_defaults(config.generation.clone());

        let repo: Arc<dyn ArtifactRepository> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryRepository::new()),
            StorageBackend::Sqlite => {
                if let Some(parent) = config.storage.sqlite_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await.map_err(|source| ConfigError::Io {
                            path: parent.display().to_string(),
                            source,
                        })?;
                    }
                }
                Arc::new(SqliteRepository::new(&config.storage.sqlite_path).await?)
            }
        };
        info!(
            "Sheet service ready (provider {}, storage {:?})",
            config.provider.base_url, config.storage.backend
        );

        Ok(Self::new(Arc::new(client), repo, Arc::new(ImageResolver::new()), config.detector())
            .with_modification(config.modification.clone())
            .with_text_model(config.provider.text_model.clone())
            .with_project_defaults(config.project.clone())
            .with_default_views(config.orchestrator.default_views.clone())
            .with_run_options(config.run_options()))
    }

    /// Progress events of every run started through this service.
    pub fn subscribe(&self) -> broadcast::Receiver<SheetEvent> {
        self.events.subscribe()
    }

    /// A run context wired to this service's event bus, with the configured
    /// run options.
    pub fn context(&self) -> RunContext {
        RunContext::new(self.options.clone()).with_events(self.events.clone())
    }

    pub fn default_views(&self) -> &[ViewType] {
        &self.default_views
    }

    /// Normalize raw upstream output with the project defaults.
    pub fn normalize(&self, raw: &Value) -> Result<DesignDna, SheetError> {
        Ok(normalize(raw, &self.project)?)
    }

    /// Generate `view_types` (or the default views when empty) and save the
    /// sheet as the next baseline version.
    pub async fn generate_sheet(
        &self,
        design_id: &str,
        dna: &DesignDna,
        view_types: &[ViewType],
        ctx: &RunContext,
    ) -> Result<SheetResult, SheetError> {
        let views = if view_types.is_empty() {
            &self.default_views[..]
        } else {
            view_types
        };
        self.orchestrator.run_generation(design_id, dna, views, ctx).await
    }

    pub async fn generate_from_raw(
        &self,
        design_id: &str,
        raw: &Value,
        view_types: &[ViewType],
        ctx: &RunContext,
    ) -> Result<SheetResult, SheetError> {
        let dna = self.normalize(raw)?;
        self.generate_sheet(design_id, &dna, view_types, ctx).await
    }

    /// Extract a design from a free-text brief through the text provider,
    /// then generate it like [`generate_from_raw`](Self::generate_from_raw).
    /// Fields the reply lacks fall back to the project defaults.
    pub async fn generate_from_brief(
        &self,
        design_id: &str,
        brief: &str,
        view_types: &[ViewType],
        ctx: &RunContext,
    ) -> Result<SheetResult, SheetError> {
        let proposal = self.extractor.extract(brief).await?;
        if proposal.used_defaults {
            tracing::warn!("{}: brief reply was incomplete; using defaults for missing fields", design_id);
        }
        self.generate_from_raw(design_id, &proposal.value.to_raw(), view_types, ctx)
            .await
    }

    pub async fn resume_sheet(&self, partial: PartialSheet, ctx: &RunContext) -> Result<SheetResult, SheetError> {
        self.orchestrator.resume_generation(partial, ctx).await
    }

    pub async fn modify_sheet(&self, request: &ModifyRequest, ctx: &RunContext) -> Result<ModifyResult, ModifyError> {
        self.engine.modify(request, ctx).await
    }

    pub async fn load_baseline(&self, design_id: &str, version: Option<u64>) -> Result<BaselineArtifact, StoreError> {
        self.store.load(design_id, version).await
    }

    pub async fn baseline_versions(&self, design_id: &str) -> Result<Vec<u64>, StoreError> {
        self.store.versions(design_id).await
    }
}
