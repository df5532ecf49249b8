#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use archsheet::baseline::{ArtifactRepository, InMemoryRepository};
use archsheet::drift::{DriftDetector, DriftThresholds, DriftWeights};
use archsheet::generation::{
    GenerationClient, ImageProvider, ImageRequest, ImageResolver, ImageResponse, MemoryImageStore,
    ProviderFailure, RecordingSleeper, TextProvider, TextRequest,
};
use archsheet::modification::ModificationSettings;
use archsheet::{ContextDefaults, SheetService};

/// What the mock does with a modification request's reference image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edit {
    /// Return the reference unchanged.
    Copy,
    /// Shift every pixel up by 40 levels; scores just below 0.98.
    Brighten,
    /// Invert the reference; scores near zero.
    Invert,
}

/// Image provider that paints into a [`MemoryImageStore`].
///
/// Plain requests get a deterministic texture per call; requests carrying a
/// reference image get that image back, transformed by the next scripted
/// [`Edit`] (default [`Edit::Copy`]). Scripted failures are consumed first.
pub struct PaintingProvider {
    pub store: MemoryImageStore,
    failures: Mutex<VecDeque<ProviderFailure>>,
    fail_at: Mutex<HashMap<u32, ProviderFailure>>,
    edits: Mutex<VecDeque<Edit>>,
    pub requests: Mutex<Vec<ImageRequest>>,
}

impl PaintingProvider {
    pub fn new(store: MemoryImageStore) -> Arc<Self> {
        Arc::new(Self {
            store,
            failures: Mutex::new(VecDeque::new()),
            fail_at: Mutex::new(HashMap::new()),
            edits: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub async fn fail_next(&self, failures: Vec<ProviderFailure>) {
        self.failures.lock().await.extend(failures);
    }

    /// Fail the `call`-th request (1-based) instead of painting.
    pub async fn fail_call(&self, call: u32, failure: ProviderFailure) {
        self.fail_at.lock().await.insert(call, failure);
    }

    pub async fn script_edits(&self, edits: Vec<Edit>) {
        self.edits.lock().await.extend(edits);
    }

    pub async fn calls(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Requests that carried a reference image.
    pub async fn edit_requests(&self) -> Vec<ImageRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.reference_image.is_some())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ImageProvider for PaintingProvider {
    fn name(&self) -> &str {
        "painting-mock"
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, ProviderFailure> {
        let call = {
            let mut requests = self.requests.lock().await;
            requests.push(request.clone());
            requests.len() as u32
        };
        if let Some(failure) = self.failures.lock().await.pop_front() {
            return Err(failure);
        }
        if let Some(failure) = self.fail_at.lock().await.remove(&call) {
            return Err(failure);
        }

        let image = match &request.reference_image {
            None => texture(call),
            Some(reference) => {
                let base = self
                    .store
                    .get(reference)
                    .ok_or_else(|| ProviderFailure::BadRequest(format!("unknown reference {reference}")))?;
                let edit = self.edits.lock().await.pop_front().unwrap_or(Edit::Copy);
                apply(edit, base)
            }
        };
        Ok(ImageResponse {
            image: self.store.put(image),
            seed: Some(request.seed),
        })
    }
}

/// 64x64 texture with levels in [40, 200).
pub fn texture(salt: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
        Luma([(40 + ((x * 31 + y * 17 + salt * 7) ^ (x * y)) % 160) as u8])
    }))
}

fn apply(edit: Edit, image: DynamicImage) -> DynamicImage {
    match edit {
        Edit::Copy => image,
        Edit::Brighten => {
            let mut gray = image.to_luma8();
            for p in gray.pixels_mut() {
                p.0[0] = p.0[0].saturating_add(40);
            }
            DynamicImage::ImageLuma8(gray)
        }
        Edit::Invert => {
            let mut inverted = image;
            inverted.invert();
            inverted
        }
    }
}

/// Text provider that answers every prompt with the same reply.
pub struct CannedText {
    reply: String,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl CannedText {
    pub fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            prompts: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextProvider for CannedText {
    fn name(&self) -> &str {
        "canned-text"
    }

    async fn complete(&self, request: &TextRequest) -> Result<String, ProviderFailure> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(self.reply.clone())
    }
}

pub struct Harness {
    pub service: SheetService,
    pub provider: Arc<PaintingProvider>,
    pub sleeper: Arc<RecordingSleeper>,
    pub repo: Arc<InMemoryRepository>,
}

pub fn project() -> ContextDefaults {
    ContextDefaults {
        gross_area_m2: Some(216.0),
        ..ContextDefaults::default()
    }
}

/// Service over the painting mock, an in-memory repository and a recording
/// sleeper, with the given drift thresholds.
pub fn harness(thresholds: DriftThresholds) -> Harness {
    harness_with(thresholds, ModificationSettings::default())
}

pub fn harness_with(thresholds: DriftThresholds, settings: ModificationSettings) -> Harness {
    build(thresholds, settings, None)
}

/// Default harness with `text` as the text provider.
pub fn harness_with_text(text: Arc<CannedText>) -> Harness {
    build(DriftThresholds::default(), ModificationSettings::default(), Some(text))
}

fn build(thresholds: DriftThresholds, settings: ModificationSettings, text: Option<Arc<CannedText>>) -> Harness {
    let store = MemoryImageStore::new();
    let provider = PaintingProvider::new(store.clone());
    let sleeper = Arc::new(RecordingSleeper::new());
    let repo = Arc::new(InMemoryRepository::new());
    let mut client = GenerationClient::new(provider.clone()).with_sleeper(sleeper.clone());
    if let Some(text) = text {
        client = client.with_text(text);
    }
    let service = SheetService::new(
        Arc::new(client),
        repo.clone() as Arc<dyn ArtifactRepository>,
        Arc::new(ImageResolver::new().with_memory(store)),
        DriftDetector::new(thresholds, DriftWeights::default()),
    )
    .with_project_defaults(project())
    .with_modification(settings);
    Harness {
        service,
        provider,
        sleeper,
        repo,
    }
}

pub fn brick_spec() -> serde_json::Value {
    json!({ "floors": 2, "materials": ["brick"], "seed": 42 })
}
