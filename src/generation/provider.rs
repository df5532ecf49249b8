use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ProviderErrorKind;

/// Opaque reference to a generated image: URL, file path, `data:` URL or
/// `mem://` key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.starts_with("data:") {
            write!(f, "data:<{} bytes>", self.0.len())
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Request to an image-generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub guidance: f32,
    pub steps: u32,
    /// Baseline image to stay close to (modification path).
    pub reference_image: Option<ImageRef>,
    /// Influence of `reference_image`, 0.0..=1.0.
    pub strength: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image: ImageRef,
    /// Seed the provider reports having used.
    pub seed: Option<u64>,
}

/// Request to a text-generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Raw failure reported by a provider adapter, before retry handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderFailure {
    RateLimited { retry_after: Option<Duration> },
    Auth(String),
    Quota(String),
    TokenLimit(String),
    BadRequest(String),
    Upstream(String),
    Timeout,
}

impl ProviderFailure {
    /// Kind and message for non-transient failures.
    pub fn classify(&self) -> Option<(ProviderErrorKind, String)> {
        match self {
            ProviderFailure::Auth(m) => Some((ProviderErrorKind::Auth, m.clone())),
            ProviderFailure::Quota(m) => Some((ProviderErrorKind::Quota, m.clone())),
            ProviderFailure::TokenLimit(m) => Some((ProviderErrorKind::TokenLimit, m.clone())),
            ProviderFailure::BadRequest(m) => Some((ProviderErrorKind::BadRequest, m.clone())),
            ProviderFailure::Upstream(m) => Some((ProviderErrorKind::Upstream, m.clone())),
            ProviderFailure::RateLimited { .. } | ProviderFailure::Timeout => None,
        }
    }
}

/// Uniform interface over image-generation backends.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, ProviderFailure>;
}

/// Uniform interface over text-generation backends.
#[async_trait]
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &TextRequest) -> Result<String, ProviderFailure>;
}
