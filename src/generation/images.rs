//! Image resolution
//!
//! Turns an [`ImageRef`] into decoded pixels for drift scoring. Supported
//! references: local paths, `file://`, `http(s)://`, `data:` URLs and
//! `mem://` keys held by a [`MemoryImageStore`].

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::task;
use uuid::Uuid;

use super::provider::ImageRef;
use crate::error::ImageError;

const MEM_SCHEME: &str = "mem://";

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, image: &ImageRef) -> Result<DynamicImage, ImageError>;
}

/// In-process image table addressed by `mem://` references.
#[derive(Debug, Default, Clone)]
pub struct MemoryImageStore {
    images: Arc<RwLock<HashMap<String, DynamicImage>>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store under a caller-chosen key.
    pub fn insert(&self, key: &str, image: DynamicImage) -> ImageRef {
        if let Ok(mut map) = self.images.write() {
            map.insert(key.to_string(), image);
        }
        ImageRef::new(format!("{MEM_SCHEME}{key}"))
    }

    /// Store under a fresh key.
    pub fn put(&self, image: DynamicImage) -> ImageRef {
        self.insert(&Uuid::new_v4().to_string(), image)
    }

    pub fn get(&self, image: &ImageRef) -> Option<DynamicImage> {
        let key = image.as_str().strip_prefix(MEM_SCHEME)?;
        self.images.read().ok()?.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.images.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageFetcher for MemoryImageStore {
    async fn fetch(&self, image: &ImageRef) -> Result<DynamicImage, ImageError> {
        self.get(image)
            .ok_or_else(|| ImageError::NotFound(image.to_string()))
    }
}

/// Resolves every supported reference form.
#[derive(Clone, Default)]
pub struct ImageResolver {
    http: reqwest::Client,
    memory: Option<MemoryImageStore>,
}

impl ImageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, memory: MemoryImageStore) -> Self {
        self.memory = Some(memory);
        self
    }

    async fn bytes(&self, image: &ImageRef) -> Result<Vec<u8>, ImageError> {
        let raw = image.as_str();
        let fetch_err = |message: String| ImageError::Fetch {
            reference: image.to_string(),
            message,
        };

        if let Some(rest) = raw.strip_prefix("data:") {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| ImageError::Unsupported(image.to_string()))?;
            if !meta.ends_with(";base64") {
                return Err(ImageError::Unsupported(image.to_string()));
            }
            return STANDARD
                .decode(payload.trim())
                .map_err(|e| fetch_err(format!("invalid base64: {e}")));
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            let res = self
                .http
                .get(raw)
                .send()
                .await
                .map_err(|e| fetch_err(e.to_string()))?;
            if res.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ImageError::NotFound(image.to_string()));
            }
            let res = res.error_for_status().map_err(|e| fetch_err(e.to_string()))?;
            return res
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| fetch_err(e.to_string()));
        }

        let path = PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ImageError::NotFound(image.to_string()))
            }
            Err(e) => Err(fetch_err(e.to_string())),
        }
    }
}

#[async_trait]
impl ImageFetcher for ImageResolver {
    async fn fetch(&self, image: &ImageRef) -> Result<DynamicImage, ImageError> {
        if image.as_str().starts_with(MEM_SCHEME) {
            return match &self.memory {
                Some(memory) => memory.fetch(image).await,
                None => Err(ImageError::Unsupported(image.to_string())),
            };
        }

        let bytes = self.bytes(image).await?;
        let reference = image.to_string();
        task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map_err(|source| ImageError::Decode { reference, source })
        })
        .await
        .map_err(|e| ImageError::Fetch {
            reference: image.to_string(),
            message: format!("decode task failed: {e}"),
        })?
    }
}
