//! Error taxonomy
//!
//! Every component surfaces its own error enum; the service layer composes
//! them. Nothing in the core substitutes a placeholder image on failure.

use std::time::Duration;
use thiserror::Error;

use crate::drift::DriftReport;
use crate::orchestrator::PartialSheet;
use crate::prompt::ViewType;

/// Bad or incomplete input. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("validation failed on `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures of a single generation call after retry handling.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("provider throttled the request after {attempts} attempts")]
    RateLimited {
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("provider error ({kind}): {message}")]
    Provider { kind: ProviderErrorKind, message: String },

    #[error("generation call timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }
}

/// Classification of non-transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    Quota,
    TokenLimit,
    BadRequest,
    Upstream,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderErrorKind::Auth => write!(f, "auth"),
            ProviderErrorKind::Quota => write!(f, "quota"),
            ProviderErrorKind::TokenLimit => write!(f, "token-limit"),
            ProviderErrorKind::BadRequest => write!(f, "bad-request"),
            ProviderErrorKind::Upstream => write!(f, "upstream"),
        }
    }
}

/// Errors resolving an image reference to pixels.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image `{0}` not found")]
    NotFound(String),

    #[error("unsupported image reference `{0}`")]
    Unsupported(String),

    #[error("failed to fetch image `{reference}`: {message}")]
    Fetch { reference: String, message: String },

    #[error("failed to decode image `{reference}`: {source}")]
    Decode {
        reference: String,
        #[source]
        source: image::ImageError,
    },
}

/// Baseline store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no baseline for design `{design_id}`{}", .version.map(|v| format!(" at version {v}")).unwrap_or_default())]
    NotFound {
        design_id: String,
        version: Option<u64>,
    },

    #[error("version {version} of design `{design_id}` already exists")]
    VersionConflict { design_id: String, version: u64 },

    #[error("repository error: {0}")]
    Repository(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Repository-level errors; the store maps these onto [`StoreError`].
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record {key}@{version} already exists")]
    Conflict { key: String, version: u64 },

    #[error("backend failure: {0}")]
    Backend(String),
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict { key, version } => StoreError::VersionConflict {
                design_id: key,
                version,
            },
            RepositoryError::Backend(message) => StoreError::Repository(message),
        }
    }
}

/// Errors from a sheet generation run.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("sheet generation stopped: {} of {} views completed", .0.completed.len(), .0.total())]
    PartialFailure(Box<PartialSheet>),

    #[error("failed to persist baseline: {0}")]
    Store(#[from] StoreError),

    #[error("brief extraction failed: {0}")]
    Extraction(#[from] GenerationError),
}

/// Errors from a modification run.
#[derive(Debug, Error)]
pub enum ModifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("design `{design_id}` has no baseline{}", .version.map(|v| format!(" at version {v}")).unwrap_or_default())]
    DesignNotFound {
        design_id: String,
        version: Option<u64>,
    },

    #[error("modification rejected: view {view} drifted (score {score:.3})")]
    DriftRejected {
        view: ViewType,
        score: f64,
        report: Box<DriftReport>,
    },

    #[error("baseline of `{design_id}` moved past version {expected}; reload and retry")]
    VersionConflict { design_id: String, expected: u64 },

    #[error("generation failed for view {view}: {source}")]
    Generation {
        view: ViewType,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("modification cancelled before commit")]
    Cancelled,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ModifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { design_id, version } => {
                ModifyError::DesignNotFound { design_id, version }
            }
            StoreError::VersionConflict { design_id, version } => ModifyError::VersionConflict {
                design_id,
                expected: version.saturating_sub(1),
            },
            other => ModifyError::Store(other),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value `{key}`: {reason}")]
    Invalid { key: String, reason: String },

    #[error("failed to open baseline storage: {0}")]
    Storage(#[from] RepositoryError),
}
