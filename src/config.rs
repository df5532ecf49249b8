//! Pipeline configuration
//!
//! YAML file with every field defaulted, overlaid with `ARCHSHEET_*`
//! environment variables. Secrets are never stored in the file: the API key
//! is read from the environment variable named by `provider.api_key_env`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dna::ContextDefaults;
use crate::drift::{DriftDetector, DriftThresholds, DriftWeights};
use crate::error::ConfigError;
use crate::generation::{GenerationKnobs, RetryPolicy};
use crate::modification::ModificationSettings;
use crate::orchestrator::RunOptions;
use crate::prompt::ViewType;
use crate::telemetry::DEFAULT_FILTER;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub image_model: String,
    pub text_model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Outgoing request budget per minute; unlimited when absent.
    pub requests_per_minute: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            image_model: "flux-1-dev".to_string(),
            text_model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            requests_per_minute: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub inter_call_delay_ms: u64,
    pub compute_hashes: bool,
    /// Views generated when a caller names none.
    pub default_views: Vec<ViewType>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_call_delay_ms: 2000,
            compute_hashes: true,
            default_views: vec![
                ViewType::FloorPlanGround,
                ViewType::FloorPlanUpper,
                ViewType::ElevationSouth,
                ViewType::ElevationNorth,
                ViewType::SectionLong,
                ViewType::ExteriorFront,
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub thresholds: DriftThresholds,
    pub weights: DriftWeights,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("data/baselines.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    /// Daily-rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    pub orchestrator: OrchestratorConfig,
    pub drift: DriftConfig,
    pub modification: ModificationSettings,
    pub storage: StorageConfig,
    pub generation: GenerationKnobs,
    /// Project-level fallbacks for the DNA normalizer.
    pub project: ContextDefaults,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Read `path`, apply environment overrides, validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self) {
        dotenv::dotenv().ok();
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `ARCHSHEET_*` overrides from `lookup`. Unparseable numbers are
    /// ignored and left for `validate` to judge the file value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ARCHSHEET_BASE_URL") {
            self.provider.base_url = v;
        }
        if let Some(v) = lookup("ARCHSHEET_IMAGE_MODEL") {
            self.provider.image_model = v;
        }
        if let Some(v) = lookup("ARCHSHEET_TEXT_MODEL") {
            self.provider.text_model = v;
        }
        if let Some(v) = lookup("ARCHSHEET_RPM").and_then(|v| v.parse().ok()) {
            self.provider.requests_per_minute = Some(v);
        }
        if let Some(v) = lookup("ARCHSHEET_DB_PATH") {
            self.storage.backend = StorageBackend::Sqlite;
            self.storage.sqlite_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ARCHSHEET_ACCEPT_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.drift.thresholds.accept = v;
        }
        if let Some(v) = lookup("ARCHSHEET_FLOOR_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.drift.thresholds.floor = v;
        }
        if let Some(v) = lookup("ARCHSHEET_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.modification.max_retries = v;
        }
        if let Some(v) = lookup("ARCHSHEET_LOG_DIR") {
            self.logging.log_dir = Some(PathBuf::from(v));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.provider.base_url.trim().is_empty() {
            return Err(invalid("provider.base_url", "must not be empty"));
        }
        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs", "must be positive"));
        }
        if self.provider.requests_per_minute == Some(0) {
            return Err(invalid("provider.requests_per_minute", "must be positive when set"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid("retry.base_delay_ms", "exceeds retry.max_delay_ms"));
        }
        if self.orchestrator.default_views.is_empty() {
            return Err(invalid("orchestrator.default_views", "must name at least one view"));
        }
        if let Some(strength) = self.generation.strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(invalid("generation.strength", "must lie in [0, 1]"));
            }
        }
        if self
            .modification
            .view_weights
            .values()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(invalid("modification.view_weights", "weights must be non-negative"));
        }
        self.drift.thresholds.validate()?;
        self.drift.weights.validate()?;
        Ok(())
    }

    /// API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn detector(&self) -> DriftDetector {
        DriftDetector::new(self.drift.thresholds, self.drift.weights)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            inter_call_delay: Duration::from_millis(self.orchestrator.inter_call_delay_ms),
            compute_hashes: self.orchestrator.compute_hashes,
            save_baseline: true,
            knobs: None,
        }
    }
}
