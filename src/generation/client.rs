//! Generation Client
//!
//! Wraps one external call with uniform parameters. Throttling is retried
//! with exponential backoff (honoring retry-after hints) up to a bounded
//! attempt count; every other failure is surfaced on the first occurrence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::provider::{ImageProvider, ImageRef, ImageRequest, ProviderFailure, TextProvider, TextRequest};
use super::sleeper::{SleepReason, Sleeper, TokioSleeper};
use crate::drift::PerceptualHash;
use crate::error::{GenerationError, ProviderErrorKind};
use crate::prompt::{ViewSpec, ViewType};
use crate::utils::preview;

/// Backoff schedule for throttled calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at `max_delay`, raised to the provider hint when larger.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = self.base_delay.saturating_mul(factor).min(self.max_delay);
        match hint {
            Some(h) if h > backoff => h,
            _ => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Per-call generation parameters beyond the view spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationKnobs {
    pub guidance: f32,
    pub steps: u32,
    pub reference_image: Option<ImageRef>,
    pub strength: Option<f32>,
}

impl Default for GenerationKnobs {
    fn default() -> Self {
        Self {
            guidance: 7.5,
            steps: 30,
            reference_image: None,
            strength: None,
        }
    }
}

/// One successfully generated view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedView {
    pub view_type: ViewType,
    pub image: ImageRef,
    pub seed: u64,
    pub prompt: String,
    /// Calls made, including throttled ones.
    pub attempts: u32,
    pub perceptual_hash: Option<PerceptualHash>,
    pub generated_at: DateTime<Utc>,
}

pub struct GenerationClient {
    images: Arc<dyn ImageProvider>,
    text: Option<Arc<dyn TextProvider>>,
    policy: RetryPolicy,
    call_timeout: Duration,
    sleeper: Arc<dyn Sleeper>,
    defaults: GenerationKnobs,
}

impl GenerationClient {
    pub fn new(images: Arc<dyn ImageProvider>) -> Self {
        Self {
            images,
            text: None,
            policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(120),
            sleeper: Arc::new(TokioSleeper),
            defaults: GenerationKnobs::default(),
        }
    }

    pub fn with_text(mut self, text: Arc<dyn TextProvider>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationKnobs) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn sleeper(&self) -> Arc<dyn Sleeper> {
        self.sleeper.clone()
    }

    pub fn default_knobs(&self) -> &GenerationKnobs {
        &self.defaults
    }

    /// Generate a view with the client's default knobs.
    pub async fn generate(&self, spec: &ViewSpec) -> Result<GeneratedView, GenerationError> {
        self.generate_with(spec, &self.defaults).await
    }

    pub async fn generate_with(
        &self,
        spec: &ViewSpec,
        knobs: &GenerationKnobs,
    ) -> Result<GeneratedView, GenerationError> {
        let request = ImageRequest {
            prompt: spec.prompt.clone(),
            negative_prompt: spec.negative_prompt.clone(),
            width: spec.width,
            height: spec.height,
            seed: spec.seed,
            guidance: knobs.guidance,
            steps: knobs.steps,
            reference_image: knobs.reference_image.clone(),
            strength: knobs.strength,
        };
        debug!(
            "Generating {} via {}: {}",
            spec.view_type,
            self.images.name(),
            preview(&spec.prompt, 120)
        );

        let provider = self.images.clone();
        let (response, attempts) = self
            .with_retry(spec.view_type.as_str(), || {
                let provider = provider.clone();
                let request = request.clone();
                async move { provider.generate_image(&request).await }
            })
            .await?;

        let seed = match response.seed {
            Some(echoed) if echoed != spec.seed => {
                warn!(
                    "Provider {} ignored seed lock for {}: requested {}, used {}",
                    self.images.name(),
                    spec.view_type,
                    spec.seed,
                    echoed
                );
                echoed
            }
            _ => spec.seed,
        };

        info!("Generated {} in {} attempt(s): {}", spec.view_type, attempts, response.image);
        Ok(GeneratedView {
            view_type: spec.view_type,
            image: response.image,
            seed,
            prompt: spec.prompt.clone(),
            attempts,
            perceptual_hash: None,
            generated_at: Utc::now(),
        })
    }

    /// Text generation with the same retry semantics.
    pub async fn complete_text(&self, request: &TextRequest) -> Result<String, GenerationError> {
        let Some(text) = self.text.clone() else {
            return Err(GenerationError::Provider {
                kind: ProviderErrorKind::BadRequest,
                message: "no text provider configured".to_string(),
            });
        };
        let (reply, _) = self
            .with_retry("text", || {
                let text = text.clone();
                let request = request.clone();
                async move { text.complete(&request).await }
            })
            .await?;
        Ok(reply)
    }

    async fn with_retry<T, F, Fut>(&self, label: &str, mut call: F) -> Result<(T, u32), GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderFailure::Timeout),
            };

            match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(ProviderFailure::RateLimited { retry_after }) => {
                    if attempt >= max_attempts {
                        warn!("{}: rate limited, retry budget of {} exhausted", label, max_attempts);
                        return Err(GenerationError::RateLimited {
                            attempts: attempt,
                            retry_after,
                        });
                    }
                    let delay = self.policy.delay_for(attempt, retry_after);
                    warn!(
                        "{}: rate limited on attempt {}/{}, backing off {:?}",
                        label, attempt, max_attempts, delay
                    );
                    self.sleeper
                        .sleep(delay, SleepReason::Backoff { attempt })
                        .await;
                }
                Err(ProviderFailure::Timeout) => {
                    warn!("{}: call timed out after {:?}", label, self.call_timeout);
                    return Err(GenerationError::Timeout(self.call_timeout));
                }
                Err(other) => {
                    let (kind, message) = other
                        .classify()
                        .unwrap_or((ProviderErrorKind::Upstream, format!("{other:?}")));
                    warn!("{}: provider error ({}): {}", label, kind, message);
                    return Err(GenerationError::Provider { kind, message });
                }
            }
        }
    }
}
