//! OpenAI-compatible HTTP adapters
//!
//! Image generation goes to `{base}/images/generations`, text completion to
//! `{base}/chat/completions`. HTTP status and body wording are mapped onto
//! [`ProviderFailure`] so the client can decide what is retryable.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use super::provider::{
    ImageProvider, ImageRef, ImageRequest, ImageResponse, ProviderFailure, TextProvider, TextRequest,
};
use crate::utils::truncate_text;

fn limiter(per_minute: Option<u32>) -> Option<DefaultDirectRateLimiter> {
    per_minute
        .and_then(NonZeroU32::new)
        .map(|n| RateLimiter::direct(Quota::per_minute(n)))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Map an HTTP failure onto a provider failure.
pub fn classify(status: StatusCode, retry_after: Option<Duration>, body: &str) -> ProviderFailure {
    let lower = body.to_lowercase();
    let message = truncate_text(body, 400);
    let mentions_tokens = ["token", "context length", "too long", "maximum context"]
        .iter()
        .any(|w| lower.contains(w));

    match status.as_u16() {
        429 if lower.contains("quota") || lower.contains("billing") => ProviderFailure::Quota(message),
        429 => ProviderFailure::RateLimited { retry_after },
        401 | 403 => ProviderFailure::Auth(message),
        402 => ProviderFailure::Quota(message),
        400 | 413 | 422 if mentions_tokens => ProviderFailure::TokenLimit(message),
        408 | 504 => ProviderFailure::Timeout,
        s if (500..600).contains(&s) => ProviderFailure::Upstream(message),
        _ => ProviderFailure::BadRequest(message),
    }
}

/// `Retry-After` in delta-seconds form.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn transport_failure(err: reqwest::Error) -> ProviderFailure {
    if err.is_timeout() {
        ProviderFailure::Timeout
    } else {
        ProviderFailure::Upstream(err.to_string())
    }
}

async fn post_json(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
) -> Result<Value, ProviderFailure> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let res = request.send().await.map_err(transport_failure)?;
    let status = res.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(
            res.headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
        );
        let text = res.text().await.unwrap_or_default();
        debug!("POST {} failed with {}: {}", url, status, truncate_text(&text, 200));
        return Err(classify(status, retry_after, &text));
    }

    res.json::<Value>()
        .await
        .map_err(|e| ProviderFailure::Upstream(format!("invalid JSON body: {e}")))
}

pub struct OpenAiImageProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl OpenAiImageProvider {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            limiter: None,
        }
    }

    /// Cap outgoing requests per minute.
    pub fn with_rate_limit(mut self, per_minute: Option<u32>) -> Self {
        self.limiter = limiter(per_minute);
        self
    }

    fn body(&self, request: &ImageRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "prompt": request.prompt,
            "negative_prompt": request.negative_prompt,
            "size": format!("{}x{}", request.width, request.height),
            "seed": request.seed,
            "guidance_scale": request.guidance,
            "num_inference_steps": request.steps,
            "n": 1,
        });
        if let Some(reference) = &request.reference_image {
            body["image"] = json!(reference.as_str());
            body["strength"] = json!(request.strength.unwrap_or(0.5));
        }
        body
    }
}

/// Pull the image reference (URL or inline base64) and echoed seed.
pub fn parse_image_response(json: &Value) -> Result<ImageResponse, ProviderFailure> {
    let item = &json["data"][0];
    let image = if let Some(url) = item["url"].as_str() {
        ImageRef::new(url)
    } else if let Some(b64) = item["b64_json"].as_str() {
        ImageRef::new(format!("data:image/png;base64,{b64}"))
    } else {
        return Err(ProviderFailure::Upstream(
            "response carried no image url or b64_json".to_string(),
        ));
    };
    let seed = item["seed"].as_u64().or_else(|| json["seed"].as_u64());
    Ok(ImageResponse { image, seed })
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<ImageResponse, ProviderFailure> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let url = endpoint(&self.base_url, "images/generations");
        let json = post_json(&self.client, &url, self.api_key.as_deref(), &self.body(request)).await?;
        parse_image_response(&json)
    }
}

pub struct OpenAiTextProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl OpenAiTextProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            limiter: None,
        }
    }

    pub fn with_rate_limit(mut self, per_minute: Option<u32>) -> Self {
        self.limiter = limiter(per_minute);
        self
    }
}

/// Extract the first choice's content; a `length` finish means the reply
/// was cut off by the token limit.
pub fn parse_chat_response(json: &Value) -> Result<String, ProviderFailure> {
    let choice = &json["choices"][0];
    if choice["finish_reason"].as_str() == Some("length") {
        return Err(ProviderFailure::TokenLimit(
            "completion stopped at max_tokens".to_string(),
        ));
    }
    choice["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderFailure::Upstream("response carried no message content".to_string()))
}

#[async_trait]
impl TextProvider for OpenAiTextProvider {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn complete(&self, request: &TextRequest) -> Result<String, ProviderFailure> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        let mut messages = Vec::new();
        if let Some(sys) = &request.system {
            messages.push(json!({ "role": "system", "content": sys }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = json!(max);
        }

        let url = endpoint(&self.base_url, "chat/completions");
        let json = post_json(&self.client, &url, self.api_key.as_deref(), &body).await?;
        parse_chat_response(&json)
    }
}
