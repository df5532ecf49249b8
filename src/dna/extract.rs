//! Brief extraction
//!
//! Asks the text provider to turn a free-text project brief into a design
//! proposal. The reply goes through the resilient parser, so a chatty or
//! truncated answer still yields a usable raw spec for [`normalize`].
//!
//! [`normalize`]: super::normalize

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::lenient::{parse_lenient, Lenient};
use crate::error::GenerationError;
use crate::generation::{GenerationClient, TextRequest};
use crate::utils::preview;

const SYSTEM_PROMPT: &str = "You are an architect preparing a concise design specification. \
Reply with a single JSON object and nothing else.";

/// Structured design proposal as returned by the text provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignProposal {
    pub style: String,
    pub floors: u32,
    pub width_m: Option<f64>,
    pub depth_m: Option<f64>,
    pub gross_area_m2: Option<f64>,
    pub materials: Vec<String>,
    pub roof_form: Option<String>,
    pub roof_material: Option<String>,
    pub window_style: Option<String>,
    pub entrance: Option<String>,
}

impl Default for DesignProposal {
    fn default() -> Self {
        Self {
            style: super::DEFAULT_STYLE.to_string(),
            floors: 2,
            width_m: None,
            depth_m: None,
            gross_area_m2: None,
            materials: Vec::new(),
            roof_form: None,
            roof_material: None,
            window_style: None,
            entrance: None,
        }
    }
}

impl DesignProposal {
    /// Raw spec in the shape the normalizer reads. Absent fields are left
    /// out so project context defaults can apply.
    pub fn to_raw(&self) -> Value {
        let mut raw = Map::new();
        raw.insert("style".into(), json!(self.style));
        raw.insert("floors".into(), json!(self.floors));
        let optional = [
            ("width", self.width_m.map(|v| json!(v))),
            ("depth", self.depth_m.map(|v| json!(v))),
            ("gross_area_m2", self.gross_area_m2.map(|v| json!(v))),
            ("roof_form", self.roof_form.as_ref().map(|v| json!(v))),
            ("roof_material", self.roof_material.as_ref().map(|v| json!(v))),
            ("window_style", self.window_style.as_ref().map(|v| json!(v))),
            ("entrance", self.entrance.as_ref().map(|v| json!(v))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                raw.insert(key.into(), value);
            }
        }
        if !self.materials.is_empty() {
            raw.insert("materials".into(), json!(self.materials));
        }
        Value::Object(raw)
    }
}

pub struct BriefExtractor {
    client: Arc<GenerationClient>,
    model: String,
    temperature: f32,
}

impl BriefExtractor {
    pub fn new(client: Arc<GenerationClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.2,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn prompt(brief: &str) -> String {
        format!(
            "Project brief:\n{brief}\n\n\
             Return JSON with keys: style (string), floors (integer), width_m (number), \
             depth_m (number), gross_area_m2 (number), materials (array of strings, facade first), \
             roof_form (string), roof_material (string), window_style (string), \
             entrance (one of north, south, east, west)."
        )
    }

    /// Extract a proposal; `used_defaults` reports fields the reply lacked.
    pub async fn extract(&self, brief: &str) -> Result<Lenient<DesignProposal>, GenerationError> {
        let request = TextRequest {
            model: self.model.clone(),
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: Self::prompt(brief),
            temperature: self.temperature,
            max_tokens: Some(800),
        };
        let reply = self.client.complete_text(&request).await?;
        let parsed = parse_lenient::<DesignProposal>(&reply);
        if parsed.used_defaults {
            warn!(
                "Design proposal fell back to defaults ({} issue(s)): {}",
                parsed.issues.len(),
                preview(&reply, 160)
            );
        } else {
            info!("Extracted design proposal: style={}, floors={}", parsed.value.style, parsed.value.floors);
        }
        Ok(parsed)
    }
}
