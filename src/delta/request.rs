use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;
use crate::prompt::Aspect;

/// Value of a modification toggle: a switch or a named choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToggleValue {
    Bool(bool),
    Choice(String),
}

impl ToggleValue {
    pub fn is_off(&self) -> bool {
        match self {
            ToggleValue::Bool(b) => !b,
            ToggleValue::Choice(c) => c.trim().is_empty(),
        }
    }
}

impl fmt::Display for ToggleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleValue::Bool(b) => write!(f, "{b}"),
            ToggleValue::Choice(c) => f.write_str(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ToggleKind {
    Switch,
    Choice,
    Either,
}

/// Toggle name, accepted value kind, and the aspect it touches.
pub(crate) const KNOWN_TOGGLES: &[(&str, ToggleKind, Aspect)] = &[
    ("roofMaterial", ToggleKind::Choice, Aspect::Roof),
    ("roofForm", ToggleKind::Choice, Aspect::Roof),
    ("facadeMaterial", ToggleKind::Choice, Aspect::Facade),
    ("windowStyle", ToggleKind::Choice, Aspect::Fenestration),
    ("addBalcony", ToggleKind::Switch, Aspect::Facade),
    ("entranceCanopy", ToggleKind::Switch, Aspect::Entrance),
    ("interiorFinish", ToggleKind::Choice, Aspect::Interior),
    ("landscaping", ToggleKind::Either, Aspect::Site),
];

pub(crate) fn toggle_spec(name: &str) -> Option<(ToggleKind, Aspect)> {
    KNOWN_TOGGLES
        .iter()
        .find(|(n, _, _)| *n == name)
        .map(|(_, kind, aspect)| (*kind, *aspect))
}

/// How tightly regenerated views are held to the baseline image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    Relaxed,
    #[default]
    Standard,
    Strict,
    Locked,
}

impl Strictness {
    /// One level stricter; `None` at the top.
    pub fn tighten(self) -> Option<Strictness> {
        match self {
            Strictness::Relaxed => Some(Strictness::Standard),
            Strictness::Standard => Some(Strictness::Strict),
            Strictness::Strict => Some(Strictness::Locked),
            Strictness::Locked => None,
        }
    }

    /// Baseline-image influence for this level.
    pub fn reference_strength(self) -> f32 {
        match self {
            Strictness::Relaxed => 0.45,
            Strictness::Standard => 0.6,
            Strictness::Strict => 0.75,
            Strictness::Locked => 0.9,
        }
    }

    pub fn guidance(self) -> f32 {
        match self {
            Strictness::Relaxed => 6.0,
            Strictness::Standard => 7.5,
            Strictness::Strict => 9.0,
            Strictness::Locked => 10.5,
        }
    }

    pub fn lock_clause(self) -> &'static str {
        match self {
            Strictness::Relaxed => "Keep the overall composition of the reference image.",
            Strictness::Standard => {
                "Keep everything not listed above identical to the reference image, including camera and geometry."
            }
            Strictness::Strict => {
                "STRICT LOCK: change only what is listed above. Camera, proportions, geometry and materials must match the reference image exactly."
            }
            Strictness::Locked => {
                "MAXIMUM LOCK: reproduce the reference image pixel for pixel except for the listed change. Do not reinterpret anything."
            }
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strictness::Relaxed => "relaxed",
            Strictness::Standard => "standard",
            Strictness::Strict => "strict",
            Strictness::Locked => "locked",
        };
        f.write_str(name)
    }
}

/// A bounded edit against an accepted baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyRequest {
    pub design_id: String,
    /// Baseline to modify; latest when absent.
    #[serde(default)]
    pub baseline_version: Option<u64>,
    #[serde(default)]
    pub toggles: BTreeMap<String, ToggleValue>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub strictness: Strictness,
    /// Initial baseline-image influence, overriding the strictness default.
    #[serde(default)]
    pub image_strength: Option<f32>,
}

impl ModifyRequest {
    pub fn new(design_id: impl Into<String>) -> Self {
        Self {
            design_id: design_id.into(),
            baseline_version: None,
            toggles: BTreeMap::new(),
            instruction: None,
            strictness: Strictness::default(),
            image_strength: None,
        }
    }

    pub fn toggle(mut self, name: &str, value: ToggleValue) -> Self {
        self.toggles.insert(name.to_string(), value);
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.instruction = Some(text.into());
        self
    }

    pub fn at_version(mut self, version: u64) -> Self {
        self.baseline_version = Some(version);
        self
    }

    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Toggles that are switched on.
    pub fn active_toggles(&self) -> impl Iterator<Item = (&String, &ToggleValue)> {
        self.toggles.iter().filter(|(_, v)| !v.is_off())
    }

    pub fn instruction_text(&self) -> Option<&str> {
        self.instruction.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Structural checks that need no baseline.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.design_id.trim().is_empty() {
            return Err(ValidationError::new("design_id", "must not be empty"));
        }
        for (name, value) in &self.toggles {
            let Some((kind, _)) = toggle_spec(name) else {
                return Err(ValidationError::new(
                    format!("toggles.{name}"),
                    "unknown toggle",
                ));
            };
            let fits = matches!(
                (kind, value),
                (ToggleKind::Switch, ToggleValue::Bool(_))
                    | (ToggleKind::Choice, ToggleValue::Choice(_))
                    | (ToggleKind::Either, _)
            );
            if !fits {
                return Err(ValidationError::new(
                    format!("toggles.{name}"),
                    format!("unexpected value `{value}`"),
                ));
            }
        }
        if let Some(strength) = self.image_strength {
            if !(0.0..=1.0).contains(&strength) {
                return Err(ValidationError::new("image_strength", "must lie in [0, 1]"));
            }
        }
        if self.active_toggles().next().is_none() && self.instruction_text().is_none() {
            return Err(ValidationError::new(
                "toggles",
                "no active toggle and no instruction: nothing to modify",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_toggle_values() {
        let req: ModifyRequest = serde_json::from_str(
            r#"{"design_id": "d", "toggles": {"roofMaterial": "zinc", "addBalcony": true}}"#,
        )
        .unwrap();
        assert_eq!(req.toggles["roofMaterial"], ToggleValue::Choice("zinc".into()));
        assert_eq!(req.toggles["addBalcony"], ToggleValue::Bool(true));
        assert_eq!(req.strictness, Strictness::Standard);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_and_mistyped_toggles() {
        let unknown = ModifyRequest::new("d").toggle("paintItPink", ToggleValue::Bool(true));
        assert_eq!(unknown.validate().unwrap_err().field, "toggles.paintItPink");

        let mistyped = ModifyRequest::new("d").toggle("roofMaterial", ToggleValue::Bool(true));
        assert!(mistyped.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_and_bad_strength() {
        let empty = ModifyRequest::new("d").toggle("addBalcony", ToggleValue::Bool(false));
        assert!(empty.validate().is_err());

        let mut strong = ModifyRequest::new("d").instruction("add a chimney");
        strong.image_strength = Some(1.5);
        assert_eq!(strong.validate().unwrap_err().field, "image_strength");
    }

    #[test]
    fn test_tighten_climbs_to_locked() {
        let mut level = Strictness::Relaxed;
        let mut seen = vec![level];
        while let Some(next) = level.tighten() {
            assert!(next.reference_strength() > level.reference_strength());
            level = next;
            seen.push(level);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(level, Strictness::Locked);
    }
}
