//! Delta Builder
//!
//! Turns a [`ModifyRequest`] into additive instruction fragments layered on
//! the unchanged baseline DNA, and selects the views that must be
//! regenerated: those depicting an aspect the delta touches. Every other
//! view is carried over by reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::request::{toggle_spec, ModifyRequest, Strictness, ToggleValue};
use crate::baseline::BaselineArtifact;
use crate::error::ValidationError;
use crate::prompt::{build_view_spec, Aspect, ViewSpec, ViewType};

/// Keyword stems recognized in free-text instructions.
const KEYWORDS: &[(&str, Aspect)] = &[
    ("roof", Aspect::Roof),
    ("gutter", Aspect::Roof),
    ("chimney", Aspect::Roof),
    ("dormer", Aspect::Roof),
    ("skylight", Aspect::Roof),
    ("facade", Aspect::Facade),
    ("façade", Aspect::Facade),
    ("cladding", Aspect::Facade),
    ("brick", Aspect::Facade),
    ("render", Aspect::Facade),
    ("wall", Aspect::Facade),
    ("balcon", Aspect::Facade),
    ("colour", Aspect::Facade),
    ("color", Aspect::Facade),
    ("window", Aspect::Fenestration),
    ("glazing", Aspect::Fenestration),
    ("shutter", Aspect::Fenestration),
    ("door", Aspect::Entrance),
    ("entrance", Aspect::Entrance),
    ("porch", Aspect::Entrance),
    ("canopy", Aspect::Entrance),
    ("interior", Aspect::Interior),
    ("kitchen", Aspect::Interior),
    ("living room", Aspect::Interior),
    ("furniture", Aspect::Interior),
    ("flooring", Aspect::Interior),
    ("garden", Aspect::Site),
    ("landscap", Aspect::Site),
    ("tree", Aspect::Site),
    ("driveway", Aspect::Site),
    ("fence", Aspect::Site),
    ("layout", Aspect::Layout),
    ("room", Aspect::Layout),
    ("partition", Aspect::Layout),
];

/// One recorded modification: what it touches and how it reads in prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub aspects: BTreeSet<Aspect>,
    /// Prompt fragments in application order.
    pub fragments: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Delta {
    /// Whether this delta changes something `view_type` shows.
    pub fn touches(&self, view_type: ViewType) -> bool {
        view_type.aspects().iter().any(|a| self.aspects.contains(a))
    }
}

/// Regeneration plan for one modification.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaPlan {
    /// Views to regenerate, prompts rendered at `strictness`.
    pub affected: Vec<ViewSpec>,
    /// Views kept as-is from the baseline.
    pub carried: Vec<ViewType>,
    pub delta: Delta,
    pub strictness: Strictness,
    unlocked: Vec<ViewSpec>,
}

impl DeltaPlan {
    pub fn affected_views(&self) -> Vec<ViewType> {
        self.affected.iter().map(|s| s.view_type).collect()
    }

    /// The same plan re-rendered one strictness level up, if there is one.
    pub fn tightened(&self) -> Option<DeltaPlan> {
        let next = self.strictness.tighten()?;
        Some(self.at_strictness(next))
    }

    pub fn at_strictness(&self, strictness: Strictness) -> DeltaPlan {
        DeltaPlan {
            affected: lock(&self.unlocked, strictness),
            carried: self.carried.clone(),
            delta: self.delta.clone(),
            strictness,
            unlocked: self.unlocked.clone(),
        }
    }
}

/// Translate the request into a delta and pick the affected views.
pub fn build_delta(baseline: &BaselineArtifact, request: &ModifyRequest) -> Result<DeltaPlan, ValidationError> {
    request.validate()?;

    let mut aspects = BTreeSet::new();
    let mut fragments = Vec::new();
    let mut summary = Vec::new();

    for (name, value) in request.active_toggles() {
        // validate() already rejected unknown toggles
        let Some((_, aspect)) = toggle_spec(name) else {
            continue;
        };
        aspects.insert(aspect);
        fragments.push(toggle_fragment(name, value));
        summary.push(format!("{name}={value}"));
    }

    if let Some(text) = request.instruction_text() {
        let inferred = infer_aspects(text);
        if inferred.is_empty() {
            aspects.insert(Aspect::Facade);
        } else {
            aspects.extend(inferred);
        }
        fragments.push(format!("Requested change: {text}."));
        summary.push(format!("\"{text}\""));
    }

    let delta = Delta {
        aspects,
        fragments,
        summary: summary.join(", "),
        created_at: Some(Utc::now()),
    };

    let mut unlocked = Vec::new();
    let mut carried = Vec::new();
    for view_type in baseline.view_types() {
        if delta.touches(view_type) {
            unlocked.push(delta_spec(baseline, &delta, view_type));
        } else {
            carried.push(view_type);
        }
    }

    if unlocked.is_empty() {
        return Err(ValidationError::new(
            "toggles",
            format!(
                "change touches {:?} but baseline v{} has no view depicting it",
                delta.aspects, baseline.version
            ),
        ));
    }

    Ok(DeltaPlan {
        affected: lock(&unlocked, request.strictness),
        carried,
        delta,
        strictness: request.strictness,
        unlocked,
    })
}

/// Aspects named by keywords in free text.
pub fn infer_aspects(text: &str) -> BTreeSet<Aspect> {
    let lower = text.to_lowercase();
    KEYWORDS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(_, aspect)| *aspect)
        .collect()
}

fn toggle_fragment(name: &str, value: &ToggleValue) -> String {
    match (name, value) {
        ("roofMaterial", v) => format!("Change the roof covering to {v}; keep the roof form and pitch."),
        ("roofForm", v) => format!("Change the roof form to {v}."),
        ("facadeMaterial", v) => format!("Change the main facade material to {v}; keep openings unchanged."),
        ("windowStyle", v) => format!("Change all windows to {v} style; keep their positions and sizes."),
        ("addBalcony", _) => "Add a balcony on the upper floor of the entrance facade.".to_string(),
        ("entranceCanopy", _) => "Add a canopy over the main entrance door.".to_string(),
        ("interiorFinish", v) => format!("Change interior finishes to {v}."),
        ("landscaping", ToggleValue::Choice(v)) => format!("Landscape the site with {v}."),
        ("landscaping", _) => "Add soft landscaping around the building.".to_string(),
        (other, v) => format!("Apply {other}: {v}."),
    }
}

/// Baseline prompt for `view_type` plus every earlier and current delta
/// that touches it.
fn delta_spec(baseline: &BaselineArtifact, delta: &Delta, view_type: ViewType) -> ViewSpec {
    let mut spec = build_view_spec(&baseline.dna, view_type);
    let earlier: Vec<&str> = baseline
        .applied_deltas
        .iter()
        .filter(|d| d.touches(view_type))
        .flat_map(|d| d.fragments.iter().map(String::as_str))
        .collect();
    if !earlier.is_empty() {
        spec.prompt.push_str("\nPreviously applied: ");
        spec.prompt.push_str(&earlier.join(" "));
    }
    spec.prompt.push_str("\nMODIFICATION: ");
    spec.prompt.push_str(&delta.fragments.join(" "));
    spec
}

fn lock(specs: &[ViewSpec], strictness: Strictness) -> Vec<ViewSpec> {
    specs
        .iter()
        .map(|spec| {
            let mut locked = spec.clone();
            locked.prompt.push('\n');
            locked.prompt.push_str(strictness.lock_clause());
            locked
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineView;
    use crate::dna::fixtures::brick_house;
    use crate::generation::ImageRef;
    use std::collections::BTreeMap;

    fn baseline(views: &[ViewType]) -> BaselineArtifact {
        let dna = brick_house();
        let views: BTreeMap<_, _> = views
            .iter()
            .map(|v| {
                (
                    *v,
                    BaselineView {
                        image: ImageRef::new(format!("mem://{v}")),
                        perceptual_hash: None,
                        prompt: String::new(),
                    },
                )
            })
            .collect();
        BaselineArtifact {
            design_id: "house".into(),
            version: 1,
            parent_version: None,
            dna_fingerprint: dna.fingerprint(),
            seed: dna.seed,
            dna,
            views,
            applied_deltas: Vec::new(),
            created_at: Utc::now(),
        }
    }

    const FIVE: [ViewType; 5] = [
        ViewType::FloorPlanGround,
        ViewType::FloorPlanUpper,
        ViewType::ElevationSouth,
        ViewType::ExteriorFront,
        ViewType::Interior,
    ];

    #[test]
    fn test_roof_material_touches_only_roof_views() {
        let request = ModifyRequest::new("house").toggle("roofMaterial", ToggleValue::Choice("zinc".into()));
        let plan = build_delta(&baseline(&FIVE), &request).unwrap();

        assert_eq!(
            plan.affected_views(),
            vec![ViewType::ElevationSouth, ViewType::ExteriorFront]
        );
        assert_eq!(
            plan.carried,
            vec![ViewType::FloorPlanGround, ViewType::FloorPlanUpper, ViewType::Interior]
        );
        for spec in &plan.affected {
            assert!(spec.prompt.contains("roof covering to zinc"));
            assert!(spec.prompt.contains("seed 42"));
            assert!(spec.prompt.ends_with(Strictness::Standard.lock_clause()));
        }
    }

    #[test]
    fn test_free_text_without_keywords_hits_exterior_views() {
        let request = ModifyRequest::new("house").instruction("make it feel warmer");
        let plan = build_delta(&baseline(&FIVE), &request).unwrap();
        assert_eq!(
            plan.affected_views(),
            vec![ViewType::ElevationSouth, ViewType::ExteriorFront]
        );
        assert!(plan.delta.aspects.contains(&Aspect::Facade));
    }

    #[test]
    fn test_keywords_infer_aspects() {
        let found = infer_aspects("Add a chimney and a new front door");
        assert!(found.contains(&Aspect::Roof));
        assert!(found.contains(&Aspect::Entrance));
        assert!(!found.contains(&Aspect::Interior));
    }

    #[test]
    fn test_tightened_plan_changes_lock_clause() {
        let request = ModifyRequest::new("house").toggle("entranceCanopy", ToggleValue::Bool(true));
        let plan = build_delta(&baseline(&FIVE), &request).unwrap();
        let tighter = plan.tightened().unwrap();
        assert_eq!(tighter.strictness, Strictness::Strict);
        assert_eq!(tighter.affected_views(), plan.affected_views());
        assert!(tighter.affected[0].prompt.ends_with(Strictness::Strict.lock_clause()));
        assert!(plan.at_strictness(Strictness::Locked).tightened().is_none());
    }

    #[test]
    fn test_earlier_deltas_are_replayed() {
        let mut base = baseline(&FIVE);
        base.applied_deltas.push(Delta {
            aspects: [Aspect::Roof].into_iter().collect(),
            fragments: vec!["Change the roof covering to zinc.".into()],
            summary: "roofMaterial=zinc".into(),
            created_at: None,
        });
        let request = ModifyRequest::new("house").toggle("windowStyle", ToggleValue::Choice("sash".into()));
        let plan = build_delta(&base, &request).unwrap();
        let south = &plan.affected[0];
        assert_eq!(south.view_type, ViewType::ElevationSouth);
        assert!(south.prompt.contains("Previously applied: Change the roof covering to zinc."));
        assert!(south.prompt.contains("windows to sash"));
    }

    #[test]
    fn test_change_with_no_depicting_view_is_invalid() {
        let request = ModifyRequest::new("house").toggle("landscaping", ToggleValue::Bool(true));
        let err = build_delta(&baseline(&[ViewType::FloorPlanGround]), &request).unwrap_err();
        assert_eq!(err.field, "toggles");
    }
}
