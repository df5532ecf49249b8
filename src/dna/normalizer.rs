//! DNA Normalizer
//!
//! Canonicalizes heterogeneous upstream design input (LLM extraction,
//! portfolio analysis, hand-written JSON) into one validated [`DesignDna`].
//! Pure and deterministic: no I/O and no randomness.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use super::types::{DesignDna, Dimensions, Fenestration, Material, Orientation, Roof};
use crate::error::ValidationError;

pub const DEFAULT_FLOOR_HEIGHT_M: f64 = 3.0;
pub const DEFAULT_STYLE: &str = "contemporary";
pub const MAX_FLOORS: u32 = 200;
const WINDOW_SPACING_M: f64 = 3.0;

/// Project-level values used where the raw spec is silent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDefaults {
    pub floors: Option<u32>,
    pub gross_area_m2: Option<f64>,
    pub style: Option<String>,
    pub floor_height_m: Option<f64>,
    pub entrance: Option<Orientation>,
    pub seed: Option<u64>,
}

const FLOOR_KEYS: &[&str] = &[
    "dimensions.floor_count",
    "dimensions.floors",
    "floor_count",
    "floors",
    "floorCount",
    "storeys",
    "levels",
];
const FLOOR_HEIGHT_KEYS: &[&str] = &[
    "dimensions.floor_height_m",
    "dimensions.floor_height",
    "floor_height_m",
    "floor_height",
    "floorHeight",
];
const WIDTH_KEYS: &[&str] = &[
    "dimensions.width_m",
    "dimensions.width",
    "footprint.width",
    "width_m",
    "width",
];
const DEPTH_KEYS: &[&str] = &[
    "dimensions.depth_m",
    "dimensions.depth",
    "dimensions.length",
    "footprint.depth",
    "depth_m",
    "depth",
    "length",
];
const AREA_KEYS: &[&str] = &["gross_area_m2", "area_m2", "area", "dimensions.area"];
const STYLE_KEYS: &[&str] = &["style", "style_tag", "architectural_style", "architecturalStyle"];
const ENTRANCE_KEYS: &[&str] = &[
    "entrance",
    "entrance_orientation",
    "entranceOrientation",
    "entrance_facade",
];

/// Normalize a raw design spec against project context defaults.
///
/// Fails only when the floor count or the footprint cannot be resolved from
/// either source, or when a resolved dimension is not positive.
pub fn normalize(raw: &Value, ctx: &ContextDefaults) -> Result<DesignDna, ValidationError> {
    let style = lookup(raw, STYLE_KEYS)
        .and_then(text)
        .or_else(|| ctx.style.as_deref().map(canonical_text))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_STYLE.to_string());

    let dimensions = resolve_dimensions(raw, ctx)?;

    let mut materials = resolve_materials(raw);
    if materials.is_empty() {
        materials = style_palette(&style);
    }

    let roof = resolve_roof(raw, &style);
    let fenestration = resolve_fenestration(raw, &dimensions);

    let entrance = lookup(raw, ENTRANCE_KEYS)
        .and_then(orientation)
        .or(ctx.entrance)
        .unwrap_or(Orientation::South);

    let mut dna = DesignDna {
        dimensions,
        materials,
        roof,
        fenestration,
        entrance,
        style,
        seed: 0,
    };

    dna.seed = match lookup(raw, &["seed"]).map(seed).transpose()?.flatten() {
        Some(given) => given,
        None => ctx.seed.unwrap_or_else(|| derived_seed(&dna)),
    };

    Ok(dna)
}

fn resolve_dimensions(raw: &Value, ctx: &ContextDefaults) -> Result<Dimensions, ValidationError> {
    let floors = lookup(raw, FLOOR_KEYS)
        .and_then(number)
        .map(|f| f.round())
        .or(ctx.floors.map(f64::from))
        .ok_or_else(|| {
            ValidationError::new("floor_count", "absent from spec and project context")
        })?;
    if floors < 1.0 {
        return Err(ValidationError::new("floor_count", "must be at least 1"));
    }
    if floors > f64::from(MAX_FLOORS) {
        return Err(ValidationError::new(
            "floor_count",
            format!("must not exceed {MAX_FLOORS}"),
        ));
    }
    let floor_count = floors as u32;

    let floor_height_m = round2(
        lookup(raw, FLOOR_HEIGHT_KEYS)
            .and_then(number)
            .or(ctx.floor_height_m)
            .unwrap_or(DEFAULT_FLOOR_HEIGHT_M),
    );
    if floor_height_m <= 0.0 {
        return Err(ValidationError::new("floor_height_m", "must be positive"));
    }

    let width = lookup(raw, WIDTH_KEYS).and_then(number);
    let depth = lookup(raw, DEPTH_KEYS).and_then(number);
    let area = lookup(raw, AREA_KEYS).and_then(number).or(ctx.gross_area_m2);
    let footprint = area.map(|a| a / floor_count as f64);

    let (width_m, depth_m) = match (width, depth, footprint) {
        (Some(w), Some(d), _) => (w, d),
        (Some(w), None, Some(fp)) if w > 0.0 => (w, fp / w),
        (None, Some(d), Some(fp)) if d > 0.0 => (fp / d, d),
        (None, None, Some(fp)) if fp > 0.0 => (fp.sqrt(), fp.sqrt()),
        _ => {
            return Err(ValidationError::new(
                "footprint",
                "width/depth absent and no gross area to derive them from",
            ))
        }
    };
    // validated after rounding so a re-normalized record still passes
    let (width_m, depth_m) = (round2(width_m), round2(depth_m));
    if width_m <= 0.0 || depth_m <= 0.0 {
        return Err(ValidationError::new("footprint", "width and depth must be positive"));
    }

    Ok(Dimensions {
        width_m,
        depth_m,
        floor_count,
        floor_height_m,
    })
}

fn resolve_materials(raw: &Value) -> Vec<Material> {
    let mut out: Vec<Material> = Vec::new();
    let Some(source) = lookup(raw, &["materials", "material"]) else {
        return out;
    };

    let mut push = |m: Material| {
        if !m.name.is_empty() && !out.iter().any(|e| e.name == m.name) {
            out.push(m);
        }
    };

    match source {
        Value::String(s) => s.split(',').map(material_from_name).for_each(&mut push),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => push(material_from_name(s)),
                    Value::Object(_) => {
                        if let Some(m) = material_from_object(item) {
                            push(m)
                        }
                    }
                    _ => {}
                }
            }
        }
        Value::Object(_) => {
            if let Some(m) = material_from_object(source) {
                push(m)
            }
        }
        _ => {}
    }
    out
}

fn material_from_name(name: &str) -> Material {
    let name = canonical_text(name);
    let (color, finish) = material_defaults(&name);
    Material {
        name,
        color: color.to_string(),
        finish: finish.to_string(),
    }
}

fn material_from_object(value: &Value) -> Option<Material> {
    let name = lookup(value, &["name", "material", "type"]).and_then(text)?;
    let (color, finish) = material_defaults(&name);
    Some(Material {
        color: lookup(value, &["color", "colour"])
            .and_then(text)
            .unwrap_or_else(|| color.to_string()),
        finish: lookup(value, &["finish", "texture"])
            .and_then(text)
            .unwrap_or_else(|| finish.to_string()),
        name,
    })
}

/// Default (color, finish) for a material name.
fn material_defaults(name: &str) -> (&'static str, &'static str) {
    const TABLE: &[(&str, &str, &str)] = &[
        ("brick", "red-brown", "matte"),
        ("timber", "natural oak", "oiled"),
        ("wood", "natural oak", "oiled"),
        ("concrete", "light grey", "board-marked"),
        ("glass", "clear", "reflective"),
        ("stone", "warm beige", "honed"),
        ("render", "off-white", "smooth"),
        ("stucco", "off-white", "smooth"),
        ("zinc", "graphite", "standing seam"),
        ("slate", "dark grey", "natural"),
        ("steel", "charcoal", "brushed"),
        ("metal", "charcoal", "brushed"),
        ("tile", "terracotta", "glazed"),
    ];
    TABLE
        .iter()
        .find(|(key, _, _)| name.contains(key))
        .map(|(_, c, f)| (*c, *f))
        .unwrap_or(("neutral", "matte"))
}

fn style_palette(style: &str) -> Vec<Material> {
    let names: &[&str] = if is_modern(style) {
        &["concrete", "glass"]
    } else if style.contains("traditional") || style.contains("vernacular") {
        &["brick", "timber"]
    } else {
        &["render"]
    };
    names.iter().map(|n| material_from_name(n)).collect()
}

fn is_modern(style: &str) -> bool {
    ["modern", "contemporary", "minimal"]
        .iter()
        .any(|k| style.contains(k))
}

fn resolve_roof(raw: &Value, style: &str) -> Roof {
    let (default_form, default_material) = if is_modern(style) {
        ("flat", "bitumen membrane")
    } else {
        ("pitched", "slate")
    };

    let form = lookup(raw, &["roof.form", "roof_form", "roofForm"])
        .and_then(text)
        .unwrap_or_else(|| default_form.to_string());

    let material = match lookup(raw, &["roof.material", "roof_material", "roofMaterial"]) {
        Some(v @ Value::Object(_)) => material_from_object(v),
        Some(v) => text(v).map(|s| material_from_name(&s)),
        None => None,
    }
    .unwrap_or_else(|| material_from_name(default_material));

    Roof { form, material }
}

fn resolve_fenestration(raw: &Value, dims: &Dimensions) -> Fenestration {
    let style = lookup(raw, &["fenestration.style", "windows.style", "window_style", "windowStyle"])
        .and_then(text)
        .unwrap_or_else(|| "casement".to_string());
    let pattern = lookup(raw, &["fenestration.pattern", "windows.pattern", "window_pattern"])
        .and_then(text)
        .unwrap_or_else(|| "regular grid".to_string());
    let count = lookup(raw, &["fenestration.count", "windows.count", "window_count", "windowCount"])
        .and_then(number)
        .map(|c| c.round().max(1.0) as u32)
        .unwrap_or_else(|| {
            let per_floor = (2.0 * (dims.width_m + dims.depth_m) / WINDOW_SPACING_M).round();
            (per_floor.max(1.0) as u32).saturating_mul(dims.floor_count)
        });

    Fenestration {
        style,
        pattern,
        count,
    }
}

/// Seed derived from the fingerprint of the seedless DNA; fits in 32 bits.
fn derived_seed(dna: &DesignDna) -> u64 {
    let fp = dna.fingerprint();
    u64::from_str_radix(&fp[..8], 16).unwrap_or(0)
}

/// First non-null value among dotted paths.
fn lookup<'a>(raw: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        let mut cur = raw;
        for part in path.split('.') {
            cur = cur.get(part)?;
        }
        (!cur.is_null()).then_some(cur)
    })
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static pattern"))
}

/// Coerce numbers, numeric strings with units, and ranges (lower bound).
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let mut found = number_pattern()
                .find_iter(s)
                .filter_map(|m| m.as_str().parse::<f64>().ok());
            let first = found.next()?;
            // "2-3" reads as 2 then -3: treat the dash as a range separator
            Some(match found.next() {
                Some(second) if second < 0.0 && first >= 0.0 => first.min(-second),
                _ => first,
            })
        }
        Value::Array(items) => items.iter().filter_map(number).reduce(f64::min),
        Value::Object(_) => lookup(value, &["min", "value", "from"]).and_then(number),
        _ => None,
    }
}

/// Integer seeds are taken exactly; strings and ranges go through [`number`].
fn seed(value: &Value) -> Result<Option<u64>, ValidationError> {
    if let Some(seed) = value.as_u64() {
        return Ok(Some(seed));
    }
    if let Some(seed) = value.as_str().and_then(|s| s.trim().parse::<u64>().ok()) {
        return Ok(Some(seed));
    }
    match number(value) {
        Some(seed) if seed >= 0.0 => Ok(Some(seed.trunc() as u64)),
        Some(_) => Err(ValidationError::new("seed", "must not be negative")),
        None => Ok(None),
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(canonical_text(s)).filter(|s| !s.is_empty()),
        Value::Array(items) => items.first().and_then(text),
        _ => None,
    }
}

fn orientation(value: &Value) -> Option<Orientation> {
    match value {
        Value::String(s) => Orientation::parse(s),
        Value::Object(_) => lookup(value, &["orientation", "facade"]).and_then(orientation),
        _ => None,
    }
}

/// Trimmed, lowercased, single-spaced.
fn canonical_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ContextDefaults {
        ContextDefaults::default()
    }

    #[test]
    fn test_scalar_material_becomes_list() {
        let raw = json!({"floors": 2, "width": 10, "depth": 8, "materials": "Brick"});
        let dna = normalize(&raw, &ctx()).unwrap();
        assert_eq!(dna.materials.len(), 1);
        assert_eq!(dna.materials[0].name, "brick");
        assert_eq!(dna.materials[0].color, "red-brown");
    }

    #[test]
    fn test_comma_separated_materials_keep_order() {
        let raw = json!({"floors": 1, "width": 10, "depth": 8, "materials": "timber, glass, timber"});
        let dna = normalize(&raw, &ctx()).unwrap();
        let names: Vec<_> = dna.materials.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["timber", "glass"]);
    }

    #[test]
    fn test_context_fills_floors_and_area() {
        let raw = json!({"style": "Modern"});
        let context = ContextDefaults {
            floors: Some(2),
            gross_area_m2: Some(200.0),
            ..Default::default()
        };
        let dna = normalize(&raw, &context).unwrap();
        assert_eq!(dna.dimensions.floor_count, 2);
        assert_eq!(dna.dimensions.width_m, 10.0);
        assert_eq!(dna.dimensions.depth_m, 10.0);
        assert_eq!(dna.style, "modern");
        // modern palette fallback
        assert_eq!(dna.materials[0].name, "concrete");
        assert_eq!(dna.roof.form, "flat");
    }

    #[test]
    fn test_missing_floors_is_validation_error() {
        let raw = json!({"width": 10, "depth": 8});
        let err = normalize(&raw, &ctx()).unwrap_err();
        assert_eq!(err.field, "floor_count");
    }

    #[test]
    fn test_missing_footprint_is_validation_error() {
        let raw = json!({"floors": 2});
        let err = normalize(&raw, &ctx()).unwrap_err();
        assert_eq!(err.field, "footprint");
    }

    #[test]
    fn test_ranges_and_units_collapse() {
        let raw = json!({
            "floors": "2-3",
            "dimensions": {"width": "12.5 m", "length": [9, 11]},
            "floor_height": {"min": 2.8, "max": 3.2}
        });
        let dna = normalize(&raw, &ctx()).unwrap();
        assert_eq!(dna.dimensions.floor_count, 2);
        assert_eq!(dna.dimensions.width_m, 12.5);
        assert_eq!(dna.dimensions.depth_m, 9.0);
        assert_eq!(dna.dimensions.floor_height_m, 2.8);
    }

    #[test]
    fn test_derived_seed_is_deterministic() {
        let raw = json!({"floors": 2, "width": 10, "depth": 8});
        let a = normalize(&raw, &ctx()).unwrap();
        let b = normalize(&raw, &ctx()).unwrap();
        assert_eq!(a.seed, b.seed);
        assert!(a.seed <= u32::MAX as u64);
    }

    #[test]
    fn test_explicit_seed_wins_over_context() {
        let raw = json!({"floors": 2, "width": 10, "depth": 8, "seed": 42});
        let context = ContextDefaults {
            seed: Some(7),
            ..Default::default()
        };
        assert_eq!(normalize(&raw, &context).unwrap().seed, 42);
    }

    #[test]
    fn test_large_seed_is_kept_exactly() {
        let raw = json!({"floors": 2, "width": 10, "depth": 8, "seed": 9_007_199_254_740_993u64});
        assert_eq!(normalize(&raw, &ctx()).unwrap().seed, 9_007_199_254_740_993);

        let raw = json!({"floors": 2, "width": 10, "depth": 8, "seed": u64::MAX.to_string()});
        assert_eq!(normalize(&raw, &ctx()).unwrap().seed, u64::MAX);

        let raw = json!({"floors": 2, "width": 10, "depth": 8, "seed": -3});
        assert_eq!(normalize(&raw, &ctx()).unwrap_err().field, "seed");
    }

    #[test]
    fn test_implausible_floor_count_is_rejected() {
        let raw = json!({"floors": 50_000_000, "width": 100, "depth": 100});
        assert_eq!(normalize(&raw, &ctx()).unwrap_err().field, "floor_count");

        let raw = json!({"floors": MAX_FLOORS, "width": 1_000_000, "depth": 1_000_000});
        let dna = normalize(&raw, &ctx()).unwrap();
        assert_eq!(dna.dimensions.floor_count, MAX_FLOORS);
        assert!(dna.fenestration.count > 0);
    }

    #[test]
    fn test_dimensions_that_round_to_zero_are_rejected() {
        let raw = json!({"floors": 1, "width": 1000, "area": 1});
        assert_eq!(normalize(&raw, &ctx()).unwrap_err().field, "footprint");

        let raw = json!({"floors": 1, "width": 10, "depth": 8, "floor_height": 0.001});
        assert_eq!(normalize(&raw, &ctx()).unwrap_err().field, "floor_height_m");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let raw = json!({
            "floorCount": 3,
            "area": 450,
            "materials": [{"name": " Stone ", "colour": "Honey"}, "glass"],
            "roofMaterial": "Zinc",
            "entrance": {"orientation": "E"},
            "windows": {"count": "18"}
        });
        let once = normalize(&raw, &ctx()).unwrap();
        let twice = normalize(&serde_json::to_value(&once).unwrap(), &ctx()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.entrance, Orientation::East);
        assert_eq!(once.roof.material.name, "zinc");
    }
}
