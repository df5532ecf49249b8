//! Prompt Builder
//!
//! Derives a per-view [`ViewSpec`] from normalized DNA. Output is a pure
//! function of its arguments: identical DNA and view type give
//! byte-identical prompts. Every prompt carries the same consistency block
//! (seed, style, floor count, ordered material tokens) verbatim.

use crate::dna::{DesignDna, Orientation};

use super::view::{Aspect, ViewSpec, ViewType};

const GROUND_ROOMS: &[&str] = &["entrance hall", "living room", "kitchen", "dining area", "wc"];
const GROUND_EXCLUDED: &[&str] = &["bedroom", "master bedroom"];
const UPPER_ROOMS: &[&str] = &["master bedroom", "bedroom", "bathroom", "landing"];
const UPPER_EXCLUDED: &[&str] = &["entrance hall", "front door", "living room", "kitchen", "dining area"];

const NEGATIVE_COMMON: &str = "blurry, distorted geometry, inconsistent materials, extra floors, watermark, text artifacts";

/// Build the generation request for one view of a design.
pub fn build_view_spec(dna: &DesignDna, view_type: ViewType) -> ViewSpec {
    let (width, height) = view_type.resolution();
    let mut included_rooms = Vec::new();
    let mut excluded_rooms = Vec::new();

    let body = match view_type {
        ViewType::FloorPlanGround => {
            included_rooms = room_list(GROUND_ROOMS, dna.dimensions.floor_count > 1);
            excluded_rooms = to_owned(GROUND_EXCLUDED);
            floor_plan_body(dna, 0, &included_rooms, &excluded_rooms)
        }
        ViewType::FloorPlanUpper => {
            included_rooms = room_list(UPPER_ROOMS, true);
            excluded_rooms = to_owned(UPPER_EXCLUDED);
            floor_plan_body(dna, 1, &included_rooms, &excluded_rooms)
        }
        ViewType::ElevationNorth
        | ViewType::ElevationSouth
        | ViewType::ElevationEast
        | ViewType::ElevationWest => {
            // elevation_facade is Some for every elevation variant
            let facade = view_type.elevation_facade().unwrap_or(Orientation::South);
            elevation_body(dna, facade)
        }
        ViewType::SectionLong => section_body(dna, true),
        ViewType::SectionCross => section_body(dna, false),
        ViewType::ExteriorFront => format!(
            "Photorealistic 3D exterior render, front view at eye level facing the {} facade with the main entrance centred. \
             Overall footprint {:.2} m x {:.2} m.",
            dna.entrance, dna.dimensions.width_m, dna.dimensions.depth_m
        ),
        ViewType::ExteriorSide => format!(
            "Photorealistic 3D exterior render, side view at eye level facing the {} facade, entrance facade turned away. \
             Overall footprint {:.2} m x {:.2} m.",
            clockwise(dna.entrance), dna.dimensions.width_m, dna.dimensions.depth_m
        ),
        ViewType::Interior => format!(
            "Photorealistic 3D interior render of the ground-floor living room, ceiling height {:.2} m, \
             {} windows along the outer wall, daylight, finishes echoing the facade palette.",
            dna.dimensions.floor_height_m, dna.fenestration.style
        ),
        ViewType::Axonometric => format!(
            "Axonometric cutaway drawing at 30 degrees, all {} floors visible, footprint {:.2} m x {:.2} m, \
             clean line work with flat material colours.",
            dna.dimensions.floor_count, dna.dimensions.width_m, dna.dimensions.depth_m
        ),
        ViewType::Perspective => format!(
            "Hero two-point perspective from street level, the {} entrance facade and the {} facade visible, \
             overall footprint {:.2} m x {:.2} m, soft evening light.",
            dna.entrance,
            clockwise(dna.entrance),
            dna.dimensions.width_m,
            dna.dimensions.depth_m
        ),
        ViewType::SiteDiagram => format!(
            "Top-down site plan diagram with north arrow, building footprint {:.2} m x {:.2} m, \
             main entrance and approach path on the {} side, landscaping and boundaries in flat colour.",
            dna.dimensions.width_m, dna.dimensions.depth_m, dna.entrance
        ),
    };

    let mut prompt = String::new();
    prompt.push_str(&body);
    prompt.push('\n');
    prompt.push_str(&consistency_block(dna));
    if view_type.depicts(Aspect::Roof) {
        prompt.push('\n');
        prompt.push_str(&roof_block(dna));
    }
    if view_type.depicts(Aspect::Fenestration) {
        prompt.push('\n');
        prompt.push_str(&format!(
            "Fenestration: {} {} windows in a {} pattern.",
            dna.fenestration.count, dna.fenestration.style, dna.fenestration.pattern
        ));
    }

    ViewSpec {
        view_type,
        prompt,
        negative_prompt: negative_prompt(view_type, &excluded_rooms),
        width,
        height,
        seed: dna.seed,
        included_rooms,
        excluded_rooms,
    }
}

/// Build specs for several views in the given order.
pub fn build_view_specs(dna: &DesignDna, views: &[ViewType]) -> Vec<ViewSpec> {
    views.iter().map(|v| build_view_spec(dna, *v)).collect()
}

/// Shared tokens every view repeats verbatim.
fn consistency_block(dna: &DesignDna) -> String {
    let materials = dna
        .materials
        .iter()
        .map(|m| m.token())
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "CONSISTENCY LOCK: seed {seed}. Style: {style}. Floors: {floors} at {height:.2} m floor-to-floor. \
         Facade materials in order: {materials}.",
        seed = dna.seed,
        style = dna.style,
        floors = dna.dimensions.floor_count,
        height = dna.dimensions.floor_height_m,
    )
}

fn roof_block(dna: &DesignDna) -> String {
    format!("Roof: {} roof in {}.", dna.roof.form, dna.roof.material.token())
}

fn floor_plan_body(dna: &DesignDna, floor_index: u32, include: &[String], exclude: &[String]) -> String {
    let floors = dna.dimensions.floor_count;
    let (label, entrance_line) = if floor_index == 0 {
        (
            "GROUND FLOOR",
            format!("Main entrance on the {} facade.", dna.entrance),
        )
    } else {
        (
            "UPPER FLOOR",
            "This is not the ground floor: no entrance, no front door, no ground-floor rooms.".to_string(),
        )
    };
    format!(
        "2D architectural floor plan, orthographic top-down, {label} (floor index {floor_index}, level {level} of {floors}). \
         External walls {w:.2} m x {d:.2} m. {entrance_line} Include only: {include}. Exclude: {exclude}.",
        level = floor_index + 1,
        w = dna.dimensions.width_m,
        d = dna.dimensions.depth_m,
        include = include.join(", "),
        exclude = exclude.join(", "),
    )
}

fn elevation_body(dna: &DesignDna, facade: Orientation) -> String {
    let dims = &dna.dimensions;
    let facade_width = match facade {
        Orientation::North | Orientation::South => dims.width_m,
        Orientation::East | Orientation::West => dims.depth_m,
    };
    let entrance = if facade == dna.entrance {
        "The main entrance is on this facade."
    } else {
        "No entrance on this facade."
    };
    format!(
        "Orthographic {facade} elevation, flat projection, no perspective. Facade width {facade_width:.2} m. \
         {floors} floors at {height:.2} m floor-to-floor, eaves height {eaves:.2} m. {entrance}",
        floors = dims.floor_count,
        height = dims.floor_height_m,
        eaves = dims.eaves_height_m(),
    )
}

fn section_body(dna: &DesignDna, long: bool) -> String {
    let dims = &dna.dimensions;
    let (label, cut) = if long {
        ("longitudinal", dims.width_m.max(dims.depth_m))
    } else {
        ("cross", dims.width_m.min(dims.depth_m))
    };
    let levels = (0..=dims.floor_count)
        .map(|i| format!("+{:.2} m", i as f64 * dims.floor_height_m))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Architectural {label} section, orthographic, cut length {cut:.2} m. {floors} floors at {height:.2} m \
         floor-to-floor, floor levels at {levels}.",
        floors = dims.floor_count,
        height = dims.floor_height_m,
    )
}

fn negative_prompt(view_type: ViewType, excluded_rooms: &[String]) -> String {
    let specific = if view_type.is_floor_plan() {
        format!("perspective, 3d render, {}", excluded_rooms.join(", "))
    } else if view_type.elevation_facade().is_some()
        || matches!(view_type, ViewType::SectionLong | ViewType::SectionCross)
    {
        "perspective distortion, vanishing points, people".to_string()
    } else {
        "cartoon, low detail".to_string()
    };
    format!("{specific}, {NEGATIVE_COMMON}")
}

fn clockwise(o: Orientation) -> Orientation {
    match o {
        Orientation::North => Orientation::East,
        Orientation::East => Orientation::South,
        Orientation::South => Orientation::West,
        Orientation::West => Orientation::North,
    }
}

fn room_list(rooms: &[&str], with_stairs: bool) -> Vec<String> {
    let mut list = to_owned(rooms);
    if with_stairs {
        list.push("staircase".to_string());
    }
    list
}

fn to_owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
