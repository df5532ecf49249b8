use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::dna::Orientation;

/// The views a sheet can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViewType {
    #[serde(rename = "floor-plan-ground")]
    FloorPlanGround,
    #[serde(rename = "floor-plan-upper")]
    FloorPlanUpper,
    #[serde(rename = "elevation-n")]
    ElevationNorth,
    #[serde(rename = "elevation-s")]
    ElevationSouth,
    #[serde(rename = "elevation-e")]
    ElevationEast,
    #[serde(rename = "elevation-w")]
    ElevationWest,
    #[serde(rename = "section-long")]
    SectionLong,
    #[serde(rename = "section-cross")]
    SectionCross,
    #[serde(rename = "3d-exterior-front")]
    ExteriorFront,
    #[serde(rename = "3d-exterior-side")]
    ExteriorSide,
    #[serde(rename = "3d-interior")]
    Interior,
    #[serde(rename = "axonometric")]
    Axonometric,
    #[serde(rename = "perspective")]
    Perspective,
    #[serde(rename = "site-diagram")]
    SiteDiagram,
}

/// A facet of the DNA that a view depicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    Layout,
    Facade,
    Roof,
    Fenestration,
    Entrance,
    Interior,
    Site,
}

impl ViewType {
    pub const ALL: [ViewType; 14] = [
        ViewType::FloorPlanGround,
        ViewType::FloorPlanUpper,
        ViewType::ElevationNorth,
        ViewType::ElevationSouth,
        ViewType::ElevationEast,
        ViewType::ElevationWest,
        ViewType::SectionLong,
        ViewType::SectionCross,
        ViewType::ExteriorFront,
        ViewType::ExteriorSide,
        ViewType::Interior,
        ViewType::Axonometric,
        ViewType::Perspective,
        ViewType::SiteDiagram,
    ];

    /// Wire name, e.g. `floor-plan-ground`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewType::FloorPlanGround => "floor-plan-ground",
            ViewType::FloorPlanUpper => "floor-plan-upper",
            ViewType::ElevationNorth => "elevation-n",
            ViewType::ElevationSouth => "elevation-s",
            ViewType::ElevationEast => "elevation-e",
            ViewType::ElevationWest => "elevation-w",
            ViewType::SectionLong => "section-long",
            ViewType::SectionCross => "section-cross",
            ViewType::ExteriorFront => "3d-exterior-front",
            ViewType::ExteriorSide => "3d-exterior-side",
            ViewType::Interior => "3d-interior",
            ViewType::Axonometric => "axonometric",
            ViewType::Perspective => "perspective",
            ViewType::SiteDiagram => "site-diagram",
        }
    }

    /// Which DNA aspects this view depicts; drives selective regeneration.
    pub fn aspects(&self) -> &'static [Aspect] {
        use Aspect::*;
        match self {
            ViewType::FloorPlanGround => &[Layout, Entrance],
            ViewType::FloorPlanUpper => &[Layout],
            ViewType::ElevationNorth
            | ViewType::ElevationSouth
            | ViewType::ElevationEast
            | ViewType::ElevationWest => &[Facade, Roof, Fenestration, Entrance],
            ViewType::SectionLong | ViewType::SectionCross => &[Layout, Roof],
            ViewType::ExteriorFront => &[Facade, Roof, Fenestration, Entrance, Site],
            ViewType::ExteriorSide => &[Facade, Roof, Fenestration, Site],
            ViewType::Interior => &[Interior],
            ViewType::Axonometric => &[Layout, Facade, Roof, Fenestration],
            ViewType::Perspective => &[Facade, Roof, Fenestration, Entrance, Site],
            ViewType::SiteDiagram => &[Site, Roof, Entrance],
        }
    }

    pub fn depicts(&self, aspect: Aspect) -> bool {
        self.aspects().contains(&aspect)
    }

    pub fn is_floor_plan(&self) -> bool {
        matches!(self, ViewType::FloorPlanGround | ViewType::FloorPlanUpper)
    }

    /// Facade shown by an elevation view.
    pub fn elevation_facade(&self) -> Option<Orientation> {
        match self {
            ViewType::ElevationNorth => Some(Orientation::North),
            ViewType::ElevationSouth => Some(Orientation::South),
            ViewType::ElevationEast => Some(Orientation::East),
            ViewType::ElevationWest => Some(Orientation::West),
            _ => None,
        }
    }

    /// Target (width, height) in pixels.
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            ViewType::FloorPlanGround
            | ViewType::FloorPlanUpper
            | ViewType::Axonometric
            | ViewType::SiteDiagram => (1024, 1024),
            ViewType::ElevationNorth
            | ViewType::ElevationSouth
            | ViewType::ElevationEast
            | ViewType::ElevationWest
            | ViewType::SectionLong
            | ViewType::SectionCross => (1024, 768),
            ViewType::ExteriorFront
            | ViewType::ExteriorSide
            | ViewType::Interior
            | ViewType::Perspective => (1344, 768),
        }
    }
}

impl std::fmt::Display for ViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ViewType::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| format!("unknown view type `{s}`"))
    }
}

/// A fully-derived generation request for one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub view_type: ViewType,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    /// Room tokens the plan must show (floor plans only).
    #[serde(default)]
    pub included_rooms: Vec<String>,
    /// Room tokens the plan must not show (floor plans only).
    #[serde(default)]
    pub excluded_rooms: Vec<String>,
}

impl ViewSpec {
    pub fn aspects(&self) -> &'static [Aspect] {
        self.view_type.aspects()
    }
}
