//! Design DNA types
//!
//! The canonical, fully-resolved design description. Every field is
//! concrete after normalization; nothing here is optional.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Footprint and vertical dimensions, in meters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width_m: f64,
    pub depth_m: f64,
    pub floor_count: u32,
    pub floor_height_m: f64,
}

impl Dimensions {
    /// Eaves height: floor count times floor-to-floor height.
    pub fn eaves_height_m(&self) -> f64 {
        self.floor_count as f64 * self.floor_height_m
    }

    pub fn gross_area_m2(&self) -> f64 {
        self.width_m * self.depth_m * self.floor_count as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    pub color: String,
    pub finish: String,
}

impl Material {
    /// Prompt token, e.g. `brick (red-brown, matte)`.
    pub fn token(&self) -> String {
        format!("{} ({}, {})", self.name, self.color, self.finish)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roof {
    pub form: String,
    pub material: Material,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fenestration {
    pub style: String,
    pub pattern: String,
    pub count: u32,
}

/// Compass orientation of a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    North,
    South,
    East,
    West,
}

impl Orientation {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "n" | "north" => Some(Orientation::North),
            "s" | "south" => Some(Orientation::South),
            "e" | "east" => Some(Orientation::East),
            "w" | "west" => Some(Orientation::West),
            _ => None,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::North => write!(f, "north"),
            Orientation::South => write!(f, "south"),
            Orientation::East => write!(f, "east"),
            Orientation::West => write!(f, "west"),
        }
    }
}

/// Canonical design description shared by every view of a sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDna {
    pub dimensions: Dimensions,
    pub materials: Vec<Material>,
    pub roof: Roof,
    pub fenestration: Fenestration,
    pub entrance: Orientation,
    pub style: String,
    pub seed: u64,
}

impl DesignDna {
    /// The dominant facade material (first in order).
    pub fn primary_material(&self) -> &Material {
        // non-empty by construction
        &self.materials[0]
    }

    /// SHA-256 over the canonical JSON form, hex encoded.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}
