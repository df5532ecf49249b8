//! Drift Module
//!
//! Visual comparison of regenerated views against baseline images.

pub mod phash;
pub mod ssim;
pub mod edges;
mod detector;

pub use phash::PerceptualHash;
pub use edges::{edge_alignment, EdgeAlignment};
pub use detector::{DriftDetector, DriftReport, DriftThresholds, DriftWeights, Verdict, ViewDrift, ViewWeights};
