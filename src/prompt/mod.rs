//! Prompt Module
//!
//! View taxonomy and the deterministic per-view prompt builder.

mod view;
mod builder;

pub use view::{Aspect, ViewSpec, ViewType};
pub use builder::{build_view_spec, build_view_specs};
