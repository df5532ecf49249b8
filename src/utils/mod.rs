//! Utils Module
pub mod truncate;

pub use truncate::{preview, truncate_text};
