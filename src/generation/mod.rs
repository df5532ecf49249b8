//! Generation Module
//!
//! Provider seams, the retrying generation client, HTTP adapters and image
//! resolution.

pub mod provider;
pub mod client;
pub mod http;
pub mod images;
pub mod sleeper;

pub use provider::{
    ImageProvider, ImageRef, ImageRequest, ImageResponse, ProviderFailure, TextProvider, TextRequest,
};
pub use client::{GeneratedView, GenerationClient, GenerationKnobs, RetryPolicy};
pub use http::{OpenAiImageProvider, OpenAiTextProvider};
pub use images::{ImageFetcher, ImageResolver, MemoryImageStore};
pub use sleeper::{RecordingSleeper, SleepReason, Sleeper, TokioSleeper};
