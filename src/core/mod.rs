//! Pipeline configuration and error types.

mod config;
mod error;

pub use config::{AoVariant, PipelineConfig, ShadowQuality, SsaoConfig, TextureQuality};
pub use error::PipelineError;
