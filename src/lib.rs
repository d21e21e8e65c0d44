//! # Ember - Deferred Rendering Pipeline for wgpu
//!
//! Ember renders scenes through a classic deferred path: geometry is
//! rasterized once into a multi-target G-buffer, every light then adds
//! its contribution in screen space, and a post-processing chain shapes
//! the final image.
//!
//! ## Stages
//!
//! - **G-buffer**: position, normal, albedo + specular, material and
//!   depth/stencil attachments filled by a single geometry pass
//! - **Shadows**: variance shadow maps in a fixed-capacity slot array,
//!   allocated LIFO, filtered with a separable three-pass blur
//! - **AO**: selectable SSAO or HBAO occlusion stage
//! - **Lighting**: one additive pass per light, point-light volumes
//!   restricted by stencil masking, plus a final ambient pass
//! - **Post-processing**: bloom and tonemapping over two ping-ponged
//!   targets, blitted to the surface
//!
//! ## Example
//!
//! ```ignore
//! use ember::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let mut pipeline = DeferredPipeline::new(&device, &queue, &config)?;
//!
//! let mut encoder = device.create_command_encoder(&Default::default());
//! let info = pipeline.render_lighting(&queue, &device, &mut encoder, &frame, &surface_view);
//! queue.submit([encoder.finish()]);
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod ao;
pub mod core;
pub mod gbuffer;
pub mod lighting;
pub mod math;
pub mod pipeline;
pub mod postprocess;
pub mod scene;
pub mod shadows;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::core::{
        AoVariant, PipelineConfig, PipelineError, ShadowQuality, SsaoConfig, TextureQuality,
    };
    pub use crate::gbuffer::{GBuffer, GeometryPass};
    pub use crate::math::{Color, Matrix4, Vector3};
    pub use crate::pipeline::{DeferredPipeline, FrameInfo};
    pub use crate::scene::{CameraSnapshot, DrawBatch, FrameInput, LightKind, LightRecord};
    pub use crate::shadows::{ShadowRenderer, ShadowSlotPool};
}

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = "Ember";
