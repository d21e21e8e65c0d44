//! Ambient occlusion: SSAO and HBAO variants behind one contract.
//!
//! Both variants consume the G-buffer normal and depth plus the
//! camera's matrices and write a single-channel occlusion texture at
//! G-buffer resolution, blurred by a small spatial filter. Exactly one
//! variant is active at a time; HBAO takes priority when both are
//! requested at configuration time.

mod kernel;
mod stage;

pub use kernel::{generate_kernel, generate_noise, NOISE_DIM};
pub use stage::AoStage;

/// Occlusion texture format, single channel.
pub const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
