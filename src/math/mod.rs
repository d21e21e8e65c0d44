//! Minimal 3D math types used by the pipeline.
//!
//! Only the operations the deferred pipeline actually performs are
//! implemented here: light/camera matrix construction, inversion for
//! screen-space reconstruction, and color packing for uniforms.

mod color;
mod matrix4;
mod vector3;

pub use color::Color;
pub use matrix4::Matrix4;
pub use vector3::Vector3;
