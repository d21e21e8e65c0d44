//! G-buffer targets and the geometry pass that fills them.

pub(crate) mod geometry;
pub(crate) mod targets;

pub use geometry::{CameraUniform, GeometryPass};
pub use targets::{
    GBuffer, ALBEDO_SPEC_FORMAT, BRIGHT_FORMAT, DEPTH_FORMAT, LIGHT_FORMAT, MATERIAL_FORMAT,
    NORMAL_FORMAT, POSITION_FORMAT,
};
