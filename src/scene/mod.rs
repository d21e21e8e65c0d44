//! Frame-input contract between the scene and the pipeline.
//!
//! The scene collaborator owns meshes, lights and the camera. Per frame
//! it hands the pipeline an immutable [`FrameInput`] snapshot: the
//! active camera, the light list in stable scene order, and pre-built
//! draw batches that the pipeline issues without inspecting.

use crate::math::{Color, Matrix4, Vector3};

/// Kind of light source, driving shader variant selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightKind {
    /// Infinitely distant light with parallel rays.
    Directional = 0,
    /// Omni-directional light with distance attenuation.
    Point = 1,
    /// Cone-shaped light with distance attenuation.
    Spot = 2,
}

impl LightKind {
    /// Numeric id consumed by the lighting shader.
    #[inline]
    pub fn gpu_id(&self) -> u32 {
        *self as u32
    }

    /// Number of shadow map slots a caster of this kind needs.
    /// Point lights render one cube face per slot.
    pub fn shadow_slot_count(&self) -> u32 {
        match self {
            Self::Directional | Self::Spot => 1,
            Self::Point => 6,
        }
    }
}

/// Immutable per-frame snapshot of one light.
#[derive(Debug, Clone, PartialEq)]
pub struct LightRecord {
    /// Stable identifier assigned by the scene.
    pub id: u64,
    /// What kind of light this is.
    pub kind: LightKind,
    /// World-space position (ignored for directional lights).
    pub position: Vector3,
    /// Normalized direction (ignored for point lights).
    pub direction: Vector3,
    /// Light color.
    pub color: Color,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Distance at which linear attenuation reaches zero.
    pub linear_radius: f32,
    /// Outer radius of the light volume (quadratic falloff bound).
    pub quadratic_radius: f32,
    /// Spot cone angle in radians (outer, full angle is 2x).
    pub cone_angle: f32,
    /// Whether this light wants a shadow map this frame.
    pub cast_shadow: bool,
}

impl LightRecord {
    /// A white point light at the origin, useful as a starting point.
    pub fn point(id: u64, position: Vector3, radius: f32) -> Self {
        Self {
            id,
            kind: LightKind::Point,
            position,
            direction: Vector3::new(0.0, -1.0, 0.0),
            color: Color::WHITE,
            intensity: 1.0,
            linear_radius: radius * 0.5,
            quadratic_radius: radius,
            cone_angle: 0.0,
            cast_shadow: false,
        }
    }

    /// A white directional light.
    pub fn directional(id: u64, direction: Vector3) -> Self {
        Self {
            id,
            kind: LightKind::Directional,
            position: Vector3::ZERO,
            direction: direction.normalized(),
            color: Color::WHITE,
            intensity: 1.0,
            linear_radius: 0.0,
            quadratic_radius: 0.0,
            cone_angle: 0.0,
            cast_shadow: false,
        }
    }
}

/// Active camera state for one frame.
#[derive(Debug, Clone)]
pub struct CameraSnapshot {
    /// World-space position.
    pub position: Vector3,
    /// View matrix.
    pub view: Matrix4,
    /// Projection matrix.
    pub projection: Matrix4,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
    /// Distance at which fog fully obscures geometry.
    pub fog_distance: f32,
}

impl CameraSnapshot {
    /// Combined view-projection matrix.
    pub fn view_projection(&self) -> Matrix4 {
        self.projection.multiply(&self.view)
    }

    /// Inverse view-projection, for screen-space position reconstruction.
    pub fn inverse_view_projection(&self) -> Matrix4 {
        self.view_projection().inverse()
    }
}

/// A pre-built draw batch, opaque to the pipeline.
///
/// The scene binds geometry and per-object data against the layouts
/// published by the geometry and shadow passes; the pipeline only sets
/// pipeline state and issues the draw.
pub struct DrawBatch {
    /// Vertex buffer (position, normal, uv interleaved).
    pub vertex_buffer: wgpu::Buffer,
    /// Index buffer, `u32` indices.
    pub index_buffer: wgpu::Buffer,
    /// Number of indices to draw.
    pub index_count: u32,
    /// Per-object bind group (model matrix + material constants),
    /// built against [`crate::gbuffer::GeometryPass::model_layout`].
    pub model_bind_group: wgpu::BindGroup,
}

/// Everything the pipeline consumes for one frame.
pub struct FrameInput<'a> {
    /// Active camera.
    pub camera: &'a CameraSnapshot,
    /// Lights in stable scene order.
    pub lights: &'a [LightRecord],
    /// Visible geometry batches.
    pub batches: &'a [DrawBatch],
    /// Bounding center of the visible scene, for directional shadow fit.
    pub scene_center: Vector3,
    /// Bounding radius of the visible scene.
    pub scene_radius: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_count_per_kind() {
        assert_eq!(LightKind::Directional.shadow_slot_count(), 1);
        assert_eq!(LightKind::Spot.shadow_slot_count(), 1);
        assert_eq!(LightKind::Point.shadow_slot_count(), 6);
    }

    #[test]
    fn test_gpu_ids_are_stable() {
        assert_eq!(LightKind::Directional.gpu_id(), 0);
        assert_eq!(LightKind::Point.gpu_id(), 1);
        assert_eq!(LightKind::Spot.gpu_id(), 2);
    }

    #[test]
    fn test_view_projection_round_trip() {
        let camera = CameraSnapshot {
            position: Vector3::new(0.0, 2.0, 8.0),
            view: Matrix4::look_at(
                &Vector3::new(0.0, 2.0, 8.0),
                &Vector3::ZERO,
                &Vector3::UP,
            ),
            projection: Matrix4::perspective(1.2, 1.5, 0.1, 200.0),
            near: 0.1,
            far: 200.0,
            fog_distance: 150.0,
        };
        let vp = camera.view_projection();
        let product = vp.multiply(&camera.inverse_view_projection());
        assert!(product.approx_eq(&Matrix4::IDENTITY, 1e-3));
    }
}
