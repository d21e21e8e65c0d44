//! GPU packing of per-light constants.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::math::Matrix4;
use crate::scene::{CameraSnapshot, LightKind, LightRecord};
use crate::shadows::{CasterId, ShadowSlotPool};

/// Stencil sphere proxies hug the volume radius; a small overscale
/// covers the silhouette error of the coarse tessellation.
const VOLUME_OVERSCALE: f32 = 1.05;

/// Per-light uniform block, one 256-byte region per light.
///
/// Each light's contribution depends only on this block and the
/// G-buffer, so the accumulation order across lights does not matter.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LightBlock {
    /// xyz = world position, w = 1 / shadow range.
    pub position_range: [f32; 4],
    /// rgb = color, w = intensity.
    pub color_intensity: [f32; 4],
    /// xyz = normalized direction, w = cos(cone angle).
    pub direction_cone: [f32; 4],
    /// x = linear radius, y = quadratic radius, z = kind id,
    /// w = 1 when a shadow map is bound this frame.
    pub params: [f32; 4],
    /// Shadow slot indices: x holds the single slot for directional
    /// and spot casters, xyzw + the next vector hold the six
    /// cube-face slots for point casters.
    pub slots_a: [f32; 4],
    /// Cube-face slots 4 and 5.
    pub slots_b: [f32; 4],
    /// Light-space matrix for directional/spot shadow lookup.
    pub shadow_matrix: [[f32; 4]; 4],
    /// Clip transform of the unit-sphere volume proxy.
    pub volume_transform: [[f32; 4]; 4],
}

impl LightBlock {
    /// Pack one light. `caster` carries the slot assignment when the
    /// light has a live shadow map; `None` renders it unshadowed.
    pub fn pack(
        light: &LightRecord,
        caster_id: Option<CasterId>,
        pool: &ShadowSlotPool,
        camera: &CameraSnapshot,
    ) -> Self {
        let inv_range = if light.quadratic_radius > 0.0 {
            1.0 / light.quadratic_radius
        } else {
            0.0
        };

        let mut slots = [0.0f32; 8];
        let mut shadow_matrix = Matrix4::IDENTITY;
        let mut shadowed = 0.0;
        if let Some(id) = caster_id {
            if let Some(caster) = pool.caster(id) {
                for (i, &slot) in caster.slots.iter().take(8).enumerate() {
                    slots[i] = slot as f32;
                }
                if let Some(first) = caster.matrices.first() {
                    shadow_matrix = first.matrix;
                }
                shadowed = 1.0;
            }
        }

        let volume_transform = camera.view_projection().multiply(&Matrix4::translation_scale(
            &light.position,
            light.quadratic_radius * VOLUME_OVERSCALE,
        ));

        Self {
            position_range: [
                light.position.x,
                light.position.y,
                light.position.z,
                inv_range,
            ],
            color_intensity: [
                light.color.r,
                light.color.g,
                light.color.b,
                light.intensity,
            ],
            direction_cone: [
                light.direction.x,
                light.direction.y,
                light.direction.z,
                light.cone_angle.cos(),
            ],
            params: [
                light.linear_radius,
                light.quadratic_radius,
                light.kind.gpu_id() as f32,
                shadowed,
            ],
            slots_a: [slots[0], slots[1], slots[2], slots[3]],
            slots_b: [slots[4], slots[5], slots[6], slots[7]],
            shadow_matrix: shadow_matrix.to_cols_array_2d(),
            volume_transform: volume_transform.to_cols_array_2d(),
        }
    }

    /// Whether this block drives the stencil-masked point path.
    #[inline]
    pub fn is_point(&self) -> bool {
        self.params[2] as u32 == LightKind::Point.gpu_id()
    }
}

/// Pack the frame's light list in scene order.
///
/// Lights whose shadow registration failed (or was never made) are
/// packed unshadowed; the shadow flag stays clear.
pub fn pack_lights(
    lights: &[LightRecord],
    caster_ids: &HashMap<u64, CasterId>,
    pool: &ShadowSlotPool,
    camera: &CameraSnapshot,
) -> Vec<LightBlock> {
    lights
        .iter()
        .map(|light| {
            let caster_id = if light.cast_shadow {
                caster_ids.get(&light.id).copied()
            } else {
                None
            };
            LightBlock::pack(light, caster_id, pool, camera)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Matrix4, Vector3};

    fn test_camera() -> CameraSnapshot {
        CameraSnapshot {
            position: Vector3::new(0.0, 3.0, 10.0),
            view: Matrix4::look_at(&Vector3::new(0.0, 3.0, 10.0), &Vector3::ZERO, &Vector3::UP),
            projection: Matrix4::perspective(1.0, 16.0 / 9.0, 0.1, 100.0),
            near: 0.1,
            far: 100.0,
            fog_distance: 80.0,
        }
    }

    #[test]
    fn test_pack_order_independent() {
        let camera = test_camera();
        let pool = ShadowSlotPool::new(8);
        let ids = HashMap::new();
        let lights = vec![
            LightRecord::point(1, Vector3::new(1.0, 0.0, 0.0), 5.0),
            LightRecord::point(2, Vector3::new(-3.0, 1.0, 2.0), 8.0),
            LightRecord::directional(3, Vector3::new(0.0, -1.0, 0.2)),
        ];
        let mut reversed = lights.clone();
        reversed.reverse();

        let forward = pack_lights(&lights, &ids, &pool, &camera);
        let backward = pack_lights(&reversed, &ids, &pool, &camera);

        // Same blocks regardless of order.
        for block in &forward {
            assert!(backward.contains(block));
        }
        assert_eq!(forward.len(), backward.len());
    }

    #[test]
    fn test_unregistered_caster_packs_unshadowed() {
        let camera = test_camera();
        let pool = ShadowSlotPool::new(8);
        let mut light = LightRecord::point(7, Vector3::ZERO, 4.0);
        light.cast_shadow = true;

        let blocks = pack_lights(&[light], &HashMap::new(), &pool, &camera);
        assert_eq!(blocks[0].params[3], 0.0);
    }

    #[test]
    fn test_registered_caster_packs_slots() {
        let camera = test_camera();
        let mut pool = ShadowSlotPool::new(8);
        let mut light = LightRecord::point(9, Vector3::new(2.0, 1.0, 0.0), 6.0);
        light.cast_shadow = true;

        let mut ids = HashMap::new();
        let caster_id = pool
            .register_caster(light.id, LightKind::Point.shadow_slot_count())
            .unwrap();
        ids.insert(light.id, caster_id);

        let blocks = pack_lights(&[light], &ids, &pool, &camera);
        let block = &blocks[0];
        assert_eq!(block.params[3], 1.0);
        assert!(block.is_point());
        // All six face slots are distinct.
        let slots = [
            block.slots_a[0],
            block.slots_a[1],
            block.slots_a[2],
            block.slots_a[3],
            block.slots_b[0],
            block.slots_b[1],
        ];
        for (i, a) in slots.iter().enumerate() {
            for b in slots.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_inverse_range_guard() {
        let camera = test_camera();
        let pool = ShadowSlotPool::new(4);
        let light = LightRecord::directional(1, Vector3::new(0.3, -1.0, 0.0));
        let blocks = pack_lights(&[light], &HashMap::new(), &pool, &camera);
        assert_eq!(blocks[0].position_range[3], 0.0);
    }
}
