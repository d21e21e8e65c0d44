//! The deferred pipeline: owns every render stage and drives a frame
//! from G-buffer fill to the final surface blit.

use std::collections::{HashMap, HashSet};

use crate::ao::AoStage;
use crate::core::{AoVariant, PipelineConfig, PipelineError};
use crate::gbuffer::{GBuffer, GeometryPass};
use crate::lighting::{pack_lights, LightingAccumulator};
use crate::math::Color;
use crate::postprocess::{BloomEffect, BloomSettings, PostProcessChain, TonemapEffect};
use crate::scene::{FrameInput, LightKind, LightRecord};
use crate::shadows::{
    CasterId, ShadowMatrixTable, ShadowRenderer, ShadowSlotPool, SlotMatrices,
};

/// Clip-space depth offset applied while rendering into shadow slots.
const SHADOW_DEPTH_BIAS: f32 = 0.002;

/// Per-frame statistics returned by [`DeferredPipeline::render_lighting`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameInfo {
    /// Lights accumulated this frame.
    pub lights: usize,
    /// Shadow slots owned by live casters.
    pub shadow_slots: u32,
    /// Geometry batches drawn.
    pub batches: usize,
}

/// Reconcile shadow caster registrations with this frame's light list.
///
/// Casters for lights that disappeared or stopped casting release their
/// slots (reusable after the next frame); lights that started casting
/// get slots popped from the free list. A light that changed kind while
/// registered releases its old allotment and registers anew, since the
/// slot count per caster follows the kind. A point light that cannot
/// get all six faces stays unregistered and renders unshadowed.
fn sync_casters(
    pool: &mut ShadowSlotPool,
    registry: &mut HashMap<u64, CasterId>,
    lights: &[LightRecord],
) {
    let wants_shadow: HashSet<u64> = lights
        .iter()
        .filter(|l| l.cast_shadow)
        .map(|l| l.id)
        .collect();

    registry.retain(|light_id, caster_id| {
        if wants_shadow.contains(light_id) {
            true
        } else {
            pool.unregister_caster(*caster_id);
            false
        }
    });

    for light in lights.iter().filter(|l| l.cast_shadow) {
        let wanted = light.kind.shadow_slot_count();
        if let Some(&caster_id) = registry.get(&light.id) {
            let owned = pool
                .caster(caster_id)
                .map_or(0, |c| c.slots.len() as u32);
            if owned == wanted {
                continue;
            }
            pool.unregister_caster(caster_id);
            registry.remove(&light.id);
        }
        match pool.register_caster(light.id, wanted) {
            Ok(caster_id) => {
                registry.insert(light.id, caster_id);
            }
            Err(err) => {
                log::warn!("light {} renders unshadowed: {}", light.id, err);
            }
        }
    }
}

/// The full deferred pipeline. GPU resources release when dropped.
pub struct DeferredPipeline {
    config: PipelineConfig,
    gbuffer: GBuffer,
    geometry: GeometryPass,
    shadow_pool: ShadowSlotPool,
    shadow_table: ShadowMatrixTable,
    shadow_renderer: ShadowRenderer,
    casters: HashMap<u64, CasterId>,
    ao: AoStage,
    accumulator: LightingAccumulator,
    chain: PostProcessChain,
}

impl DeferredPipeline {
    /// Build every stage from a validated configuration.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let config = config.clone().validated()?;
        let (render_width, render_height) = config.render_size();

        let gbuffer = GBuffer::new(device, render_width, render_height);
        let geometry = GeometryPass::new(device);

        let shadow_pool = ShadowSlotPool::new(config.max_shadow_maps);
        let shadow_table = ShadowMatrixTable::new(config.max_shadow_maps);
        let shadow_renderer = ShadowRenderer::new(
            device,
            queue,
            geometry.model_layout(),
            config.shadow_quality.resolution(),
            config.max_shadow_maps,
        );

        let ao = AoStage::new(
            device,
            queue,
            gbuffer.sample_layout(),
            render_width,
            render_height,
            config.ao_variant(),
            config.ao_enabled,
            config.ssao,
        );

        let accumulator = LightingAccumulator::new(
            device,
            gbuffer.sample_layout(),
            shadow_renderer.array_view(),
            ao.occlusion_view(),
            config.ao_enabled,
        );

        let mut chain =
            PostProcessChain::new(device, render_width, render_height, config.surface_format);
        chain.add_effect(Box::new(BloomEffect::new(
            device,
            queue,
            chain.shared_layout(),
            render_width,
            render_height,
            BloomSettings::default(),
        )));
        chain.add_effect(Box::new(TonemapEffect::new(device, chain.shared_layout())));

        Ok(Self {
            config,
            gbuffer,
            geometry,
            shadow_pool,
            shadow_table,
            shadow_renderer,
            casters: HashMap::new(),
            ao,
            accumulator,
            chain,
        })
    }

    /// Handle an output resize: recreate the G-buffer, the occlusion
    /// targets and the chain targets, then rebind dependent groups.
    pub fn screen_resized(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
    ) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        let (render_width, render_height) = self.config.render_size();

        self.gbuffer.resize(device, render_width, render_height);
        self.ao.resize(device, queue, render_width, render_height);
        self.accumulator.rebind(
            device,
            self.shadow_renderer.array_view(),
            self.ao.occlusion_view(),
        );
        self.chain.resize(device, queue, render_width, render_height);
    }

    /// Render one frame into `surface_view`.
    ///
    /// Stage order: caster reconciliation, shadow maps, G-buffer fill,
    /// ambient occlusion, per-light accumulation, post-processing.
    pub fn render_lighting(
        &mut self,
        queue: &wgpu::Queue,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameInput<'_>,
        surface_view: &wgpu::TextureView,
    ) -> FrameInfo {
        // Slots released last frame become allocatable only now, after
        // the GPU has retired the frame that sampled them.
        self.shadow_pool.begin_frame();
        sync_casters(&mut self.shadow_pool, &mut self.casters, frame.lights);
        self.update_shadow_matrices(frame);

        self.geometry.update_camera(queue, frame.camera);
        self.geometry.record(encoder, &self.gbuffer, frame.batches);

        self.shadow_renderer.record(
            queue,
            encoder,
            &self.shadow_pool,
            &self.shadow_table,
            frame.lights,
            frame.batches,
        );

        if self.ao.enabled() {
            self.ao.update(queue, frame.camera);
            self.ao.record(encoder, self.gbuffer.sample_bind_group());
        }

        let blocks = pack_lights(frame.lights, &self.casters, &self.shadow_pool, frame.camera);
        let lights = self
            .accumulator
            .record(queue, encoder, &self.gbuffer, frame.camera, &blocks);

        self.chain.execute(
            device,
            queue,
            encoder,
            self.gbuffer.light_view(),
            self.gbuffer.bright_view(),
            surface_view,
        );

        FrameInfo {
            lights,
            shadow_slots: self.shadow_pool.live_slots(),
            batches: frame.batches.len(),
        }
    }

    /// Rewrite every live caster's light-space matrices for this frame.
    fn update_shadow_matrices(&mut self, frame: &FrameInput<'_>) {
        self.shadow_table.clear();

        for light in frame.lights {
            let Some(&caster_id) = self.casters.get(&light.id) else {
                continue;
            };
            let matrices: Vec<SlotMatrices> = match light.kind {
                LightKind::Directional => {
                    let vp = ShadowRenderer::directional_matrix(
                        &light.direction,
                        &frame.scene_center,
                        frame.scene_radius,
                    );
                    vec![SlotMatrices::with_bias(vp, SHADOW_DEPTH_BIAS)]
                }
                LightKind::Spot => {
                    let vp = ShadowRenderer::spot_matrix(
                        &light.position,
                        &light.direction,
                        light.cone_angle,
                        light.quadratic_radius,
                    );
                    vec![SlotMatrices::with_bias(vp, SHADOW_DEPTH_BIAS)]
                }
                LightKind::Point => {
                    ShadowRenderer::point_matrices(&light.position, light.quadratic_radius)
                        .iter()
                        .map(|vp| SlotMatrices::with_bias(*vp, SHADOW_DEPTH_BIAS))
                        .collect()
                }
            };

            let Some(caster) = self.shadow_pool.caster_mut(caster_id) else {
                continue;
            };
            caster.matrices = matrices;
            for (&slot, m) in caster.slots.iter().zip(caster.matrices.iter()) {
                self.shadow_table.set(slot, *m);
            }
        }
    }

    /// Set the ambient light term.
    pub fn set_ambient_color(&mut self, color: Color, intensity: f32) {
        self.accumulator.set_ambient(color, intensity);
    }

    /// Set the fog color.
    pub fn set_fog_color(&mut self, color: Color) {
        self.accumulator.set_fog_color(color);
    }

    /// Set the distance at which fog reaches full strength and the
    /// distance at which it starts.
    pub fn set_fog_properties(&mut self, clear_distance: f32, start_distance: f32) {
        self.accumulator.set_fog_distances(clear_distance, start_distance);
    }

    /// Toggle the ambient-occlusion stage at runtime.
    pub fn enable_ao(&mut self, enabled: bool) {
        self.ao.set_enabled(enabled);
        self.accumulator.set_ao_enabled(enabled);
    }

    /// Switch the ambient-occlusion variant at runtime.
    pub fn set_ao_variant(&mut self, variant: AoVariant) {
        self.ao.set_variant(variant);
    }

    /// Set bloom strength carried to the post-process chain.
    pub fn set_bloom(&mut self, queue: &wgpu::Queue, intensity: f32, enabled: bool) {
        self.chain.set_bloom_intensity(queue, intensity, enabled);
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The per-object bind group layout scenes build batches against.
    #[inline]
    pub fn model_layout(&self) -> &wgpu::BindGroupLayout {
        self.geometry.model_layout()
    }

    /// Shadow slots currently owned by live casters.
    #[inline]
    pub fn live_shadow_slots(&self) -> u32 {
        self.shadow_pool.live_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    fn point_caster(id: u64) -> LightRecord {
        let mut light = LightRecord::point(id, Vector3::ZERO, 5.0);
        light.cast_shadow = true;
        light
    }

    #[test]
    fn test_sync_registers_and_releases() {
        let mut pool = ShadowSlotPool::new(8);
        let mut registry = HashMap::new();

        let lights = vec![point_caster(1)];
        sync_casters(&mut pool, &mut registry, &lights);
        assert!(registry.contains_key(&1));
        assert_eq!(pool.live_slots(), 6);

        // The light stops casting: slots release, pending one frame.
        let mut off = lights.clone();
        off[0].cast_shadow = false;
        sync_casters(&mut pool, &mut registry, &off);
        assert!(registry.is_empty());
        assert_eq!(pool.live_slots(), 0);
        assert_eq!(pool.available(), 2);
        pool.begin_frame();
        assert_eq!(pool.available(), 8);
    }

    #[test]
    fn test_sync_exhaustion_leaves_light_unshadowed() {
        let mut pool = ShadowSlotPool::new(8);
        let mut registry = HashMap::new();

        // Two point casters want 12 slots; only the first fits.
        let lights = vec![point_caster(1), point_caster(2)];
        sync_casters(&mut pool, &mut registry, &lights);
        assert!(registry.contains_key(&1));
        assert!(!registry.contains_key(&2));
        assert_eq!(pool.live_slots(), 6);
    }

    #[test]
    fn test_sync_reregisters_on_kind_change() {
        let mut pool = ShadowSlotPool::new(8);
        let mut registry = HashMap::new();

        let mut lights = vec![point_caster(3)];
        lights[0].kind = LightKind::Spot;
        sync_casters(&mut pool, &mut registry, &lights);
        assert_eq!(pool.live_slots(), 1);

        // Same light becomes a point caster: one slot no longer covers
        // six cube faces, so the caster is rebuilt.
        lights[0].kind = LightKind::Point;
        sync_casters(&mut pool, &mut registry, &lights);
        let caster_id = registry[&3];
        let owned = pool.caster(caster_id).map(|c| c.slots.len()).unwrap();
        assert_eq!(owned, 6);
        assert_eq!(pool.live_slots(), 6);
    }

    #[test]
    fn test_sync_removed_light_releases_slots() {
        let mut pool = ShadowSlotPool::new(4);
        let mut registry = HashMap::new();

        let mut lights = vec![point_caster(7)];
        lights[0].kind = LightKind::Spot;
        sync_casters(&mut pool, &mut registry, &lights);
        assert_eq!(pool.live_slots(), 1);

        sync_casters(&mut pool, &mut registry, &[]);
        assert_eq!(pool.live_slots(), 0);
        assert!(registry.is_empty());
    }
}
