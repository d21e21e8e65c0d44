//! Variance shadow renderer.
//!
//! For every registered caster this renders scene depth from the
//! light's point of view into a scratch target, then runs a three-pass
//! separable filter that ping-pongs between the scratch target and the
//! caster's persistent slot layer. Directional and spot slots store
//! clip-space depth moments; point-light cube faces store normalized
//! radial distance moments so the lighting shader can compare without
//! per-face matrices.

use bytemuck::{Pod, Zeroable};

use crate::gbuffer::geometry::vertex_layout;
use crate::math::{Matrix4, Vector3};
use crate::postprocess::effect::{FullscreenVertex, FULLSCREEN_QUAD_VERTICES};
use crate::scene::{DrawBatch, LightKind, LightRecord};

use super::{ShadowMatrixTable, ShadowSlotPool};

/// Format of the shadow slot array and scratch target: two filtered
/// variance moments per texel.
pub const MOMENTS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Depth format of the scratch depth buffer used while rendering
/// from the light's point of view.
const SCRATCH_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Uniform stride honouring the 256-byte dynamic offset alignment.
const UNIFORM_STRIDE: u64 = 256;

/// Depth-and-moments shader for the light's point of view.
const MOMENTS_SHADER: &str = r#"
struct LightCamera {
    view_proj: mat4x4<f32>,
    // xyz = light position, w = 1 / range
    light_pos: vec4<f32>,
    // x: 0 = clip depth moments, 1 = radial distance moments
    mode: vec4<f32>,
}

struct Model {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
    base_color: vec4<f32>,
    material: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> light_camera: LightCamera;

@group(1) @binding(0)
var<uniform> model: Model;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_pos = model.model * vec4<f32>(in.position, 1.0);
    out.world_position = world_pos.xyz;
    out.clip_position = light_camera.view_proj * world_pos;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec2<f32> {
    var depth: f32;
    if (light_camera.mode.x > 0.5) {
        depth = distance(in.world_position, light_camera.light_pos.xyz)
            * light_camera.light_pos.w;
    } else {
        depth = in.clip_position.z;
    }
    return vec2<f32>(depth, depth * depth);
}
"#;

/// Separable blur over the moments, one direction per pass.
const FILTER_SHADER: &str = r#"
struct FilterParams {
    // xy = step direction, zw = texel size
    direction: vec4<f32>,
}

@group(0) @binding(0)
var source: texture_2d<f32>;
@group(0) @binding(1)
var source_sampler: sampler;
@group(0) @binding(2)
var<uniform> params: FilterParams;

struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec2<f32> {
    let step = params.direction.xy * params.direction.zw;
    var sum = textureSample(source, source_sampler, in.uv).rg * 0.2941176;
    sum += textureSample(source, source_sampler, in.uv + step * 1.3333333).rg * 0.3529412;
    sum += textureSample(source, source_sampler, in.uv - step * 1.3333333).rg * 0.3529412;
    return sum;
}
"#;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct LightCameraUniform {
    view_proj: [[f32; 4]; 4],
    light_pos: [f32; 4],
    mode: [f32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct FilterUniform {
    direction: [f32; 4],
}

/// Face directions for point-light cube rendering, one slot per face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CubeFace {
    /// Positive X (+X).
    PositiveX = 0,
    /// Negative X (-X).
    NegativeX = 1,
    /// Positive Y (+Y).
    PositiveY = 2,
    /// Negative Y (-Y).
    NegativeY = 3,
    /// Positive Z (+Z).
    PositiveZ = 4,
    /// Negative Z (-Z).
    NegativeZ = 5,
}

impl CubeFace {
    /// All faces in slot order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// View direction for this face.
    pub fn direction(&self) -> Vector3 {
        match self {
            CubeFace::PositiveX => Vector3::new(1.0, 0.0, 0.0),
            CubeFace::NegativeX => Vector3::new(-1.0, 0.0, 0.0),
            CubeFace::PositiveY => Vector3::new(0.0, 1.0, 0.0),
            CubeFace::NegativeY => Vector3::new(0.0, -1.0, 0.0),
            CubeFace::PositiveZ => Vector3::new(0.0, 0.0, 1.0),
            CubeFace::NegativeZ => Vector3::new(0.0, 0.0, -1.0),
        }
    }

    /// Up vector for this face.
    pub fn up(&self) -> Vector3 {
        match self {
            CubeFace::PositiveY => Vector3::new(0.0, 0.0, 1.0),
            CubeFace::NegativeY => Vector3::new(0.0, 0.0, -1.0),
            _ => Vector3::new(0.0, -1.0, 0.0),
        }
    }
}

/// Renders and filters shadow maps into the shared slot array.
pub struct ShadowRenderer {
    slot_texture: wgpu::Texture,
    slot_views: Vec<wgpu::TextureView>,
    array_view: wgpu::TextureView,
    scratch: wgpu::Texture,
    scratch_view: wgpu::TextureView,
    scratch_depth_view: wgpu::TextureView,
    moments_pipeline: wgpu::RenderPipeline,
    filter_pipeline: wgpu::RenderPipeline,
    light_camera_buffer: wgpu::Buffer,
    light_camera_bind_group: wgpu::BindGroup,
    filter_buffer: wgpu::Buffer,
    filter_layout: wgpu::BindGroupLayout,
    scratch_bind_group: wgpu::BindGroup,
    slot_bind_groups: Vec<wgpu::BindGroup>,
    quad_buffer: wgpu::Buffer,
    resolution: u32,
    capacity: u32,
}

impl ShadowRenderer {
    /// Create the slot array, scratch targets and both pipelines.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        model_layout: &wgpu::BindGroupLayout,
        resolution: u32,
        capacity: u32,
    ) -> Self {
        let slot_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Slot Array"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: capacity,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MOMENTS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let slot_views: Vec<wgpu::TextureView> = (0..capacity)
            .map(|layer| {
                slot_texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("Shadow Slot {}", layer)),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let array_view = slot_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Shadow Slot Array View"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let scratch = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Scratch"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MOMENTS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let scratch_view = scratch.create_view(&wgpu::TextureViewDescriptor::default());

        let scratch_depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Shadow Scratch Depth"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SCRATCH_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let scratch_depth_view =
            scratch_depth.create_view(&wgpu::TextureViewDescriptor::default());

        // Light camera uniform with one 256-byte entry per slot so
        // every slot render this frame keeps its own constants.
        let light_camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Light Camera Buffer"),
            size: UNIFORM_STRIDE * capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let light_camera_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Shadow Light Camera Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<LightCameraUniform>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let light_camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Light Camera Bind Group"),
            layout: &light_camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &light_camera_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<LightCameraUniform>() as u64),
                }),
            }],
        });

        let moments_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Moments Shader"),
            source: wgpu::ShaderSource::Wgsl(MOMENTS_SHADER.into()),
        });

        let moments_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Shadow Moments Pipeline Layout"),
            bind_group_layouts: &[&light_camera_layout, model_layout],
            push_constant_ranges: &[],
        });

        let moments_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Moments Pipeline"),
            layout: Some(&moments_layout),
            vertex: wgpu::VertexState {
                module: &moments_shader,
                entry_point: Some("vs_main"),
                buffers: &[vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &moments_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: MOMENTS_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: SCRATCH_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Filter resources.
        let filter_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Filter Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let filter_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Filter Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<FilterUniform>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        // Two fixed entries: horizontal at offset 0, vertical at 256.
        let filter_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Filter Buffer"),
            size: UNIFORM_STRIDE * 2,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let texel = 1.0 / resolution as f32;
        let horizontal = FilterUniform {
            direction: [1.0, 0.0, texel, texel],
        };
        let vertical = FilterUniform {
            direction: [0.0, 1.0, texel, texel],
        };
        queue.write_buffer(&filter_buffer, 0, bytemuck::bytes_of(&horizontal));
        queue.write_buffer(&filter_buffer, UNIFORM_STRIDE, bytemuck::bytes_of(&vertical));

        let make_filter_bind_group = |view: &wgpu::TextureView, label: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &filter_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&filter_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &filter_buffer,
                            offset: 0,
                            size: wgpu::BufferSize::new(
                                std::mem::size_of::<FilterUniform>() as u64
                            ),
                        }),
                    },
                ],
            })
        };

        let scratch_bind_group = make_filter_bind_group(&scratch_view, "Shadow Filter Scratch");
        let slot_bind_groups: Vec<wgpu::BindGroup> = slot_views
            .iter()
            .enumerate()
            .map(|(i, view)| make_filter_bind_group(view, &format!("Shadow Filter Slot {}", i)))
            .collect();

        let filter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Filter Shader"),
            source: wgpu::ShaderSource::Wgsl(FILTER_SHADER.into()),
        });

        let filter_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shadow Filter Pipeline Layout"),
                bind_group_layouts: &[&filter_layout],
                push_constant_ranges: &[],
            });

        let filter_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Filter Pipeline"),
            layout: Some(&filter_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &filter_shader,
                entry_point: Some("vs_main"),
                buffers: &[FullscreenVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &filter_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: MOMENTS_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let quad_buffer = {
            use wgpu::util::DeviceExt;
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Shadow Filter Quad"),
                contents: bytemuck::cast_slice(&FULLSCREEN_QUAD_VERTICES),
                usage: wgpu::BufferUsages::VERTEX,
            })
        };

        Self {
            slot_texture,
            slot_views,
            array_view,
            scratch,
            scratch_view,
            scratch_depth_view,
            moments_pipeline,
            filter_pipeline,
            light_camera_buffer,
            light_camera_bind_group,
            filter_buffer,
            filter_layout,
            scratch_bind_group,
            slot_bind_groups,
            quad_buffer,
            resolution,
            capacity,
        }
    }

    /// Light-space matrix for a directional light, an orthographic fit
    /// around the visible scene.
    pub fn directional_matrix(
        direction: &Vector3,
        scene_center: &Vector3,
        scene_radius: f32,
    ) -> Matrix4 {
        let direction = direction.normalized();
        let eye = *scene_center - direction * scene_radius * 2.0;
        let up = if direction.cross(&Vector3::UP).length() < 1e-4 {
            Vector3::new(0.0, 0.0, 1.0)
        } else {
            Vector3::UP
        };
        let view = Matrix4::look_at(&eye, scene_center, &up);
        let proj = Matrix4::orthographic(
            -scene_radius,
            scene_radius,
            -scene_radius,
            scene_radius,
            0.1,
            scene_radius * 4.0,
        );
        proj.multiply(&view)
    }

    /// Light-space matrix for a spot light.
    pub fn spot_matrix(
        position: &Vector3,
        direction: &Vector3,
        cone_angle: f32,
        range: f32,
    ) -> Matrix4 {
        let target = *position + direction.normalized();
        let view = Matrix4::look_at(position, &target, &Vector3::UP);
        let proj = Matrix4::perspective(cone_angle * 2.0, 1.0, 0.1, range.max(0.2));
        proj.multiply(&view)
    }

    /// Six cube-face matrices for a point light, in [`CubeFace`] order.
    pub fn point_matrices(position: &Vector3, range: f32) -> [Matrix4; 6] {
        let proj = Matrix4::perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.05, range.max(0.1));
        CubeFace::ALL.map(|face| {
            let target = *position + face.direction();
            let view = Matrix4::look_at(position, &target, &face.up());
            proj.multiply(&view)
        })
    }

    /// Render and filter every registered caster's slots.
    ///
    /// Per slot: depth render into the scratch target with the
    /// bias-adjusted matrix, then filter scratch -> slot, slot ->
    /// scratch, scratch -> slot. Passes are strictly sequential; each
    /// reads the previous pass's output.
    pub fn record(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pool: &ShadowSlotPool,
        table: &ShadowMatrixTable,
        lights: &[LightRecord],
        batches: &[DrawBatch],
    ) {
        for (_, caster) in pool.casters() {
            let Some(light) = lights.iter().find(|l| l.id == caster.light_id) else {
                log::warn!(
                    "shadow caster for light {} has no matching light record, skipping",
                    caster.light_id
                );
                continue;
            };
            let radial = light.kind == LightKind::Point;
            let inv_range = if light.quadratic_radius > 0.0 {
                1.0 / light.quadratic_radius
            } else {
                0.0
            };

            for &slot in &caster.slots {
                let Some(matrices) = table.get(slot) else {
                    log::warn!("slot {} outside matrix table, skipping", slot);
                    continue;
                };
                let uniform = LightCameraUniform {
                    view_proj: matrices.biased.to_cols_array_2d(),
                    light_pos: [
                        light.position.x,
                        light.position.y,
                        light.position.z,
                        inv_range,
                    ],
                    mode: [if radial { 1.0 } else { 0.0 }, 0.0, 0.0, 0.0],
                };
                queue.write_buffer(
                    &self.light_camera_buffer,
                    UNIFORM_STRIDE * slot as u64,
                    bytemuck::bytes_of(&uniform),
                );
            }
        }

        for (_, caster) in pool.casters() {
            if !lights.iter().any(|l| l.id == caster.light_id) {
                continue;
            }
            for &slot in &caster.slots {
                if table.get(slot).is_none() {
                    continue;
                }
                self.record_slot(encoder, slot, batches);
            }
        }
    }

    fn record_slot(&self, encoder: &mut wgpu::CommandEncoder, slot: u32, batches: &[DrawBatch]) {
        let offset = (UNIFORM_STRIDE * slot as u64) as u32;

        // Depth render into the scratch target.
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shadow Depth Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.scratch_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.scratch_depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.moments_pipeline);
            pass.set_bind_group(0, &self.light_camera_bind_group, &[offset]);
            for batch in batches {
                pass.set_bind_group(1, &batch.model_bind_group, &[]);
                pass.set_vertex_buffer(0, batch.vertex_buffer.slice(..));
                pass.set_index_buffer(batch.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..batch.index_count, 0, 0..1);
            }
        }

        // Three-pass separable filter ping-pong.
        let slot_view = &self.slot_views[slot as usize];
        let slot_bind_group = &self.slot_bind_groups[slot as usize];
        let horizontal = 0u32;
        let vertical = UNIFORM_STRIDE as u32;

        self.filter_pass(encoder, &self.scratch_bind_group, slot_view, horizontal);
        self.filter_pass(encoder, slot_bind_group, &self.scratch_view, vertical);
        self.filter_pass(encoder, &self.scratch_bind_group, slot_view, horizontal);
    }

    fn filter_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::BindGroup,
        output: &wgpu::TextureView,
        direction_offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Shadow Filter Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.filter_pipeline);
        pass.set_bind_group(0, input, &[direction_offset]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    /// Array view over every slot, for the lighting accumulator.
    #[inline]
    pub fn array_view(&self) -> &wgpu::TextureView {
        &self.array_view
    }

    /// Per-slot resolution.
    #[inline]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Number of slots in the array.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_faces_cover_all_axes() {
        let mut sum = Vector3::ZERO;
        for face in CubeFace::ALL {
            let dir = face.direction();
            assert!((dir.length() - 1.0).abs() < 1e-6);
            // Up must be perpendicular to the view direction.
            assert!(dir.dot(&face.up()).abs() < 1e-6);
            sum = sum + dir;
        }
        assert!(sum.approx_eq(&Vector3::ZERO, 1e-6));
    }

    #[test]
    fn test_directional_matrix_contains_scene() {
        let vp = ShadowRenderer::directional_matrix(
            &Vector3::new(0.0, -1.0, 0.0),
            &Vector3::ZERO,
            10.0,
        );
        // Scene center projects inside the clip volume.
        let center = vp.transform_point(&Vector3::ZERO);
        assert!(center.x.abs() <= 1.0 && center.y.abs() <= 1.0);
        assert!(center.z >= 0.0 && center.z <= 1.0);
        // A point on the bounding sphere stays inside too.
        let edge = vp.transform_point(&Vector3::new(9.0, 0.0, 0.0));
        assert!(edge.x.abs() <= 1.0);
    }

    #[test]
    fn test_point_matrices_project_along_faces() {
        let position = Vector3::new(1.0, 2.0, 3.0);
        let mats = ShadowRenderer::point_matrices(&position, 20.0);
        for (face, vp) in CubeFace::ALL.iter().zip(mats.iter()) {
            // A point straight ahead of the face lands on the clip axis.
            let ahead = position + face.direction() * 5.0;
            let clip = vp.transform_point(&ahead);
            assert!(clip.x.abs() < 1e-3, "face {:?} x = {}", face, clip.x);
            assert!(clip.y.abs() < 1e-3, "face {:?} y = {}", face, clip.y);
        }
    }
}
