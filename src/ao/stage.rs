//! The ambient-occlusion render stage.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::core::{AoVariant, SsaoConfig};
use crate::postprocess::effect::{FullscreenVertex, FULLSCREEN_QUAD_VERTICES};
use crate::scene::CameraSnapshot;

use super::kernel::{generate_kernel, generate_noise, NOISE_DIM};
use super::AO_FORMAT;

/// Hard cap on kernel samples, matching the shader-side array.
const MAX_KERNEL_SIZE: usize = 64;

/// SSAO: hemisphere kernel sampling against G-buffer position/normal.
const SSAO_SHADER: &str = r#"
struct AoParams {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    resolution: vec4<f32>,  // w, h, 1/w, 1/h
    params: vec4<f32>,      // radius, bias, threshold, kernel_size
    near_far: vec4<f32>,    // near, far, noise_scale_x, noise_scale_y
}

struct Kernel {
    samples: array<vec4<f32>, 64>,
}

@group(0) @binding(0)
var<uniform> ao: AoParams;
@group(0) @binding(1)
var<uniform> kernel: Kernel;
@group(0) @binding(2)
var noise_tex: texture_2d<f32>;
@group(0) @binding(3)
var noise_sampler: sampler;

@group(1) @binding(0)
var g_position: texture_2d<f32>;
@group(1) @binding(1)
var g_normal: texture_2d<f32>;
@group(1) @binding(5)
var g_sampler: sampler;

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
fn fs_main(in: VertexOutput) -> @location(0) f32 {
    let world = textureSampleLevel(g_position, g_sampler, in.uv, 0.0);
    if (world.w < 0.5) {
        // No geometry under this pixel.
        return 1.0;
    }
    let p = (ao.view * vec4<f32>(world.xyz, 1.0)).xyz;
    let n_world = textureSampleLevel(g_normal, g_sampler, in.uv, 0.0).xyz;
    let n = normalize((ao.view * vec4<f32>(n_world, 0.0)).xyz);

    let noise_uv = in.uv * ao.near_far.zw;
    let random = normalize(textureSampleLevel(noise_tex, noise_sampler, noise_uv, 0.0).xyz * 2.0 - 1.0);
    let tangent = normalize(random - n * dot(random, n));
    let bitangent = cross(n, tangent);
    let tbn = mat3x3<f32>(tangent, bitangent, n);

    let radius = ao.params.x;
    let bias = ao.params.y;
    let count = u32(ao.params.w);

    var occlusion = 0.0;
    for (var i = 0u; i < count; i = i + 1u) {
        let sample_vec = tbn * kernel.samples[i].xyz;
        let sample_pos = p + sample_vec * radius;

        let clip = ao.projection * vec4<f32>(sample_pos, 1.0);
        let ndc = clip.xyz / clip.w;
        let sample_uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if (sample_uv.x < 0.0 || sample_uv.x > 1.0 || sample_uv.y < 0.0 || sample_uv.y > 1.0) {
            continue;
        }

        let scene_world = textureSampleLevel(g_position, g_sampler, sample_uv, 0.0);
        if (scene_world.w < 0.5) {
            continue;
        }
        let scene_depth = (ao.view * vec4<f32>(scene_world.xyz, 1.0)).z;

        let range_check = smoothstep(0.0, 1.0, radius / abs(p.z - scene_depth));
        if (scene_depth >= sample_pos.z + bias) {
            occlusion = occlusion + range_check;
        }
    }

    let raw = 1.0 - occlusion / f32(count);
    return pow(raw, ao.params.z);
}
"#;

/// HBAO: horizon marching in screen space.
const HBAO_SHADER: &str = r#"
struct AoParams {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    resolution: vec4<f32>,
    params: vec4<f32>,
    near_far: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> ao: AoParams;
@group(0) @binding(2)
var noise_tex: texture_2d<f32>;
@group(0) @binding(3)
var noise_sampler: sampler;

@group(1) @binding(0)
var g_position: texture_2d<f32>;
@group(1) @binding(1)
var g_normal: texture_2d<f32>;
@group(1) @binding(5)
var g_sampler: sampler;

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

const DIRECTION_COUNT: u32 = 4u;
const STEP_COUNT: u32 = 6u;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) f32 {
    let world = textureSampleLevel(g_position, g_sampler, in.uv, 0.0);
    if (world.w < 0.5) {
        return 1.0;
    }
    let p = (ao.view * vec4<f32>(world.xyz, 1.0)).xyz;
    let n_world = textureSampleLevel(g_normal, g_sampler, in.uv, 0.0).xyz;
    let n = normalize((ao.view * vec4<f32>(n_world, 0.0)).xyz);

    let noise_uv = in.uv * ao.near_far.zw;
    let random = textureSampleLevel(noise_tex, noise_sampler, noise_uv, 0.0).xy * 2.0 - 1.0;

    let radius_uv = ao.params.x / max(abs(p.z), 0.1) * 0.5;
    let bias = ao.params.y;

    var occlusion = 0.0;
    for (var d = 0u; d < DIRECTION_COUNT; d = d + 1u) {
        let angle = (f32(d) / f32(DIRECTION_COUNT)) * 6.2831853;
        var dir = vec2<f32>(cos(angle), sin(angle));
        // Per-pixel rotation to break banding.
        dir = vec2<f32>(
            dir.x * random.x - dir.y * random.y,
            dir.x * random.y + dir.y * random.x,
        );

        var highest = -1.0;
        for (var s = 1u; s <= STEP_COUNT; s = s + 1u) {
            let t = f32(s) / f32(STEP_COUNT);
            let sample_uv = in.uv + dir * radius_uv * t;
            if (sample_uv.x < 0.0 || sample_uv.x > 1.0 || sample_uv.y < 0.0 || sample_uv.y > 1.0) {
                break;
            }
            let sample_world = textureSampleLevel(g_position, g_sampler, sample_uv, 0.0);
            if (sample_world.w < 0.5) {
                continue;
            }
            let sample_view = (ao.view * vec4<f32>(sample_world.xyz, 1.0)).xyz;
            let horizon = sample_view - p;
            let len = length(horizon);
            if (len < 1e-4 || len > ao.params.x) {
                continue;
            }
            let sin_h = dot(normalize(horizon), n);
            if (sin_h > highest + bias) {
                occlusion = occlusion + (sin_h - max(highest, 0.0)) * (1.0 - len / ao.params.x);
                highest = sin_h;
            }
        }
    }

    let raw = clamp(1.0 - occlusion / f32(DIRECTION_COUNT), 0.0, 1.0);
    return pow(raw, ao.params.z);
}
"#;

/// Small box blur over the raw occlusion, one tile of the noise.
const BLUR_SHADER: &str = r#"
struct BlurParams {
    texel: vec4<f32>,
}

@group(0) @binding(0)
var source: texture_2d<f32>;
@group(0) @binding(1)
var source_sampler: sampler;
@group(0) @binding(2)
var<uniform> params: BlurParams;

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
fn fs_main(in: VertexOutput) -> @location(0) f32 {
    var sum = 0.0;
    for (var x = -2; x < 2; x = x + 1) {
        for (var y = -2; y < 2; y = y + 1) {
            let offset = vec2<f32>(f32(x), f32(y)) * params.texel.xy;
            sum = sum + textureSampleLevel(source, source_sampler, in.uv + offset, 0.0).r;
        }
    }
    return sum / 16.0;
}
"#;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct AoUniform {
    view: [[f32; 4]; 4],
    projection: [[f32; 4]; 4],
    resolution: [f32; 4],
    params: [f32; 4],
    near_far: [f32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct BlurUniform {
    texel: [f32; 4],
}

struct OcclusionTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl OcclusionTarget {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: AO_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Ambient-occlusion stage. Runs one of the two variants into a raw
/// occlusion target, then blurs into the final occlusion texture the
/// lighting accumulator samples.
pub struct AoStage {
    variant: AoVariant,
    enabled: bool,
    config: SsaoConfig,
    raw: OcclusionTarget,
    blurred: OcclusionTarget,
    ssao_pipeline: wgpu::RenderPipeline,
    hbao_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    ao_bind_group: wgpu::BindGroup,
    blur_layout: wgpu::BindGroupLayout,
    blur_bind_group: wgpu::BindGroup,
    blur_sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    blur_buffer: wgpu::Buffer,
    quad_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl AoStage {
    /// Create targets, kernel, noise and all three pipelines.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        gbuffer_layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
        variant: AoVariant,
        enabled: bool,
        config: SsaoConfig,
    ) -> Self {
        let raw = OcclusionTarget::new(device, "AO Raw", width, height);
        let blurred = OcclusionTarget::new(device, "AO Blurred", width, height);

        // Kernel: pad to the shader-side array size.
        let mut samples = generate_kernel(config.kernel_size);
        samples.resize(MAX_KERNEL_SIZE, [0.0; 4]);
        let kernel_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SSAO Kernel"),
            contents: bytemuck::cast_slice(&samples),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let noise_data = generate_noise();
        let noise_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("AO Noise"),
            size: wgpu::Extent3d {
                width: NOISE_DIM,
                height: NOISE_DIM,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &noise_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &noise_data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(NOISE_DIM * 4),
                rows_per_image: Some(NOISE_DIM),
            },
            wgpu::Extent3d {
                width: NOISE_DIM,
                height: NOISE_DIM,
                depth_or_array_layers: 1,
            },
        );
        let noise_view = noise_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("AO Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("AO Uniform"),
            size: std::mem::size_of::<AoUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let ao_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("AO Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let ao_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("AO Bind Group"),
            layout: &ao_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: kernel_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&noise_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&noise_sampler),
                },
            ],
        });

        let variant_pipeline = |label: &str, source: &str| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[&ao_layout, gbuffer_layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    buffers: &[FullscreenVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: AO_FORMAT,
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
            })
        };

        let ssao_pipeline = variant_pipeline("SSAO Pipeline", SSAO_SHADER);
        let hbao_pipeline = variant_pipeline("HBAO Pipeline", HBAO_SHADER);

        // Blur resources.
        let blur_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("AO Blur Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blur_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("AO Blur Uniform"),
            size: std::mem::size_of::<BlurUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let blur_uniform = BlurUniform {
            texel: [1.0 / width as f32, 1.0 / height as f32, 0.0, 0.0],
        };
        queue.write_buffer(&blur_buffer, 0, bytemuck::bytes_of(&blur_uniform));

        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("AO Blur Layout"),
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
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });
        let blur_bind_group = Self::create_blur_bind_group(
            device,
            &blur_layout,
            &raw.view,
            &blur_sampler,
            &blur_buffer,
        );

        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("AO Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(BLUR_SHADER.into()),
        });
        let blur_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("AO Blur Pipeline Layout"),
            bind_group_layouts: &[&blur_layout],
            push_constant_ranges: &[],
        });
        let blur_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("AO Blur Pipeline"),
            layout: Some(&blur_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blur_shader,
                entry_point: Some("vs_main"),
                buffers: &[FullscreenVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blur_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: AO_FORMAT,
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

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("AO Quad"),
            contents: bytemuck::cast_slice(&FULLSCREEN_QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            variant,
            enabled,
            config,
            raw,
            blurred,
            ssao_pipeline,
            hbao_pipeline,
            blur_pipeline,
            ao_bind_group,
            blur_layout,
            blur_bind_group,
            blur_sampler,
            uniform_buffer,
            blur_buffer,
            quad_buffer,
            width,
            height,
        }
    }

    fn create_blur_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        raw_view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
        buffer: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("AO Blur Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(raw_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        })
    }

    /// Upload the frame's camera-derived uniform state.
    pub fn update(&self, queue: &wgpu::Queue, camera: &CameraSnapshot) {
        let uniform = AoUniform {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            resolution: [
                self.width as f32,
                self.height as f32,
                1.0 / self.width as f32,
                1.0 / self.height as f32,
            ],
            params: [
                self.config.radius,
                self.config.bias,
                self.config.threshold,
                self.config.kernel_size as f32,
            ],
            near_far: [
                camera.near,
                camera.far,
                self.width as f32 / NOISE_DIM as f32,
                self.height as f32 / NOISE_DIM as f32,
            ],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Record the occlusion pass for the active variant, then the blur.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, gbuffer_bind_group: &wgpu::BindGroup) {
        let pipeline = match self.variant {
            AoVariant::Ssao => &self.ssao_pipeline,
            AoVariant::Hbao => &self.hbao_pipeline,
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("AO Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.raw.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.ao_bind_group, &[]);
            pass.set_bind_group(1, gbuffer_bind_group, &[]);
            pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
            pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("AO Blur Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.blurred.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.blur_pipeline);
        pass.set_bind_group(0, &self.blur_bind_group, &[]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    /// Recreate the occlusion targets at a new resolution.
    pub fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.raw = OcclusionTarget::new(device, "AO Raw", width, height);
        self.blurred = OcclusionTarget::new(device, "AO Blurred", width, height);
        self.blur_bind_group = Self::create_blur_bind_group(
            device,
            &self.blur_layout,
            &self.raw.view,
            &self.blur_sampler,
            &self.blur_buffer,
        );
        let blur_uniform = BlurUniform {
            texel: [1.0 / width as f32, 1.0 / height as f32, 0.0, 0.0],
        };
        queue.write_buffer(&self.blur_buffer, 0, bytemuck::bytes_of(&blur_uniform));
    }

    /// The occlusion texture the lighting accumulator samples.
    #[inline]
    pub fn occlusion_view(&self) -> &wgpu::TextureView {
        &self.blurred.view
    }

    /// Whether the stage runs this frame.
    #[inline]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Toggle the stage at runtime.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// The active variant.
    #[inline]
    pub fn variant(&self) -> AoVariant {
        self.variant
    }

    /// Switch variants at runtime.
    pub fn set_variant(&mut self, variant: AoVariant) {
        self.variant = variant;
    }

    /// Current target dimensions.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
