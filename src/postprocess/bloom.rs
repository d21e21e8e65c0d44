//! Bloom effect: blur the bright-pass attachment and add it on top of
//! the lit image.

use bytemuck::{Pod, Zeroable};

use crate::gbuffer::targets::LIGHT_FORMAT;

use super::chain::ChainContext;
use super::effect::{Effect, FullscreenVertex, FULLSCREEN_QUAD_VERTICES};

const BLUR_SHADER: &str = r#"
struct Chain {
    resolution: vec4<f32>,
    effects: vec4<f32>,
}

struct BlurParams {
    // xy = step direction, zw = texel size
    direction: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> chain: Chain;

@group(1) @binding(0)
var source: texture_2d<f32>;
@group(1) @binding(1)
var source_sampler: sampler;
@group(1) @binding(2)
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
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let step = params.direction.xy * params.direction.zw;
    var sum = textureSample(source, source_sampler, in.uv).rgb * 0.227027;
    sum += textureSample(source, source_sampler, in.uv + step * 1.3846154).rgb * 0.3162162;
    sum += textureSample(source, source_sampler, in.uv - step * 1.3846154).rgb * 0.3162162;
    sum += textureSample(source, source_sampler, in.uv + step * 3.2307692).rgb * 0.0702703;
    sum += textureSample(source, source_sampler, in.uv - step * 3.2307692).rgb * 0.0702703;
    return vec4<f32>(sum, 1.0);
}
"#;

const COMBINE_SHADER: &str = r#"
struct Chain {
    resolution: vec4<f32>,
    effects: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> chain: Chain;

@group(1) @binding(0)
var scene: texture_2d<f32>;
@group(1) @binding(1)
var bloom: texture_2d<f32>;
@group(1) @binding(2)
var combine_sampler: sampler;

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
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let base = textureSample(scene, combine_sampler, in.uv);
    let glow = textureSample(bloom, combine_sampler, in.uv).rgb;
    let amount = chain.effects.x * chain.effects.y;
    return vec4<f32>(base.rgb + glow * amount, base.a);
}
"#;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct BlurUniform {
    direction: [f32; 4],
}

const UNIFORM_STRIDE: u64 = 256;

/// Bloom settings.
#[derive(Debug, Clone, Copy)]
pub struct BloomSettings {
    /// Contribution strength of the blurred bright pass.
    pub intensity: f32,
    /// Number of blur iterations (each is one horizontal + vertical pair).
    pub iterations: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            intensity: 0.5,
            iterations: 2,
        }
    }
}

struct BlurTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl BlurTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, index: usize) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Bloom Blur {}", index)),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: LIGHT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Bloom post-process effect.
pub struct BloomEffect {
    enabled: bool,
    settings: BloomSettings,
    blur_pipeline: wgpu::RenderPipeline,
    combine_pipeline: wgpu::RenderPipeline,
    blur_layout: wgpu::BindGroupLayout,
    combine_layout: wgpu::BindGroupLayout,
    blur_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    // Half-resolution ping-pong pair for the blur iterations.
    blur_targets: [BlurTarget; 2],
    // Set on resize; directions are rewritten on the next record, when
    // a queue is in reach.
    dirty_directions: bool,
    width: u32,
    height: u32,
}

impl BloomEffect {
    /// Build bloom pipelines against the chain's shared uniform layout.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        shared_layout: &wgpu::BindGroupLayout,
        width: u32,
        height: u32,
        settings: BloomSettings,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Blur Layout"),
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
                            std::mem::size_of::<BlurUniform>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let combine_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom Combine Layout"),
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
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(BLUR_SHADER.into()),
        });
        let combine_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom Combine Shader"),
            source: wgpu::ShaderSource::Wgsl(COMBINE_SHADER.into()),
        });

        let pipeline = |label: &str,
                        shader: &wgpu::ShaderModule,
                        group1: &wgpu::BindGroupLayout| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[shared_layout, group1],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[FullscreenVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: LIGHT_FORMAT,
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

        let blur_pipeline = pipeline("Bloom Blur Pipeline", &blur_shader, &blur_layout);
        let combine_pipeline = pipeline("Bloom Combine Pipeline", &combine_shader, &combine_layout);

        // Fixed horizontal/vertical entries, rewritten on resize.
        let blur_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bloom Blur Uniform"),
            size: UNIFORM_STRIDE * 2,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self::write_blur_directions(queue, &blur_buffer, width / 2, height / 2);

        let blur_targets = [
            BlurTarget::new(device, width / 2, height / 2, 0),
            BlurTarget::new(device, width / 2, height / 2, 1),
        ];

        Self {
            enabled: true,
            settings,
            blur_pipeline,
            combine_pipeline,
            blur_layout,
            combine_layout,
            blur_buffer,
            sampler,
            blur_targets,
            dirty_directions: false,
            width,
            height,
        }
    }

    fn write_blur_directions(queue: &wgpu::Queue, buffer: &wgpu::Buffer, width: u32, height: u32) {
        let texel_x = 1.0 / width.max(1) as f32;
        let texel_y = 1.0 / height.max(1) as f32;
        let horizontal = BlurUniform {
            direction: [1.0, 0.0, texel_x, texel_y],
        };
        let vertical = BlurUniform {
            direction: [0.0, 1.0, texel_x, texel_y],
        };
        queue.write_buffer(buffer, 0, bytemuck::bytes_of(&horizontal));
        queue.write_buffer(buffer, UNIFORM_STRIDE, bytemuck::bytes_of(&vertical));
    }

    fn blur_bind_group(
        &self,
        device: &wgpu::Device,
        source: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Blur Bind Group"),
            layout: &self.blur_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.blur_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<BlurUniform>() as u64),
                    }),
                },
            ],
        })
    }

    fn blur_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        shared: &wgpu::BindGroup,
        input: &wgpu::BindGroup,
        output: &wgpu::TextureView,
        quad: &wgpu::Buffer,
        direction_offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bloom Blur Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.blur_pipeline);
        pass.set_bind_group(0, shared, &[]);
        pass.set_bind_group(1, input, &[direction_offset]);
        pass.set_vertex_buffer(0, quad.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }
}

impl Effect for BloomEffect {
    fn name(&self) -> &str {
        "bloom"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn record(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        ctx: &ChainContext<'_>,
    ) {
        if self.dirty_directions {
            Self::write_blur_directions(ctx.queue, &self.blur_buffer, self.width / 2, self.height / 2);
            self.dirty_directions = false;
        }

        let horizontal = 0u32;
        let vertical = UNIFORM_STRIDE as u32;

        // Downsample-and-blur the bright attachment, iterating the
        // horizontal/vertical pair over the half-resolution pair.
        let mut source = ctx.bright;
        for _ in 0..self.settings.iterations.max(1) {
            let bind_a = self.blur_bind_group(ctx.device, source);
            self.blur_pass(
                encoder,
                ctx.shared_bind_group,
                &bind_a,
                &self.blur_targets[0].view,
                ctx.quad_buffer,
                horizontal,
            );
            let bind_b = self.blur_bind_group(ctx.device, &self.blur_targets[0].view);
            self.blur_pass(
                encoder,
                ctx.shared_bind_group,
                &bind_b,
                &self.blur_targets[1].view,
                ctx.quad_buffer,
                vertical,
            );
            source = &self.blur_targets[1].view;
        }

        // Composite scene + blurred glow into the chain output.
        let combine_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bloom Combine Bind Group"),
            layout: &self.combine_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.blur_targets[1].view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Bloom Combine Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.combine_pipeline);
        pass.set_bind_group(0, ctx.shared_bind_group, &[]);
        pass.set_bind_group(1, &combine_bind_group, &[]);
        pass.set_vertex_buffer(0, ctx.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    fn resize(&mut self, width: u32, height: u32, device: &wgpu::Device) {
        self.width = width;
        self.height = height;
        self.blur_targets = [
            BlurTarget::new(device, width / 2, height / 2, 0),
            BlurTarget::new(device, width / 2, height / 2, 1),
        ];
        self.dirty_directions = true;
    }
}
