//! Ping-pong effect chain and final blit.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gbuffer::targets::LIGHT_FORMAT;

use super::effect::{Effect, FullscreenVertex, FULLSCREEN_QUAD_VERTICES};

/// Simple textured copy used for the final present blit.
const BLIT_SHADER: &str = r#"
@group(0) @binding(0)
var source: texture_2d<f32>;
@group(0) @binding(1)
var source_sampler: sampler;

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
    return textureSample(source, source_sampler, in.uv);
}
"#;

/// Shared uniform block every effect can bind: frame dimensions plus
/// effect-agnostic parameters.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ChainUniform {
    /// width, height, 1/width, 1/height.
    pub resolution: [f32; 4],
    /// x = bloom intensity, y = bloom enabled (1.0/0.0), zw unused.
    pub effects: [f32; 4],
}

/// Everything an effect needs besides its own resources.
pub struct ChainContext<'a> {
    /// Device, for transient bind groups.
    pub device: &'a wgpu::Device,
    /// Queue, for uniform updates.
    pub queue: &'a wgpu::Queue,
    /// Shared uniform bind group (group 0 in effect shaders).
    pub shared_bind_group: &'a wgpu::BindGroup,
    /// Bright-pass attachment written by the lighting accumulator.
    pub bright: &'a wgpu::TextureView,
    /// Shared fullscreen quad vertex buffer.
    pub quad_buffer: &'a wgpu::Buffer,
    /// Current chain width.
    pub width: u32,
    /// Current chain height.
    pub height: u32,
}

struct PingPongTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl PingPongTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32, index: usize) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("Post-Process Target {}", index)),
            size: wgpu::Extent3d {
                width,
                height,
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

/// Which ping-pong target the flag state selects.
///
/// Effects write `targets[flag]` then toggle, so after the chain runs
/// the presentable image sits in the opposite buffer from the current
/// flag value.
#[inline]
pub(crate) fn write_index(second_buffer: bool) -> usize {
    if second_buffer {
        1
    } else {
        0
    }
}

/// The buffer holding the final image once all effects have run.
#[inline]
pub(crate) fn final_index(second_buffer: bool) -> usize {
    if second_buffer {
        0
    } else {
        1
    }
}

/// Ordered list of full-screen effects executed over two ping-ponged
/// targets. The effect list is fixed after initialization; per-frame
/// only the `second_buffer` flag and uniform contents change.
pub struct PostProcessChain {
    effects: Vec<Box<dyn Effect>>,
    targets: [PingPongTarget; 2],
    second_buffer: bool,
    uniform: ChainUniform,
    uniform_buffer: wgpu::Buffer,
    shared_layout: wgpu::BindGroupLayout,
    shared_bind_group: wgpu::BindGroup,
    blit_pipeline: wgpu::RenderPipeline,
    blit_layout: wgpu::BindGroupLayout,
    blit_sampler: wgpu::Sampler,
    quad_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
}

impl PostProcessChain {
    /// Create the chain targets and the final blit pipeline.
    /// `surface_format` is the format of the presentable surface.
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let targets = [
            PingPongTarget::new(device, width, height, 0),
            PingPongTarget::new(device, width, height, 1),
        ];

        let uniform = ChainUniform {
            resolution: [
                width as f32,
                height as f32,
                1.0 / width as f32,
                1.0 / height as f32,
            ],
            effects: [0.5, 1.0, 0.0, 0.0],
        };
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Post-Process Chain Uniform"),
            contents: bytemuck::bytes_of(&uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shared_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post-Process Shared Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let shared_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Post-Process Shared Bind Group"),
            layout: &shared_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Layout"),
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
            ],
        });

        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER.into()),
        });
        let blit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&blit_layout],
            push_constant_ranges: &[],
        });
        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&blit_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[FullscreenVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
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
            label: Some("Post-Process Quad"),
            contents: bytemuck::cast_slice(&FULLSCREEN_QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            effects: Vec::new(),
            targets,
            second_buffer: false,
            uniform,
            uniform_buffer,
            shared_layout,
            shared_bind_group,
            blit_pipeline,
            blit_layout,
            blit_sampler,
            quad_buffer,
            width,
            height,
        }
    }

    /// Append an effect. Only valid during initialization; the list is
    /// static per configuration afterwards.
    pub fn add_effect(&mut self, effect: Box<dyn Effect>) {
        self.effects.push(effect);
    }

    /// Look up an effect by name.
    pub fn effect_mut(&mut self, name: &str) -> Option<&mut Box<dyn Effect>> {
        self.effects.iter_mut().find(|e| e.name() == name)
    }

    /// Recreate targets for a new size and propagate to every effect.
    pub fn resize(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.width = width;
        self.height = height;
        self.targets = [
            PingPongTarget::new(device, width, height, 0),
            PingPongTarget::new(device, width, height, 1),
        ];
        self.uniform.resolution = [
            width as f32,
            height as f32,
            1.0 / width as f32,
            1.0 / height as f32,
        ];
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniform));
        for effect in &mut self.effects {
            effect.resize(width, height, device);
        }
    }

    /// Run every enabled effect over the ping-pong targets and blit the
    /// final image to `surface_view`.
    pub fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        scene_input: &wgpu::TextureView,
        bright: &wgpu::TextureView,
        surface_view: &wgpu::TextureView,
    ) {
        self.second_buffer = false;

        let enabled: Vec<usize> = self
            .effects
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled())
            .map(|(i, _)| i)
            .collect();

        if enabled.is_empty() {
            self.blit(device, encoder, scene_input, surface_view);
            return;
        }

        for (step, &idx) in enabled.iter().enumerate() {
            let out_index = write_index(self.second_buffer);
            // Field borrows are disjoint from the mutably-borrowed
            // effect entry, so the context can reference `self` directly.
            let input_view = if step == 0 {
                scene_input
            } else {
                &self.targets[final_index(self.second_buffer)].view
            };
            let ctx = ChainContext {
                device,
                queue,
                shared_bind_group: &self.shared_bind_group,
                bright,
                quad_buffer: &self.quad_buffer,
                width: self.width,
                height: self.height,
            };
            self.effects[idx].record(encoder, input_view, &self.targets[out_index].view, &ctx);
            self.second_buffer = !self.second_buffer;
        }

        let final_view = &self.targets[final_index(self.second_buffer)].view;
        self.blit(device, encoder, final_view, surface_view);
    }

    fn blit(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Bind Group"),
            layout: &self.blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(input),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.blit_sampler),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Present Blit"),
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
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    /// Set the bloom intensity carried in the shared uniform block.
    pub fn set_bloom_intensity(&mut self, queue: &wgpu::Queue, intensity: f32, enabled: bool) {
        self.uniform.effects[0] = intensity;
        self.uniform.effects[1] = if enabled { 1.0 } else { 0.0 };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniform));
    }

    /// Shared uniform bind group layout effects build pipelines against.
    #[inline]
    pub fn shared_layout(&self) -> &wgpu::BindGroupLayout {
        &self.shared_layout
    }

    /// Current ping-pong flag value.
    #[inline]
    pub fn second_buffer(&self) -> bool {
        self.second_buffer
    }

    /// Current chain dimensions.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_sequence_alternates_targets() {
        // Effects write 0, 1, 0, 1, ... as the flag toggles.
        let mut flag = false;
        let writes: Vec<usize> = (0..4)
            .map(|_| {
                let w = write_index(flag);
                flag = !flag;
                w
            })
            .collect();
        assert_eq!(writes, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_final_index_is_last_written() {
        for effect_count in 1..6 {
            let mut flag = false;
            let mut last_written = usize::MAX;
            for _ in 0..effect_count {
                last_written = write_index(flag);
                flag = !flag;
            }
            assert_eq!(final_index(flag), last_written);
        }
    }
}
