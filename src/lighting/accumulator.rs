//! Per-light additive accumulation into the light and bright targets.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::gbuffer::{GBuffer, BRIGHT_FORMAT, DEPTH_FORMAT, LIGHT_FORMAT};
use crate::math::Color;
use crate::postprocess::effect::{FullscreenVertex, FULLSCREEN_QUAD_VERTICES};
use crate::scene::CameraSnapshot;

use super::light_block::LightBlock;
use super::sphere::generate_sphere;

/// Most lights a single frame will pack into the uniform buffer.
pub const MAX_LIGHTS: usize = 64;

/// Uniform stride honouring the 256-byte dynamic offset alignment.
const UNIFORM_STRIDE: u64 = 256;

/// Shared WGSL prelude: scene constants, the per-light block and the
/// G-buffer bindings used by every lighting shader.
const LIGHTING_COMMON: &str = r#"
struct SceneUniform {
    // rgb = ambient color, w = ambient intensity
    ambient: vec4<f32>,
    fog_color: vec4<f32>,
    // x = fog start, y = fog end, z = occlusion enabled flag
    fog_params: vec4<f32>,
    camera_pos: vec4<f32>,
    // x = width, y = height, z = 1/width, w = 1/height
    screen: vec4<f32>,
}

struct Light {
    // xyz = position, w = 1 / shadow range
    position_range: vec4<f32>,
    // rgb = color, w = intensity
    color_intensity: vec4<f32>,
    // xyz = direction, w = cos(cone angle)
    direction_cone: vec4<f32>,
    // x = linear radius, y = quadratic radius, z = kind, w = shadowed
    params: vec4<f32>,
    slots_a: vec4<f32>,
    slots_b: vec4<f32>,
    shadow_matrix: mat4x4<f32>,
    volume_transform: mat4x4<f32>,
}

@group(0) @binding(0)
var<uniform> scene: SceneUniform;
@group(0) @binding(1)
var<uniform> light: Light;
@group(0) @binding(2)
var shadow_maps: texture_2d_array<f32>;
@group(0) @binding(3)
var shadow_sampler: sampler;
@group(0) @binding(4)
var occlusion_tex: texture_2d<f32>;

@group(1) @binding(0)
var g_position: texture_2d<f32>;
@group(1) @binding(1)
var g_normal: texture_2d<f32>;
@group(1) @binding(2)
var g_albedo_spec: texture_2d<f32>;
@group(1) @binding(3)
var g_material: texture_2d<f32>;
"#;

/// Vertex-only sphere pass that marks covered stencil pixels.
const VOLUME_SHADER_BODY: &str = r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return light.volume_transform * vec4<f32>(position, 1.0);
}
"#;

/// Fullscreen per-light shading, shared by the global and the
/// stencil-masked point path.
const LIGHTING_SHADER_BODY: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

struct FragmentOutput {
    @location(0) light: vec4<f32>,
    @location(1) bright: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    return out;
}

// Chebyshev upper bound over filtered variance moments.
fn shadow_probability(moments: vec2<f32>, depth: f32) -> f32 {
    if (depth <= moments.x) {
        return 1.0;
    }
    let variance = max(moments.y - moments.x * moments.x, 0.00002);
    let delta = depth - moments.x;
    let p = variance / (variance + delta * delta);
    // Rescale to cut light bleeding at the tail.
    return clamp((p - 0.25) / 0.75, 0.0, 1.0);
}

fn directional_shadow(world: vec3<f32>) -> f32 {
    let clip = light.shadow_matrix * vec4<f32>(world, 1.0);
    if (clip.w <= 0.0) {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0) {
        return 1.0;
    }
    let layer = i32(light.slots_a.x);
    let moments = textureSampleLevel(shadow_maps, shadow_sampler, uv, layer, 0.0).rg;
    return shadow_probability(moments, ndc.z);
}

fn point_shadow(world: vec3<f32>) -> f32 {
    let d = world - light.position_range.xyz;
    let depth = length(d) * light.position_range.w;

    // Cube face by dominant axis, in slot order.
    let ad = abs(d);
    var face = 0u;
    if (ad.x >= ad.y && ad.x >= ad.z) {
        face = select(1u, 0u, d.x >= 0.0);
    } else if (ad.y >= ad.z) {
        face = select(3u, 2u, d.y >= 0.0);
    } else {
        face = select(5u, 4u, d.z >= 0.0);
    }

    var dirs = array<vec3<f32>, 6>(
        vec3<f32>(1.0, 0.0, 0.0),
        vec3<f32>(-1.0, 0.0, 0.0),
        vec3<f32>(0.0, 1.0, 0.0),
        vec3<f32>(0.0, -1.0, 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
        vec3<f32>(0.0, 0.0, -1.0),
    );
    var ups = array<vec3<f32>, 6>(
        vec3<f32>(0.0, -1.0, 0.0),
        vec3<f32>(0.0, -1.0, 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
        vec3<f32>(0.0, 0.0, -1.0),
        vec3<f32>(0.0, -1.0, 0.0),
        vec3<f32>(0.0, -1.0, 0.0),
    );
    let forward = dirs[face];
    let right = normalize(cross(forward, ups[face]));
    let up = cross(right, forward);

    let denom = dot(d, forward);
    if (denom <= 0.0) {
        return 1.0;
    }
    // 90-degree square faces: ndc = lateral / forward distance.
    let ndc = vec2<f32>(dot(d, right) / denom, dot(d, up) / denom);
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);

    var slots = array<f32, 6>(
        light.slots_a.x, light.slots_a.y, light.slots_a.z,
        light.slots_a.w, light.slots_b.x, light.slots_b.y,
    );
    let layer = i32(slots[face]);
    let moments = textureSampleLevel(shadow_maps, shadow_sampler, uv, layer, 0.0).rg;
    return shadow_probability(moments, depth);
}

@fragment
fn fs_main(in: VertexOutput) -> FragmentOutput {
    var out: FragmentOutput;
    out.light = vec4<f32>(0.0, 0.0, 0.0, 1.0);
    out.bright = vec4<f32>(0.0, 0.0, 0.0, 1.0);

    let pixel = vec2<i32>(in.clip_position.xy);
    let world = textureLoad(g_position, pixel, 0);
    if (world.w < 0.5) {
        return out;
    }

    let normal = normalize(textureLoad(g_normal, pixel, 0).xyz);
    let albedo_spec = textureLoad(g_albedo_spec, pixel, 0);
    let material = textureLoad(g_material, pixel, 0);
    let view_dir = normalize(scene.camera_pos.xyz - world.xyz);

    var occlusion = 1.0;
    if (scene.fog_params.z > 0.5) {
        occlusion = textureLoad(occlusion_tex, pixel, 0).r;
    }

    let kind = u32(light.params.z);
    var light_dir: vec3<f32>;
    var attenuation = 1.0;
    var shadow = 1.0;

    if (kind == 0u) {
        // Directional.
        light_dir = -light.direction_cone.xyz;
        if (light.params.w > 0.5) {
            shadow = directional_shadow(world.xyz);
        }
    } else {
        let to_light = light.position_range.xyz - world.xyz;
        let dist = length(to_light);
        if (dist >= light.params.y) {
            return out;
        }
        light_dir = to_light / max(dist, 0.0001);
        attenuation = 1.0 - smoothstep(light.params.x, light.params.y, dist);

        if (kind == 2u) {
            // Spot cone falloff around the axis.
            let axis = dot(-light_dir, light.direction_cone.xyz);
            let cone = smoothstep(light.direction_cone.w, light.direction_cone.w + 0.05, axis);
            if (cone <= 0.0) {
                return out;
            }
            attenuation = attenuation * cone;
            if (light.params.w > 0.5) {
                shadow = directional_shadow(world.xyz);
            }
        } else if (light.params.w > 0.5) {
            shadow = point_shadow(world.xyz);
        }
    }

    let diffuse = max(dot(normal, light_dir), 0.0);
    let half_dir = normalize(light_dir + view_dir);
    let shininess = mix(64.0, 8.0, material.x);
    let specular = pow(max(dot(normal, half_dir), 0.0), shininess) * albedo_spec.a;

    let fog = 1.0 - smoothstep(
        scene.fog_params.x,
        scene.fog_params.y,
        distance(scene.camera_pos.xyz, world.xyz),
    );

    let radiance = light.color_intensity.rgb * light.color_intensity.w
        * attenuation * shadow * occlusion * fog;
    let color = (albedo_spec.rgb * diffuse + vec3<f32>(specular)) * radiance;

    out.light = vec4<f32>(color, 1.0);
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    out.bright = vec4<f32>(color * step(1.0, luminance), 1.0);
    return out;
}
"#;

/// Ambient + emissive + fog base, added once after every light.
const AMBIENT_SHADER_BODY: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
}

struct FragmentOutput {
    @location(0) light: vec4<f32>,
    @location(1) bright: vec4<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> FragmentOutput {
    var out: FragmentOutput;
    out.bright = vec4<f32>(0.0, 0.0, 0.0, 1.0);

    let pixel = vec2<i32>(in.clip_position.xy);
    let world = textureLoad(g_position, pixel, 0);
    if (world.w < 0.5) {
        // Sky pixels take the fog color.
        out.light = vec4<f32>(scene.fog_color.rgb, 1.0);
        return out;
    }

    let albedo_spec = textureLoad(g_albedo_spec, pixel, 0);
    let material = textureLoad(g_material, pixel, 0);

    var occlusion = 1.0;
    if (scene.fog_params.z > 0.5) {
        occlusion = textureLoad(occlusion_tex, pixel, 0).r;
    }

    let fog = smoothstep(
        scene.fog_params.x,
        scene.fog_params.y,
        distance(scene.camera_pos.xyz, world.xyz),
    );

    let ambient = albedo_spec.rgb * scene.ambient.rgb * scene.ambient.w * occlusion;
    let emissive = albedo_spec.rgb * material.z;
    let color = (ambient + emissive) * (1.0 - fog) + scene.fog_color.rgb * fog;

    out.light = vec4<f32>(color, 1.0);
    let luminance = dot(emissive, vec3<f32>(0.2126, 0.7152, 0.0722));
    out.bright = vec4<f32>(emissive * step(1.0, luminance), 1.0);
    return out;
}
"#;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SceneUniform {
    ambient: [f32; 4],
    fog_color: [f32; 4],
    fog_params: [f32; 4],
    camera_pos: [f32; 4],
    screen: [f32; 4],
}

/// CPU-side lighting constants, packed into the scene uniform each
/// frame.
#[derive(Debug, Clone, Copy)]
struct SceneSettings {
    ambient_color: Color,
    ambient_intensity: f32,
    fog_color: Color,
    fog_start: f32,
    /// Distance at which fog is fully opaque; the camera's fog
    /// distance applies while unset.
    fog_clear: Option<f32>,
    ao_enabled: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            ambient_color: Color::new(0.1, 0.1, 0.12),
            ambient_intensity: 1.0,
            fog_color: Color::new(0.5, 0.6, 0.7),
            fog_start: 0.0,
            fog_clear: None,
            ao_enabled: false,
        }
    }
}

impl SceneSettings {
    fn pack(&self, camera: &CameraSnapshot, width: u32, height: u32) -> SceneUniform {
        SceneUniform {
            ambient: [
                self.ambient_color.r,
                self.ambient_color.g,
                self.ambient_color.b,
                self.ambient_intensity,
            ],
            fog_color: [self.fog_color.r, self.fog_color.g, self.fog_color.b, 1.0],
            fog_params: [
                self.fog_start,
                self.fog_clear.unwrap_or(camera.fog_distance),
                if self.ao_enabled { 1.0 } else { 0.0 },
                0.0,
            ],
            camera_pos: [camera.position.x, camera.position.y, camera.position.z, 1.0],
            screen: [
                width as f32,
                height as f32,
                1.0 / width as f32,
                1.0 / height as f32,
            ],
        }
    }
}

/// One recorded pass in a frame's accumulation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePass {
    Clear,
    StencilVolume,
    PointShading,
    GlobalShading,
    Ambient,
}

/// The pass sequence a light list produces: one clear, per-light
/// shading (point volumes preceded by their stencil mark), and the
/// ambient base last.
fn frame_passes(blocks: &[LightBlock]) -> Vec<FramePass> {
    let mut passes = vec![FramePass::Clear];
    for block in blocks {
        if block.is_point() {
            passes.push(FramePass::StencilVolume);
            passes.push(FramePass::PointShading);
        } else {
            passes.push(FramePass::GlobalShading);
        }
    }
    passes.push(FramePass::Ambient);
    passes
}

/// Runs the per-light accumulation: an initial clear of the light and
/// bright targets, one additive pass per light (stencil-restricted for
/// point volumes), and a final ambient pass.
pub struct LightingAccumulator {
    scene_buffer: wgpu::Buffer,
    light_buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    stencil_pipeline: wgpu::RenderPipeline,
    point_pipeline: wgpu::RenderPipeline,
    global_pipeline: wgpu::RenderPipeline,
    ambient_pipeline: wgpu::RenderPipeline,
    sphere_vertices: wgpu::Buffer,
    sphere_indices: wgpu::Buffer,
    sphere_index_count: u32,
    quad_buffer: wgpu::Buffer,
    settings: SceneSettings,
}

impl LightingAccumulator {
    /// Create buffers, the sphere proxy and all four pipelines.
    pub fn new(
        device: &wgpu::Device,
        gbuffer_layout: &wgpu::BindGroupLayout,
        shadow_array_view: &wgpu::TextureView,
        occlusion_view: &wgpu::TextureView,
        ao_enabled: bool,
    ) -> Self {
        let scene_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Lighting Scene Buffer"),
            size: std::mem::size_of::<SceneUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Light Block Buffer"),
            size: UNIFORM_STRIDE * MAX_LIGHTS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lighting Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<SceneUniform>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<LightBlock>() as u64,
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Map Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = Self::create_bind_group(
            device,
            &layout,
            &scene_buffer,
            &light_buffer,
            shadow_array_view,
            &shadow_sampler,
            occlusion_view,
        );

        // Pipelines share one layout: scene/light constants plus the
        // geometric G-buffer attachments.
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lighting Pipeline Layout"),
            bind_group_layouts: &[&layout, gbuffer_layout],
            push_constant_ranges: &[],
        });

        let volume_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Light Volume Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let volume_source = format!("{}{}", LIGHTING_COMMON, VOLUME_SHADER_BODY);
        let volume_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Light Volume Shader"),
            source: wgpu::ShaderSource::Wgsl(volume_source.into()),
        });

        // Sphere proxy marks stencil where scene geometry falls inside
        // the light volume: back faces behind geometry decrement, front
        // faces in front of it increment, interior pixels end non-zero.
        let stencil_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Light Volume Stencil Pipeline"),
            layout: Some(&volume_layout),
            vertex: wgpu::VertexState {
                module: &volume_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: 12,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState {
                    front: wgpu::StencilFaceState {
                        compare: wgpu::CompareFunction::Always,
                        fail_op: wgpu::StencilOperation::Keep,
                        depth_fail_op: wgpu::StencilOperation::IncrementWrap,
                        pass_op: wgpu::StencilOperation::Keep,
                    },
                    back: wgpu::StencilFaceState {
                        compare: wgpu::CompareFunction::Always,
                        fail_op: wgpu::StencilOperation::Keep,
                        depth_fail_op: wgpu::StencilOperation::DecrementWrap,
                        pass_op: wgpu::StencilOperation::Keep,
                    },
                    read_mask: 0xff,
                    write_mask: 0xff,
                },
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let lighting_source = format!("{}{}", LIGHTING_COMMON, LIGHTING_SHADER_BODY);
        let lighting_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Lighting Shader"),
            source: wgpu::ShaderSource::Wgsl(lighting_source.into()),
        });

        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };
        let accumulation_targets = [
            Some(wgpu::ColorTargetState {
                format: LIGHT_FORMAT,
                blend: Some(additive),
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: BRIGHT_FORMAT,
                blend: Some(additive),
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];

        let lighting_pipeline = |label: &str, stencil: wgpu::StencilState, shader| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[FullscreenVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &accumulation_targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: false,
                    depth_compare: wgpu::CompareFunction::Always,
                    stencil,
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        // Point lights shade only pixels the volume pass marked.
        let masked = wgpu::StencilState {
            front: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::NotEqual,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            },
            back: wgpu::StencilFaceState {
                compare: wgpu::CompareFunction::NotEqual,
                fail_op: wgpu::StencilOperation::Keep,
                depth_fail_op: wgpu::StencilOperation::Keep,
                pass_op: wgpu::StencilOperation::Keep,
            },
            read_mask: 0xff,
            write_mask: 0,
        };
        let point_pipeline =
            lighting_pipeline("Point Lighting Pipeline", masked, &lighting_shader);
        let global_pipeline = lighting_pipeline(
            "Global Lighting Pipeline",
            wgpu::StencilState::default(),
            &lighting_shader,
        );

        let ambient_source = format!("{}{}", LIGHTING_COMMON, AMBIENT_SHADER_BODY);
        let ambient_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Ambient Shader"),
            source: wgpu::ShaderSource::Wgsl(ambient_source.into()),
        });
        let ambient_pipeline = lighting_pipeline(
            "Ambient Pipeline",
            wgpu::StencilState::default(),
            &ambient_shader,
        );

        let sphere = generate_sphere(12, 16);
        let sphere_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Volume Sphere Vertices"),
            contents: bytemuck::cast_slice(&sphere.positions),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Volume Sphere Indices"),
            contents: bytemuck::cast_slice(&sphere.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let quad_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Lighting Quad"),
            contents: bytemuck::cast_slice(&FULLSCREEN_QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            scene_buffer,
            light_buffer,
            layout,
            bind_group,
            stencil_pipeline,
            point_pipeline,
            global_pipeline,
            ambient_pipeline,
            sphere_vertices,
            sphere_indices,
            sphere_index_count: sphere.indices.len() as u32,
            quad_buffer,
            settings: SceneSettings {
                ao_enabled,
                ..SceneSettings::default()
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        scene_buffer: &wgpu::Buffer,
        light_buffer: &wgpu::Buffer,
        shadow_array_view: &wgpu::TextureView,
        shadow_sampler: &wgpu::Sampler,
        occlusion_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lighting Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: light_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<LightBlock>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(shadow_array_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(shadow_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(occlusion_view),
                },
            ],
        })
    }

    /// Rebuild the bind group after the occlusion target was recreated.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        shadow_array_view: &wgpu::TextureView,
        occlusion_view: &wgpu::TextureView,
    ) {
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Map Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        self.bind_group = Self::create_bind_group(
            device,
            &self.layout,
            &self.scene_buffer,
            &self.light_buffer,
            shadow_array_view,
            &shadow_sampler,
            occlusion_view,
        );
    }

    /// Set the ambient term.
    pub fn set_ambient(&mut self, color: Color, intensity: f32) {
        self.settings.ambient_color = color;
        self.settings.ambient_intensity = intensity;
    }

    /// Set the fog color.
    pub fn set_fog_color(&mut self, color: Color) {
        self.settings.fog_color = color;
    }

    /// Distance at which fog is fully opaque and distance at which it
    /// starts. The clear distance takes precedence over the camera's
    /// fog distance once set.
    pub fn set_fog_distances(&mut self, clear: f32, start: f32) {
        self.settings.fog_clear = Some(clear);
        self.settings.fog_start = start;
    }

    /// Whether light and ambient shading modulate by the occlusion
    /// texture.
    pub fn set_ao_enabled(&mut self, enabled: bool) {
        self.settings.ao_enabled = enabled;
    }

    /// Current ambient color.
    #[inline]
    pub fn ambient(&self) -> (Color, f32) {
        (self.settings.ambient_color, self.settings.ambient_intensity)
    }

    /// Upload scene constants and the packed light list, then record
    /// every accumulation pass.
    ///
    /// Returns the number of lights accumulated.
    pub fn record(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        camera: &CameraSnapshot,
        blocks: &[LightBlock],
    ) -> usize {
        let blocks = if blocks.len() > MAX_LIGHTS {
            log::warn!(
                "{} lights exceed the per-frame budget of {}, extra lights dropped",
                blocks.len(),
                MAX_LIGHTS
            );
            &blocks[..MAX_LIGHTS]
        } else {
            blocks
        };

        let scene = self
            .settings
            .pack(camera, gbuffer.width(), gbuffer.height());
        queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&scene));
        for (i, block) in blocks.iter().enumerate() {
            queue.write_buffer(
                &self.light_buffer,
                UNIFORM_STRIDE * i as u64,
                bytemuck::bytes_of(block),
            );
        }

        let mut light = 0usize;
        for pass in frame_passes(blocks) {
            let offset = (UNIFORM_STRIDE * light as u64) as u32;
            match pass {
                FramePass::Clear => self.clear_targets(encoder, gbuffer),
                FramePass::StencilVolume => self.record_stencil_volume(encoder, gbuffer, offset),
                FramePass::PointShading => {
                    self.record_point_shading(encoder, gbuffer, offset);
                    light += 1;
                }
                FramePass::GlobalShading => {
                    self.record_global_light(encoder, gbuffer, offset);
                    light += 1;
                }
                FramePass::Ambient => self.record_ambient(encoder, gbuffer),
            }
        }
        blocks.len()
    }

    fn clear_targets(&self, encoder: &mut wgpu::CommandEncoder, gbuffer: &GBuffer) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Light Accumulation Clear"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: gbuffer.light_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: gbuffer.bright_view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                }),
            ],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    /// Volume pass: clear stencil, mark pixels covered by the sphere
    /// proxy.
    fn record_stencil_volume(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Light Volume Stencil Pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                // Depth is only compared against, never written.
                depth_ops: None,
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.stencil_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[offset]);
        pass.set_vertex_buffer(0, self.sphere_vertices.slice(..));
        pass.set_index_buffer(self.sphere_indices.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.sphere_index_count, 0, 0..1);
    }

    /// Shading pass restricted to the pixels the volume pass marked.
    fn record_point_shading(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Point Lighting Pass"),
            color_attachments: &self.accumulation_attachments(gbuffer),
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                // Read-only so the depth view bound in the G-buffer
                // sample group does not conflict with the attachment.
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.point_pipeline);
        pass.set_stencil_reference(0);
        pass.set_bind_group(0, &self.bind_group, &[offset]);
        pass.set_bind_group(1, gbuffer.sample_bind_group(), &[]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    fn record_global_light(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        offset: u32,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Global Lighting Pass"),
            color_attachments: &self.accumulation_attachments(gbuffer),
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                // Read-only so the depth view bound in the G-buffer
                // sample group does not conflict with the attachment.
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.global_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[offset]);
        pass.set_bind_group(1, gbuffer.sample_bind_group(), &[]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    fn record_ambient(&self, encoder: &mut wgpu::CommandEncoder, gbuffer: &GBuffer) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Ambient Pass"),
            color_attachments: &self.accumulation_attachments(gbuffer),
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: gbuffer.depth_stencil_view(),
                // Read-only so the depth view bound in the G-buffer
                // sample group does not conflict with the attachment.
                depth_ops: None,
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.ambient_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[0]);
        pass.set_bind_group(1, gbuffer.sample_bind_group(), &[]);
        pass.set_vertex_buffer(0, self.quad_buffer.slice(..));
        pass.draw(0..FULLSCREEN_QUAD_VERTICES.len() as u32, 0..1);
    }

    fn accumulation_attachments<'a>(
        &self,
        gbuffer: &'a GBuffer,
    ) -> [Option<wgpu::RenderPassColorAttachment<'a>>; 2] {
        [
            Some(wgpu::RenderPassColorAttachment {
                view: gbuffer.light_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            }),
            Some(wgpu::RenderPassColorAttachment {
                view: gbuffer.bright_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Matrix4, Vector3};
    use crate::scene::LightRecord;
    use crate::shadows::ShadowSlotPool;

    fn test_camera() -> CameraSnapshot {
        CameraSnapshot {
            position: Vector3::new(0.0, 2.0, 8.0),
            view: Matrix4::look_at(&Vector3::new(0.0, 2.0, 8.0), &Vector3::ZERO, &Vector3::UP),
            projection: Matrix4::perspective(1.0, 16.0 / 9.0, 0.1, 100.0),
            near: 0.1,
            far: 100.0,
            fog_distance: 80.0,
        }
    }

    #[test]
    fn test_no_lights_runs_ambient_only() {
        assert_eq!(frame_passes(&[]), vec![FramePass::Clear, FramePass::Ambient]);
    }

    #[test]
    fn test_point_light_marks_stencil_before_shading() {
        let camera = test_camera();
        let pool = ShadowSlotPool::new(4);
        let point = LightBlock::pack(
            &LightRecord::point(1, Vector3::new(1.0, 0.0, 0.0), 5.0),
            None,
            &pool,
            &camera,
        );
        let sun = LightBlock::pack(
            &LightRecord::directional(2, Vector3::new(0.2, -1.0, 0.0)),
            None,
            &pool,
            &camera,
        );
        assert_eq!(
            frame_passes(&[point, sun]),
            vec![
                FramePass::Clear,
                FramePass::StencilVolume,
                FramePass::PointShading,
                FramePass::GlobalShading,
                FramePass::Ambient,
            ]
        );
    }

    #[test]
    fn test_ao_flag_carried_in_scene_uniform() {
        let camera = test_camera();
        let mut settings = SceneSettings::default();
        settings.ao_enabled = true;
        assert_eq!(settings.pack(&camera, 8, 8).fog_params[2], 1.0);
        settings.ao_enabled = false;
        assert_eq!(settings.pack(&camera, 8, 8).fog_params[2], 0.0);
    }

    #[test]
    fn test_fog_clear_distance_overrides_camera() {
        let camera = test_camera();
        let mut settings = SceneSettings::default();
        assert_eq!(settings.pack(&camera, 8, 8).fog_params[1], 80.0);

        settings.fog_clear = Some(40.0);
        settings.fog_start = 10.0;
        let packed = settings.pack(&camera, 8, 8);
        assert_eq!(packed.fog_params[1], 40.0);
        assert_eq!(packed.fog_params[0], 10.0);
    }

    #[test]
    fn test_light_shader_modulates_occlusion() {
        // Every light contribution applies the occlusion target, not
        // just the ambient base.
        assert!(LIGHTING_SHADER_BODY.contains("textureLoad(occlusion_tex"));
        assert!(LIGHTING_SHADER_BODY.contains("* occlusion"));
    }
}
