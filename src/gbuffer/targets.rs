//! G-buffer render target set.

/// Formats of the G-buffer color attachments, in attachment order.
pub const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Normal attachment format.
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Albedo (rgb) + specular (a) attachment format.
pub const ALBEDO_SPEC_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Material info attachment format (roughness, metallic, emissive, flags).
pub const MATERIAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Light accumulation attachment format (HDR).
pub const LIGHT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Bright-pass accumulation attachment format (HDR).
pub const BRIGHT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Depth + stencil attachment format. Stencil is required for
/// point-light volume masking.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;

struct Attachment {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl Attachment {
    fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
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
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// The full G-buffer: geometric attributes written once per frame by
/// the geometry pass, plus the light/bright accumulation targets the
/// later stages write into. Recreated on resize.
pub struct GBuffer {
    position: Attachment,
    normal: Attachment,
    albedo_spec: Attachment,
    material: Attachment,
    light: Attachment,
    bright: Attachment,
    depth_texture: wgpu::Texture,
    depth_stencil_view: wgpu::TextureView,
    depth_only_view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    sample_layout: wgpu::BindGroupLayout,
    sample_bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

impl GBuffer {
    /// Create all attachments at the given render resolution.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let position = Attachment::new(device, "G-Buffer Position", width, height, POSITION_FORMAT);
        let normal = Attachment::new(device, "G-Buffer Normal", width, height, NORMAL_FORMAT);
        let albedo_spec =
            Attachment::new(device, "G-Buffer Albedo+Spec", width, height, ALBEDO_SPEC_FORMAT);
        let material = Attachment::new(device, "G-Buffer Material", width, height, MATERIAL_FORMAT);
        let light = Attachment::new(device, "Light Accumulation", width, height, LIGHT_FORMAT);
        let bright = Attachment::new(device, "Bright Accumulation", width, height, BRIGHT_FORMAT);

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("G-Buffer Depth+Stencil"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_stencil_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_only_view = depth_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("G-Buffer Depth Only"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("G-Buffer Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let sample_layout = Self::create_sample_layout(device);
        let sample_bind_group = Self::create_sample_bind_group(
            device,
            &sample_layout,
            &position.view,
            &normal.view,
            &albedo_spec.view,
            &material.view,
            &depth_only_view,
            &sampler,
        );

        Self {
            position,
            normal,
            albedo_spec,
            material,
            light,
            bright,
            depth_texture,
            depth_stencil_view,
            depth_only_view,
            sampler,
            sample_layout,
            sample_bind_group,
            width,
            height,
        }
    }

    /// Bind group layout for sampling the geometric attachments in the
    /// lighting and AO passes.
    pub fn create_sample_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("G-Buffer Sample Layout"),
            entries: &[
                texture_entry(0), // position
                texture_entry(1), // normal
                texture_entry(2), // albedo + specular
                texture_entry(3), // material
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn create_sample_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        position: &wgpu::TextureView,
        normal: &wgpu::TextureView,
        albedo_spec: &wgpu::TextureView,
        material: &wgpu::TextureView,
        depth: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("G-Buffer Sample Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(position),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(normal),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(albedo_spec),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(material),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(depth),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Recreate every attachment at a new resolution.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if self.width != width || self.height != height {
            *self = Self::new(device, width, height);
        }
    }

    /// Current width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Position attachment view (render target).
    #[inline]
    pub fn position_view(&self) -> &wgpu::TextureView {
        &self.position.view
    }

    /// Normal attachment view (render target).
    #[inline]
    pub fn normal_view(&self) -> &wgpu::TextureView {
        &self.normal.view
    }

    /// Albedo + specular attachment view (render target).
    #[inline]
    pub fn albedo_spec_view(&self) -> &wgpu::TextureView {
        &self.albedo_spec.view
    }

    /// Material attachment view (render target).
    #[inline]
    pub fn material_view(&self) -> &wgpu::TextureView {
        &self.material.view
    }

    /// Light accumulation view. Written additively by the lighting
    /// accumulator, read by the post-process chain.
    #[inline]
    pub fn light_view(&self) -> &wgpu::TextureView {
        &self.light.view
    }

    /// Bright accumulation view, read by bloom.
    #[inline]
    pub fn bright_view(&self) -> &wgpu::TextureView {
        &self.bright.view
    }

    /// Depth + stencil view for attachment use.
    #[inline]
    pub fn depth_stencil_view(&self) -> &wgpu::TextureView {
        &self.depth_stencil_view
    }

    /// Depth-only view for sampling.
    #[inline]
    pub fn depth_only_view(&self) -> &wgpu::TextureView {
        &self.depth_only_view
    }

    /// Sample bind group (position/normal/albedo/material/depth + sampler).
    #[inline]
    pub fn sample_bind_group(&self) -> &wgpu::BindGroup {
        &self.sample_bind_group
    }

    /// Sample bind group layout.
    #[inline]
    pub fn sample_layout(&self) -> &wgpu::BindGroupLayout {
        &self.sample_layout
    }

    /// Underlying depth texture.
    #[inline]
    pub fn depth_texture(&self) -> &wgpu::Texture {
        &self.depth_texture
    }
}
