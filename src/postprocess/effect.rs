//! Full-screen effect trait and shared fullscreen-quad plumbing.

use super::chain::ChainContext;

/// One effect in the post-processing chain.
pub trait Effect {
    /// Name of this effect, for lookup and logging.
    fn name(&self) -> &str;

    /// Whether this effect runs this frame.
    fn enabled(&self) -> bool {
        true
    }

    /// Enable or disable this effect.
    fn set_enabled(&mut self, enabled: bool);

    /// Record this effect: read `input`, write `output`. The context
    /// carries the shared uniform block, the bright-pass attachment and
    /// the device/queue for transient bind groups.
    fn record(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
        ctx: &ChainContext<'_>,
    );

    /// Called when the render target size changes.
    fn resize(&mut self, width: u32, height: u32, device: &wgpu::Device);
}

/// Vertex for fullscreen quad rendering (position + uv).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FullscreenVertex {
    /// Clip-space position (x, y).
    pub position: [f32; 2],
    /// UV coordinates.
    pub uv: [f32; 2],
}

impl FullscreenVertex {
    /// Vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 0,
                    shader_location: 0,
                },
                wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x2,
                    offset: 8,
                    shader_location: 1,
                },
            ],
        }
    }
}

/// Fullscreen quad vertices (two triangles).
pub const FULLSCREEN_QUAD_VERTICES: [FullscreenVertex; 6] = [
    FullscreenVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    FullscreenVertex { position: [1.0, -1.0], uv: [1.0, 1.0] },
    FullscreenVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
    FullscreenVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    FullscreenVertex { position: [1.0, 1.0], uv: [1.0, 0.0] },
    FullscreenVertex { position: [-1.0, 1.0], uv: [0.0, 0.0] },
];
