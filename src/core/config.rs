//! Pipeline configuration options.

use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Shadow map resolution presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShadowQuality {
    /// 512x512 per slot.
    Low,
    /// 1024x1024 per slot.
    Medium,
    /// 2048x2048 per slot (default).
    #[default]
    High,
    /// 4096x4096 per slot.
    Ultra,
}

impl ShadowQuality {
    /// Shadow map resolution for this quality level.
    pub fn resolution(&self) -> u32 {
        match self {
            Self::Low => 512,
            Self::Medium => 1024,
            Self::High => 2048,
            Self::Ultra => 4096,
        }
    }

    /// Pick the closest tier for a raw resolution value.
    pub fn from_resolution(resolution: u32) -> Self {
        match resolution {
            0..=512 => Self::Low,
            513..=1024 => Self::Medium,
            1025..=2048 => Self::High,
            _ => Self::Ultra,
        }
    }
}

/// Texture quality tier. Affects which mip level is treated as base
/// when collaborators bind material textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureQuality {
    /// Base mip 2 (quarter resolution).
    Low,
    /// Base mip 1 (half resolution).
    Medium,
    /// Base mip 0 (full resolution, default).
    #[default]
    Full,
}

impl TextureQuality {
    /// The mip level treated as base for this tier.
    pub fn base_mip(&self) -> u32 {
        match self {
            Self::Low => 2,
            Self::Medium => 1,
            Self::Full => 0,
        }
    }
}

/// Which ambient-occlusion variant runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AoVariant {
    /// Screen-space AO with a hemisphere sample kernel (default).
    #[default]
    Ssao,
    /// Horizon-based AO.
    Hbao,
}

/// SSAO tuning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SsaoConfig {
    /// Number of hemisphere kernel samples (clamped to 8..=64).
    pub kernel_size: u32,
    /// Sampling radius in view-space units.
    pub radius: f32,
    /// Depth bias preventing self-occlusion.
    pub bias: f32,
    /// Occlusion contrast threshold.
    pub threshold: f32,
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            kernel_size: 32,
            radius: 0.5,
            bias: 0.025,
            threshold: 1.0,
        }
    }
}

/// Configuration for the deferred pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Multisample count. The deferred path resolves anti-aliasing via
    /// supersampling; values above 1 are clamped with a warning.
    pub sample_count: u32,
    /// Render the G-buffer at twice the output resolution.
    pub supersampling: bool,
    /// Shadow map resolution tier.
    pub shadow_quality: ShadowQuality,
    /// Maximum concurrent shadow map slots (1..=64). Point lights
    /// consume up to 6 slots each.
    pub max_shadow_maps: u32,
    /// Enable the ambient-occlusion stage.
    pub ao_enabled: bool,
    /// SSAO parameters.
    pub ssao: SsaoConfig,
    /// Request the horizon-based AO variant. Takes priority over SSAO
    /// when both are requested.
    pub hbao: bool,
    /// Texture quality tier.
    pub texture_quality: TextureQuality,
    /// Surface format the final frame is blitted to.
    #[serde(skip, default = "default_surface_format")]
    pub surface_format: wgpu::TextureFormat,
}

fn default_surface_format() -> wgpu::TextureFormat {
    wgpu::TextureFormat::Bgra8UnormSrgb
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            sample_count: 1,
            supersampling: false,
            shadow_quality: ShadowQuality::default(),
            max_shadow_maps: 8,
            ao_enabled: true,
            ssao: SsaoConfig::default(),
            hbao: false,
            texture_quality: TextureQuality::default(),
            surface_format: default_surface_format(),
        }
    }
}

impl PipelineConfig {
    /// Validate ranges and normalize values the hardware cannot honor.
    pub fn validated(mut self) -> Result<Self, PipelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "output size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if self.max_shadow_maps == 0 || self.max_shadow_maps > 64 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_shadow_maps {} outside 1..=64",
                self.max_shadow_maps
            )));
        }
        if self.sample_count > 1 {
            log::warn!(
                "multisample count {} not supported by the deferred path, using supersampling instead",
                self.sample_count
            );
            self.sample_count = 1;
        }
        self.ssao.kernel_size = self.ssao.kernel_size.clamp(8, 64);
        Ok(self)
    }

    /// The AO variant selected by this configuration. HBAO wins when
    /// both are requested.
    pub fn ao_variant(&self) -> AoVariant {
        if self.hbao {
            AoVariant::Hbao
        } else {
            AoVariant::Ssao
        }
    }

    /// G-buffer dimensions, accounting for supersampling.
    pub fn render_size(&self) -> (u32, u32) {
        if self.supersampling {
            (self.width * 2, self.height * 2)
        } else {
            (self.width, self.height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_quality_resolution() {
        assert_eq!(ShadowQuality::Low.resolution(), 512);
        assert_eq!(ShadowQuality::from_resolution(2048), ShadowQuality::High);
        assert_eq!(ShadowQuality::from_resolution(8192), ShadowQuality::Ultra);
    }

    #[test]
    fn test_validated_rejects_zero_size() {
        let config = PipelineConfig {
            width: 0,
            ..Default::default()
        };
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_validated_clamps_msaa_and_kernel() {
        let config = PipelineConfig {
            sample_count: 4,
            ssao: SsaoConfig {
                kernel_size: 256,
                ..Default::default()
            },
            ..Default::default()
        };
        let config = config.validated().unwrap();
        assert_eq!(config.sample_count, 1);
        assert_eq!(config.ssao.kernel_size, 64);
    }

    #[test]
    fn test_hbao_priority() {
        let config = PipelineConfig {
            hbao: true,
            ..Default::default()
        };
        assert_eq!(config.ao_variant(), AoVariant::Hbao);
        assert_eq!(PipelineConfig::default().ao_variant(), AoVariant::Ssao);
    }

    #[test]
    fn test_supersampled_render_size() {
        let config = PipelineConfig {
            width: 800,
            height: 600,
            supersampling: true,
            ..Default::default()
        };
        assert_eq!(config.render_size(), (1600, 1200));
    }
}
