//! RGB color type.

use serde::{Deserialize, Serialize};

/// An RGB color with components in [0, 1] (HDR values may exceed 1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
}

impl Color {
    /// Pure black.
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };
    /// Pure white.
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };

    /// Create a new color.
    #[inline]
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// As an array, for uniform packing.
    #[inline]
    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }

    /// Scale all components by a factor.
    #[inline]
    pub fn scaled(&self, factor: f32) -> Color {
        Color::new(self.r * factor, self.g * factor, self.b * factor)
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled() {
        let c = Color::new(0.5, 0.25, 1.0).scaled(2.0);
        assert_eq!(c.to_array(), [1.0, 0.5, 2.0]);
    }
}
