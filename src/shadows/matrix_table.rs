//! Per-slot light-space matrix table.

use crate::math::Matrix4;

use super::MAX_SHADOW_SLOTS;

/// Matrix pair for one shadow slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotMatrices {
    /// Light-space view-projection, used when sampling the slot during
    /// lighting accumulation.
    pub matrix: Matrix4,
    /// Depth-bias-adjusted variant, pushed as the per-draw constant
    /// while rendering into the slot.
    pub biased: Matrix4,
}

impl Default for SlotMatrices {
    fn default() -> Self {
        Self {
            matrix: Matrix4::IDENTITY,
            biased: Matrix4::IDENTITY,
        }
    }
}

impl SlotMatrices {
    /// Build the pair from an unbiased view-projection and a clip-space
    /// depth offset.
    pub fn with_bias(matrix: Matrix4, depth_bias: f32) -> Self {
        let mut biased = matrix;
        // Shift clip-space depth toward the light: z' = z - bias * w.
        for col in 0..4 {
            biased.cols[col][2] -= depth_bias * matrix.cols[col][3];
        }
        Self { matrix, biased }
    }
}

/// Mapping from slot index to its matrix pair, rewritten every frame
/// for every active caster before the shadow render sub-pass. Read by
/// the shadow renderer (render constants) and the lighting accumulator
/// (shadow-space projection of screen fragments).
pub struct ShadowMatrixTable {
    entries: Vec<SlotMatrices>,
}

impl ShadowMatrixTable {
    /// Create a table sized to the pool capacity.
    pub fn new(capacity: u32) -> Self {
        let capacity = (capacity as usize).min(MAX_SHADOW_SLOTS);
        Self {
            entries: vec![SlotMatrices::default(); capacity],
        }
    }

    /// Write one slot's matrices. Out-of-range slots are ignored.
    pub fn set(&mut self, slot: u32, matrices: SlotMatrices) {
        if let Some(entry) = self.entries.get_mut(slot as usize) {
            *entry = matrices;
        }
    }

    /// Read one slot's matrices.
    #[inline]
    pub fn get(&self, slot: u32) -> Option<&SlotMatrices> {
        self.entries.get(slot as usize)
    }

    /// Reset every entry to identity.
    pub fn clear(&mut self) {
        self.entries.fill(SlotMatrices::default());
    }

    /// Number of slots in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;

    #[test]
    fn test_set_get_round_trip() {
        let mut table = ShadowMatrixTable::new(4);
        let vp = Matrix4::orthographic(-1.0, 1.0, -1.0, 1.0, 0.1, 10.0);
        let pair = SlotMatrices::with_bias(vp, 0.002);
        table.set(2, pair);
        assert_eq!(table.get(2), Some(&pair));
        assert_eq!(table.get(0), Some(&SlotMatrices::default()));
        assert!(table.get(4).is_none());
    }

    #[test]
    fn test_bias_moves_depth_toward_light() {
        let vp = Matrix4::perspective(1.0, 1.0, 0.1, 50.0);
        let pair = SlotMatrices::with_bias(vp, 0.01);
        let p = Vector3::new(0.0, 0.0, -10.0);
        let plain = pair.matrix.transform_point(&p);
        let biased = pair.biased.transform_point(&p);
        assert!(biased.z < plain.z);
        assert!((plain.z - biased.z - 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_clear_resets_entries() {
        let mut table = ShadowMatrixTable::new(2);
        table.set(0, SlotMatrices::with_bias(Matrix4::IDENTITY, 0.5));
        table.clear();
        assert_eq!(table.get(0), Some(&SlotMatrices::default()));
    }
}
