//! Fixed-capacity shadow map slot allocator.

use std::collections::HashMap;

use thiserror::Error;

use super::matrix_table::SlotMatrices;

/// Handle to a registered shadow caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasterId(u64);

/// Allocation failures. Never fatal: the affected light falls back to
/// rendering unshadowed for the frame.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShadowPoolError {
    /// The free list holds fewer slots than requested. No partial
    /// allocation takes place.
    #[error("shadow slot pool exhausted: requested {requested}, {available} available")]
    Exhausted {
        /// How many slots the caster asked for.
        requested: u32,
        /// How many were free at the time.
        available: u32,
    },

    /// Requested slot count outside 1..=6 (point lights need at most
    /// one slot per cube face).
    #[error("invalid shadow slot count {0}, expected 1..=6")]
    InvalidSlotCount(u32),
}

/// One registered shadow caster and its exclusively-owned slots.
#[derive(Debug, Clone)]
pub struct ShadowCaster {
    /// Scene light this caster belongs to.
    pub light_id: u64,
    /// Texture array layers owned by this caster, in allocation order.
    pub slots: Vec<u32>,
    /// Per-slot light-space matrices (unbiased + bias-adjusted),
    /// rewritten every frame before the shadow render sub-pass.
    pub matrices: Vec<SlotMatrices>,
}

/// LIFO allocator over a bounded set of shadow-map texture array layers.
///
/// The free list starts full, ordered so that slot 0 is handed out
/// last. Freed slots are parked until the next [`begin_frame`] call so
/// a layer is never reissued in the same frame it was released; the
/// lighting pass reading the old contents has already been recorded by
/// then.
///
/// [`begin_frame`]: ShadowSlotPool::begin_frame
pub struct ShadowSlotPool {
    capacity: u32,
    free: Vec<u32>,
    pending: Vec<u32>,
    casters: HashMap<CasterId, ShadowCaster>,
    next_id: u64,
}

impl ShadowSlotPool {
    /// Create a pool with the given slot capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            free: (0..capacity).collect(),
            pending: Vec::new(),
            casters: HashMap::new(),
            next_id: 0,
        }
    }

    /// Return last frame's freed slots to the free list. Call once at
    /// the top of every frame, before any registration.
    pub fn begin_frame(&mut self) {
        self.free.append(&mut self.pending);
    }

    /// Register a shadow caster, popping `slot_count` layers from the
    /// free list. Fails whole when fewer are available.
    pub fn register_caster(
        &mut self,
        light_id: u64,
        slot_count: u32,
    ) -> Result<CasterId, ShadowPoolError> {
        if slot_count == 0 || slot_count > 6 {
            return Err(ShadowPoolError::InvalidSlotCount(slot_count));
        }
        if (self.free.len() as u32) < slot_count {
            return Err(ShadowPoolError::Exhausted {
                requested: slot_count,
                available: self.free.len() as u32,
            });
        }

        let slots: Vec<u32> = (0..slot_count).filter_map(|_| self.free.pop()).collect();
        let matrices = vec![SlotMatrices::default(); slots.len()];

        let id = CasterId(self.next_id);
        self.next_id += 1;
        self.casters.insert(
            id,
            ShadowCaster {
                light_id,
                slots,
                matrices,
            },
        );
        Ok(id)
    }

    /// Release a caster's slots. They become allocatable again after
    /// the next [`begin_frame`](Self::begin_frame).
    pub fn unregister_caster(&mut self, id: CasterId) {
        if let Some(caster) = self.casters.remove(&id) {
            self.pending.extend(caster.slots);
        }
    }

    /// Look up a registered caster.
    #[inline]
    pub fn caster(&self, id: CasterId) -> Option<&ShadowCaster> {
        self.casters.get(&id)
    }

    /// Mutable caster access, for rewriting matrices each frame.
    #[inline]
    pub fn caster_mut(&mut self, id: CasterId) -> Option<&mut ShadowCaster> {
        self.casters.get_mut(&id)
    }

    /// This caster's light-space matrices, if registered.
    pub fn matrices(&self, id: CasterId) -> Option<&[SlotMatrices]> {
        self.casters.get(&id).map(|c| c.matrices.as_slice())
    }

    /// Iterate all registered casters.
    pub fn casters(&self) -> impl Iterator<Item = (CasterId, &ShadowCaster)> {
        self.casters.iter().map(|(id, c)| (*id, c))
    }

    /// Total slot capacity.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Slots allocatable right now (excludes slots pending reuse).
    #[inline]
    pub fn available(&self) -> u32 {
        self.free.len() as u32
    }

    /// Number of slots currently owned by live casters.
    pub fn live_slots(&self) -> u32 {
        self.casters.values().map(|c| c.slots.len() as u32).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_then_exhaustion() {
        let mut pool = ShadowSlotPool::new(4);
        let mut issued = Vec::new();
        for light in 0..4 {
            let id = pool.register_caster(light, 1).unwrap();
            issued.extend(pool.caster(id).unwrap().slots.clone());
        }
        // First four single-slot casters drain the pool top-down.
        assert_eq!(issued, vec![3, 2, 1, 0]);
        assert_eq!(
            pool.register_caster(4, 1),
            Err(ShadowPoolError::Exhausted {
                requested: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_no_slot_issued_twice_while_held() {
        let mut pool = ShadowSlotPool::new(8);
        let a = pool.register_caster(0, 3).unwrap();
        let b = pool.register_caster(1, 3).unwrap();
        let mut all: Vec<u32> = pool.caster(a).unwrap().slots.clone();
        all.extend(pool.caster(b).unwrap().slots.clone());
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 6);
        assert_eq!(pool.live_slots(), 6);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_lifo_reuse_after_frame_boundary() {
        let mut pool = ShadowSlotPool::new(8);
        let a = pool.register_caster(0, 2).unwrap();
        let freed = pool.caster(a).unwrap().slots.clone();
        pool.unregister_caster(a);
        pool.begin_frame();

        let b = pool.register_caster(1, 2).unwrap();
        let reused = pool.caster(b).unwrap().slots.clone();
        // Exactly the freed set, in reverse-free order.
        let expected: Vec<u32> = freed.iter().rev().copied().collect();
        assert_eq!(reused, expected);
    }

    #[test]
    fn test_freed_slots_deferred_one_frame() {
        let mut pool = ShadowSlotPool::new(1);
        let a = pool.register_caster(0, 1).unwrap();
        pool.unregister_caster(a);
        // Same frame: the slot is still parked.
        assert_eq!(
            pool.register_caster(1, 1),
            Err(ShadowPoolError::Exhausted {
                requested: 1,
                available: 0
            })
        );
        pool.begin_frame();
        assert!(pool.register_caster(1, 1).is_ok());
    }

    #[test]
    fn test_point_light_no_partial_allocation() {
        let mut pool = ShadowSlotPool::new(4);
        assert_eq!(
            pool.register_caster(0, 6),
            Err(ShadowPoolError::Exhausted {
                requested: 6,
                available: 4
            })
        );
        // Nothing was taken.
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_invalid_slot_count() {
        let mut pool = ShadowSlotPool::new(8);
        assert_eq!(
            pool.register_caster(0, 0),
            Err(ShadowPoolError::InvalidSlotCount(0))
        );
        assert_eq!(
            pool.register_caster(0, 7),
            Err(ShadowPoolError::InvalidSlotCount(7))
        );
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let mut pool = ShadowSlotPool::new(2);
        let a = pool.register_caster(0, 1).unwrap();
        pool.unregister_caster(a);
        pool.unregister_caster(a);
        pool.begin_frame();
        assert_eq!(pool.available(), 2);
    }
}
