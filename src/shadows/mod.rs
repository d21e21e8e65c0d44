//! Shadow mapping: slot pool allocation, light-space matrices, and the
//! variance shadow renderer.
//!
//! All shadow-casting lights share one fixed-capacity texture array.
//! Slots are handed out by [`ShadowSlotPool`] (a LIFO free list with
//! one-frame reuse deferral), light-space matrices live in the
//! [`ShadowMatrixTable`], and [`ShadowRenderer`] renders and filters
//! each caster's depth into its assigned layers.

mod matrix_table;
mod renderer;
mod slot_pool;

pub use matrix_table::{ShadowMatrixTable, SlotMatrices};
pub use renderer::{CubeFace, ShadowRenderer};
pub use slot_pool::{CasterId, ShadowCaster, ShadowPoolError, ShadowSlotPool};

/// Upper bound on configurable shadow slot capacity.
pub const MAX_SHADOW_SLOTS: usize = 64;
