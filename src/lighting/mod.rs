//! Per-light deferred accumulation.
//!
//! Every light contributes one additive pass over the light and bright
//! targets; point lights first mark their volume's stencil footprint
//! with a sphere proxy so shading only touches covered pixels. Because
//! all passes blend additively, the result is independent of light
//! order. A final ambient pass adds the base term, emissive and fog.

mod accumulator;
mod light_block;
mod sphere;

pub use accumulator::{LightingAccumulator, MAX_LIGHTS};
pub use light_block::{pack_lights, LightBlock};
pub use sphere::{generate_sphere, SphereMesh};
