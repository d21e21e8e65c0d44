//! Post-processing: an ordered chain of full-screen effects over two
//! ping-ponged render targets, finished by a blit to the surface.

pub mod effect;

mod bloom;
mod chain;
mod tonemap;

pub use bloom::{BloomEffect, BloomSettings};
pub use chain::{ChainContext, PostProcessChain};
pub use effect::{Effect, FullscreenVertex, FULLSCREEN_QUAD_VERTICES};
pub use tonemap::TonemapEffect;
