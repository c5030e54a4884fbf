//! The Abrogue render engine.
//!
//! Owns the full Vulkan object graph (instance, device, swapchain
//! generations, pipeline, per-frame resources) and exposes exactly two
//! things to the game: construction and [`RenderEngine::draw_frame`].

mod engine;
mod frame;
mod quad;

pub use engine::RenderEngine;
pub use frame::DeferredRelease;
pub use quad::QuadData;
