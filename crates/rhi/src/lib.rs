//! Vulkan abstraction layer for the Abrogue render engine.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Physical device selection
//! - Swapchain management (including the render pass and framebuffers)
//! - Buffer and image memory allocation
//! - Texture upload
//! - Command buffer recording
//! - Synchronization primitives

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
