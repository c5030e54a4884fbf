//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// A required layer, extension or device feature is absent
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// No suitable GPU found
    #[error("no suitable physical devices found")]
    NoSuitableGpu,

    /// No memory type satisfies the requested property flags
    #[error("No suitable memory type for {0}")]
    NoSuitableMemoryType(&'static str),

    /// The driver returned a null buffer device address
    #[error("Failed to get buffer device address")]
    NullDeviceAddress,

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Texture loading/upload error
    #[error("Texture error: {0}")]
    TextureError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// The engine hit a fatal error earlier and refuses further work
    #[error("render engine is in a failed state")]
    EngineFailed,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
