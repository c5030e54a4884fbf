//! Error types shared across the game.

use thiserror::Error;

/// Main error type for the application layers above the RHI.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors surfaced by the render engine
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the game's Error type.
pub type Result<T> = std::result::Result<T, Error>;
