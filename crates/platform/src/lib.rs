//! Platform layer: window, Vulkan surface, and input state.

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};
