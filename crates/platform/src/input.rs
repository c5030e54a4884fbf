//! Keyboard input handling.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Tracks the current state of keyboard input.
///
/// The game only cares about held movement keys, so there is no per-frame
/// just-pressed bookkeeping: events flip keys in and out of a set and the
/// fixed-tick update samples it.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a key press event.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        self.pressed_keys.insert(key);
    }

    /// Handle a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Check if a key is currently pressed.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Horizontal movement axis from WASD/arrow keys: -1, 0 or 1.
    pub fn movement_x(&self) -> i32 {
        let left = self.is_key_pressed(KeyCode::KeyA) || self.is_key_pressed(KeyCode::ArrowLeft);
        let right = self.is_key_pressed(KeyCode::KeyD) || self.is_key_pressed(KeyCode::ArrowRight);
        i32::from(right) - i32::from(left)
    }

    /// Vertical movement axis from WASD/arrow keys: -1, 0 or 1.
    ///
    /// Positive is down, matching the quad coordinate system.
    pub fn movement_y(&self) -> i32 {
        let up = self.is_key_pressed(KeyCode::KeyW) || self.is_key_pressed(KeyCode::ArrowUp);
        let down = self.is_key_pressed(KeyCode::KeyS) || self.is_key_pressed(KeyCode::ArrowDown);
        i32::from(down) - i32::from(up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_axes_combine_opposing_keys() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyA);
        assert_eq!(input.movement_x(), -1);

        input.on_key_pressed(KeyCode::KeyD);
        assert_eq!(input.movement_x(), 0);

        input.on_key_released(KeyCode::KeyA);
        assert_eq!(input.movement_x(), 1);
    }

    #[test]
    fn release_clears_pressed_state() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert_eq!(input.movement_y(), 0);
    }
}
