//! Platform abstraction layer
//!
//! Ports to the collaborators the simulation core does not own:
//! - Window/input: close flag, key edges, cursor, buttons, framebuffer size
//! - Rendering: receives the stable render buffer once per frame
//!
//! `headless` provides scriptable implementations of both.

pub mod headless;

use std::collections::HashSet;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::sim::{Body, SimulationParameters};

pub use headless::{HeadlessWindow, InputEvent, StatsSink};

/// Keys the simulation reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    G,
    R,
    N,
    M,
    B,
    C,
    V,
    Digit1,
    Digit2,
    Digit3,
    Digit4,
    Digit5,
    Digit6,
    Digit7,
    Up,
    Down,
    Left,
    Right,
    Minus,
    Equal,
    Escape,
}

pub type KeySet = HashSet<Key>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MouseButtons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
}

impl MouseButtons {
    pub fn set(&mut self, button: MouseButton, down: bool) {
        match button {
            MouseButton::Left => self.left = down,
            MouseButton::Right => self.right = down,
            MouseButton::Middle => self.middle = down,
        }
    }
}

/// Window and input collaborator; only touched from the main thread
pub trait WindowPort {
    /// Pull this frame's events; key sets from the previous frame are cleared
    fn update(&mut self);
    fn should_close(&self) -> bool;
    fn pressed_keys(&self) -> &KeySet;
    fn released_keys(&self) -> &KeySet;
    fn repeated_keys(&self) -> &KeySet;
    /// Pixels, origin top-left
    fn cursor_position(&self) -> DVec2;
    fn mouse_buttons(&self) -> MouseButtons;
    fn framebuffer_size(&self) -> (u32, u32);

    /// Pressed this frame, or held long enough to auto-repeat
    fn pressed_or_repeated(&self, key: Key) -> bool {
        self.pressed_keys().contains(&key) || self.repeated_keys().contains(&key)
    }
}

/// What the renderer sees for one frame
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub frame: u64,
    /// Stable render buffer
    pub bodies: &'a [Body],
    /// Render buffer of the previous frame
    pub previous: &'a [Body],
    pub params: &'a SimulationParameters,
}

impl<'a> RenderFrame<'a> {
    pub fn population(&self) -> usize {
        self.bodies.len()
    }

    pub fn border(&self) -> DVec2 {
        self.params.border
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.params.aspect_ratio
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies
            .iter()
            .map(|b| crate::kinetic_energy(b.mass, b.velocity))
            .sum()
    }

    /// Position of body `i` between the previous (`t = 0`) and current
    /// (`t = 1`) frame; bodies new this frame have no history
    pub fn interpolated(&self, i: usize, t: f64) -> Option<DVec2> {
        let current = self.bodies.get(i)?.position;
        Some(match self.previous.get(i) {
            Some(previous) => previous.position.lerp(current, t),
            None => current,
        })
    }

    /// Raw bytes of the render buffer, ready for upload
    pub fn as_bytes(&self) -> &'a [u8] {
        crate::sim::body::as_bytes(self.bodies)
    }
}

/// Render collaborator; runs on the main thread beside the physics chain
pub trait RenderSink {
    fn render(&mut self, frame: &RenderFrame<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolation_between_frames() {
        let previous = [Body::new(1.0, DVec2::new(0.0, 0.0))];
        let current = [
            Body::new(1.0, DVec2::new(1.0, -1.0)).with_velocity(DVec2::new(2.0, 0.0)),
            Body::new(1.0, DVec2::new(0.5, 0.5)),
        ];
        let params = SimulationParameters::default();
        let frame = RenderFrame {
            frame: 1,
            bodies: &current,
            previous: &previous,
            params: &params,
        };
        assert_eq!(frame.interpolated(0, 0.5), Some(DVec2::new(0.5, -0.5)));
        assert_eq!(frame.interpolated(1, 0.5), Some(DVec2::new(0.5, 0.5)));
        assert_eq!(frame.interpolated(2, 0.5), None);
        assert!((frame.kinetic_energy() - 2.0).abs() < 1e-12);
        assert_eq!(frame.as_bytes().len(), 2 * std::mem::size_of::<Body>());
    }

    #[test]
    fn test_mouse_buttons_set() {
        let mut buttons = MouseButtons::default();
        buttons.set(MouseButton::Middle, true);
        assert!(buttons.middle && !buttons.left && !buttons.right);
        buttons.set(MouseButton::Middle, false);
        assert_eq!(buttons, MouseButtons::default());
    }
}
