//! Headless window and render sink
//!
//! `HeadlessWindow` replays a script of input events keyed by frame number
//! and requests close after a frame limit. Each instance owns its key sets.
//! `StatsSink` "renders" by summarizing the render buffer.

use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::{Key, KeySet, MouseButton, MouseButtons, RenderFrame, RenderSink, WindowPort};

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Press(Key),
    Release(Key),
    Repeat(Key),
    CursorMoved { x: f64, y: f64 },
    Button { button: MouseButton, down: bool },
    Resize { width: u32, height: u32 },
    Close,
}

#[derive(Debug, Clone)]
pub struct HeadlessWindow {
    width: u32,
    height: u32,
    cursor: DVec2,
    buttons: MouseButtons,
    pressed: KeySet,
    released: KeySet,
    repeated: KeySet,
    script: BTreeMap<u64, Vec<InputEvent>>,
    frame: u64,
    frame_limit: Option<u64>,
    close_requested: bool,
}

impl Default for HeadlessWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cursor: DVec2::new(width as f64 * 0.5, height as f64 * 0.5),
            buttons: MouseButtons::default(),
            pressed: KeySet::new(),
            released: KeySet::new(),
            repeated: KeySet::new(),
            script: BTreeMap::new(),
            frame: 0,
            frame_limit: None,
            close_requested: false,
        }
    }

    /// Request close once `frames` updates have happened
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Queue `event` for the update of frame `frame` (0-based)
    pub fn schedule(&mut self, frame: u64, event: InputEvent) {
        self.script.entry(frame).or_default().push(event);
    }

    pub fn with_event(mut self, frame: u64, event: InputEvent) -> Self {
        self.schedule(frame, event);
        self
    }

    /// Updates performed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn apply(&mut self, event: InputEvent) {
        match event {
            InputEvent::Press(key) => {
                self.pressed.insert(key);
            }
            InputEvent::Release(key) => {
                self.released.insert(key);
            }
            InputEvent::Repeat(key) => {
                self.repeated.insert(key);
            }
            InputEvent::CursorMoved { x, y } => self.cursor = DVec2::new(x, y),
            InputEvent::Button { button, down } => self.buttons.set(button, down),
            InputEvent::Resize { width, height } => {
                self.width = width;
                self.height = height;
            }
            InputEvent::Close => self.close_requested = true,
        }
    }
}

impl WindowPort for HeadlessWindow {
    fn update(&mut self) {
        self.pressed.clear();
        self.released.clear();
        self.repeated.clear();
        if let Some(events) = self.script.remove(&self.frame) {
            for event in events {
                self.apply(event);
            }
        }
        self.frame += 1;
        if self.frame_limit.is_some_and(|limit| self.frame >= limit) {
            self.close_requested = true;
        }
    }

    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn pressed_keys(&self) -> &KeySet {
        &self.pressed
    }

    fn released_keys(&self) -> &KeySet {
        &self.released
    }

    fn repeated_keys(&self) -> &KeySet {
        &self.repeated
    }

    fn cursor_position(&self) -> DVec2 {
        self.cursor
    }

    fn mouse_buttons(&self) -> MouseButtons {
        self.buttons
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Summary of the last rendered frame
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSink {
    pub frames: u64,
    pub last_frame: u64,
    pub population: usize,
    pub kinetic_energy: f64,
    /// Mean drawn position (interpolated halfway when motion blur is on)
    pub centroid: DVec2,
    pub uploaded_bytes: usize,
}

impl RenderSink for StatsSink {
    fn render(&mut self, frame: &RenderFrame<'_>) {
        let t = if frame.params.motion_blur { 0.5 } else { 1.0 };
        let sum: DVec2 = (0..frame.population())
            .filter_map(|i| frame.interpolated(i, t))
            .sum();

        self.frames += 1;
        self.last_frame = frame.frame;
        self.population = frame.population();
        self.kinetic_energy = frame.kinetic_energy();
        self.centroid = if self.population > 0 {
            sum / self.population as f64
        } else {
            DVec2::ZERO
        };
        self.uploaded_bytes = frame.as_bytes().len();
        log::trace!(
            "rendered frame {} ({} bodies, energy {:.6})",
            frame.frame,
            self.population,
            self.kinetic_energy
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Body, SimulationParameters};

    #[test]
    fn test_script_replays_per_frame() {
        let mut window = HeadlessWindow::new(800, 600)
            .with_event(0, InputEvent::Press(Key::G))
            .with_event(1, InputEvent::Repeat(Key::Up))
            .with_event(1, InputEvent::Button { button: MouseButton::Left, down: true })
            .with_event(2, InputEvent::Resize { width: 400, height: 400 });

        window.update();
        assert!(window.pressed_keys().contains(&Key::G));
        assert!(!window.pressed_or_repeated(Key::Up));

        window.update();
        assert!(window.pressed_keys().is_empty());
        assert!(window.pressed_or_repeated(Key::Up));
        assert!(window.mouse_buttons().left);

        window.update();
        assert!(window.repeated_keys().is_empty());
        assert_eq!(window.framebuffer_size(), (400, 400));
        // Button state persists until released
        assert!(window.mouse_buttons().left);
    }

    #[test]
    fn test_frame_limit_requests_close() {
        let mut window = HeadlessWindow::default().with_frame_limit(2);
        window.update();
        assert!(!window.should_close());
        window.update();
        assert!(window.should_close());
    }

    #[test]
    fn test_stats_sink_summarizes_frame() {
        let bodies = [
            Body::new(1.0, DVec2::new(1.0, 0.0)),
            Body::new(1.0, DVec2::new(-1.0, 0.5)).with_velocity(DVec2::new(0.0, 2.0)),
        ];
        let params = SimulationParameters::default();
        let mut sink = StatsSink::default();
        sink.render(&RenderFrame {
            frame: 7,
            bodies: &bodies,
            previous: &bodies,
            params: &params,
        });
        assert_eq!(sink.frames, 1);
        assert_eq!(sink.last_frame, 7);
        assert_eq!(sink.population, 2);
        assert_eq!(sink.centroid, DVec2::new(0.0, 0.25));
        assert!((sink.kinetic_energy - 2.0).abs() < 1e-12);
    }
}
