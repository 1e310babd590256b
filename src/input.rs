//! Input edge state
//!
//! The core never polls devices. A host pushes discrete edge events in
//! whatever order it received them, and behaviors read the resulting state
//! during the frame: held buttons, just-pressed/just-released edges,
//! pointer position and delta, scroll delta. The scheduler clears the
//! per-frame edges at the end of every pass.
//!
//! Button identity is an opaque code; mapping device specifics to codes is
//! the host's business.

use glam::Vec2;
use std::collections::HashSet;

/// Opaque button code assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Button(pub u32);

/// A discrete input edge pushed by the host.
#[derive(Debug, Clone, Copy)]
pub enum InputEvent {
    /// A button went down.
    Pressed(Button),
    /// A button went up.
    Released(Button),
    /// The pointer moved to an absolute position.
    PointerMoved(Vec2),
    /// Scroll wheel movement.
    Scrolled(Vec2),
}

/// Input state manager.
#[derive(Debug, Default)]
pub struct Input {
    /// Currently held buttons.
    held: HashSet<Button>,
    /// Buttons that went down since the last pass.
    just_pressed: HashSet<Button>,
    /// Buttons that went up since the last pass.
    just_released: HashSet<Button>,
    /// Current pointer position.
    pointer_position: Vec2,
    /// Pointer movement since the last pass.
    pointer_delta: Vec2,
    /// Scroll movement since the last pass.
    scroll_delta: Vec2,
}

impl Input {
    /// Create an empty input state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one host event into the state.
    pub(crate) fn process(&mut self, event: InputEvent) {
        match event {
            InputEvent::Pressed(button) => {
                if self.held.insert(button) {
                    self.just_pressed.insert(button);
                }
            }
            InputEvent::Released(button) => {
                self.held.remove(&button);
                self.just_released.insert(button);
            }
            InputEvent::PointerMoved(position) => {
                self.pointer_delta += position - self.pointer_position;
                self.pointer_position = position;
            }
            InputEvent::Scrolled(delta) => {
                self.scroll_delta += delta;
            }
        }
    }

    /// Clear per-frame edges. Called by the scheduler at the end of each
    /// pass.
    pub(crate) fn end_frame(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
        self.pointer_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    /// Whether a button is currently held.
    #[must_use]
    pub fn is_held(&self, button: Button) -> bool {
        self.held.contains(&button)
    }

    /// Whether a button went down since the last pass.
    #[must_use]
    pub fn just_pressed(&self, button: Button) -> bool {
        self.just_pressed.contains(&button)
    }

    /// Whether a button went up since the last pass.
    #[must_use]
    pub fn just_released(&self, button: Button) -> bool {
        self.just_released.contains(&button)
    }

    /// Current pointer position.
    #[must_use]
    pub fn pointer_position(&self) -> Vec2 {
        self.pointer_position
    }

    /// Pointer movement since the last pass.
    #[must_use]
    pub fn pointer_delta(&self) -> Vec2 {
        self.pointer_delta
    }

    /// Scroll movement since the last pass.
    #[must_use]
    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}
