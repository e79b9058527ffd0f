//=========================================================================
// Debug Console
//=========================================================================
//
// Frame step 7: the console sees resolved device state before the
// script's `update`. A frame it consumes skips `update(dt)` entirely.
//
//=========================================================================

use log::info;

use super::input::{KeyCode, StateTracker};

//=== DebugConsole ========================================================

pub trait DebugConsole {
    /// Returns `true` if this frame's input belongs to the console.
    fn consume_frame(&mut self, input: &StateTracker) -> bool;

    fn is_open(&self) -> bool;
}

//=== KeyToggleConsole ====================================================

/// Opens and closes on one key and consumes every frame while open,
/// including the frames the toggle key itself is pressed on.
#[derive(Debug, Clone)]
pub struct KeyToggleConsole {
    toggle: KeyCode,
    open: bool,
}

impl KeyToggleConsole {
    pub fn new(toggle: KeyCode) -> Self {
        Self { toggle, open: false }
    }

    pub fn toggle_key(&self) -> KeyCode {
        self.toggle
    }
}

impl Default for KeyToggleConsole {
    fn default() -> Self {
        Self::new(KeyCode::Backquote)
    }
}

impl DebugConsole for KeyToggleConsole {
    fn consume_frame(&mut self, input: &StateTracker) -> bool {
        if input.is_key_pressed(self.toggle) {
            self.open = !self.open;
            info!(target: "frame", "Debug console {}", if self.open { "opened" } else { "closed" });
            return true;
        }
        self.open
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::InputEvent;

    #[test]
    fn toggle_key_opens_and_closes() {
        let mut tracker = StateTracker::new();
        let mut console = KeyToggleConsole::default();

        tracker.advance_frame(&[]);
        assert!(!console.consume_frame(&tracker));

        tracker.advance_frame(&[InputEvent::key_down(KeyCode::Backquote)]);
        assert!(console.consume_frame(&tracker));
        assert!(console.is_open());

        tracker.advance_frame(&[InputEvent::key_up(KeyCode::Backquote)]);
        assert!(console.consume_frame(&tracker), "open console keeps consuming");

        tracker.advance_frame(&[InputEvent::key_down(KeyCode::Backquote)]);
        assert!(console.consume_frame(&tracker), "closing press is consumed too");
        assert!(!console.is_open());

        tracker.advance_frame(&[InputEvent::key_up(KeyCode::Backquote)]);
        assert!(!console.consume_frame(&tracker));
    }
}
