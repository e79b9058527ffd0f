//=========================================================================
// State Tracker
//=========================================================================
//
// Device state with per-frame delta tracking. This is the "device
// polling" surface the action system resolves bindings against.
//
// Architecture:
//   InputEvent → process_events() → HashSet (keys/buttons held) → query
//
// Frame lifecycle: clear() → process_events() → finalize_frame() → query
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashSet;

//=== Internal Dependencies ===============================================

use super::event::{InputEvent, KeyCode, Modifiers, MouseButton};

//=== StateTracker ========================================================

/// Tracks persistent state (held) and per-frame deltas (pressed/released).
#[derive(Debug, Clone)]
pub struct StateTracker {
    //--- Persistent State (survives frame boundary) ----------------------
    keys_down: HashSet<KeyCode>,
    mouse_buttons_down: HashSet<MouseButton>,
    mouse_position: (f32, f32),
    modifiers: Modifiers,

    //--- Frame Deltas (reset each frame via clear()) --------------------
    keys_pressed_this_frame: HashSet<KeyCode>,
    keys_released_this_frame: HashSet<KeyCode>,
    mouse_buttons_pressed_this_frame: HashSet<MouseButton>,
    mouse_buttons_released_this_frame: HashSet<MouseButton>,

    //--- Forced releases, reported by the next frame --------------------
    keys_force_released: HashSet<KeyCode>,
    mouse_buttons_force_released: HashSet<MouseButton>,

    //--- Continuous Input ------------------------------------------------
    mouse_delta: (f32, f32),
    last_mouse_position: (f32, f32),
}

impl StateTracker {
    /// Creates a new state tracker with nothing held.
    pub fn new() -> Self {
        Self {
            keys_down: HashSet::new(),
            mouse_buttons_down: HashSet::new(),
            mouse_position: (0.0, 0.0),
            modifiers: Modifiers::NONE,
            keys_pressed_this_frame: HashSet::new(),
            keys_released_this_frame: HashSet::new(),
            mouse_buttons_pressed_this_frame: HashSet::new(),
            mouse_buttons_released_this_frame: HashSet::new(),
            keys_force_released: HashSet::new(),
            mouse_buttons_force_released: HashSet::new(),
            mouse_delta: (0.0, 0.0),
            last_mouse_position: (0.0, 0.0),
        }
    }

    //--- Frame Processing -------------------------------------------------

    /// Runs the whole frame lifecycle for one batch of device events.
    pub fn advance_frame(&mut self, events: &[InputEvent]) {
        self.clear();
        self.process_events(events);
        self.finalize_frame();
    }

    /// Clears frame-specific deltas (pressed/released flags).
    pub(crate) fn clear(&mut self) {
        self.keys_pressed_this_frame.clear();
        self.keys_released_this_frame.clear();
        self.mouse_buttons_pressed_this_frame.clear();
        self.mouse_buttons_released_this_frame.clear();
        self.keys_released_this_frame.extend(self.keys_force_released.drain());
        self.mouse_buttons_released_this_frame
            .extend(self.mouse_buttons_force_released.drain());
        self.last_mouse_position = self.mouse_position;
    }

    /// Processes input events, updating internal state.
    pub(crate) fn process_events(&mut self, events: &[InputEvent]) {
        for event in events {
            self.process_event(event);
        }
    }

    /// Finalizes frame calculations (mouse delta).
    pub(crate) fn finalize_frame(&mut self) {
        self.mouse_delta = (
            self.mouse_position.0 - self.last_mouse_position.0,
            self.mouse_position.1 - self.last_mouse_position.1,
        );
    }

    /// Forgets everything held. Used when the window loses focus.
    ///
    /// The releases show up as this-frame deltas of the next frame, so
    /// actions bound to them still fire their released phase.
    pub fn release_all(&mut self) {
        self.keys_force_released.extend(self.keys_down.drain());
        self.mouse_buttons_force_released
            .extend(self.mouse_buttons_down.drain());
        self.modifiers = Modifiers::NONE;
    }

    //--- Internal Helpers -------------------------------------------------

    fn process_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::KeyDown { key, modifiers } => {
                self.modifiers = *modifiers;
                // OS key repeat: a held key is not pressed again
                if self.keys_down.insert(*key) {
                    self.keys_pressed_this_frame.insert(*key);
                }
            }

            InputEvent::KeyUp { key, modifiers } => {
                self.modifiers = *modifiers;
                if self.keys_down.remove(key) {
                    self.keys_released_this_frame.insert(*key);
                }
            }

            InputEvent::MouseButtonDown { button, modifiers } => {
                self.modifiers = *modifiers;
                if self.mouse_buttons_down.insert(*button) {
                    self.mouse_buttons_pressed_this_frame.insert(*button);
                }
            }

            InputEvent::MouseButtonUp { button, modifiers } => {
                self.modifiers = *modifiers;
                if self.mouse_buttons_down.remove(button) {
                    self.mouse_buttons_released_this_frame.insert(*button);
                }
            }

            InputEvent::MouseMoved { x, y } => {
                self.mouse_position = (*x, *y);
            }

            InputEvent::Unidentified => {}
        }
    }

    //=====================================================================
    // Query API - Keyboard
    //=====================================================================

    /// Returns `true` if key transitioned UP → DOWN this frame.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed_this_frame.contains(&key)
    }

    /// Returns `true` while key is held.
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// Returns `true` if key transitioned DOWN → UP this frame.
    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released_this_frame.contains(&key)
    }

    //=====================================================================
    // Query API - Mouse
    //=====================================================================

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.mouse_buttons_pressed_this_frame.contains(&button)
    }

    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_down.contains(&button)
    }

    pub fn is_button_released(&self, button: MouseButton) -> bool {
        self.mouse_buttons_released_this_frame.contains(&button)
    }

    /// Mouse position in window coordinates (pixels, top-left origin).
    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }

    /// Mouse movement since the previous frame.
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    /// Modifier state reported with the most recent discrete event.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
