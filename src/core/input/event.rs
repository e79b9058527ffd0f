//=========================================================================
// Device Event Types
//
// Normalized keyboard/mouse events handed over by the platform layer at
// every frame boundary.
//
// Responsibilities:
// - Represent physical keys and mouse buttons independent of winit
// - Carry modifier state with discrete events
// - Give every device code a stable, script-facing name ("space",
//   "left", ...) so bindings can be declared from scripts
//
// Event Flow:
// ```text
// Platform Layer (winit)
//         ↓
//    InputEvent (this module)
//         ↓
//    StateTracker (pressed / released / held)
//         ↓
//    InputManager (actions, contexts, callbacks)
// ```
//
//=========================================================================

//=== Standard Library Imports ============================================

use std::fmt;
use std::str::FromStr;

//=== MouseButton =========================================================

/// Physical mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MouseButton {
    /// Primary button (typically left).
    Left,

    /// Secondary button (typically right).
    Right,

    /// Middle button (wheel click).
    Middle,

    /// Any other button (side buttons, thumb buttons, macro keys).
    Other,
}

impl MouseButton {
    /// Script-facing name of the button.
    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
            Self::Other => "other",
        }
    }
}

impl FromStr for MouseButton {
    type Err = UnknownDeviceCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "middle" => Ok(Self::Middle),
            "other" => Ok(Self::Other),
            _ => Err(UnknownDeviceCode(s.to_string())),
        }
    }
}

//=== KeyCode =============================================================

/// Physical keyboard key identifier.
///
/// Represents the physical key location, not the character produced.
/// `KeyA` is the same physical key on QWERTY and AZERTY layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyCode {
    //--- Numeric Keys -----------------------------------------------------
    Digit0, Digit1, Digit2, Digit3, Digit4,
    Digit5, Digit6, Digit7, Digit8, Digit9,

    //--- Alphabetic Keys --------------------------------------------------
    KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI,
    KeyJ, KeyK, KeyL, KeyM, KeyN, KeyO, KeyP, KeyQ, KeyR,
    KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,

    //--- Arrow Keys -------------------------------------------------------
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    ArrowUp,

    //--- Special Keys -----------------------------------------------------
    Space,
    Enter,
    Escape,
    Tab,
    Backspace,
    Delete,
    Backquote,
    ShiftLeft,
    ShiftRight,
    ControlLeft,
    ControlRight,

    //--- Function Keys ----------------------------------------------------
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,

    /// Fallback for keys not explicitly mapped by the platform layer.
    Unidentified,
}

//--- Name Table ----------------------------------------------------------
//
// Single source of truth for script-facing key names. Lookup is linear,
// which is fine: names are only parsed when actions are defined.
//
const KEY_NAMES: &[(KeyCode, &str)] = &[
    (KeyCode::Digit0, "0"), (KeyCode::Digit1, "1"), (KeyCode::Digit2, "2"),
    (KeyCode::Digit3, "3"), (KeyCode::Digit4, "4"), (KeyCode::Digit5, "5"),
    (KeyCode::Digit6, "6"), (KeyCode::Digit7, "7"), (KeyCode::Digit8, "8"),
    (KeyCode::Digit9, "9"),
    (KeyCode::KeyA, "a"), (KeyCode::KeyB, "b"), (KeyCode::KeyC, "c"),
    (KeyCode::KeyD, "d"), (KeyCode::KeyE, "e"), (KeyCode::KeyF, "f"),
    (KeyCode::KeyG, "g"), (KeyCode::KeyH, "h"), (KeyCode::KeyI, "i"),
    (KeyCode::KeyJ, "j"), (KeyCode::KeyK, "k"), (KeyCode::KeyL, "l"),
    (KeyCode::KeyM, "m"), (KeyCode::KeyN, "n"), (KeyCode::KeyO, "o"),
    (KeyCode::KeyP, "p"), (KeyCode::KeyQ, "q"), (KeyCode::KeyR, "r"),
    (KeyCode::KeyS, "s"), (KeyCode::KeyT, "t"), (KeyCode::KeyU, "u"),
    (KeyCode::KeyV, "v"), (KeyCode::KeyW, "w"), (KeyCode::KeyX, "x"),
    (KeyCode::KeyY, "y"), (KeyCode::KeyZ, "z"),
    (KeyCode::ArrowDown, "down"), (KeyCode::ArrowLeft, "left"),
    (KeyCode::ArrowRight, "right"), (KeyCode::ArrowUp, "up"),
    (KeyCode::Space, "space"), (KeyCode::Enter, "enter"),
    (KeyCode::Escape, "escape"), (KeyCode::Tab, "tab"),
    (KeyCode::Backspace, "backspace"), (KeyCode::Delete, "delete"),
    (KeyCode::Backquote, "backquote"),
    (KeyCode::ShiftLeft, "left_shift"), (KeyCode::ShiftRight, "right_shift"),
    (KeyCode::ControlLeft, "left_ctrl"), (KeyCode::ControlRight, "right_ctrl"),
    (KeyCode::F1, "f1"), (KeyCode::F2, "f2"), (KeyCode::F3, "f3"),
    (KeyCode::F4, "f4"), (KeyCode::F5, "f5"), (KeyCode::F6, "f6"),
    (KeyCode::F7, "f7"), (KeyCode::F8, "f8"), (KeyCode::F9, "f9"),
    (KeyCode::F10, "f10"), (KeyCode::F11, "f11"), (KeyCode::F12, "f12"),
];

impl KeyCode {
    /// Script-facing name of the key (`"unidentified"` for the fallback).
    pub fn name(self) -> &'static str {
        KEY_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
            .unwrap_or("unidentified")
    }
}

impl FromStr for KeyCode {
    type Err = UnknownDeviceCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        let aliased = match lowered.as_str() {
            "return" => "enter",
            "esc" => "escape",
            "grave" | "`" => "backquote",
            other => other,
        };

        KEY_NAMES
            .iter()
            .find(|(_, name)| *name == aliased)
            .map(|(code, _)| *code)
            .ok_or_else(|| UnknownDeviceCode(s.to_string()))
    }
}

//=== UnknownDeviceCode ===================================================

/// A key or button name that does not map to any known device code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDeviceCode(pub String);

impl fmt::Display for UnknownDeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device code '{}'", self.0)
    }
}

impl std::error::Error for UnknownDeviceCode {}

//=== InputEvent ==========================================================

/// Low-level input event from the platform layer.
///
/// - **KeyDown/KeyUp**: Discrete keyboard events with modifier state
/// - **MouseButtonDown/MouseButtonUp**: Discrete mouse button events
/// - **MouseMoved**: Continuous cursor position updates
/// - **Unidentified**: Unknown/unsupported events (ignored by tracker)
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown { key: KeyCode, modifiers: Modifiers },
    KeyUp { key: KeyCode, modifiers: Modifiers },
    MouseButtonDown { button: MouseButton, modifiers: Modifiers },
    MouseButtonUp { button: MouseButton, modifiers: Modifiers },

    /// Coordinates are in window space (pixels, top-left origin).
    MouseMoved { x: f32, y: f32 },

    Unidentified,
}

impl InputEvent {
    /// Shorthand for an unmodified key press.
    pub fn key_down(key: KeyCode) -> Self {
        Self::KeyDown { key, modifiers: Modifiers::NONE }
    }

    /// Shorthand for an unmodified key release.
    pub fn key_up(key: KeyCode) -> Self {
        Self::KeyUp { key, modifiers: Modifiers::NONE }
    }

    /// Shorthand for an unmodified button press.
    pub fn button_down(button: MouseButton) -> Self {
        Self::MouseButtonDown { button, modifiers: Modifiers::NONE }
    }

    /// Shorthand for an unmodified button release.
    pub fn button_up(button: MouseButton) -> Self {
        Self::MouseButtonUp { button, modifiers: Modifiers::NONE }
    }

    /// `true` for key/button events, whose order within a frame matters.
    pub fn is_discrete(&self) -> bool {
        !matches!(self, Self::MouseMoved { .. } | Self::Unidentified)
    }
}

//=== Modifiers ===========================================================

/// Modifier key state (Shift, Ctrl, Alt).
///
/// Left/right variants are not distinguished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    /// No modifiers held.
    pub const NONE: Self = Self { shift: false, ctrl: false, alt: false };

    /// Shift only.
    pub const SHIFT: Self = Self { shift: true, ctrl: false, alt: false };

    /// Ctrl only.
    pub const CTRL: Self = Self { shift: false, ctrl: true, alt: false };

    /// Alt only.
    pub const ALT: Self = Self { shift: false, ctrl: false, alt: true };
}

//=========================================================================
// Unit Tests
//=========================================================================
