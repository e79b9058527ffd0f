//=========================================================================
// Actions, Bindings & Phases
//=========================================================================
//
// Named logical actions resolved through one or more physical bindings.
//
// Actions: string identifiers defined by scripts, interpreted by scripts.
// Bindings: (source, code) pairs, OR-combined when an action is resolved.
// Phases: the transition of interest (pressed, released, held).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

//=== Internal Dependencies ===============================================

use super::event::{KeyCode, MouseButton, UnknownDeviceCode};
use super::state_tracker::StateTracker;

//=== Phase ===============================================================

/// Input-state transition an action query or callback is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Transitioned up → down this frame.
    Pressed,

    /// Transitioned down → up this frame.
    Released,

    /// Down this frame (continuous).
    Held,
}

impl Phase {
    /// All phases in dispatch order.
    pub const ALL: [Phase; 3] = [Phase::Pressed, Phase::Held, Phase::Released];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pressed => "pressed",
            Self::Released => "released",
            Self::Held => "held",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Phase {
    type Err = BindingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pressed" | "press" => Ok(Self::Pressed),
            "released" | "release" => Ok(Self::Released),
            "held" | "down" => Ok(Self::Held),
            other => Err(BindingParseError::UnknownPhase(other.to_string())),
        }
    }
}

//=== BindingParseError ===================================================

/// Malformed binding or phase descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingParseError {
    #[error("empty binding descriptor")]
    Empty,

    #[error("unknown input source '{0}' (expected key, mouse or gamepad)")]
    UnknownSource(String),

    #[error("invalid {source_name} code: {code}")]
    UnknownCode {
        source_name: &'static str,
        code: UnknownDeviceCode,
    },

    #[error("invalid gamepad button index '{0}'")]
    InvalidGamepadIndex(String),

    #[error("unknown phase '{0}' (expected pressed, released or held)")]
    UnknownPhase(String),
}

//=== Binding =============================================================

/// One physical input contributing to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Key(KeyCode),
    Mouse(MouseButton),

    /// Reserved for gamepad support. Parsed and stored, never active.
    Gamepad(u32),
}

impl Binding {
    /// Whether this binding's physical input matches `phase` this frame.
    pub fn is_in_phase(&self, tracker: &StateTracker, phase: Phase) -> bool {
        match (*self, phase) {
            (Self::Key(key), Phase::Pressed) => tracker.is_key_pressed(key),
            (Self::Key(key), Phase::Released) => tracker.is_key_released(key),
            (Self::Key(key), Phase::Held) => tracker.is_key_down(key),
            (Self::Mouse(btn), Phase::Pressed) => tracker.is_button_pressed(btn),
            (Self::Mouse(btn), Phase::Released) => tracker.is_button_released(btn),
            (Self::Mouse(btn), Phase::Held) => tracker.is_button_down(btn),
            (Self::Gamepad(_), _) => false,
        }
    }
}

impl FromStr for Binding {
    type Err = BindingParseError;

    /// Parses `"space"`, `"key:a"`, `"mouse:left"` or `"gamepad:0"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BindingParseError::Empty);
        }

        let (source, code) = match s.split_once(':') {
            Some((source, code)) => (source, code),
            None => ("key", s),
        };

        match source.to_ascii_lowercase().as_str() {
            "key" | "keyboard" => code
                .parse()
                .map(Self::Key)
                .map_err(|code| BindingParseError::UnknownCode { source_name: "key", code }),
            "mouse" => code
                .parse()
                .map(Self::Mouse)
                .map_err(|code| BindingParseError::UnknownCode { source_name: "mouse", code }),
            "gamepad" | "pad" => code
                .parse()
                .map(Self::Gamepad)
                .map_err(|_| BindingParseError::InvalidGamepadIndex(code.to_string())),
            other => Err(BindingParseError::UnknownSource(other.to_string())),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "key:{}", key.name()),
            Self::Mouse(btn) => write!(f, "mouse:{}", btn.name()),
            Self::Gamepad(index) => write!(f, "gamepad:{index}"),
        }
    }
}

//=== ActionDefinition ====================================================

/// A named action and the ordered list of bindings that drive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDefinition {
    pub name: String,
    pub bindings: Vec<Binding>,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self { name: name.into(), bindings }
    }

    /// Logical OR across bindings.
    pub fn is_in_phase(&self, tracker: &StateTracker, phase: Phase) -> bool {
        self.bindings.iter().any(|b| b.is_in_phase(tracker, phase))
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
