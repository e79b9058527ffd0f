//=========================================================================
// Input Processor
//=========================================================================
//
// Converts winit window events into runtime `InputEvent`s.
//
// Architecture:
//   winit WindowEvent → InputProcessor → InputEvent → InputBuffer
//
// Modifier state is cached from `ModifiersChanged` and stamped onto every
// later key/button event. Keys with no runtime code are dropped. Key
// repeat is dropped too: a held key is already "down" for the tracker.
//
//=========================================================================

//=== External Dependencies ===============================================

use winit::{
    event::{ElementState, KeyEvent, MouseButton as WinitMouseButton},
    keyboard::{KeyCode as WinitKeyCode, ModifiersState, PhysicalKey},
};

//=== Internal Dependencies ===============================================

use crate::core::input::{InputEvent, KeyCode, Modifiers, MouseButton};

//=== InputProcessor ======================================================

#[derive(Debug, Default)]
pub(crate) struct InputProcessor {
    modifiers: Modifiers,
}

impl InputProcessor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    //--- Modifier State ---------------------------------------------------

    pub(crate) fn update_modifiers(&mut self, state: ModifiersState) {
        self.modifiers = Modifiers::from(state);
    }

    pub(crate) fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    //--- Conversion -------------------------------------------------------

    pub(crate) fn key_event(&self, event: &KeyEvent) -> Option<InputEvent> {
        if event.repeat {
            return None;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return None;
        };
        match KeyCode::from(code) {
            KeyCode::Unidentified => None,
            key => Some(self.key(key, event.state)),
        }
    }

    pub(crate) fn mouse_button(&self, button: WinitMouseButton, state: ElementState) -> InputEvent {
        let button = MouseButton::from(button);
        let modifiers = self.modifiers;
        match state {
            ElementState::Pressed => InputEvent::MouseButtonDown { button, modifiers },
            ElementState::Released => InputEvent::MouseButtonUp { button, modifiers },
        }
    }

    pub(crate) fn cursor_moved(&self, x: f64, y: f64) -> InputEvent {
        InputEvent::MouseMoved { x: x as f32, y: y as f32 }
    }

    fn key(&self, key: KeyCode, state: ElementState) -> InputEvent {
        let modifiers = self.modifiers;
        match state {
            ElementState::Pressed => InputEvent::KeyDown { key, modifiers },
            ElementState::Released => InputEvent::KeyUp { key, modifiers },
        }
    }
}

//=========================================================================
// winit Conversions
//=========================================================================

impl From<ModifiersState> for Modifiers {
    fn from(state: ModifiersState) -> Self {
        Self {
            shift: state.shift_key(),
            ctrl: state.control_key(),
            alt: state.alt_key(),
        }
    }
}

impl From<WinitKeyCode> for KeyCode {
    fn from(code: WinitKeyCode) -> Self {
        use WinitKeyCode as W;
        match code {
            W::Digit0 => Self::Digit0,
            W::Digit1 => Self::Digit1,
            W::Digit2 => Self::Digit2,
            W::Digit3 => Self::Digit3,
            W::Digit4 => Self::Digit4,
            W::Digit5 => Self::Digit5,
            W::Digit6 => Self::Digit6,
            W::Digit7 => Self::Digit7,
            W::Digit8 => Self::Digit8,
            W::Digit9 => Self::Digit9,

            W::KeyA => Self::KeyA,
            W::KeyB => Self::KeyB,
            W::KeyC => Self::KeyC,
            W::KeyD => Self::KeyD,
            W::KeyE => Self::KeyE,
            W::KeyF => Self::KeyF,
            W::KeyG => Self::KeyG,
            W::KeyH => Self::KeyH,
            W::KeyI => Self::KeyI,
            W::KeyJ => Self::KeyJ,
            W::KeyK => Self::KeyK,
            W::KeyL => Self::KeyL,
            W::KeyM => Self::KeyM,
            W::KeyN => Self::KeyN,
            W::KeyO => Self::KeyO,
            W::KeyP => Self::KeyP,
            W::KeyQ => Self::KeyQ,
            W::KeyR => Self::KeyR,
            W::KeyS => Self::KeyS,
            W::KeyT => Self::KeyT,
            W::KeyU => Self::KeyU,
            W::KeyV => Self::KeyV,
            W::KeyW => Self::KeyW,
            W::KeyX => Self::KeyX,
            W::KeyY => Self::KeyY,
            W::KeyZ => Self::KeyZ,

            W::ArrowUp => Self::ArrowUp,
            W::ArrowDown => Self::ArrowDown,
            W::ArrowLeft => Self::ArrowLeft,
            W::ArrowRight => Self::ArrowRight,

            W::Space => Self::Space,
            W::Enter => Self::Enter,
            W::Escape => Self::Escape,
            W::Tab => Self::Tab,
            W::Backspace => Self::Backspace,
            W::Delete => Self::Delete,
            W::Backquote => Self::Backquote,
            W::ShiftLeft => Self::ShiftLeft,
            W::ShiftRight => Self::ShiftRight,
            W::ControlLeft => Self::ControlLeft,
            W::ControlRight => Self::ControlRight,

            W::F1 => Self::F1,
            W::F2 => Self::F2,
            W::F3 => Self::F3,
            W::F4 => Self::F4,
            W::F5 => Self::F5,
            W::F6 => Self::F6,
            W::F7 => Self::F7,
            W::F8 => Self::F8,
            W::F9 => Self::F9,
            W::F10 => Self::F10,
            W::F11 => Self::F11,
            W::F12 => Self::F12,

            _ => Self::Unidentified,
        }
    }
}

impl From<WinitMouseButton> for MouseButton {
    fn from(button: WinitMouseButton) -> Self {
        match button {
            WinitMouseButton::Left => Self::Left,
            WinitMouseButton::Right => Self::Right,
            WinitMouseButton::Middle => Self::Middle,
            _ => Self::Other,
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
