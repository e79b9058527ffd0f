//=========================================================================
// Runtime Events
//=========================================================================
//
// Closed set of events carried by the event queue.
//
//   InputAction   an action fired in a phase this frame
//   StateChanged  a state machine moved between states
//   Custom        named, script-emitted
//
// `EventPayload` lets native code subscribe to one variant with a typed
// closure; matching is an exhaustive `match`, never a runtime type check.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::str::FromStr;

use mlua::{Lua, Table};

//=== Internal Dependencies ===============================================

use crate::core::input::Phase;
use crate::core::state_machine::MachineHandle;

//=== Payloads ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputActionEvent {
    pub action: String,
    pub phase: Phase,
}

impl InputActionEvent {
    pub fn new(action: impl Into<String>, phase: Phase) -> Self {
        Self { action: action.into(), phase }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangedEvent {
    pub machine: MachineHandle,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomEvent {
    pub name: String,
}

//=== Event ===============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    InputAction(InputActionEvent),
    StateChanged(StateChangedEvent),
    Custom(CustomEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::InputAction(_) => EventKind::InputAction,
            Self::StateChanged(_) => EventKind::StateChanged,
            Self::Custom(_) => EventKind::Custom,
        }
    }

    /// Table handed to script subscribers.
    pub fn to_lua<'lua>(&self, lua: &'lua Lua) -> mlua::Result<Table<'lua>> {
        let table = lua.create_table()?;
        table.set("kind", self.kind().name())?;
        match self {
            Self::InputAction(e) => {
                table.set("action", e.action.as_str())?;
                table.set("phase", e.phase.name())?;
            }
            Self::StateChanged(e) => {
                table.set("machine", e.machine.0)?;
                table.set("from", e.from.as_str())?;
                table.set("to", e.to.as_str())?;
            }
            Self::Custom(e) => {
                table.set("name", e.name.as_str())?;
            }
        }
        Ok(table)
    }
}

impl From<InputActionEvent> for Event {
    fn from(e: InputActionEvent) -> Self {
        Self::InputAction(e)
    }
}

impl From<StateChangedEvent> for Event {
    fn from(e: StateChangedEvent) -> Self {
        Self::StateChanged(e)
    }
}

impl From<CustomEvent> for Event {
    fn from(e: CustomEvent) -> Self {
        Self::Custom(e)
    }
}

//=== EventKind ===========================================================

/// Discriminant used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    InputAction,
    StateChanged,
    Custom,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::InputAction => "input_action",
            Self::StateChanged => "state_changed",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input_action" => Ok(Self::InputAction),
            "state_changed" => Ok(Self::StateChanged),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "unknown event kind '{other}' (expected input_action, state_changed or custom)"
            )),
        }
    }
}

//=== EventPayload ========================================================

/// A payload type that can be pulled out of an `Event`.
pub trait EventPayload: 'static {
    const KIND: EventKind;

    fn from_event(event: &Event) -> Option<&Self>;
}

impl EventPayload for InputActionEvent {
    const KIND: EventKind = EventKind::InputAction;

    fn from_event(event: &Event) -> Option<&Self> {
        match event {
            Event::InputAction(e) => Some(e),
            _ => None,
        }
    }
}

impl EventPayload for StateChangedEvent {
    const KIND: EventKind = EventKind::StateChanged;

    fn from_event(event: &Event) -> Option<&Self> {
        match event {
            Event::StateChanged(e) => Some(e),
            _ => None,
        }
    }
}

impl EventPayload for CustomEvent {
    const KIND: EventKind = EventKind::Custom;

    fn from_event(event: &Event) -> Option<&Self> {
        match event {
            Event::Custom(e) => Some(e),
            _ => None,
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
