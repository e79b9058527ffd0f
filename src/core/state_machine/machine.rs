//=========================================================================
// State Machine Types
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

//=== Internal Dependencies ===============================================

use crate::core::input::Phase;
use crate::core::script::{ScriptRef, VmGeneration};

//=== MachineHandle =======================================================

/// Opaque handle for a state machine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineHandle(pub u32);

impl fmt::Display for MachineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "machine#{}", self.0)
    }
}

//=== StateDefinition =====================================================

/// Declared behavior of one state: named transitions and hooks.
#[derive(Debug, Clone, Default)]
pub struct StateDefinition {
    /// Event name → target state.
    pub transitions: HashMap<String, String>,
    pub on_enter: Option<Rc<ScriptRef>>,
    pub on_exit: Option<Rc<ScriptRef>>,
}

impl StateDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions.insert(event.into(), target.into());
        self
    }
}

//=== StateMachine ========================================================

/// One running instance.
#[derive(Debug)]
pub struct StateMachine {
    pub(crate) handle: MachineHandle,
    /// Receiver for conditions and hooks.
    pub(crate) owner: Option<Rc<ScriptRef>>,
    /// Generation that created the instance, `None` for native machines.
    pub(crate) origin: Option<VmGeneration>,
    pub(crate) state: String,
    pub(crate) active: bool,
    pub(crate) time_in_state: f32,
    pub(crate) states: HashMap<String, StateDefinition>,
}

impl StateMachine {
    pub fn handle(&self) -> MachineHandle {
        self.handle
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    /// Target of `event` from the current state, if declared.
    pub fn transition_for(&self, event: &str) -> Option<&str> {
        self.states
            .get(&self.state)
            .and_then(|def| def.transitions.get(event))
            .map(String::as_str)
    }

    pub(crate) fn hooks(&self, state: &str) -> (Option<Rc<ScriptRef>>, Option<Rc<ScriptRef>>) {
        self.states
            .get(state)
            .map(|def| (def.on_enter.clone(), def.on_exit.clone()))
            .unwrap_or_default()
    }
}

//=== InputBinding ========================================================

/// Input-driven transition registered for one declared state.
#[derive(Debug, Clone)]
pub struct InputBinding {
    pub machine: MachineHandle,
    pub action: String,
    pub phase: Phase,
    /// State the binding applies in. Checked against the live state.
    pub current_state: String,
    pub target: String,
    pub condition: Option<Rc<ScriptRef>>,
    /// Skip the condition entirely.
    pub forced: bool,
}

impl InputBinding {
    pub fn new(
        machine: MachineHandle,
        action: impl Into<String>,
        phase: Phase,
        current_state: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            machine,
            action: action.into(),
            phase,
            current_state: current_state.into(),
            target: target.into(),
            condition: None,
            forced: false,
        }
    }

    pub fn with_condition(mut self, condition: Rc<ScriptRef>) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }
}

//=== Transitions =========================================================

/// A transition requested while a condition was being evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredTransition {
    Trigger { machine: MachineHandle, event: String },
    SetState { machine: MachineHandle, state: String },
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(state: &str) -> StateMachine {
        StateMachine {
            handle: MachineHandle(1),
            owner: None,
            origin: None,
            state: state.into(),
            active: true,
            time_in_state: 0.0,
            states: HashMap::new(),
        }
    }

    #[test]
    fn transition_lookup_uses_current_state() {
        let mut m = machine("idle");
        m.states
            .insert("idle".into(), StateDefinition::new().on("jump", "airborne"));
        m.states
            .insert("airborne".into(), StateDefinition::new().on("land", "idle"));

        assert_eq!(m.transition_for("jump"), Some("airborne"));
        assert_eq!(m.transition_for("land"), None);

        m.state = "airborne".into();
        assert_eq!(m.transition_for("land"), Some("idle"));
    }

    #[test]
    fn undeclared_state_has_no_transitions_or_hooks() {
        let m = machine("anything");
        assert_eq!(m.transition_for("go"), None);
        let (enter, exit) = m.hooks("anything");
        assert!(enter.is_none() && exit.is_none());
    }

    #[test]
    fn binding_builder() {
        let b = InputBinding::new(MachineHandle(2), "jump", Phase::Pressed, "idle", "airborne")
            .forced();
        assert!(b.forced);
        assert!(b.condition.is_none());
        assert_eq!(b.current_state, "idle");
    }
}
