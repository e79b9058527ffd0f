//=========================================================================
// State Machine Manager
//=========================================================================
//
// Owns every state machine instance and every input-bound transition.
//
// Bindings are not purged when a machine changes state. Each one records
// the state it applies in, and dispatch compares that against the live
// state, so a stale binding simply does not match. They are purged only
// when their machine is destroyed or their generation is released.
//
// Script calls (conditions, enter/exit hooks) happen outside this type,
// in `state_machine::{set_state, apply_input_bindings}`, with no borrow
// of the manager held across the call.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::rc::Rc;

use log::{debug, trace};

//=== Internal Dependencies ===============================================

use super::machine::{
    DeferredTransition, InputBinding, MachineHandle, StateDefinition, StateMachine,
};
use crate::core::events::InputActionEvent;
use crate::core::script::{pinned_by, ScriptRef, VmGeneration};

//=== StateMachineManager =================================================

#[derive(Debug, Default)]
pub struct StateMachineManager {
    machines: BTreeMap<MachineHandle, StateMachine>,
    bindings: Vec<InputBinding>,
    next_handle: u32,
    evaluating_condition: bool,
    deferred: Vec<DeferredTransition>,
}

impl StateMachineManager {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Instances --------------------------------------------------------

    /// Creates a machine in `initial`. `origin` tags script-created machines.
    pub fn create(
        &mut self,
        owner: Option<Rc<ScriptRef>>,
        origin: Option<VmGeneration>,
        initial: &str,
    ) -> MachineHandle {
        self.next_handle += 1;
        let handle = MachineHandle(self.next_handle);
        self.machines.insert(
            handle,
            StateMachine {
                handle,
                owner,
                origin,
                state: initial.to_string(),
                active: true,
                time_in_state: 0.0,
                states: HashMap::new(),
            },
        );
        debug!(target: "state_machine", "Created {handle} in '{initial}'");
        handle
    }

    /// Destroys a machine and every binding registered for it.
    pub fn destroy(&mut self, handle: MachineHandle) -> bool {
        let existed = self.machines.remove(&handle).is_some();
        self.bindings.retain(|b| b.machine != handle);
        self.deferred.retain(|d| match d {
            DeferredTransition::Trigger { machine, .. }
            | DeferredTransition::SetState { machine, .. } => *machine != handle,
        });
        if existed {
            debug!(target: "state_machine", "Destroyed {handle}");
        }
        existed
    }

    /// Origin of a machine; `None` for unknown handles.
    pub fn origin(&self, handle: MachineHandle) -> Option<Option<VmGeneration>> {
        self.machines.get(&handle).map(|m| m.origin)
    }

    pub fn get(&self, handle: MachineHandle) -> Option<&StateMachine> {
        self.machines.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    //--- Definitions ------------------------------------------------------

    /// Declares (or redeclares) one state of a machine.
    pub fn define_state(
        &mut self,
        handle: MachineHandle,
        state: &str,
        definition: StateDefinition,
    ) -> bool {
        let Some(machine) = self.machines.get_mut(&handle) else {
            return false;
        };
        machine.states.insert(state.to_string(), definition);
        true
    }

    /// Registers an input-bound transition. Fails for unknown machines.
    pub fn bind_input(&mut self, binding: InputBinding) -> bool {
        if !self.machines.contains_key(&binding.machine) {
            return false;
        }
        trace!(
            target: "state_machine",
            "{}: {}/{} in '{}' -> '{}'",
            binding.machine, binding.action, binding.phase, binding.current_state, binding.target
        );
        self.bindings.push(binding);
        true
    }

    /// Drops bindings registered for `state` of a machine.
    pub fn purge_bindings(&mut self, handle: MachineHandle, state: &str) -> usize {
        let before = self.bindings.len();
        self.bindings
            .retain(|b| !(b.machine == handle && b.current_state == state));
        before - self.bindings.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    //--- State ------------------------------------------------------------

    pub fn current(&self, handle: MachineHandle) -> Option<&str> {
        self.machines.get(&handle).map(StateMachine::state)
    }

    pub fn time_in_state(&self, handle: MachineHandle) -> Option<f32> {
        self.machines.get(&handle).map(StateMachine::time_in_state)
    }

    pub fn set_active(&mut self, handle: MachineHandle, active: bool) -> bool {
        match self.machines.get_mut(&handle) {
            Some(machine) => {
                machine.active = active;
                true
            }
            None => false,
        }
    }

    /// Target of `event` from the machine's current state.
    pub fn lookup_transition(&self, handle: MachineHandle, event: &str) -> Option<String> {
        self.machines
            .get(&handle)
            .and_then(|m| m.transition_for(event))
            .map(str::to_string)
    }

    /// Moves the machine to `target` and resets its clock.
    ///
    /// Returns the previous state. Hooks are the caller's business.
    pub(crate) fn apply_state(&mut self, handle: MachineHandle, target: &str) -> Option<String> {
        let machine = self.machines.get_mut(&handle)?;
        let from = mem::replace(&mut machine.state, target.to_string());
        machine.time_in_state = 0.0;
        debug!(target: "state_machine", "{handle}: '{from}' -> '{target}'");
        Some(from)
    }

    /// Per-frame bookkeeping: accumulates time in state for active machines.
    pub fn update(&mut self, dt: f32) {
        for machine in self.machines.values_mut().filter(|m| m.active) {
            machine.time_in_state += dt;
        }
    }

    //--- Input Bindings ---------------------------------------------------

    /// Bindings matching `event` whose state equals the live state.
    ///
    /// First filter: action and phase. Second filter: the machine exists,
    /// is active and is currently in the binding's `current_state`.
    pub fn candidates(&self, event: &InputActionEvent) -> Vec<InputBinding> {
        self.bindings
            .iter()
            .filter(|b| b.action == event.action && b.phase == event.phase)
            .filter(|b| self.is_live(b))
            .cloned()
            .collect()
    }

    /// Whether the binding's machine is active and in its declared state.
    pub fn is_live(&self, binding: &InputBinding) -> bool {
        self.machines
            .get(&binding.machine)
            .is_some_and(|m| m.active && m.state == binding.current_state)
    }

    //--- Reentrancy -------------------------------------------------------

    pub fn is_evaluating_condition(&self) -> bool {
        self.evaluating_condition
    }

    pub(crate) fn set_evaluating_condition(&mut self, evaluating: bool) {
        self.evaluating_condition = evaluating;
    }

    pub fn defer(&mut self, transition: DeferredTransition) {
        debug!(target: "state_machine", "Deferred {:?} to next dispatch", transition);
        self.deferred.push(transition);
    }

    pub fn take_deferred(&mut self) -> Vec<DeferredTransition> {
        mem::take(&mut self.deferred)
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    //--- Lifecycle --------------------------------------------------------

    /// Drops everything pinned by `generation`. Returns the released count.
    pub fn release_generation(&mut self, generation: VmGeneration) -> usize {
        let doomed: Vec<MachineHandle> = self
            .machines
            .values()
            .filter(|m| m.origin == Some(generation) || pinned_by(m.owner.as_ref(), generation))
            .map(StateMachine::handle)
            .collect();

        let mut released = 0;
        for handle in doomed {
            self.destroy(handle);
            released += 1;
        }

        let before = self.bindings.len();
        self.bindings
            .retain(|b| !pinned_by(b.condition.as_ref(), generation));
        released += before - self.bindings.len();

        for machine in self.machines.values_mut() {
            for def in machine.states.values_mut() {
                if pinned_by(def.on_enter.as_ref(), generation) {
                    def.on_enter = None;
                    released += 1;
                }
                if pinned_by(def.on_exit.as_ref(), generation) {
                    def.on_exit = None;
                    released += 1;
                }
            }
        }
        released
    }

    pub fn clear(&mut self) {
        self.machines.clear();
        self.bindings.clear();
        self.deferred.clear();
        self.evaluating_condition = false;
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
