//=========================================================================
// State Machines
//
// Per-instance current state, declarative transitions, and transitions
// driven by input events.
//
// Responsibilities:
// - `trigger`: named-event lookup from the current state
// - `set_state`: forced change, with exit/enter hooks and a
//   `StateChangedEvent`
// - `apply_input_bindings`: the two-stage filter run for every dispatched
//   `InputActionEvent` (type/phase, then live state), then the optional
//   condition invoked with the owner as receiver
//
// Notes:
// A `trigger`/`set_state` requested while a condition is being evaluated
// is deferred and applied at the start of the next dispatch.
//
//=========================================================================

//=== Submodules ==========================================================

mod machine;
mod manager;

pub use machine::{DeferredTransition, InputBinding, MachineHandle, StateDefinition, StateMachine};
pub use manager::StateMachineManager;

//=== External Dependencies ===============================================

use log::trace;

//=== Internal Dependencies ===============================================

use crate::core::events::{InputActionEvent, StateChangedEvent};
use crate::core::runtime_context::RuntimeContext;
use crate::core::script::{is_truthy, FaultSite, ScriptRef, VmRef};

//=== Transitions =========================================================

/// Forces `handle` into `state`, running exit and enter hooks.
///
/// Returns `false` for unknown machines.
pub fn set_state(ctx: &RuntimeContext, vm: &VmRef<'_>, handle: MachineHandle, state: &str) -> bool {
    let (owner, exit_hook, from) = {
        let machines = ctx.machines.borrow();
        let Some(machine) = machines.get(handle) else {
            return false;
        };
        let (_, on_exit) = machine.hooks(machine.state());
        (machine.owner.clone(), on_exit, machine.state().to_string())
    };

    if let Some(hook) = exit_hook {
        run_hook(ctx, vm, &hook, owner.as_deref(), &from, state);
    }

    // The exit hook may have destroyed the machine
    let Some(from) = ctx.machines.borrow_mut().apply_state(handle, state) else {
        return false;
    };

    let enter_hook = ctx
        .machines
        .borrow()
        .get(handle)
        .and_then(|m| m.hooks(state).0);
    if let Some(hook) = enter_hook {
        run_hook(ctx, vm, &hook, owner.as_deref(), &from, state);
    }

    ctx.events.borrow_mut().enqueue(StateChangedEvent {
        machine: handle,
        from,
        to: state.to_string(),
    });
    true
}

/// Normal transition lookup. Returns whether a transition occurred.
pub fn trigger(ctx: &RuntimeContext, vm: &VmRef<'_>, handle: MachineHandle, event: &str) -> bool {
    let target = ctx.machines.borrow().lookup_transition(handle, event);
    match target {
        Some(target) => set_state(ctx, vm, handle, &target),
        None => false,
    }
}

/// `set_state` as requested by script code; deferred during a condition.
pub fn request_set_state(
    ctx: &RuntimeContext,
    vm: &VmRef<'_>,
    handle: MachineHandle,
    state: &str,
) -> bool {
    if ctx.machines.borrow().is_evaluating_condition() {
        ctx.machines.borrow_mut().defer(DeferredTransition::SetState {
            machine: handle,
            state: state.to_string(),
        });
        return false;
    }
    set_state(ctx, vm, handle, state)
}

/// `trigger` as requested by script code; deferred during a condition.
pub fn request_trigger(
    ctx: &RuntimeContext,
    vm: &VmRef<'_>,
    handle: MachineHandle,
    event: &str,
) -> bool {
    if ctx.machines.borrow().is_evaluating_condition() {
        ctx.machines.borrow_mut().defer(DeferredTransition::Trigger {
            machine: handle,
            event: event.to_string(),
        });
        return false;
    }
    trigger(ctx, vm, handle, event)
}

/// Applies transitions deferred during the previous dispatch.
pub fn apply_deferred(ctx: &RuntimeContext, vm: &VmRef<'_>) {
    let deferred = ctx.machines.borrow_mut().take_deferred();
    for transition in deferred {
        match transition {
            DeferredTransition::Trigger { machine, event } => {
                trigger(ctx, vm, machine, &event);
            }
            DeferredTransition::SetState { machine, state } => {
                set_state(ctx, vm, machine, &state);
            }
        }
    }
}

//=== Input-Driven Transitions ============================================

/// Runs every input binding that matches `event`.
pub fn apply_input_bindings(ctx: &RuntimeContext, vm: &VmRef<'_>, event: &InputActionEvent) {
    let candidates = ctx.machines.borrow().candidates(event);

    for binding in candidates {
        // An earlier binding for the same event may have moved the machine
        let owner = {
            let machines = ctx.machines.borrow();
            if !machines.is_live(&binding) {
                continue;
            }
            machines.get(binding.machine).and_then(|m| m.owner.clone())
        };

        if !binding.forced {
            if let Some(condition) = &binding.condition {
                if !evaluate_condition(ctx, vm, condition, owner.as_deref()) {
                    continue;
                }
            }
        }

        trace!(
            target: "state_machine",
            "{} fired {}/{}",
            binding.machine, binding.action, binding.phase
        );
        set_state(ctx, vm, binding.machine, &binding.target);
    }
}

/// Per-frame bookkeeping.
pub fn update(ctx: &RuntimeContext, dt: f32) {
    ctx.machines.borrow_mut().update(dt);
}

//=== Internal Helpers ====================================================

fn evaluate_condition(
    ctx: &RuntimeContext,
    vm: &VmRef<'_>,
    condition: &ScriptRef,
    owner: Option<&ScriptRef>,
) -> bool {
    ctx.machines.borrow_mut().set_evaluating_condition(true);
    let result = vm.call_ref(FaultSite::TransitionCondition, condition, owner, ());
    ctx.machines.borrow_mut().set_evaluating_condition(false);

    match result {
        Ok(values) => is_truthy(&values),
        Err(fault) => {
            ctx.diagnostics.report(fault);
            false
        }
    }
}

fn run_hook(
    ctx: &RuntimeContext,
    vm: &VmRef<'_>,
    hook: &ScriptRef,
    owner: Option<&ScriptRef>,
    from: &str,
    to: &str,
) {
    if let Err(fault) = vm.call_ref(FaultSite::StateCallback, hook, owner, (from, to)) {
        ctx.diagnostics.report(fault);
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
