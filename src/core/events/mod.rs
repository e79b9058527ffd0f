//=========================================================================
// Events
//
// Typed, double-buffered pub/sub between producers (input, state
// machines, scripts) and consumers (native and script subscribers, and
// the state machine input bindings).
//
// `dispatch` is called exactly once per frame by the orchestrator.
//
//=========================================================================

//=== Submodules ==========================================================

mod event;
mod event_queue;

pub use event::{CustomEvent, Event, EventKind, EventPayload, InputActionEvent, StateChangedEvent};
pub use event_queue::{EventQueue, NativeEventFn, Subscriber, SubscriptionHandle};

//=== External Dependencies ===============================================

use log::{trace, warn};

//=== Internal Dependencies ===============================================

use crate::core::runtime_context::RuntimeContext;
use crate::core::script::{FaultSite, ScriptFault, VmRef};
use crate::core::state_machine;

//=== Dispatch ============================================================

/// Delivers every event pending at call time, in FIFO order.
///
/// For each event the matching subscribers are copied before any of them
/// runs, so (un)subscribing from a handler never disturbs the pass.
/// `InputAction` events then drive the state machine input bindings.
pub fn dispatch(ctx: &RuntimeContext, vm: &VmRef<'_>) {
    state_machine::apply_deferred(ctx, vm);

    let Some(batch) = ctx.events.borrow_mut().begin_dispatch() else {
        return;
    };
    if !batch.is_empty() {
        trace!(target: "events", "Dispatching {} events", batch.len());
    }

    for event in &batch {
        let subscribers = ctx.events.borrow().subscribers_for(event);
        for subscriber in subscribers {
            deliver(ctx, vm, &subscriber, event);
        }

        if let Event::InputAction(input) = event {
            state_machine::apply_input_bindings(ctx, vm, input);
        }
    }

    ctx.events.borrow_mut().end_dispatch(batch);
}

fn deliver(ctx: &RuntimeContext, vm: &VmRef<'_>, subscriber: &Subscriber, event: &Event) {
    match subscriber {
        Subscriber::Native(f) => match f.try_borrow_mut() {
            Ok(mut f) => (&mut *f)(event),
            Err(_) => warn!(target: "events", "Skipped reentrant native subscriber"),
        },
        Subscriber::Script(callback) => {
            let result = event
                .to_lua(vm.lua())
                .map_err(|e| ScriptFault::from_lua(FaultSite::EventSubscriber, &e))
                .and_then(|table| vm.call_ref(FaultSite::EventSubscriber, callback, None, table));
            if let Err(fault) = result {
                ctx.diagnostics.report(fault);
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
