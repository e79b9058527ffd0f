//=========================================================================
// Input System
//
// Resolves per-frame device state into named logical actions, scoped by
// a stack of input contexts with a permanent "global" fallback.
//
// Responsibilities:
// - Normalized device events (`event`) and per-frame device state
//   (`state_tracker`)
// - Action definitions, bindings and phases (`action`)
// - Context registry and stack (`context`)
// - Queries and the callback table (`input_manager`)
// - `poll_and_dispatch`: frame step 4 of the orchestrator
//
// Notes:
// Action queries never fail: an undefined action is simply not active.
//
//=========================================================================

//=== Submodules ==========================================================

pub mod event;

mod action;
mod context;
mod input_manager;
mod state_tracker;

pub use action::{ActionDefinition, Binding, BindingParseError, Phase};
pub use context::{ActionRegistry, ContextStack, GLOBAL_CONTEXT};
pub use event::{InputEvent, KeyCode, Modifiers, MouseButton, UnknownDeviceCode};
pub use input_manager::{CallbackHandle, InputCallback, InputDefinitions, InputManager, NativeInputFn};
pub use state_tracker::StateTracker;

//=== External Dependencies ===============================================

use log::warn;

//=== Internal Dependencies ===============================================

use crate::core::events::Event;
use crate::core::runtime_context::RuntimeContext;
use crate::core::script::{FaultSite, VmRef};

//=== poll_and_dispatch() =================================================
//
// Advances device state, enqueues one `InputActionEvent` per fired
// (action, phase), then runs the matching callbacks directly.
//
// The callback list is copied before the first one runs: a callback that
// calls `off()` on itself (or anyone else) still completes this pass as
// captured and is gone from the next one.
//
// With no script image loaded (`vm` is `None`) device state still
// advances and native callbacks still run.
//
pub fn poll_and_dispatch(ctx: &RuntimeContext, vm: Option<&VmRef<'_>>, events: &[InputEvent]) {
    let (fired, callbacks) = {
        let mut input = ctx.input.borrow_mut();
        let fired = input.poll(events);
        let callbacks = input.snapshot_callbacks(&fired);
        (fired, callbacks)
    };

    {
        let mut queue = ctx.events.borrow_mut();
        for event in fired {
            queue.enqueue(Event::InputAction(event));
        }
    }

    for (event, callback) in callbacks {
        match callback {
            InputCallback::Native(f) => match f.try_borrow_mut() {
                Ok(mut f) => (&mut *f)(&event.action, event.phase),
                Err(_) => warn!(target: "input", "Skipped reentrant native callback"),
            },
            InputCallback::Script { callback, receiver } => {
                let Some(vm) = vm else {
                    continue;
                };
                let args = (event.action.as_str(), event.phase.name());
                if let Err(fault) =
                    vm.call_ref(FaultSite::InputCallback, &callback, receiver.as_deref(), args)
                {
                    ctx.diagnostics.report(fault);
                }
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::script::{ScriptVm, VmGeneration};
    use mlua::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn fired_actions_are_enqueued_and_native_callbacks_run() {
        let ctx = RuntimeContext::new();
        let vm = ScriptVm::new(VmGeneration(1)).unwrap();
        ctx.input
            .borrow_mut()
            .define_action("jump", vec![Binding::Key(KeyCode::Space)]);

        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        ctx.input.borrow_mut().on_native("jump", Phase::Pressed, move |action, phase| {
            sink.borrow_mut().push(format!("{action}/{phase}"));
        });

        poll_and_dispatch(&ctx, Some(&vm.vm_ref()), &[InputEvent::key_down(KeyCode::Space)]);

        assert_eq!(*calls.borrow(), vec!["jump/pressed"]);
        assert_eq!(ctx.events.borrow().pending_len(), 2, "pressed + held");
    }

    #[test]
    fn script_callback_receives_receiver_action_and_phase() {
        let ctx = RuntimeContext::new();
        let vm = ScriptVm::new(VmGeneration(1)).unwrap();
        vm.exec_source(
            r#"
            hero = { jumps = 0 }
            function on_jump(self, action, phase) self.jumps = self.jumps + 1; last = action .. "/" .. phase end
            "#,
            "test.lua",
        )
        .unwrap();
        ctx.input
            .borrow_mut()
            .define_action("jump", vec![Binding::Key(KeyCode::Space)]);

        let vm_ref = vm.vm_ref();
        let callback: Value = vm.lua().globals().get("on_jump").unwrap();
        let receiver: Value = vm.lua().globals().get("hero").unwrap();
        let callback = InputCallback::Script {
            callback: vm_ref.pin_shared(callback).unwrap(),
            receiver: Some(vm_ref.pin_shared(receiver).unwrap()),
        };
        ctx.input.borrow_mut().on("jump", Phase::Pressed, callback);

        poll_and_dispatch(&ctx, Some(&vm_ref), &[InputEvent::key_down(KeyCode::Space)]);
        poll_and_dispatch(&ctx, Some(&vm_ref), &[]);

        let jumps: i64 = vm.lua().load("return hero.jumps").eval().unwrap();
        let last: String = vm.lua().globals().get("last").unwrap();
        assert_eq!(jumps, 1);
        assert_eq!(last, "jump/pressed");
    }

    #[test]
    fn callback_fault_is_reported_not_propagated() {
        let ctx = RuntimeContext::new();
        let vm = ScriptVm::new(VmGeneration(1)).unwrap();
        vm.exec_source("function boom() error('bad callback') end", "test.lua").unwrap();
        ctx.input
            .borrow_mut()
            .define_action("fire", vec![Binding::Mouse(MouseButton::Left)]);

        let vm_ref = vm.vm_ref();
        let callback: Value = vm.lua().globals().get("boom").unwrap();
        ctx.input.borrow_mut().on(
            "fire",
            Phase::Pressed,
            InputCallback::Script {
                callback: vm_ref.pin_shared(callback).unwrap(),
                receiver: None,
            },
        );

        poll_and_dispatch(&ctx, Some(&vm_ref), &[InputEvent::button_down(MouseButton::Left)]);

        let fault = ctx.diagnostics.last_fault().unwrap();
        assert_eq!(fault.site, FaultSite::InputCallback);
        assert!(fault.message.contains("bad callback"));
    }

    #[test]
    fn without_a_vm_native_callbacks_still_run() {
        let ctx = RuntimeContext::new();
        ctx.input
            .borrow_mut()
            .define_action("jump", vec![Binding::Key(KeyCode::Space)]);
        let hits = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&hits);
        ctx.input.borrow_mut().on_native("jump", Phase::Pressed, move |_, _| {
            *sink.borrow_mut() += 1;
        });

        poll_and_dispatch(&ctx, None, &[InputEvent::key_down(KeyCode::Space)]);

        assert_eq!(*hits.borrow(), 1);
        assert!(ctx.input.borrow().is_down("jump"));
    }

    #[test]
    fn released_callback_unpins_its_values() {
        let ctx = RuntimeContext::new();
        let vm = ScriptVm::new(VmGeneration(4)).unwrap();
        vm.exec_source("function cb() end", "test.lua").unwrap();

        let vm_ref = vm.vm_ref();
        let callback: Value = vm.lua().globals().get("cb").unwrap();
        let handle = ctx.input.borrow_mut().on(
            "jump",
            Phase::Held,
            InputCallback::Script {
                callback: vm_ref.pin_shared(callback).unwrap(),
                receiver: None,
            },
        );
        assert_eq!(vm.pinned_count(), 1);

        assert!(ctx.input.borrow_mut().off(handle));
        assert_eq!(vm.pinned_count(), 0);
    }
}
