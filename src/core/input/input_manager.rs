//=========================================================================
// Input Manager
//
// Resolves device state into named logical actions for the active
// context, and owns the callback subscription table.
//
// Responsibilities:
// - Feed per-frame device events into the `StateTracker`
// - Hold action definitions per context and the context stack
// - Answer pressed/released/down queries by action name
// - Produce the (action, phase) pairs that fired this frame
// - Keep native and script callbacks with stable integer handles
//
// Notes:
// Script callbacks and receivers are held as `Rc<ScriptRef>`, so the
// subscription table pins them exactly as long as the entry lives.
// Invocation happens outside this type (see `input::poll_and_dispatch`)
// against a snapshot, which keeps `off()` safe from inside a callback.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

//=== Internal Dependencies ===============================================

use super::action::{ActionDefinition, Binding, Phase};
use super::context::{ActionRegistry, ContextStack};
use super::event::InputEvent;
use super::state_tracker::StateTracker;
use crate::core::events::InputActionEvent;
use crate::core::script::{ScriptRef, VmGeneration};

//=== CallbackHandle ======================================================

/// Opaque handle for an input callback subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackHandle(pub u32);

//=== InputCallback =======================================================

/// Native callback signature: `(action, phase)`.
pub type NativeInputFn = Rc<RefCell<dyn FnMut(&str, Phase)>>;

/// What runs when a watched action fires.
#[derive(Clone)]
pub enum InputCallback {
    Native(NativeInputFn),
    Script {
        callback: Rc<ScriptRef>,
        receiver: Option<Rc<ScriptRef>>,
    },
}

impl InputCallback {
    /// Generation that registered the callback, `None` for native ones.
    pub fn origin(&self) -> Option<VmGeneration> {
        match self {
            Self::Native(_) => None,
            Self::Script { callback, .. } => Some(callback.generation()),
        }
    }

    fn is_from(&self, generation: VmGeneration) -> bool {
        match self {
            Self::Native(_) => false,
            Self::Script { callback, receiver } => {
                callback.generation() == generation
                    || receiver.as_ref().is_some_and(|r| r.generation() == generation)
            }
        }
    }
}

impl fmt::Debug for InputCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Script { callback, receiver } => f
                .debug_struct("Script")
                .field("generation", &callback.generation())
                .field("has_receiver", &receiver.is_some())
                .finish(),
        }
    }
}

#[derive(Debug)]
struct Subscription {
    handle: CallbackHandle,
    action: String,
    phase: Phase,
    callback: InputCallback,
}

//=== InputDefinitions ====================================================

/// Action definitions and context stack, captured as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputDefinitions {
    registry: ActionRegistry,
    stack: ContextStack,
}

//=== InputManager ========================================================

/// Action/context resolution over per-frame device state.
#[derive(Debug, Default)]
pub struct InputManager {
    tracker: StateTracker,
    definitions: InputDefinitions,
    callbacks: Vec<Subscription>,
    next_handle: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Action Definitions -----------------------------------------------

    /// Registers or overwrites an action in the global context.
    pub fn define_action(&mut self, name: &str, bindings: Vec<Binding>) {
        debug!(target: "input", "Defined action '{name}' ({} bindings)", bindings.len());
        self.definitions.registry.define(name, bindings);
    }

    /// Registers or overwrites an action scoped to `context`.
    pub fn define_action_in_context(&mut self, context: &str, name: &str, bindings: Vec<Binding>) {
        debug!(
            target: "input",
            "Defined action '{name}' in context '{context}' ({} bindings)",
            bindings.len()
        );
        self.definitions.registry.define_in(context, name, bindings);
    }

    /// The definition `name` currently resolves to, if any.
    pub fn resolve(&self, name: &str) -> Option<&ActionDefinition> {
        self.definitions
            .registry
            .resolve(self.definitions.stack.current_name(), name)
    }

    //--- Context Stack ----------------------------------------------------

    /// Activates `name`, creating an empty context if needed.
    pub fn push_context(&mut self, name: &str) {
        self.definitions.registry.ensure_context(name);
        self.definitions.stack.push(name);
        trace!(target: "input", "Pushed context '{name}'");
    }

    pub fn pop_context(&mut self) -> Option<String> {
        let popped = self.definitions.stack.pop();
        if let Some(name) = &popped {
            trace!(target: "input", "Popped context '{name}'");
        }
        popped
    }

    pub fn set_context(&mut self, name: &str) {
        self.definitions.registry.ensure_context(name);
        self.definitions.stack.set(name);
    }

    /// Empties the stack. Global definitions stay available.
    pub fn clear_contexts(&mut self) {
        self.definitions.stack.clear();
    }

    pub fn is_context_active(&self, name: &str) -> bool {
        self.definitions.stack.is_active(name)
    }

    pub fn current_context(&self) -> Option<&str> {
        self.definitions.stack.current_name()
    }

    //--- Queries ----------------------------------------------------------

    /// Whether `name` matches `phase` this frame. Undefined actions are inactive.
    pub fn is_in_phase(&self, name: &str, phase: Phase) -> bool {
        self.resolve(name)
            .is_some_and(|action| action.is_in_phase(&self.tracker, phase))
    }

    pub fn is_pressed(&self, name: &str) -> bool {
        self.is_in_phase(name, Phase::Pressed)
    }

    pub fn is_released(&self, name: &str) -> bool {
        self.is_in_phase(name, Phase::Released)
    }

    pub fn is_down(&self, name: &str) -> bool {
        self.is_in_phase(name, Phase::Held)
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.tracker.mouse_position()
    }

    /// Raw device state, independent of contexts.
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    //--- Polling ----------------------------------------------------------

    /// Advances device state and returns every visible action that fired.
    ///
    /// Order is deterministic: action name ascending, then pressed, held,
    /// released. `Held` fires on every frame the action is down.
    pub fn poll(&mut self, events: &[InputEvent]) -> Vec<InputActionEvent> {
        self.tracker.advance_frame(events);

        let current = self.definitions.stack.current_name();
        let registry = &self.definitions.registry;
        let mut fired = Vec::new();

        for name in registry.visible_actions(current) {
            let Some(action) = registry.resolve(current, name) else {
                continue;
            };
            for phase in Phase::ALL {
                if action.is_in_phase(&self.tracker, phase) {
                    fired.push(InputActionEvent::new(name, phase));
                }
            }
        }

        if !fired.is_empty() {
            trace!(target: "input", "{} action events this frame", fired.len());
        }
        fired
    }

    /// Releases every held input, as when the window loses focus.
    pub fn release_all(&mut self) {
        self.tracker.release_all();
    }

    //--- Callbacks --------------------------------------------------------

    /// Registers a callback for `action` in `phase`.
    pub fn on(&mut self, action: &str, phase: Phase, callback: InputCallback) -> CallbackHandle {
        self.next_handle += 1;
        let handle = CallbackHandle(self.next_handle);
        self.callbacks.push(Subscription {
            handle,
            action: action.to_string(),
            phase,
            callback,
        });
        debug!(target: "input", "Callback {:?} registered for {action}/{phase}", handle);
        handle
    }

    /// Registers a native closure for `action` in `phase`.
    pub fn on_native<F>(&mut self, action: &str, phase: Phase, f: F) -> CallbackHandle
    where
        F: FnMut(&str, Phase) + 'static,
    {
        self.on(action, phase, InputCallback::Native(Rc::new(RefCell::new(f))))
    }

    /// Removes a callback. Returns `false` for unknown handles.
    pub fn off(&mut self, handle: CallbackHandle) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|sub| sub.handle != handle);
        self.callbacks.len() != before
    }

    /// Origin of a registered callback; `None` for unknown handles.
    pub fn callback_origin(&self, handle: CallbackHandle) -> Option<Option<VmGeneration>> {
        self.callbacks
            .iter()
            .find(|sub| sub.handle == handle)
            .map(|sub| sub.callback.origin())
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Copies the callbacks that match each fired event, in firing order
    /// then registration order.
    pub fn snapshot_callbacks(
        &self,
        fired: &[InputActionEvent],
    ) -> Vec<(InputActionEvent, InputCallback)> {
        fired
            .iter()
            .flat_map(|event| {
                self.callbacks
                    .iter()
                    .filter(move |sub| sub.action == event.action && sub.phase == event.phase)
                    .map(move |sub| (event.clone(), sub.callback.clone()))
            })
            .collect()
    }

    //--- Lifecycle --------------------------------------------------------

    pub fn snapshot_definitions(&self) -> InputDefinitions {
        self.definitions.clone()
    }

    pub fn restore_definitions(&mut self, definitions: InputDefinitions) {
        self.definitions = definitions;
    }

    /// Drops every action, every non-global context and the stack.
    pub fn reset_definitions(&mut self) {
        self.definitions.registry.reset();
        self.definitions.stack.clear();
    }

    /// Removes every callback pinned by `generation`. Returns the count.
    pub fn release_generation(&mut self, generation: VmGeneration) -> usize {
        let before = self.callbacks.len();
        self.callbacks.retain(|sub| !sub.callback.is_from(generation));
        before - self.callbacks.len()
    }

    /// Drops all callbacks and definitions. Device state is kept.
    pub fn clear(&mut self) {
        self.callbacks.clear();
        self.reset_definitions();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
