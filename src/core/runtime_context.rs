//=========================================================================
// Runtime Context
//=========================================================================
//
// The process-wide set of frame subsystems, built once at startup and
// shared (via `Rc`) between the frame orchestrator, the script host and
// every script API closure.
//
// Each subsystem sits in its own `RefCell`. Borrows are kept short: take
// what is needed (handles, snapshots of callbacks), release, then call
// into script code. No borrow is ever held across a VM call.
//
// `live_generation` names the script image currently authoritative. An
// image still running its `init` is not live yet, and may only modify
// registrations it created itself (see `may_modify`).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, info};

//=== Internal Dependencies ===============================================

use super::animation::AnimationManager;
use super::camera::Camera;
use super::draw::DrawQueue;
use super::events::EventQueue;
use super::input::InputManager;
use super::script::{Diagnostics, VmGeneration};
use super::state_machine::StateMachineManager;

//=== RuntimeContext ======================================================

#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub input: RefCell<InputManager>,
    pub events: RefCell<EventQueue>,
    pub machines: RefCell<StateMachineManager>,
    pub animations: RefCell<AnimationManager>,
    pub draw_queue: RefCell<DrawQueue>,
    pub camera: RefCell<Camera>,
    pub diagnostics: Diagnostics,
    live_generation: Cell<Option<VmGeneration>>,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// The authoritative script image, if one is loaded.
    pub fn live_generation(&self) -> Option<VmGeneration> {
        self.live_generation.get()
    }

    pub(crate) fn set_live_generation(&self, generation: Option<VmGeneration>) {
        self.live_generation.set(generation);
    }

    /// Whether script code of `generation` may modify a registration
    /// created by `origin` (`None` for native registrations).
    ///
    /// Its own registrations always; native ones only while live. Those
    /// of any other image never.
    pub fn may_modify(&self, generation: VmGeneration, origin: Option<VmGeneration>) -> bool {
        match origin {
            Some(origin) => origin == generation,
            None => self.live_generation() == Some(generation),
        }
    }

    /// Releases every native registration pinned by `generation`.
    ///
    /// Called by the script host for the losing VM of a reload: the old
    /// one after a successful swap, the new one after a failed attempt.
    pub fn release_generation(&self, generation: VmGeneration) -> usize {
        let callbacks = self.input.borrow_mut().release_generation(generation);
        let subscriptions = self.events.borrow_mut().release_generation(generation);
        let machines = self.machines.borrow_mut().release_generation(generation);
        let animations = self.animations.borrow_mut().release_generation(generation);

        let total = callbacks + subscriptions + machines + animations;
        debug!(
            target: "script",
            "Released {generation}: {callbacks} callbacks, {subscriptions} subscriptions, \
             {machines} state machine entries, {animations} animations"
        );
        total
    }

    /// Drops every registration and queued item across all subsystems.
    pub fn clear(&self) {
        self.input.borrow_mut().clear();
        self.events.borrow_mut().clear();
        self.machines.borrow_mut().clear();
        self.animations.borrow_mut().clear();
        self.draw_queue.borrow_mut().begin_frame();
        self.set_live_generation(None);
        info!(target: "frame", "Runtime context cleared");
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
