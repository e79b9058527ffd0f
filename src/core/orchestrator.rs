//=========================================================================
// Frame Orchestrator
//=========================================================================
//
// Runs one frame as a fixed sequence. Every subsystem is invoked exactly
// once, in this order:
//
//    1. script reload check
//    2. draw queue begin_frame
//    3. animation update
//    4. input poll + callback dispatch
//    5. event dispatch (including state machine input bindings)
//    6. state machine bookkeeping
//    7. debug console
//    8. script update(dt)        skipped when the console took the frame
//    9. camera update
//   10. script draw()
//   11. draw queue flush         error banner drawn last
//   12. present
//
// Input is fully resolved and dispatched before `update(dt)`, so script
// logic always sees post-transition state.
//
// Steps that call into script code are skipped while no image is loaded;
// device state still advances and the banner explains why nothing draws.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

use log::{debug, trace};

//=== Internal Dependencies ===============================================

use super::animation;
use super::console::DebugConsole;
use super::draw::{self, RenderBackend};
use super::events;
use super::input::{self, InputEvent};
use super::runtime_context::RuntimeContext;
use super::script::{FaultSite, ScriptFault, ScriptHost};
use super::state_machine;

/// Banner text while no script image has loaded and no fault explains why.
pub const NO_SCRIPT_LOADED: &str = "no script loaded";

//=== FrameSummary ========================================================

/// What happened during one call to [`FrameOrchestrator::frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSummary {
    pub index: u64,
    pub reloaded: bool,
    pub console_consumed: bool,
    /// Text of the error banner drawn this frame, if any.
    pub banner: Option<String>,
}

//=== FrameOrchestrator ===================================================

pub struct FrameOrchestrator {
    ctx: Rc<RuntimeContext>,
    host: ScriptHost,
    console: Option<Box<dyn DebugConsole>>,
    frame: u64,
}

impl FrameOrchestrator {
    pub fn new(ctx: Rc<RuntimeContext>, host: ScriptHost) -> Self {
        Self {
            ctx,
            host,
            console: None,
            frame: 0,
        }
    }

    pub fn with_console(mut self, console: Box<dyn DebugConsole>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn context(&self) -> &Rc<RuntimeContext> {
        &self.ctx
    }

    pub fn host(&self) -> &ScriptHost {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut ScriptHost {
        &mut self.host
    }

    /// Frames run so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn console_open(&self) -> bool {
        self.console.as_ref().is_some_and(|c| c.is_open())
    }

    //--- frame() ----------------------------------------------------------

    /// Runs one frame. Script faults are reported, never returned.
    pub fn frame(
        &mut self,
        dt: f32,
        input_events: &[InputEvent],
        backend: &mut dyn RenderBackend,
    ) -> FrameSummary {
        self.frame += 1;
        let ctx = Rc::clone(&self.ctx);
        ctx.diagnostics.set_frame(self.frame);
        trace!(target: "frame", "Frame {} (dt {dt:.4})", self.frame);

        //--- 1. Reload check ----------------------------------------------
        let reloaded = self.host.reload_if_changed();

        //--- 2. Begin frame -----------------------------------------------
        ctx.draw_queue.borrow_mut().begin_frame();

        let vm = self.host.vm_ref();

        //--- 3. Animation -------------------------------------------------
        if let Some(vm) = &vm {
            animation::update(&ctx, vm, dt);
        }

        //--- 4. Input -----------------------------------------------------
        input::poll_and_dispatch(&ctx, vm.as_ref(), input_events);

        //--- 5. Events ----------------------------------------------------
        match &vm {
            Some(vm) => events::dispatch(&ctx, vm),
            None => {
                let dropped = ctx.events.borrow().pending_len();
                ctx.events.borrow_mut().truncate_pending(0);
                if dropped > 0 {
                    trace!(target: "events", "No script image, dropped {dropped} events");
                }
            }
        }

        //--- 6. State machines --------------------------------------------
        state_machine::update(&ctx, dt);

        //--- 7. Debug console ---------------------------------------------
        let console_consumed = match self.console.as_mut() {
            Some(console) => console.consume_frame(ctx.input.borrow().tracker()),
            None => false,
        };

        //--- 8. Script update ---------------------------------------------
        if let Some(vm) = &vm {
            if console_consumed {
                trace!(target: "frame", "Console consumed frame {}", self.frame);
            } else if let Err(fault) = vm.call_global(FaultSite::Update, "update", f64::from(dt)) {
                ctx.diagnostics.report(fault);
            }
        }

        //--- 9. Camera ----------------------------------------------------
        ctx.camera.borrow_mut().update(dt);

        //--- 10. Script draw ----------------------------------------------
        let banner = match &vm {
            Some(vm) => match vm.call_global(FaultSite::Draw, "draw", ()) {
                Ok(_) => None,
                Err(fault) => {
                    let message = banner_text(&fault);
                    ctx.diagnostics.report(fault);
                    Some(message)
                }
            },
            None => Some(
                self.host
                    .last_error()
                    .map_or_else(|| NO_SCRIPT_LOADED.to_string(), banner_text),
            ),
        };

        //--- 11. Flush ----------------------------------------------------
        draw::flush(&ctx, backend, banner.as_deref());

        //--- 12. Present --------------------------------------------------
        backend.end_frame();

        FrameSummary {
            index: self.frame,
            reloaded,
            console_consumed,
            banner,
        }
    }

    /// Releases every registration and drops the script image.
    pub fn shutdown(&mut self) {
        debug!(target: "frame", "Shutting down after {} frames", self.frame);
        self.host.shutdown();
    }
}

impl std::fmt::Debug for FrameOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameOrchestrator")
            .field("host", &self.host)
            .field("console", &self.console.is_some())
            .field("frame", &self.frame)
            .finish()
    }
}

fn banner_text(fault: &ScriptFault) -> String {
    format!("{}: {}", fault.kind, fault.message)
}

//=========================================================================
// Unit Tests
//=========================================================================
