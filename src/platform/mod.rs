//=========================================================================
// Platform Subsystem
//
// Hosts the frame orchestrator inside the winit event loop.
//
// Architecture:
// ```text
//  Main Thread
//  ┌─────────────────────────────────────────┐
//  │  winit Event Loop                       │
//  │   ↓                                     │
//  │  InputProcessor   winit → InputEvent    │
//  │   ↓                                     │
//  │  InputBuffer      discrete + last move  │
//  │   ↓                                     │
//  │  RedrawRequested  = frame boundary      │
//  │   ↓ drain                               │
//  │  FrameOrchestrator::frame(dt, events)   │
//  │   ↓                                     │
//  │  RenderBackend                          │
//  └─────────────────────────────────────────┘
// ```
//
// Key Design Decisions:
// - **RedrawRequested = frame boundary**: one orchestrated frame per
//   redraw, with every event buffered since the previous one
// - **Paced redraws**: `about_to_wait` asks for the next redraw once the
//   target frame time has elapsed and sleeps until then otherwise
// - **Focus loss releases input**: keys held while the window loses focus
//   would otherwise never see their release
// - **Main thread only**: the runtime context and the VM are not `Send`
//
//=========================================================================

//=== Submodules ==========================================================

mod input_buffer;
mod input_processor;

//=== External Dependencies ===============================================

use std::time::{Duration, Instant};

use log::{debug, error, info, trace};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

//=== Internal Dependencies ===============================================

use crate::core::draw::RenderBackend;
use crate::core::FrameOrchestrator;
use crate::error::{EngineError, EngineResult};
use input_buffer::InputBuffer;
use input_processor::InputProcessor;

/// Upper bound on the `dt` handed to a frame (debugger pauses, drags).
const MAX_FRAME_DT: f32 = 0.25;

//=== WindowSettings ======================================================

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

//=== Platform ============================================================

/// Window, input aggregation and frame pacing around the orchestrator.
///
/// # Lifecycle
///
/// 1. **Construction**: `Platform::new(...)`; no window yet
/// 2. **Execution**: `run()` blocks inside the winit event loop
/// 3. **Frames**: every `RedrawRequested` runs exactly one frame
/// 4. **Shutdown**: close request → loop exits → registrations released
pub(crate) struct Platform {
    window: Option<Window>,
    settings: WindowSettings,
    buffer: InputBuffer,
    input_processor: InputProcessor,
    orchestrator: FrameOrchestrator,
    backend: Box<dyn RenderBackend>,
    frame_duration: Duration,
    last_frame: Instant,
    next_frame: Instant,
    redraw_pending: bool,
    fatal: Option<EngineError>,
}

impl Platform {
    //--- Construction -----------------------------------------------------

    pub fn new(
        orchestrator: FrameOrchestrator,
        backend: Box<dyn RenderBackend>,
        settings: WindowSettings,
        target_fps: f64,
    ) -> Self {
        let now = Instant::now();
        info!(target: "platform", "Platform initialized ({target_fps} fps target)");
        Self {
            window: None,
            settings,
            buffer: InputBuffer::new(),
            input_processor: InputProcessor::new(),
            orchestrator,
            backend,
            frame_duration: Duration::from_secs_f64(1.0 / target_fps),
            last_frame: now,
            next_frame: now,
            redraw_pending: false,
            fatal: None,
        }
    }

    //--- Execution --------------------------------------------------------

    /// Runs the event loop until the window closes, then shuts the
    /// orchestrator down.
    ///
    /// # Errors
    ///
    /// [`EngineError::EventLoop`] if the loop cannot start,
    /// [`EngineError::Window`] if the window cannot be created.
    pub fn run(mut self) -> EngineResult<()> {
        debug!(target: "platform", "Starting winit event loop");

        let event_loop = EventLoop::new()?;
        let result = event_loop.run_app(&mut self);

        info!(target: "platform", "Event loop exited after {} frames", self.orchestrator.frame_count());
        self.orchestrator.shutdown();

        result?;
        match self.fatal.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    //--- Frame ------------------------------------------------------------

    /// Runs one orchestrated frame with everything buffered so far.
    fn step_frame(&mut self, now: Instant) {
        let dt = now
            .saturating_duration_since(self.last_frame)
            .as_secs_f32()
            .min(MAX_FRAME_DT);
        self.last_frame = now;
        self.next_frame = now + self.frame_duration;
        self.redraw_pending = false;

        let events = self.buffer.drain();
        trace!(target: "platform", "Frame boundary with {} input events", events.len());
        self.orchestrator.frame(dt, &events, self.backend.as_mut());
    }

    fn focus_changed(&mut self, focused: bool) {
        if !focused {
            debug!(target: "platform", "Focus lost, releasing held input");
            self.buffer.drain();
            self.orchestrator.context().input.borrow_mut().release_all();
        }
    }
}

//=== winit Integration ===================================================

impl ApplicationHandler for Platform {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            debug!(target: "platform", "Window already exists (resume)");
            return;
        }

        let attrs = WindowAttributes::default()
            .with_title(self.settings.title.clone())
            .with_inner_size(LogicalSize::new(self.settings.width, self.settings.height));

        match event_loop.create_window(attrs) {
            Ok(window) => {
                let size = window.inner_size();
                info!(
                    target: "platform",
                    "Window created: {}x{} @ {}x DPI",
                    size.width,
                    size.height,
                    window.scale_factor()
                );
                window.request_redraw();
                self.redraw_pending = true;
                self.last_frame = Instant::now();
                self.window = Some(window);
            }
            Err(e) => {
                error!(target: "platform", "Window creation failed: {e}");
                self.fatal = Some(EngineError::Window(e));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!(target: "platform", "Window close requested");
                event_loop.exit();
            }

            WindowEvent::Focused(focused) => self.focus_changed(focused),

            WindowEvent::ModifiersChanged(modifiers) => {
                self.input_processor.update_modifiers(modifiers.state());
            }

            WindowEvent::CursorMoved { position, .. } => {
                let event = self.input_processor.cursor_moved(position.x, position.y);
                self.buffer.push(event);
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(event) = self.input_processor.key_event(&event) {
                    self.buffer.push(event);
                }
            }

            WindowEvent::MouseInput { state, button, .. } => {
                let event = self.input_processor.mouse_button(button, state);
                self.buffer.push(event);
            }

            WindowEvent::RedrawRequested => self.step_frame(Instant::now()),

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(window) = &self.window else {
            return;
        };
        if !self.redraw_pending && Instant::now() >= self.next_frame {
            window.request_redraw();
            self.redraw_pending = true;
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
