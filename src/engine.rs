//=========================================================================
// Aetheric Runtime
//
// Main entry point: configuration in, a running frame loop out.
//
// Architecture:
// ```text
//     EngineBuilder  ──build()──>  Engine  ──run()──────────>  [winit loop]
//         │                          │
//         ├─ with_config()           ├─ loads the script image
//         ├─ with_target_fps()       └─ run_headless(n) ───>  [n frames]
//         ├─ with_console()
//         ├─ with_backend()
//         └─ with_diagnostics_channel()
// ```
//
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

use crossbeam_channel::Sender;
use log::{info, warn};

//=== Internal Dependencies ===============================================

use crate::config::RuntimeConfig;
use crate::core::console::{DebugConsole, KeyToggleConsole};
use crate::core::draw::{RecordingBackend, RenderBackend};
use crate::core::script::{FaultRecord, ScriptHost};
use crate::core::{FrameOrchestrator, FrameSummary, RuntimeContext};
use crate::error::EngineResult;
use crate::platform::{Platform, WindowSettings};

//=== EngineBuilder =======================================================

/// Builder for configuring and constructing an [`Engine`].
///
/// # Default Values
///
/// - **Config**: [`RuntimeConfig::default()`] (`scripts/main.lua`, hot reload on)
/// - **Target FPS**: taken from the config (60.0)
/// - **Console**: [`KeyToggleConsole`] on the config's toggle key
/// - **Backend**: a [`RecordingBackend`] keeping the last frame
///
/// # Examples
///
/// ```no_run
/// use aetheric_runtime::{EngineBuilder, RuntimeConfig};
///
/// let config = RuntimeConfig::load("runtime.toml".as_ref())?;
/// EngineBuilder::new()
///     .with_config(config)
///     .with_target_fps(120.0)
///     .build()?
///     .run()?;
/// # Ok::<(), aetheric_runtime::EngineError>(())
/// ```
pub struct EngineBuilder {
    config: RuntimeConfig,
    target_fps: Option<f64>,
    console: ConsoleChoice,
    backend: Option<Box<dyn RenderBackend>>,
    diagnostics: Option<Sender<FaultRecord>>,
}

enum ConsoleChoice {
    FromConfig,
    Custom(Box<dyn DebugConsole>),
    Disabled,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            target_fps: None,
            console: ConsoleChoice::FromConfig,
            backend: None,
            diagnostics: None,
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the frame rate the platform paces redraws to, and the fixed
    /// `dt` of headless runs.
    ///
    /// Default: the config's `target_fps` (60.0)
    ///
    /// # Panics
    ///
    /// Panics if `fps <= 0.0`.
    pub fn with_target_fps(mut self, fps: f64) -> Self {
        assert!(fps > 0.0, "Target FPS must be positive, got {}", fps);
        self.target_fps = Some(fps);
        self
    }

    /// Replaces the built-in key-toggled console.
    pub fn with_console(mut self, console: Box<dyn DebugConsole>) -> Self {
        self.console = ConsoleChoice::Custom(console);
        self
    }

    pub fn without_console(mut self) -> Self {
        self.console = ConsoleChoice::Disabled;
        self
    }

    pub fn with_backend(mut self, backend: Box<dyn RenderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Forwards every script fault as a [`FaultRecord`] to `sender`.
    pub fn with_diagnostics_channel(mut self, sender: Sender<FaultRecord>) -> Self {
        self.diagnostics = Some(sender);
        self
    }

    /// Builds the runtime and loads the script image.
    ///
    /// A script that fails to load is not an error here: it is reported,
    /// the error banner shows until a reload succeeds.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::ConfigValue`] for an unknown console toggle key.
    pub fn build(self) -> EngineResult<Engine> {
        let target_fps = self.target_fps.unwrap_or(self.config.target_fps);
        assert!(target_fps > 0.0, "Target FPS must be positive, got {}", target_fps);

        let console: Option<Box<dyn DebugConsole>> = match self.console {
            ConsoleChoice::FromConfig => {
                Some(Box::new(KeyToggleConsole::new(self.config.console_key()?)))
            }
            ConsoleChoice::Custom(console) => Some(console),
            ConsoleChoice::Disabled => None,
        };

        let ctx = RuntimeContext::shared();
        if let Some(sender) = self.diagnostics {
            ctx.diagnostics.attach_channel(sender);
        }

        let mut host = ScriptHost::new(
            Rc::clone(&ctx),
            self.config.script_root.clone(),
            self.config.entry.clone(),
        )
        .with_hot_reload(self.config.hot_reload);

        info!(
            "Building runtime (script: {}, {target_fps} fps, hot reload {})",
            host.entry_path().display(),
            if self.config.hot_reload { "on" } else { "off" }
        );
        if let Err(fault) = host.load() {
            warn!("Starting without a script image: {fault}");
        }

        let mut orchestrator = FrameOrchestrator::new(ctx, host);
        if let Some(console) = console {
            orchestrator = orchestrator.with_console(console);
        }

        Ok(Engine {
            config: self.config,
            orchestrator,
            backend: self
                .backend
                .unwrap_or_else(|| Box::new(RecordingBackend::with_history(1))),
            target_fps,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

//=== Engine ==============================================================

/// A built runtime, ready to run windowed or headless.
///
/// # Architecture
///
/// ```text
/// Engine (Main Thread)
///   ├─► Platform (winit event loop)
///   │     └─► one FrameOrchestrator::frame per redraw
///   │
///   └─► FrameOrchestrator
///         ├─► ScriptHost (Lua VM, hot reload)
///         └─► RuntimeContext (input, events, state machines,
///                             animation, draw queue, camera)
/// ```
pub struct Engine {
    config: RuntimeConfig,
    orchestrator: FrameOrchestrator,
    backend: Box<dyn RenderBackend>,
    target_fps: f64,
}

impl Engine {
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn target_fps(&self) -> f64 {
        self.target_fps
    }

    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }

    pub fn context(&self) -> &Rc<RuntimeContext> {
        self.orchestrator.context()
    }

    //--- Execution --------------------------------------------------------

    /// Runs `frames` frames at a fixed `dt` with no window and no input.
    pub fn run_headless(&mut self, frames: u64) -> Vec<FrameSummary> {
        let dt = (1.0 / self.target_fps) as f32;
        info!("Running {frames} headless frames (dt {dt:.4})");

        (0..frames)
            .map(|_| self.orchestrator.frame(dt, &[], self.backend.as_mut()))
            .collect()
    }

    /// Opens the window and blocks until it closes.
    ///
    /// # Lifecycle
    ///
    /// 1. Creates the platform around the orchestrator
    /// 2. Runs the winit event loop; each redraw runs one frame
    /// 3. On close: releases every script registration and drops the VM
    ///
    /// # Errors
    ///
    /// Event loop or window creation failures. Script faults never end
    /// the loop.
    pub fn run(self) -> EngineResult<()> {
        info!("Starting runtime ({} fps target)", self.target_fps);

        let settings = WindowSettings {
            title: self.config.window_title.clone(),
            width: self.config.window_width,
            height: self.config.window_height,
        };
        let platform = Platform::new(self.orchestrator, self.backend, settings, self.target_fps);
        platform.run()?;

        info!("Runtime shutdown complete");
        Ok(())
    }

    /// Releases every registration without running the window loop.
    pub fn shutdown(mut self) {
        self.orchestrator.shutdown();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
