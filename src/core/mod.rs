//=========================================================================
// Runtime Core
//
// Everything that runs inside one frame, independent of the window.
//
// Responsibilities:
// - Frame subsystems (input, events, state machines, animation, draw)
// - The shared `RuntimeContext` that owns them
// - The script host and the Lua API it installs
// - `FrameOrchestrator`: the fixed per-frame step order
//
// Notes:
// The core is single-threaded. Subsystems never hold the VM; each step
// receives a borrowed `VmRef` from the host for the duration of a call.
//
//=========================================================================

pub mod animation;
pub mod camera;
pub mod console;
pub mod draw;
pub mod events;
pub mod input;
pub mod orchestrator;
pub mod runtime_context;
pub mod script;
pub mod state_machine;

pub use orchestrator::{FrameOrchestrator, FrameSummary};
pub use runtime_context::RuntimeContext;
