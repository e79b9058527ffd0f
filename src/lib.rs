//=========================================================================
// Aetheric Runtime — Library Root
//
// A script-driven frame runtime: named input actions with contexts, a
// double-buffered event queue, input-bound state machines, tweens and
// sprite animation, a z-ordered draw queue, and a hot-reloadable Lua
// host, all sequenced by a fixed per-frame orchestrator.
//
// Responsibilities:
// - Expose the runtime facade (`EngineBuilder`, `Engine`)
// - Expose `core` for embedding the orchestrator without a window
// - Keep the winit integration (`platform`) internal
//
// Typical usage:
// ```no_run
// use aetheric_runtime::EngineBuilder;
//
// fn main() -> Result<(), aetheric_runtime::EngineError> {
//     EngineBuilder::new().build()?.run()
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds every frame subsystem plus the script host. Embedders that
// bring their own window drive `core::FrameOrchestrator` directly.
//
pub mod config;
pub mod core;
pub mod error;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------

mod engine;
mod platform;

//--- Public Exports ------------------------------------------------------

pub use config::RuntimeConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, EngineResult};
