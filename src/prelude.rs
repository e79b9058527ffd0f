//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_runtime::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Runtime facade
pub use crate::config::RuntimeConfig;
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{EngineError, EngineResult};

// Frame core
pub use crate::core::console::{DebugConsole, KeyToggleConsole};
pub use crate::core::draw::{Color, DrawCommand, RecordingBackend, RenderBackend};
pub use crate::core::{FrameOrchestrator, FrameSummary, RuntimeContext};

// Input
pub use crate::core::input::{Binding, InputEvent, KeyCode, Modifiers, MouseButton, Phase};

// Events
pub use crate::core::events::{CustomEvent, Event, InputActionEvent, StateChangedEvent};

// Scripting
pub use crate::core::script::{FaultRecord, FaultSite, ScriptFault, ScriptHost};
