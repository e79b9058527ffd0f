//=========================================================================
// Scripting
//
// The embedded Lua layer and everything that crosses its boundary.
//
// Responsibilities:
// - VM construction and protected calls (`vm`)
// - GC pinning of script values held natively (`script_ref`)
// - Structured faults and the diagnostics channel (`fault`)
// - Load, change detection and the reload transaction (`host`)
// - The Lua-facing API tables (`api`)
//
// Invariant: native containers never store a raw Lua value. Everything
// held across a call is a `ScriptRef`, tagged with the generation of the
// VM that pinned it.
//
//=========================================================================

//=== Submodules ==========================================================

pub mod api;

mod fault;
mod host;
mod script_ref;
mod vm;

pub use fault::{parse_traceback, Diagnostics, FaultRecord, FaultSite, ScriptFault, STALE_REFERENCE};
pub use host::{source_timestamp, ScriptHost};
pub use script_ref::{pinned_by, PinLedger, ScriptRef, VmGeneration};
pub use vm::{is_truthy, ScriptVm, VmRef, VmScope};
