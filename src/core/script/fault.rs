//=========================================================================
// Script Faults & Diagnostics
//=========================================================================
//
// Structured record of every recoverable script-level failure, and the
// channel those records are reported through.
//
// A fault never unwinds past the frame. It is logged, kept as the most
// recent fault, and (when a debug channel is attached) forwarded as a
// `FaultRecord` over crossbeam.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::fmt;

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, warn};
use thiserror::Error;

//=== FaultSite ===========================================================

/// Where a script fault was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultSite {
    Load,
    Init,
    Update,
    Draw,
    InputCallback,
    EventSubscriber,
    TransitionCondition,
    StateCallback,
    AnimationTarget,
    AnimationCompletion,
    Api,
}

impl FaultSite {
    pub fn name(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Init => "init",
            Self::Update => "update",
            Self::Draw => "draw",
            Self::InputCallback => "input callback",
            Self::EventSubscriber => "event subscriber",
            Self::TransitionCondition => "transition condition",
            Self::StateCallback => "state callback",
            Self::AnimationTarget => "animation target",
            Self::AnimationCompletion => "animation completion",
            Self::Api => "api",
        }
    }
}

impl fmt::Display for FaultSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//=== ScriptFault =========================================================

/// Kind given to faults raised by stale cross-generation references.
pub const STALE_REFERENCE: &str = "StaleReference";

/// A recoverable failure raised by (or while talking to) the script VM.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} in {site}: {message}")]
pub struct ScriptFault {
    /// Error class (`RuntimeError`, `SyntaxError`, a metatable `__name`, ...).
    pub kind: String,
    pub message: String,
    /// One entry per stack frame, innermost first.
    pub backtrace: Vec<String>,
    pub site: FaultSite,
}

impl ScriptFault {
    pub fn new(site: FaultSite, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            backtrace: Vec::new(),
            site,
        }
    }

    pub fn with_backtrace(mut self, backtrace: Vec<String>) -> Self {
        self.backtrace = backtrace;
        self
    }

    /// Maps a host-side `mlua` error onto a fault.
    pub fn from_lua(site: FaultSite, err: &mlua::Error) -> Self {
        let kind = match err {
            mlua::Error::SyntaxError { .. } => "SyntaxError",
            mlua::Error::RuntimeError(_) => "RuntimeError",
            mlua::Error::MemoryError(_) => "MemoryError",
            mlua::Error::FromLuaConversionError { .. }
            | mlua::Error::ToLuaConversionError { .. } => "TypeError",
            mlua::Error::CallbackError { .. } => "CallbackError",
            mlua::Error::MismatchedRegistryKey => STALE_REFERENCE,
            _ => "LuaError",
        };

        let message = match err {
            mlua::Error::SyntaxError { message, .. } => message.clone(),
            mlua::Error::CallbackError { traceback, cause } => {
                return Self::new(site, kind, cause.to_string())
                    .with_backtrace(parse_traceback(traceback));
            }
            other => other.to_string(),
        };

        Self::new(site, kind, message)
    }

    pub fn stale(site: FaultSite, what: &str) -> Self {
        Self::new(
            site,
            STALE_REFERENCE,
            format!("{what} belongs to a script generation that is no longer loaded"),
        )
    }
}

/// Splits a `debug.traceback` string into one entry per frame.
pub fn parse_traceback(traceback: &str) -> Vec<String> {
    traceback
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "stack traceback:")
        .map(str::to_string)
        .collect()
}

//=== FaultRecord =========================================================

/// Structured form of a fault sent over the debug channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub kind: String,
    pub value: String,
    pub backtrace: Vec<String>,
    pub site: FaultSite,
    pub frame: u64,
}

//=== Diagnostics =========================================================

/// Collects script faults for the running process.
#[derive(Debug, Default)]
pub struct Diagnostics {
    last_fault: RefCell<Option<ScriptFault>>,
    channel: RefCell<Option<Sender<FaultRecord>>>,
    frame: Cell<u64>,
    reported: Cell<u64>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a debug channel. Replaces any previous one.
    pub fn attach_channel(&self, sender: Sender<FaultRecord>) {
        *self.channel.borrow_mut() = Some(sender);
    }

    pub fn detach_channel(&self) {
        self.channel.borrow_mut().take();
    }

    pub fn has_channel(&self) -> bool {
        self.channel.borrow().is_some()
    }

    /// Frame number stamped onto outgoing records.
    pub fn set_frame(&self, frame: u64) {
        self.frame.set(frame);
    }

    /// Logs the fault, remembers it and forwards it to the debug channel.
    pub fn report(&self, fault: ScriptFault) {
        error!(
            target: "script",
            "{} in {}: {}",
            fault.kind, fault.site, fault.message
        );
        for frame in &fault.backtrace {
            debug!(target: "script", "    {frame}");
        }

        self.reported.set(self.reported.get() + 1);
        self.forward(&fault);
        *self.last_fault.borrow_mut() = Some(fault);
    }

    fn forward(&self, fault: &ScriptFault) {
        let mut channel = self.channel.borrow_mut();
        let Some(sender) = channel.as_ref() else {
            return;
        };

        let record = FaultRecord {
            kind: fault.kind.clone(),
            value: fault.message.clone(),
            backtrace: fault.backtrace.clone(),
            site: fault.site,
            frame: self.frame.get(),
        };

        match sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(target: "script", "Diagnostics channel full, dropping fault record");
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(target: "script", "Diagnostics receiver disconnected, detaching channel");
                channel.take();
            }
        }
    }

    pub fn last_fault(&self) -> Option<ScriptFault> {
        self.last_fault.borrow().clone()
    }

    pub fn take_last_fault(&self) -> Option<ScriptFault> {
        self.last_fault.borrow_mut().take()
    }

    /// Total faults reported since startup.
    pub fn fault_count(&self) -> u64 {
        self.reported.get()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};

    fn sample() -> ScriptFault {
        ScriptFault::new(FaultSite::Update, "RuntimeError", "main.lua:3: boom")
            .with_backtrace(vec!["main.lua:3: in function 'update'".into()])
    }

    #[test]
    fn traceback_lines_are_split_and_trimmed() {
        let trace = "\nstack traceback:\n\tmain.lua:3: in function 'update'\n\t[C]: in ?";
        assert_eq!(
            parse_traceback(trace),
            vec!["main.lua:3: in function 'update'", "[C]: in ?"]
        );
    }

    #[test]
    fn report_keeps_last_fault() {
        let diagnostics = Diagnostics::new();
        diagnostics.report(sample());
        assert_eq!(diagnostics.last_fault(), Some(sample()));
        assert_eq!(diagnostics.fault_count(), 1);
        assert_eq!(diagnostics.take_last_fault(), Some(sample()));
        assert_eq!(diagnostics.last_fault(), None);
    }

    #[test]
    fn attached_channel_receives_records() {
        let diagnostics = Diagnostics::new();
        let (tx, rx) = unbounded();
        diagnostics.attach_channel(tx);
        diagnostics.set_frame(42);

        diagnostics.report(sample());

        let record = rx.try_recv().expect("record sent");
        assert_eq!(record.kind, "RuntimeError");
        assert_eq!(record.value, "main.lua:3: boom");
        assert_eq!(record.site, FaultSite::Update);
        assert_eq!(record.frame, 42);
        assert_eq!(record.backtrace.len(), 1);
    }

    #[test]
    fn disconnected_channel_is_detached() {
        let diagnostics = Diagnostics::new();
        let (tx, rx) = bounded(1);
        diagnostics.attach_channel(tx);
        drop(rx);

        diagnostics.report(sample());
        assert!(!diagnostics.has_channel());
        assert_eq!(diagnostics.fault_count(), 1);
    }

    #[test]
    fn syntax_errors_map_to_syntax_kind() {
        let err = mlua::Error::SyntaxError {
            message: "main.lua:1: unexpected symbol".into(),
            incomplete_input: false,
        };
        let fault = ScriptFault::from_lua(FaultSite::Load, &err);
        assert_eq!(fault.kind, "SyntaxError");
        assert_eq!(fault.message, "main.lua:1: unexpected symbol");
    }
}
