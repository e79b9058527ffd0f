//=========================================================================
// ScriptRef
//=========================================================================
//
// The only native container for script values.
//
// Constructing a ScriptRef pins the value in the VM registry and bumps
// the owning generation's pin ledger. Dropping it unpins exactly once.
// Native tables that need to hand the same value to several snapshots
// hold `Rc<ScriptRef>`; the pin lives until the last clone is dropped.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use mlua::{Lua, RegistryKey, Value};

//=== VmGeneration ========================================================

/// Identifies one VM instance over the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VmGeneration(pub u64);

impl fmt::Display for VmGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

//=== PinLedger ===========================================================

/// Live pin count of one VM generation.
#[derive(Debug, Clone, Default)]
pub struct PinLedger(Rc<Cell<usize>>);

impl PinLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.get()
    }

    fn increment(&self) {
        self.0.set(self.0.get() + 1);
    }

    fn decrement(&self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

//=== ScriptRef ===========================================================

/// A script value pinned against garbage collection.
pub struct ScriptRef {
    key: RegistryKey,
    generation: VmGeneration,
    ledger: PinLedger,
}

impl ScriptRef {
    /// Pins `value` in `lua`'s registry on behalf of `generation`.
    pub(crate) fn pin<'lua>(
        lua: &'lua Lua,
        value: Value<'lua>,
        generation: VmGeneration,
        ledger: &PinLedger,
    ) -> mlua::Result<Self> {
        let key = lua.create_registry_value(value)?;
        ledger.increment();
        Ok(Self {
            key,
            generation,
            ledger: ledger.clone(),
        })
    }

    pub fn generation(&self) -> VmGeneration {
        self.generation
    }

    pub(crate) fn key(&self) -> &RegistryKey {
        &self.key
    }
}

impl Drop for ScriptRef {
    fn drop(&mut self) {
        // The RegistryKey releases its slot when it drops right after this
        self.ledger.decrement();
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRef")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Whether an optional shared reference was pinned by `generation`.
pub fn pinned_by(value: Option<&Rc<ScriptRef>>, generation: VmGeneration) -> bool {
    value.is_some_and(|r| r.generation() == generation)
}

//=========================================================================
// Unit Tests
//=========================================================================
