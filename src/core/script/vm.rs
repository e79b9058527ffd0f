//=========================================================================
// Script VM
//=========================================================================
//
// One embedded Lua state plus the bookkeeping that ties native
// references to it.
//
// Architecture:
//   ScriptVm (owned by ScriptHost)
//     ├── Lua             the interpreter state
//     └── VmScope         generation, pin ledger, protected-call helper
//
//   VmRef<'a>             borrowed view handed to subsystems per call
//
// Every call into script code goes through the protected-call helper,
// which runs the callee under `xpcall` with a native message handler
// that extracts { kind, message, backtrace } while the failing stack is
// still live. A secondary error raised while converting the error value
// is swallowed there, so it can never leak into the next VM operation.
//
// The VM only gets the safe standard library: `debug` is never loaded,
// so scripts cannot reach the registry behind pinned references.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::trace;
use mlua::{
    FromLua, Function, IntoLuaMulti, Lua, LuaOptions, MultiValue, RegistryKey, StdLib, Table,
    Value,
};

//=== Internal Dependencies ===============================================

use super::fault::{parse_traceback, FaultSite, ScriptFault};
use super::script_ref::{PinLedger, ScriptRef, VmGeneration};

//=== Protected Call Helper ===============================================

const PROTECTED_CALL: &str = r#"
local xpcall, describe = xpcall, ...
return function(f, ...)
    return xpcall(f, describe, ...)
end
"#;

/// Deepest stack level recorded in a backtrace.
const MAX_BACKTRACE_DEPTH: usize = 32;

//=== VmScope =============================================================

/// Per-generation state shared by the VM and every API closure it hosts.
#[derive(Debug, Clone)]
pub struct VmScope {
    generation: VmGeneration,
    ledger: PinLedger,
    protected_call: Rc<RegistryKey>,
}

impl VmScope {
    pub fn generation(&self) -> VmGeneration {
        self.generation
    }

    pub fn pinned_count(&self) -> usize {
        self.ledger.count()
    }
}

//=== ScriptVm ============================================================

/// An embedded Lua VM tagged with its generation.
pub struct ScriptVm {
    lua: Lua,
    scope: VmScope,
}

impl ScriptVm {
    /// Creates an empty VM with the safe standard library.
    pub fn new(generation: VmGeneration) -> Result<Self, ScriptFault> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::new())
            .map_err(|e| ScriptFault::from_lua(FaultSite::Load, &e))?;

        let protected_call = install_protected_call(&lua)
            .map_err(|e| ScriptFault::from_lua(FaultSite::Load, &e))?;

        trace!(target: "script", "Created VM {generation}");

        Ok(Self {
            lua,
            scope: VmScope {
                generation,
                ledger: PinLedger::new(),
                protected_call: Rc::new(protected_call),
            },
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    pub fn scope(&self) -> &VmScope {
        &self.scope
    }

    pub fn generation(&self) -> VmGeneration {
        self.scope.generation
    }

    /// Script values currently pinned by native code for this generation.
    pub fn pinned_count(&self) -> usize {
        self.scope.pinned_count()
    }

    /// Borrowed view for the duration of one call.
    pub fn vm_ref(&self) -> VmRef<'_> {
        VmRef::new(&self.lua, &self.scope)
    }

    /// Prepends `root` to `package.path` so `require` resolves inside it.
    pub fn set_module_root(&self, root: &Path) -> Result<(), ScriptFault> {
        let result: mlua::Result<()> = (|| {
            let package: Table = self.lua.globals().get("package")?;
            let current: String = package.get("path")?;
            let root = root.display();
            package.set("path", format!("{root}/?.lua;{root}/?/init.lua;{current}"))
        })();
        result.map_err(|e| ScriptFault::from_lua(FaultSite::Load, &e))
    }

    /// Compiles and runs one source file.
    pub fn exec_file(&self, path: &Path) -> Result<(), ScriptFault> {
        let source = fs::read_to_string(path).map_err(|e| {
            ScriptFault::new(
                FaultSite::Load,
                "IoError",
                format!("cannot read {}: {e}", path.display()),
            )
        })?;
        self.exec_source(&source, &path.display().to_string())
    }

    /// Compiles and runs a chunk of source under `chunk_name`.
    pub fn exec_source(&self, source: &str, chunk_name: &str) -> Result<(), ScriptFault> {
        let chunk = self
            .lua
            .load(source)
            .set_name(format!("@{chunk_name}"))
            .into_function()
            .map_err(|e| ScriptFault::from_lua(FaultSite::Load, &e))?;

        self.vm_ref()
            .call(FaultSite::Load, Value::Function(chunk), MultiValue::new())
            .map(|_| ())
    }
}

fn install_protected_call(lua: &Lua) -> mlua::Result<RegistryKey> {
    let describe = lua.create_function(|lua, err: Value| describe_error(lua, err))?;
    let helper: Function = lua
        .load(PROTECTED_CALL)
        .set_name("=protected_call")
        .call(describe)?;
    lua.create_registry_value(helper)
}

//--- Message handler ------------------------------------------------------

/// Runs as the `xpcall` handler: turns a raised value into
/// `{ kind, message, backtrace }`.
fn describe_error<'lua>(lua: &'lua Lua, err: Value<'lua>) -> mlua::Result<Table<'lua>> {
    let kind = error_kind(&err);
    let message = match &err {
        Value::String(s) => s.to_string_lossy().into_owned(),
        _ => lua
            .globals()
            .raw_get::<_, Function>("tostring")
            .and_then(|tostring| tostring.call::<_, String>(err))
            .unwrap_or_else(|_| kind.clone()),
    };

    let description = lua.create_table()?;
    description.set("kind", kind)?;
    description.set("message", message)?;
    description.set("backtrace", backtrace(lua).join("\n"))?;
    Ok(description)
}

/// `__name` of a table error's metatable, else a class from the Lua type.
fn error_kind(err: &Value<'_>) -> String {
    match err {
        // strings, and errors raised by host functions
        Value::String(_) | Value::UserData(_) | Value::Error(_) => "RuntimeError".to_string(),
        Value::Table(table) => table
            .get_metatable()
            .and_then(|mt| mt.raw_get::<_, Option<String>>("__name").ok().flatten())
            .unwrap_or_else(|| "table".to_string()),
        other => other.type_name().to_string(),
    }
}

/// One line per active stack level above the handler, innermost first.
fn backtrace(lua: &Lua) -> Vec<String> {
    (1..=MAX_BACKTRACE_DEPTH)
        .map_while(|level| lua.inspect_stack(level))
        .map(|frame| {
            let source = frame.source();
            let location = source.short_src.as_deref().unwrap_or("?").to_string();
            let location = match frame.curr_line() {
                line if line > 0 => format!("{location}:{line}"),
                _ => location,
            };
            match (source.what, frame.names().name) {
                ("main", _) => format!("{location}: in main chunk"),
                (_, Some(name)) => format!("{location}: in function '{name}'"),
                _ => format!("{location}: in ?"),
            }
        })
        .collect()
}

//=== VmRef ===============================================================

/// Borrowed handle to the authoritative VM, valid for one call.
#[derive(Clone, Copy)]
pub struct VmRef<'a> {
    lua: &'a Lua,
    scope: &'a VmScope,
}

impl<'a> VmRef<'a> {
    pub fn new(lua: &'a Lua, scope: &'a VmScope) -> Self {
        Self { lua, scope }
    }

    pub fn lua(&self) -> &'a Lua {
        self.lua
    }

    pub fn generation(&self) -> VmGeneration {
        self.scope.generation
    }

    //--- Pinning ----------------------------------------------------------

    /// Pins a value for as long as the returned reference lives.
    pub fn pin(&self, value: Value<'a>) -> mlua::Result<ScriptRef> {
        ScriptRef::pin(self.lua, value, self.scope.generation, &self.scope.ledger)
    }

    /// Pins a value and wraps it for sharing between snapshots.
    pub fn pin_shared(&self, value: Value<'a>) -> mlua::Result<Rc<ScriptRef>> {
        self.pin(value).map(Rc::new)
    }

    /// Dereferences a pinned value, rejecting other generations.
    pub fn get<T: FromLua<'a>>(&self, site: FaultSite, r: &ScriptRef) -> Result<T, ScriptFault> {
        if r.generation() != self.scope.generation {
            return Err(ScriptFault::stale(site, "script reference"));
        }
        self.lua
            .registry_value(r.key())
            .map_err(|e| ScriptFault::from_lua(site, &e))
    }

    //--- Calls ------------------------------------------------------------

    /// Calls any callable value through the protected-call helper.
    pub fn call(
        &self,
        site: FaultSite,
        callable: Value<'a>,
        mut args: MultiValue<'a>,
    ) -> Result<MultiValue<'a>, ScriptFault> {
        let helper: Function<'a> = self
            .lua
            .registry_value(&self.scope.protected_call)
            .map_err(|e| ScriptFault::from_lua(site, &e))?;

        args.push_front(callable);
        let mut results: MultiValue<'a> = helper
            .call(args)
            .map_err(|e| ScriptFault::from_lua(site, &e))?;

        match results.pop_front() {
            Some(Value::Boolean(true)) => Ok(results),
            _ => Err(fault_from_value(site, results.pop_front().unwrap_or(Value::Nil))),
        }
    }

    /// Calls a pinned callback, passing `receiver` first when present.
    pub fn call_ref<A: IntoLuaMulti<'a>>(
        &self,
        site: FaultSite,
        callback: &ScriptRef,
        receiver: Option<&ScriptRef>,
        args: A,
    ) -> Result<MultiValue<'a>, ScriptFault> {
        let callable: Value<'a> = self.get(site, callback)?;
        let mut args = args
            .into_lua_multi(self.lua)
            .map_err(|e| ScriptFault::from_lua(site, &e))?;
        if let Some(receiver) = receiver {
            args.push_front(self.get(site, receiver)?);
        }
        self.call(site, callable, args)
    }

    /// Calls a global function by name. A missing global is not a fault.
    pub fn call_global<A: IntoLuaMulti<'a>>(
        &self,
        site: FaultSite,
        name: &str,
        args: A,
    ) -> Result<Option<MultiValue<'a>>, ScriptFault> {
        let callable: Value<'a> = self
            .lua
            .globals()
            .get(name)
            .map_err(|e| ScriptFault::from_lua(site, &e))?;
        if callable.is_nil() {
            return Ok(None);
        }
        let args = args
            .into_lua_multi(self.lua)
            .map_err(|e| ScriptFault::from_lua(site, &e))?;
        self.call(site, callable, args).map(Some)
    }
}

/// Lua truthiness of the first returned value.
pub fn is_truthy(values: &MultiValue<'_>) -> bool {
    !matches!(values.iter().next(), None | Some(Value::Nil) | Some(Value::Boolean(false)))
}

/// Builds a fault from the `{ kind, message, backtrace }` table raised by
/// the message handler, or from any other raw error value.
fn fault_from_value(site: FaultSite, value: Value<'_>) -> ScriptFault {
    match value {
        Value::Table(table) => {
            let kind = table
                .get::<_, Option<String>>("kind")
                .ok()
                .flatten()
                .unwrap_or_else(|| "RuntimeError".to_string());
            let message = table
                .get::<_, Option<String>>("message")
                .ok()
                .flatten()
                .unwrap_or_else(|| kind.clone());
            let backtrace = table
                .get::<_, Option<String>>("backtrace")
                .ok()
                .flatten()
                .map(|trace| parse_traceback(&trace))
                .unwrap_or_default();
            ScriptFault::new(site, kind, message).with_backtrace(backtrace)
        }
        Value::String(message) => {
            ScriptFault::new(site, "RuntimeError", message.to_string_lossy().into_owned())
        }
        other => {
            let kind = other.type_name();
            ScriptFault::new(site, kind, kind)
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> ScriptVm {
        ScriptVm::new(VmGeneration(1)).unwrap()
    }

    //=== Protected Calls =================================================

    #[test]
    fn successful_call_returns_values() {
        let vm = vm();
        vm.exec_source("function add(a, b) return a + b end", "test").unwrap();

        let result = vm
            .vm_ref()
            .call_global(FaultSite::Update, "add", (2, 3))
            .unwrap()
            .unwrap();
        let sum: i64 = vm.lua().unpack_multi(result).unwrap();
        assert_eq!(sum, 5);
    }

    #[test]
    fn missing_global_is_not_a_fault() {
        let vm = vm();
        let result = vm.vm_ref().call_global(FaultSite::Update, "update", 0.016);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn raised_string_becomes_runtime_error_with_backtrace() {
        let vm = vm();
        vm.exec_source(
            "local function inner() error('boom') end\nfunction update() inner() end",
            "main.lua",
        )
        .unwrap();

        let fault = vm
            .vm_ref()
            .call_global(FaultSite::Update, "update", ())
            .unwrap_err();
        assert_eq!(fault.kind, "RuntimeError");
        assert!(fault.message.contains("boom"));
        assert_eq!(fault.site, FaultSite::Update);
        assert!(!fault.backtrace.is_empty());
    }

    #[test]
    fn named_error_objects_report_their_class() {
        let vm = vm();
        vm.exec_source(
            r#"
            local Err = { __name = "ValidationError", __tostring = function() return "bad input" end }
            function update() error(setmetatable({}, Err)) end
            "#,
            "main.lua",
        )
        .unwrap();

        let fault = vm.vm_ref().call_global(FaultSite::Update, "update", ()).unwrap_err();
        assert_eq!(fault.kind, "ValidationError");
        assert_eq!(fault.message, "bad input");
    }

    #[test]
    fn failing_tostring_falls_back_to_kind() {
        let vm = vm();
        vm.exec_source(
            r#"
            local Broken = { __name = "BrokenError", __tostring = function() error("nested") end }
            function update() error(setmetatable({}, Broken)) end
            "#,
            "main.lua",
        )
        .unwrap();

        let fault = vm.vm_ref().call_global(FaultSite::Update, "update", ()).unwrap_err();
        assert_eq!(fault.kind, "BrokenError");
        assert_eq!(fault.message, "BrokenError");

        // The VM keeps working after the secondary failure
        vm.exec_source("function ok() return true end", "main.lua").unwrap();
        let values = vm.vm_ref().call_global(FaultSite::Update, "ok", ()).unwrap().unwrap();
        assert!(is_truthy(&values));
    }

    #[test]
    fn syntax_error_is_reported_at_load() {
        let vm = vm();
        let fault = vm.exec_source("function (", "main.lua").unwrap_err();
        assert_eq!(fault.kind, "SyntaxError");
        assert_eq!(fault.site, FaultSite::Load);
    }

    #[test]
    fn debug_library_is_hidden_from_scripts() {
        let vm = vm();
        vm.exec_source(
            r#"
            has_debug = debug ~= nil
            preloaded = package.loaded.debug ~= nil
            required = pcall(require, "debug")
            "#,
            "main.lua",
        )
        .unwrap();

        let globals = vm.lua().globals();
        assert!(!globals.get::<_, bool>("has_debug").unwrap());
        assert!(!globals.get::<_, bool>("preloaded").unwrap());
        assert!(!globals.get::<_, bool>("required").unwrap());
    }

    #[test]
    fn backtrace_names_the_failing_function() {
        let vm = vm();
        vm.exec_source(
            "local function explode() error('deep') end\nfunction update() explode() end",
            "main.lua",
        )
        .unwrap();

        let fault = vm.vm_ref().call_global(FaultSite::Update, "update", ()).unwrap_err();
        assert!(
            fault.backtrace.iter().any(|line| line.contains("main.lua:1")),
            "backtrace was {:?}",
            fault.backtrace
        );
    }

    //=== References ======================================================

    #[test]
    fn call_ref_passes_receiver_first() {
        let vm = vm();
        let vm_ref = vm.vm_ref();
        let receiver = vm.lua().create_table().unwrap();
        receiver.set("name", "hero").unwrap();
        let callback: Function = vm
            .lua()
            .load("return function(self, suffix) return self.name .. suffix end")
            .eval()
            .unwrap();

        let callback = vm_ref.pin(Value::Function(callback)).unwrap();
        let receiver = vm_ref.pin(Value::Table(receiver)).unwrap();
        assert_eq!(vm.pinned_count(), 2);

        let result = vm_ref
            .call_ref(FaultSite::InputCallback, &callback, Some(&receiver), "!")
            .unwrap();
        let text: String = vm.lua().unpack_multi(result).unwrap();
        assert_eq!(text, "hero!");

        drop(callback);
        drop(receiver);
        assert_eq!(vm.pinned_count(), 0);
    }

    #[test]
    fn reference_from_other_generation_is_stale() {
        let old = ScriptVm::new(VmGeneration(1)).unwrap();
        let new = ScriptVm::new(VmGeneration(2)).unwrap();
        let f: Function = old.lua().load("return function() end").eval().unwrap();
        let pinned = old.vm_ref().pin(Value::Function(f)).unwrap();

        let fault = new
            .vm_ref()
            .call_ref(FaultSite::EventSubscriber, &pinned, None, ())
            .unwrap_err();
        assert_eq!(fault.kind, crate::core::script::fault::STALE_REFERENCE);
    }

    #[test]
    fn truthiness_follows_lua_rules() {
        assert!(!is_truthy(&MultiValue::new()));
        assert!(!is_truthy(&MultiValue::from_vec(vec![Value::Nil])));
        assert!(!is_truthy(&MultiValue::from_vec(vec![Value::Boolean(false)])));
        assert!(is_truthy(&MultiValue::from_vec(vec![Value::Integer(0)])));
    }
}
