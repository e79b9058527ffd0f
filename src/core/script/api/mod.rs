//=========================================================================
// Script API
//
// The Lua globals a script image sees: `input`, `events`,
// `state_machine`, `animation`, `draw` and `camera`, plus `print`
// routed to the log.
//
// Every function closes over an `ApiEnv`: the shared runtime context and
// the scope (generation, pin ledger) of the VM it was installed into.
// Values a function keeps are pinned through that scope, so they are
// released with the generation that created them.
//
// Functions taking a handle only modify what `ApiEnv::may_modify`
// allows. An image still in its `init` cannot reach the live image's
// registrations, so a reload that fails leaves them as they were.
//
//=========================================================================

//=== Submodules ==========================================================

mod animation;
mod camera;
mod draw;
mod events;
mod input;
mod state_machine;

//=== External Dependencies ===============================================

use std::fmt::Display;
use std::rc::Rc;

use log::{debug, info};
use mlua::{Lua, Value, Variadic};

//=== Internal Dependencies ===============================================

use super::script_ref::VmGeneration;
use super::vm::{ScriptVm, VmRef, VmScope};
use crate::core::runtime_context::RuntimeContext;

//=== ApiEnv ==============================================================

pub(crate) struct ApiEnv {
    pub ctx: Rc<RuntimeContext>,
    pub scope: VmScope,
}

impl ApiEnv {
    pub fn vm<'a>(&'a self, lua: &'a Lua) -> VmRef<'a> {
        VmRef::new(lua, &self.scope)
    }

    /// Whether this image may modify a registration with `origin`, as
    /// returned by the subsystems' origin lookups. Unknown handles: never.
    pub fn may_modify(&self, function: &str, origin: Option<Option<VmGeneration>>) -> bool {
        let Some(origin) = origin else {
            return false;
        };
        let generation = self.scope.generation();
        let allowed = self.ctx.may_modify(generation, origin);
        if !allowed {
            debug!(
                target: "script",
                "{function}: {generation} may not modify a registration of {}",
                origin.map_or_else(|| "native code".to_string(), |g| g.to_string())
            );
        }
        allowed
    }
}

//=== install() ===========================================================

/// Installs the API tables into a fresh VM.
pub fn install(vm: &ScriptVm, ctx: &Rc<RuntimeContext>) -> mlua::Result<()> {
    let env = Rc::new(ApiEnv {
        ctx: Rc::clone(ctx),
        scope: vm.scope().clone(),
    });
    let lua = vm.lua();
    let globals = lua.globals();

    globals.set("input", input::table(lua, &env)?)?;
    globals.set("events", events::table(lua, &env)?)?;
    globals.set("state_machine", state_machine::table(lua, &env)?)?;
    globals.set("animation", animation::table(lua, &env)?)?;
    globals.set("draw", draw::table(lua, &env)?)?;
    globals.set("camera", camera::table(lua, &env)?)?;

    let generation = vm.generation();
    let print = lua.create_function(move |lua, args: Variadic<Value>| {
        let mut line = String::new();
        for (i, value) in args.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            match lua.coerce_string(value.clone())? {
                Some(s) => line.push_str(&s.to_string_lossy()),
                None => line.push_str(value.type_name()),
            }
        }
        info!(target: "script", "[{generation}] {line}");
        Ok(())
    })?;
    globals.set("print", print)?;

    Ok(())
}

//=== Helpers =============================================================

/// Argument error raised back into the calling script.
pub(crate) fn api_error(function: &str, message: impl Display) -> mlua::Error {
    mlua::Error::RuntimeError(format!("{function}: {message}"))
}

/// Treats `nil` the same as an absent argument.
pub(crate) fn non_nil(value: Option<Value<'_>>) -> Option<Value<'_>> {
    value.filter(|v| !v.is_nil())
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A VM with the API installed against `ctx`, with `source` already run.
    pub(crate) fn api_vm(ctx: &Rc<RuntimeContext>, source: &str) -> ScriptVm {
        let vm = ScriptVm::new(VmGeneration(1)).unwrap();
        install(&vm, ctx).unwrap();
        ctx.set_live_generation(Some(vm.generation()));
        vm.exec_source(source, "test.lua").unwrap();
        vm
    }

    #[test]
    fn every_table_is_installed() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(&ctx, "");
        for name in ["input", "events", "state_machine", "animation", "draw", "camera"] {
            let value: Value = vm.lua().globals().get(name).unwrap();
            assert!(matches!(value, Value::Table(_)), "{name}");
        }
    }

    #[test]
    fn print_does_not_raise() {
        let ctx = RuntimeContext::shared();
        api_vm(&ctx, "print('hello', 1, nil, {})");
    }

    #[test]
    fn image_not_yet_live_only_modifies_its_own_registrations() {
        use crate::core::input::Phase;
        use crate::core::state_machine::MachineHandle;

        let ctx = RuntimeContext::shared();
        let live = api_vm(
            &ctx,
            "h = input.on('jump', 'pressed', function() end); m = state_machine.create(nil, 'idle')",
        );
        let native = ctx.input.borrow_mut().on_native("jump", Phase::Pressed, |_, _| {});
        let (h, m): (u32, u32) = live.lua().load("return h, m").eval().unwrap();

        let next = ScriptVm::new(VmGeneration(2)).unwrap();
        install(&next, &ctx).unwrap();
        next.exec_source(
            &format!(
                r#"
                off_script = input.off({h})
                off_native = input.off({native})
                moved = state_machine.set_state({m}, "dead")
                paused = state_machine.set_active({m}, false)
                defined = pcall(state_machine.define_state, {m}, "dead", {{}})
                own = state_machine.create(nil, "a")
                own_moved = state_machine.set_state(own, "b")
                "#,
                native = native.0
            ),
            "next.lua",
        )
        .unwrap();

        let results: (bool, bool, bool, bool, bool, bool) = next
            .lua()
            .load("return off_script, off_native, moved, paused, defined, own_moved")
            .eval()
            .unwrap();
        assert_eq!(results, (false, false, false, false, false, true));
        assert_eq!(ctx.input.borrow().callback_count(), 2);
        assert_eq!(ctx.machines.borrow().current(MachineHandle(m)), Some("idle"));

        ctx.set_live_generation(Some(next.generation()));
        let removed: bool = next.lua().load(format!("return input.off({})", native.0)).eval().unwrap();
        assert!(removed, "native registrations open up once live");
    }

    #[test]
    fn argument_errors_surface_as_runtime_faults() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(&ctx, "function bad() input.on('jump', 'sideways', function() end) end");
        let fault = vm
            .vm_ref()
            .call_global(crate::core::script::FaultSite::Update, "bad", ())
            .unwrap_err();
        assert_eq!(fault.site, crate::core::script::FaultSite::Update);
        assert!(fault.message.contains("input.on"));
    }
}
