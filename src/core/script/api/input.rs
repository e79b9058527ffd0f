//=========================================================================
// Script API: input
//=========================================================================

use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use super::{api_error, non_nil, ApiEnv};
use crate::core::input::{Binding, CallbackHandle, InputCallback, Phase};

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    //--- Definitions ------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "define_action",
        lua.create_function(move |_, (name, bindings): (String, Value)| {
            let bindings = parse_bindings("input.define_action", bindings)?;
            e.ctx.input.borrow_mut().define_action(&name, bindings);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "define_action_in_context",
        lua.create_function(move |_, (context, name, bindings): (String, String, Value)| {
            let bindings = parse_bindings("input.define_action_in_context", bindings)?;
            e.ctx
                .input
                .borrow_mut()
                .define_action_in_context(&context, &name, bindings);
            Ok(())
        })?,
    )?;

    //--- Queries ----------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "pressed",
        lua.create_function(move |_, name: String| Ok(e.ctx.input.borrow().is_pressed(&name)))?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "released",
        lua.create_function(move |_, name: String| Ok(e.ctx.input.borrow().is_released(&name)))?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "down",
        lua.create_function(move |_, name: String| Ok(e.ctx.input.borrow().is_down(&name)))?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "mouse_position",
        lua.create_function(move |_, ()| Ok(e.ctx.input.borrow().mouse_position()))?,
    )?;

    //--- Contexts ---------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "push_context",
        lua.create_function(move |_, name: String| {
            e.ctx.input.borrow_mut().push_context(&name);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "pop_context",
        lua.create_function(move |_, ()| Ok(e.ctx.input.borrow_mut().pop_context()))?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "set_context",
        lua.create_function(move |_, name: String| {
            e.ctx.input.borrow_mut().set_context(&name);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "clear_contexts",
        lua.create_function(move |_, ()| {
            e.ctx.input.borrow_mut().clear_contexts();
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "context_active",
        lua.create_function(move |_, name: String| {
            Ok(e.ctx.input.borrow().is_context_active(&name))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "current_context",
        lua.create_function(move |_, ()| {
            Ok(e.ctx.input.borrow().current_context().map(str::to_string))
        })?,
    )?;

    //--- Callbacks --------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "on",
        lua.create_function(
            move |lua, (action, phase, callback, receiver): (String, String, Function, Option<Value>)| {
                let phase: Phase = phase
                    .parse()
                    .map_err(|err| api_error("input.on", err))?;
                let vm = e.vm(lua);
                let callback = vm.pin_shared(Value::Function(callback))?;
                let receiver = non_nil(receiver).map(|r| vm.pin_shared(r)).transpose()?;

                let handle = e
                    .ctx
                    .input
                    .borrow_mut()
                    .on(&action, phase, InputCallback::Script { callback, receiver });
                Ok(handle.0)
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "off",
        lua.create_function(move |_, handle: u32| {
            let handle = CallbackHandle(handle);
            let origin = e.ctx.input.borrow().callback_origin(handle);
            Ok(e.may_modify("input.off", origin) && e.ctx.input.borrow_mut().off(handle))
        })?,
    )?;

    Ok(t)
}

/// A single descriptor string or a list of them.
fn parse_bindings(function: &str, value: Value<'_>) -> mlua::Result<Vec<Binding>> {
    let descriptors: Vec<String> = match value {
        Value::String(s) => vec![s.to_str()?.to_string()],
        Value::Table(list) => list.sequence_values::<String>().collect::<mlua::Result<_>>()?,
        other => {
            return Err(api_error(
                function,
                format!("bindings must be a string or a list, got {}", other.type_name()),
            ))
        }
    };

    descriptors
        .iter()
        .map(|d| d.parse::<Binding>().map_err(|err| api_error(function, err)))
        .collect()
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use crate::core::input::{InputEvent, KeyCode, MouseButton};
    use crate::core::runtime_context::RuntimeContext;
    use crate::core::script::api::tests::api_vm;
    use crate::core::script::FaultSite;

    #[test]
    fn global_fallback_resolves_inside_other_context() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(
            &ctx,
            r#"
            input.define_action("jump", "space")
            input.push_context("menu")
            function query() return input.pressed("jump"), input.current_context() end
            "#,
        );

        ctx.input.borrow_mut().poll(&[InputEvent::key_down(KeyCode::Space)]);
        let values = vm.vm_ref().call_global(FaultSite::Update, "query", ()).unwrap().unwrap();
        let (pressed, current): (bool, String) = vm.lua().unpack_multi(values).unwrap();
        assert!(pressed);
        assert_eq!(current, "menu");

        ctx.input.borrow_mut().poll(&[]);
        let values = vm.vm_ref().call_global(FaultSite::Update, "query", ()).unwrap().unwrap();
        let (pressed, _): (bool, String) = vm.lua().unpack_multi(values).unwrap();
        assert!(!pressed);
    }

    #[test]
    fn binding_lists_or_together() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(
            &ctx,
            r#"
            input.define_action("fire", { "key:f", "mouse:left", "gamepad:0" })
            function query() return input.down("fire") end
            "#,
        );

        ctx.input.borrow_mut().poll(&[InputEvent::button_down(MouseButton::Left)]);
        let values = vm.vm_ref().call_global(FaultSite::Update, "query", ()).unwrap().unwrap();
        let down: bool = vm.lua().unpack_multi(values).unwrap();
        assert!(down);
    }

    #[test]
    fn malformed_binding_raises() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(&ctx, "");
        let fault = vm
            .exec_source("input.define_action('jump', 'key:nope')", "bad.lua")
            .unwrap_err();
        assert!(fault.message.contains("input.define_action"));
    }

    #[test]
    fn on_and_off_manage_pins() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(
            &ctx,
            r#"
            local hero = {}
            handle = input.on("jump", "pressed", function(self) end, hero)
            "#,
        );
        assert_eq!(vm.pinned_count(), 2);
        assert_eq!(ctx.input.borrow().callback_count(), 1);

        vm.exec_source("removed = input.off(handle)", "test.lua").unwrap();
        let removed: bool = vm.lua().globals().get("removed").unwrap();
        assert!(removed);
        assert_eq!(vm.pinned_count(), 0);
    }

    #[test]
    fn context_stack_operations() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(
            &ctx,
            r#"
            input.push_context("gameplay")
            input.push_context("menu")
            a = input.context_active("gameplay")
            popped = input.pop_context()
            input.set_context("cutscene")
            b = input.context_active("gameplay")
            input.clear_contexts()
            c = input.current_context()
            "#,
        );
        let globals = vm.lua().globals();
        assert!(globals.get::<_, bool>("a").unwrap());
        assert_eq!(globals.get::<_, String>("popped").unwrap(), "menu");
        assert!(!globals.get::<_, bool>("b").unwrap());
        assert!(globals.get::<_, Option<String>>("c").unwrap().is_none());
    }
}
