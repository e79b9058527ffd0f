//=========================================================================
// Script API: state_machine
//=========================================================================

use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use super::{api_error, non_nil, ApiEnv};
use crate::core::input::Phase;
use crate::core::state_machine::{self, InputBinding, MachineHandle, StateDefinition};

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    //--- Instances --------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "create",
        lua.create_function(move |lua, (owner, initial): (Option<Value>, String)| {
            let vm = e.vm(lua);
            let owner = non_nil(owner).map(|o| vm.pin_shared(o)).transpose()?;
            let handle = e
                .ctx
                .machines
                .borrow_mut()
                .create(owner, Some(vm.generation()), &initial);
            Ok(handle.0)
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "destroy",
        lua.create_function(move |_, handle: u32| {
            let handle = MachineHandle(handle);
            let origin = e.ctx.machines.borrow().origin(handle);
            Ok(e.may_modify("state_machine.destroy", origin)
                && e.ctx.machines.borrow_mut().destroy(handle))
        })?,
    )?;

    //--- Definitions ------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "define_state",
        lua.create_function(move |lua, (handle, state, spec): (u32, String, Option<Table>)| {
            const NAME: &str = "state_machine.define_state";
            let origin = e.ctx.machines.borrow().origin(MachineHandle(handle));
            if !e.may_modify(NAME, origin) {
                return Err(api_error(NAME, format!("no machine {handle}")));
            }
            let vm = e.vm(lua);
            let mut definition = StateDefinition::new();

            if let Some(spec) = spec {
                if let Some(on) = spec.get::<_, Option<Table>>("on")? {
                    for pair in on.pairs::<String, String>() {
                        let (event, target) = pair?;
                        definition = definition.on(event, target);
                    }
                }
                if let Some(enter) = spec.get::<_, Option<Function>>("enter")? {
                    definition.on_enter = Some(vm.pin_shared(Value::Function(enter))?);
                }
                if let Some(exit) = spec.get::<_, Option<Function>>("exit")? {
                    definition.on_exit = Some(vm.pin_shared(Value::Function(exit))?);
                }
            }

            let defined = e
                .ctx
                .machines
                .borrow_mut()
                .define_state(MachineHandle(handle), &state, definition);
            if !defined {
                return Err(api_error(NAME, format!("no machine {handle}")));
            }
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "bind_input",
        lua.create_function(move |lua, (handle, spec): (u32, Table)| {
            const NAME: &str = "state_machine.bind_input";
            if !e.may_modify(NAME, e.ctx.machines.borrow().origin(MachineHandle(handle))) {
                return Ok(false);
            }
            let required = |key: &str| -> mlua::Result<String> {
                spec.get::<_, Option<String>>(key)?
                    .ok_or_else(|| api_error(NAME, format!("missing '{key}'")))
            };

            let from = required("from")?;
            let to = required("to")?;
            let action = required("action")?;
            let phase: Phase = match spec.get::<_, Option<String>>("phase")? {
                Some(p) => p.parse().map_err(|err| api_error(NAME, err))?,
                None => Phase::Pressed,
            };

            let mut binding = InputBinding::new(MachineHandle(handle), action, phase, from, to);
            if spec.get::<_, Option<bool>>("forced")?.unwrap_or(false) {
                binding = binding.forced();
            }
            if let Some(condition) = spec.get::<_, Option<Function>>("condition")? {
                binding = binding.with_condition(e.vm(lua).pin_shared(Value::Function(condition))?);
            }

            Ok(e.ctx.machines.borrow_mut().bind_input(binding))
        })?,
    )?;

    //--- Transitions ------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "trigger",
        lua.create_function(move |lua, (handle, event): (u32, String)| {
            let handle = MachineHandle(handle);
            if !e.may_modify("state_machine.trigger", e.ctx.machines.borrow().origin(handle)) {
                return Ok(false);
            }
            let vm = e.vm(lua);
            Ok(state_machine::request_trigger(&e.ctx, &vm, handle, &event))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "set_state",
        lua.create_function(move |lua, (handle, state): (u32, String)| {
            let handle = MachineHandle(handle);
            if !e.may_modify("state_machine.set_state", e.ctx.machines.borrow().origin(handle)) {
                return Ok(false);
            }
            let vm = e.vm(lua);
            Ok(state_machine::request_set_state(&e.ctx, &vm, handle, &state))
        })?,
    )?;

    //--- Queries ----------------------------------------------------------

    let e = Rc::clone(env);
    t.set(
        "current",
        lua.create_function(move |_, handle: u32| {
            Ok(e.ctx
                .machines
                .borrow()
                .current(MachineHandle(handle))
                .map(str::to_string))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "time_in_state",
        lua.create_function(move |_, handle: u32| {
            Ok(e.ctx.machines.borrow().time_in_state(MachineHandle(handle)))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "set_active",
        lua.create_function(move |_, (handle, active): (u32, bool)| {
            let handle = MachineHandle(handle);
            let origin = e.ctx.machines.borrow().origin(handle);
            Ok(e.may_modify("state_machine.set_active", origin)
                && e.ctx.machines.borrow_mut().set_active(handle, active))
        })?,
    )?;

    Ok(t)
}

//=========================================================================
// Unit Tests
//=========================================================================
