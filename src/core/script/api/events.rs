//=========================================================================
// Script API: events
//=========================================================================

use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use super::{api_error, ApiEnv};
use crate::core::events::{CustomEvent, EventKind, SubscriptionHandle};

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    let e = Rc::clone(env);
    t.set(
        "subscribe",
        lua.create_function(move |lua, (kind, callback): (String, Function)| {
            let kind: EventKind = kind
                .parse()
                .map_err(|err| api_error("events.subscribe", err))?;
            let callback = e.vm(lua).pin_shared(Value::Function(callback))?;
            let handle = e.ctx.events.borrow_mut().subscribe_script(kind, callback);
            Ok(handle.0)
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "unsubscribe",
        lua.create_function(move |_, handle: u32| {
            let handle = SubscriptionHandle(handle);
            let origin = e.ctx.events.borrow().subscription_origin(handle);
            Ok(e.may_modify("events.unsubscribe", origin)
                && e.ctx.events.borrow_mut().unsubscribe(handle))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "emit",
        lua.create_function(move |_, name: String| {
            e.ctx.events.borrow_mut().enqueue(CustomEvent { name });
            Ok(())
        })?,
    )?;

    Ok(t)
}

//=========================================================================
// Unit Tests
//=========================================================================
