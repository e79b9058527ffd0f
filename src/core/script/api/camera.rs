//=========================================================================
// Script API: camera
//=========================================================================

use std::rc::Rc;

use mlua::{Lua, Table};

use super::ApiEnv;

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    let e = Rc::clone(env);
    t.set(
        "set_position",
        lua.create_function(move |_, (x, y): (f32, f32)| {
            e.ctx.camera.borrow_mut().set_position(x, y);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "follow",
        lua.create_function(move |_, (x, y): (f32, f32)| {
            e.ctx.camera.borrow_mut().follow(x, y);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "set_zoom",
        lua.create_function(move |_, zoom: f32| {
            e.ctx.camera.borrow_mut().set_zoom(zoom);
            Ok(())
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "position",
        lua.create_function(move |_, ()| Ok(e.ctx.camera.borrow().position()))?,
    )?;

    Ok(t)
}
