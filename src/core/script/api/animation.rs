//=========================================================================
// Script API: animation
//=========================================================================

use std::rc::Rc;

use mlua::{Function, Lua, Table, Value};

use super::{api_error, ApiEnv};
use crate::core::animation::{
    AnimationHandle, AnimationTarget, Completion, Easing, LoopMode, SpriteAnimation, Tween,
};
use crate::core::script::VmRef;

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    let e = Rc::clone(env);
    t.set(
        "tween",
        lua.create_function(move |lua, spec: Table| {
            const NAME: &str = "animation.tween";
            let vm = e.vm(lua);
            let target = target_of(&vm, &spec, None)?;

            let to: f64 = spec
                .get::<_, Option<f64>>("to")?
                .ok_or_else(|| api_error(NAME, "missing 'to'"))?;
            let from = match spec.get::<_, Option<f64>>("from")? {
                Some(from) => from,
                None => current_value(&spec)?.unwrap_or(0.0),
            };
            let duration = spec.get::<_, Option<f32>>("duration")?.unwrap_or(0.0);
            if duration < 0.0 {
                return Err(api_error(NAME, "'duration' must not be negative"));
            }
            let easing = match spec.get::<_, Option<String>>("easing")? {
                Some(name) => name.parse::<Easing>().map_err(|err| api_error(NAME, err))?,
                None => Easing::default(),
            };
            let loop_mode = loop_mode(NAME, spec.get::<_, Value>("loop")?)?;

            let tween = Tween::new(from, to, duration).with_easing(easing).with_loop(loop_mode);
            let handle = e
                .ctx
                .animations
                .borrow_mut()
                .start_scripted(vm.generation(), tween, target);
            attach_completion(&e, &vm, handle, spec.get("on_complete")?)?;
            Ok(handle.0)
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "sprite",
        lua.create_function(move |lua, spec: Table| {
            const NAME: &str = "animation.sprite";
            let vm = e.vm(lua);
            let target = target_of(&vm, &spec, Some("frame"))?;

            let frames: Vec<u32> = spec
                .get::<_, Option<Vec<u32>>>("frames")?
                .ok_or_else(|| api_error(NAME, "missing 'frames'"))?;
            if frames.is_empty() {
                return Err(api_error(NAME, "'frames' must not be empty"));
            }
            let frame_duration: f32 = spec
                .get::<_, Option<f32>>("frame_duration")?
                .ok_or_else(|| api_error(NAME, "missing 'frame_duration'"))?;
            if frame_duration <= 0.0 {
                return Err(api_error(NAME, "'frame_duration' must be positive"));
            }
            let looping = loop_mode(NAME, spec.get::<_, Value>("loop")?)?.is_looping();

            let sprite = SpriteAnimation::new(frames, frame_duration).looping(looping);
            let handle = e
                .ctx
                .animations
                .borrow_mut()
                .start_scripted(vm.generation(), sprite, target);
            attach_completion(&e, &vm, handle, spec.get("on_complete")?)?;
            Ok(handle.0)
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "on_complete",
        lua.create_function(move |lua, (handle, callback): (u32, Function)| {
            let handle = AnimationHandle(handle);
            let origin = e.ctx.animations.borrow().origin(handle);
            if !e.may_modify("animation.on_complete", origin) {
                return Ok(false);
            }
            attach_completion(&e, &e.vm(lua), handle, Some(callback))?;
            Ok(true)
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "cancel",
        lua.create_function(move |_, handle: u32| {
            let handle = AnimationHandle(handle);
            let origin = e.ctx.animations.borrow().origin(handle);
            Ok(e.may_modify("animation.cancel", origin)
                && e.ctx.animations.borrow_mut().cancel(handle))
        })?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "is_active",
        lua.create_function(move |_, handle: u32| {
            Ok(e.ctx.animations.borrow().is_active(AnimationHandle(handle)))
        })?,
    )?;

    Ok(t)
}

//=== Helpers =============================================================

/// `target`/`field` from a spec table. No target means a detached clock.
fn target_of<'lua>(
    vm: &VmRef<'lua>,
    spec: &Table<'lua>,
    default_field: Option<&str>,
) -> mlua::Result<AnimationTarget> {
    let target = match spec.get::<_, Option<Table>>("target")? {
        Some(target) => target,
        None => return Ok(AnimationTarget::Detached),
    };
    let field = match (spec.get::<_, Option<String>>("field")?, default_field) {
        (Some(field), _) => field,
        (None, Some(default)) => default.to_string(),
        (None, None) => return Err(api_error("animation", "'target' needs a 'field'")),
    };
    Ok(AnimationTarget::Script {
        table: vm.pin_shared(Value::Table(target))?,
        field,
    })
}

fn current_value(spec: &Table<'_>) -> mlua::Result<Option<f64>> {
    let (Some(target), Some(field)) = (
        spec.get::<_, Option<Table>>("target")?,
        spec.get::<_, Option<String>>("field")?,
    ) else {
        return Ok(None);
    };
    target.get::<_, Option<f64>>(field)
}

fn loop_mode(function: &str, value: Value<'_>) -> mlua::Result<LoopMode> {
    match value {
        Value::Nil | Value::Boolean(false) => Ok(LoopMode::Once),
        Value::Boolean(true) => Ok(LoopMode::Repeat),
        Value::String(s) => s.to_str()?.parse().map_err(|err| api_error(function, err)),
        other => Err(api_error(
            function,
            format!("'loop' must be a boolean or a mode name, got {}", other.type_name()),
        )),
    }
}

fn attach_completion<'lua>(
    env: &ApiEnv,
    vm: &VmRef<'lua>,
    handle: AnimationHandle,
    callback: Option<Function<'lua>>,
) -> mlua::Result<()> {
    if let Some(callback) = callback {
        let callback = vm.pin_shared(Value::Function(callback))?;
        env.ctx
            .animations
            .borrow_mut()
            .on_complete(handle, Completion::Script(callback));
    }
    Ok(())
}

//=========================================================================
// Unit Tests
//=========================================================================
