//=========================================================================
// Script API: draw
//=========================================================================
//
// Immediate calls (`draw.rect(...)` etc.) land in the immediate lane and
// draw in call order; `draw.queue{ kind = ..., z = ... }` lands in the
// z-sorted lane. Both are valid only during the current frame.
//
//=========================================================================

use std::rc::Rc;

use mlua::{Lua, Table, Value};

use super::{api_error, ApiEnv};
use crate::core::draw::{Color, DrawCommand, TextureId};

pub(super) fn table<'lua>(lua: &'lua Lua, env: &Rc<ApiEnv>) -> mlua::Result<Table<'lua>> {
    let t = lua.create_table()?;

    let e = Rc::clone(env);
    t.set(
        "rect",
        lua.create_function(
            move |_, (x, y, width, height, color, filled): (f32, f32, f32, f32, Value, Option<bool>)| {
                let color = parse_color("draw.rect", color)?;
                e.ctx.draw_queue.borrow_mut().immediate(DrawCommand::Rect {
                    x,
                    y,
                    width,
                    height,
                    color,
                    filled: filled.unwrap_or(true),
                });
                Ok(())
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "circle",
        lua.create_function(
            move |_, (x, y, radius, color, filled): (f32, f32, f32, Value, Option<bool>)| {
                let color = parse_color("draw.circle", color)?;
                e.ctx.draw_queue.borrow_mut().immediate(DrawCommand::Circle {
                    x,
                    y,
                    radius,
                    color,
                    filled: filled.unwrap_or(true),
                });
                Ok(())
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "line",
        lua.create_function(
            move |_, (x1, y1, x2, y2, color, thickness): (f32, f32, f32, f32, Value, Option<f32>)| {
                let color = parse_color("draw.line", color)?;
                e.ctx.draw_queue.borrow_mut().immediate(DrawCommand::Line {
                    x1,
                    y1,
                    x2,
                    y2,
                    thickness: thickness.unwrap_or(1.0),
                    color,
                });
                Ok(())
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "text",
        lua.create_function(
            move |_, (text, x, y, size, color): (String, f32, f32, Option<f32>, Value)| {
                let color = parse_color("draw.text", color)?;
                e.ctx.draw_queue.borrow_mut().immediate(DrawCommand::Text {
                    x,
                    y,
                    text,
                    size: size.unwrap_or(16.0),
                    color,
                });
                Ok(())
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "texture",
        lua.create_function(
            move |_, (texture, x, y, rotation, scale): (u32, f32, f32, Option<f32>, Option<f32>)| {
                e.ctx.draw_queue.borrow_mut().immediate(DrawCommand::Texture {
                    texture: TextureId(texture),
                    x,
                    y,
                    rotation: rotation.unwrap_or(0.0),
                    scale: scale.unwrap_or(1.0),
                    tint: Color::WHITE,
                });
                Ok(())
            },
        )?,
    )?;

    let e = Rc::clone(env);
    t.set(
        "queue",
        lua.create_function(move |_, spec: Table| {
            let command = parse_command(&spec)?;
            let z = spec.get::<_, Option<f64>>("z")?;
            e.ctx.draw_queue.borrow_mut().queue(command, z);
            Ok(())
        })?,
    )?;

    Ok(t)
}

//=== Parsing =============================================================

const QUEUE: &str = "draw.queue";

fn parse_command(spec: &Table<'_>) -> mlua::Result<DrawCommand> {
    let kind: String = spec
        .get::<_, Option<String>>("kind")?
        .ok_or_else(|| api_error(QUEUE, "missing 'kind'"))?;
    let num = |key: &str| -> mlua::Result<f32> {
        spec.get::<_, Option<f32>>(key)?
            .ok_or_else(|| api_error(QUEUE, format!("{kind} needs '{key}'")))
    };
    let opt = |key: &str, default: f32| -> mlua::Result<f32> {
        Ok(spec.get::<_, Option<f32>>(key)?.unwrap_or(default))
    };
    let color = parse_color(QUEUE, spec.get::<_, Value>("color")?)?;
    let filled = spec.get::<_, Option<bool>>("filled")?.unwrap_or(true);

    let command = match kind.as_str() {
        "rect" => DrawCommand::Rect {
            x: num("x")?,
            y: num("y")?,
            width: num("width")?,
            height: num("height")?,
            color,
            filled,
        },
        "circle" => DrawCommand::Circle {
            x: num("x")?,
            y: num("y")?,
            radius: num("radius")?,
            color,
            filled,
        },
        "line" => DrawCommand::Line {
            x1: num("x1")?,
            y1: num("y1")?,
            x2: num("x2")?,
            y2: num("y2")?,
            thickness: opt("thickness", 1.0)?,
            color,
        },
        "text" => DrawCommand::Text {
            x: num("x")?,
            y: num("y")?,
            text: spec
                .get::<_, Option<String>>("text")?
                .ok_or_else(|| api_error(QUEUE, "text needs 'text'"))?,
            size: opt("size", 16.0)?,
            color,
        },
        "texture" => DrawCommand::Texture {
            texture: TextureId(
                spec.get::<_, Option<u32>>("texture")?
                    .ok_or_else(|| api_error(QUEUE, "texture needs 'texture'"))?,
            ),
            x: num("x")?,
            y: num("y")?,
            rotation: opt("rotation", 0.0)?,
            scale: opt("scale", 1.0)?,
            tint: color,
        },
        other => return Err(api_error(QUEUE, format!("unknown kind '{other}'"))),
    };
    Ok(command)
}

/// `nil` (white), a color name, `{ r, g, b[, a] }` or `{ r = .., g = .., b = .., a = .. }`.
fn parse_color(function: &str, value: Value<'_>) -> mlua::Result<Color> {
    match value {
        Value::Nil => Ok(Color::WHITE),
        Value::String(name) => match name.to_str()? {
            "white" => Ok(Color::WHITE),
            "black" => Ok(Color::BLACK),
            "red" => Ok(Color::RED),
            other => Err(api_error(function, format!("unknown color '{other}'"))),
        },
        Value::Table(t) => {
            let channel = |name: &str, index: i64, default: Option<f32>| -> mlua::Result<f32> {
                let named = t.get::<_, Option<f32>>(name)?;
                let positional = t.get::<_, Option<f32>>(index)?;
                named
                    .or(positional)
                    .or(default)
                    .ok_or_else(|| api_error(function, format!("color is missing '{name}'")))
            };
            Ok(Color::rgba(
                channel("r", 1, None)?,
                channel("g", 2, None)?,
                channel("b", 3, None)?,
                channel("a", 4, Some(1.0))?,
            ))
        }
        other => Err(api_error(
            function,
            format!("color must be a name or a table, got {}", other.type_name()),
        )),
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use crate::core::draw::{Color, DrawCommand};
    use crate::core::runtime_context::RuntimeContext;
    use crate::core::script::api::tests::api_vm;

    fn kinds(ctx: &RuntimeContext) -> Vec<String> {
        ctx.draw_queue
            .borrow_mut()
            .take_frame()
            .into_iter()
            .map(|c| match c {
                DrawCommand::Text { text, .. } => text,
                other => other.kind().to_string(),
            })
            .collect()
    }

    #[test]
    fn immediate_then_queued_by_z() {
        let ctx = RuntimeContext::shared();
        api_vm(
            &ctx,
            r#"
            draw.queue{ kind = "text", text = "top", x = 0, y = 0, z = 5 }
            draw.queue{ kind = "text", text = "bottom", x = 0, y = 0, z = -1 }
            draw.rect(0, 0, 10, 10)
            draw.queue{ kind = "text", text = "top2", x = 0, y = 0, z = 5 }
            draw.circle(1, 1, 3, "red", false)
            "#,
        );
        assert_eq!(kinds(&ctx), vec!["rect", "circle", "bottom", "top", "top2"]);
    }

    #[test]
    fn colors_accept_names_lists_and_fields() {
        let ctx = RuntimeContext::shared();
        api_vm(
            &ctx,
            r#"
            draw.line(0, 0, 1, 1, { 0.5, 0.25, 1 })
            draw.line(0, 0, 1, 1, { r = 1, g = 0, b = 0, a = 0.5 }, 3)
            "#,
        );
        let commands = ctx.draw_queue.borrow_mut().take_frame();
        match (&commands[0], &commands[1]) {
            (
                DrawCommand::Line { color: first, .. },
                DrawCommand::Line { color: second, thickness, .. },
            ) => {
                assert_eq!(*first, Color::rgba(0.5, 0.25, 1.0, 1.0));
                assert_eq!(*second, Color::rgba(1.0, 0.0, 0.0, 0.5));
                assert_eq!(*thickness, 3.0);
            }
            other => panic!("unexpected commands {other:?}"),
        }
    }

    #[test]
    fn malformed_queue_items_raise() {
        let ctx = RuntimeContext::shared();
        let vm = api_vm(&ctx, "");
        for source in [
            "draw.queue{ x = 1 }",
            "draw.queue{ kind = 'hexagon' }",
            "draw.queue{ kind = 'rect', x = 0, y = 0, width = 1 }",
            "draw.rect(0, 0, 1, 1, 'chartreuse')",
        ] {
            assert!(vm.exec_source(source, "bad.lua").is_err(), "{source}");
        }
        assert!(ctx.draw_queue.borrow().is_empty());
    }
}
