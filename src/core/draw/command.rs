//=========================================================================
// Draw Commands
//=========================================================================

use std::fmt;

//=== Color ===============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(0.85, 0.1, 0.1);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

//=== TextureId ===========================================================

/// Opaque handle into the render backend's texture store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

//=== DrawCommand =========================================================

/// One primitive, in world coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
        filled: bool,
    },
    Circle {
        x: f32,
        y: f32,
        radius: f32,
        color: Color,
        filled: bool,
    },
    Line {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        thickness: f32,
        color: Color,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        size: f32,
        color: Color,
    },
    Texture {
        texture: TextureId,
        x: f32,
        y: f32,
        rotation: f32,
        scale: f32,
        tint: Color,
    },
}

impl DrawCommand {
    pub fn kind(&self) -> &'static str {
        match self {
            DrawCommand::Rect { .. } => "rect",
            DrawCommand::Circle { .. } => "circle",
            DrawCommand::Line { .. } => "line",
            DrawCommand::Text { .. } => "text",
            DrawCommand::Texture { .. } => "texture",
        }
    }
}
