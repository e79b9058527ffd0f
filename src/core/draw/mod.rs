//=========================================================================
// Draw
//
// Frame-scoped drawing: the draw queue scripts fill during `draw()`, and
// the `RenderBackend` seam the queue is flushed into.
//
// Responsibilities:
// - Primitive commands (`command`)
// - The z-ordered queue (`draw_queue`)
// - `flush`: frame step 11, including the script error banner
//
//=========================================================================

//=== Submodules ==========================================================

mod command;
mod draw_queue;

pub use command::{Color, DrawCommand, TextureId};
pub use draw_queue::DrawQueue;

//=== External Dependencies ===============================================

use std::collections::VecDeque;

use log::debug;

//=== Internal Dependencies ===============================================

use crate::core::camera::View;
use crate::core::runtime_context::RuntimeContext;

//=== RenderBackend =======================================================

/// The rasterizer the queue is flushed into.
pub trait RenderBackend {
    fn begin_frame(&mut self, view: &View);

    fn draw(&mut self, command: &DrawCommand);

    /// Presents the finished frame.
    fn end_frame(&mut self);
}

//=== RecordingBackend ====================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedFrame {
    pub view: View,
    pub commands: Vec<DrawCommand>,
    pub presented: bool,
}

/// Keeps the most recent frames instead of rasterizing them.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    frames: VecDeque<RecordedFrame>,
    history: usize,
    presented: u64,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_history(usize::MAX)
    }
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `history` frames (at least one).
    pub fn with_history(history: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            history: history.max(1),
            presented: 0,
        }
    }

    pub fn frames(&self) -> impl Iterator<Item = &RecordedFrame> {
        self.frames.iter()
    }

    pub fn last_frame(&self) -> Option<&RecordedFrame> {
        self.frames.back()
    }

    pub fn presented_count(&self) -> u64 {
        self.presented
    }
}

impl RenderBackend for RecordingBackend {
    fn begin_frame(&mut self, view: &View) {
        if self.frames.len() == self.history {
            self.frames.pop_front();
        }
        self.frames.push_back(RecordedFrame {
            view: *view,
            commands: Vec::new(),
            presented: false,
        });
    }

    fn draw(&mut self, command: &DrawCommand) {
        if let Some(frame) = self.frames.back_mut() {
            frame.commands.push(command.clone());
        }
    }

    fn end_frame(&mut self) {
        if let Some(frame) = self.frames.back_mut() {
            frame.presented = true;
        }
        self.presented += 1;
    }
}

//=== flush() =============================================================

/// Issues the frame's draw commands in order, then the error banner if any.
pub fn flush(ctx: &RuntimeContext, backend: &mut dyn RenderBackend, error_banner: Option<&str>) {
    let commands = ctx.draw_queue.borrow_mut().take_frame();
    let view = ctx.camera.borrow().view();

    backend.begin_frame(&view);
    for command in &commands {
        backend.draw(command);
    }
    if let Some(message) = error_banner {
        debug!(target: "draw", "Drawing script error banner");
        for command in error_banner_commands(&view, message) {
            backend.draw(&command);
        }
    }
}

/// A red strip with the fault message, pinned to the top-left of the view.
pub fn error_banner_commands(view: &View, message: &str) -> [DrawCommand; 2] {
    let zoom = view.zoom.max(f32::EPSILON);
    let scale = 1.0 / zoom;
    [
        DrawCommand::Rect {
            x: view.x,
            y: view.y,
            width: 640.0 * scale,
            height: 28.0 * scale,
            color: Color::RED,
            filled: true,
        },
        DrawCommand::Text {
            x: view.x + 8.0 * scale,
            y: view.y + 6.0 * scale,
            text: format!("script error: {message}"),
            size: 16.0 * scale,
            color: Color::WHITE,
        },
    ]
}

//=========================================================================
// Unit Tests
//=========================================================================
