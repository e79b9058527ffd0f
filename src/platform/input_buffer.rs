//=========================================================================
// Input Buffer
//
// Collects normalized device events between two frame boundaries.
//
// Responsibilities:
// - Keep discrete events (keys, buttons) in arrival order
// - Coalesce cursor movement to the last known position
// - Hand the whole batch over once per frame via `drain()`
//
//=========================================================================

//=== Internal Dependencies ===============================================

use crate::core::input::InputEvent;

//=== InputBuffer =========================================================

#[derive(Debug, Default)]
pub(crate) struct InputBuffer {
    discrete: Vec<InputEvent>,
    last_move: Option<InputEvent>,
}

impl InputBuffer {
    pub(crate) fn new() -> Self {
        Self {
            discrete: Vec::with_capacity(16),
            last_move: None,
        }
    }

    pub(crate) fn push(&mut self, event: InputEvent) {
        match event {
            InputEvent::MouseMoved { .. } => self.last_move = Some(event),
            InputEvent::Unidentified => {}
            _ => self.discrete.push(event),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.discrete.is_empty() && self.last_move.is_none()
    }

    /// The frame's events: discrete ones in order, then the final cursor
    /// position. Leaves the buffer empty.
    pub(crate) fn drain(&mut self) -> Vec<InputEvent> {
        let mut batch = std::mem::take(&mut self.discrete);
        batch.extend(self.last_move.take());
        batch
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
