//=========================================================================
// Draw Queue
//=========================================================================
//
// Frame-scoped list of draw requests. Two lanes:
//
//   immediate   drawn first, in call order
//   queued      drawn after, sorted by (z, insertion order)
//
// `begin_frame` empties both; `take_frame` drains both in draw order.
// Nothing survives from one frame into the next.
//
//=========================================================================

use log::trace;

use super::command::DrawCommand;

//=== QueuedItem ==========================================================

#[derive(Debug, Clone, PartialEq)]
struct QueuedItem {
    z: f64,
    seq: u64,
    command: DrawCommand,
}

//=== DrawQueue ===========================================================

#[derive(Debug, Default)]
pub struct DrawQueue {
    immediate: Vec<DrawCommand>,
    queued: Vec<QueuedItem>,
    next_seq: u64,
}

impl DrawQueue {
    /// Depth used for items queued without an explicit z.
    pub const DEFAULT_Z: f64 = 0.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.immediate.clear();
        self.queued.clear();
        self.next_seq = 0;
    }

    pub fn immediate(&mut self, command: DrawCommand) {
        self.immediate.push(command);
    }

    /// Queues a command at `z` (or `DEFAULT_Z`). Equal depths keep
    /// insertion order, so a later call draws on top.
    pub fn queue(&mut self, command: DrawCommand, z: Option<f64>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued.push(QueuedItem {
            z: z.unwrap_or(Self::DEFAULT_Z),
            seq,
            command,
        });
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.queued.is_empty()
    }

    /// Drains the frame in draw order and leaves the queue empty.
    pub fn take_frame(&mut self) -> Vec<DrawCommand> {
        let mut queued = std::mem::take(&mut self.queued);
        queued.sort_by(|a, b| a.z.total_cmp(&b.z).then(a.seq.cmp(&b.seq)));

        let mut commands = std::mem::take(&mut self.immediate);
        commands.extend(queued.into_iter().map(|item| item.command));
        self.next_seq = 0;

        trace!(target: "draw", "Flushing {} draw commands", commands.len());
        commands
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
