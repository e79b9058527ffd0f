//=========================================================================
// Sprite Animation
//=========================================================================

/// Steps through a sequence of frame indices at a fixed rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteAnimation {
    frames: Vec<u32>,
    frame_duration: f32,
    elapsed: f32,
    index: usize,
    looping: bool,
    finished: bool,
}

impl SpriteAnimation {
    /// An empty frame list finishes on the first tick.
    pub fn new(frames: Vec<u32>, frame_duration: f32) -> Self {
        Self {
            frames,
            frame_duration: frame_duration.max(0.0),
            elapsed: 0.0,
            index: 0,
            looping: false,
            finished: false,
        }
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Current frame index value, or `None` for an empty sequence.
    pub fn frame(&self) -> Option<u32> {
        self.frames.get(self.index).copied()
    }

    /// Moves the clock forward. Returns `true` on the tick the last frame
    /// has been shown for its full duration.
    pub fn advance(&mut self, dt: f32) -> bool {
        if self.finished {
            return false;
        }
        if self.frames.is_empty() {
            self.finished = !self.looping;
            return self.finished;
        }

        self.elapsed += dt.max(0.0);
        let len = self.frames.len();
        let total = self.frame_duration * len as f32;

        if total <= 0.0 {
            if self.looping {
                return false;
            }
            self.index = len - 1;
            self.finished = true;
            return true;
        }

        if self.elapsed >= total {
            if self.looping {
                self.elapsed %= total;
            } else {
                self.index = len - 1;
                self.finished = true;
                return true;
            }
        }

        self.index = ((self.elapsed / self.frame_duration) as usize).min(len - 1);
        false
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
