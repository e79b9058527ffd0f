//=========================================================================
// Animation Manager
//=========================================================================
//
// Owns every running tween and sprite player.
//
// `advance` only moves clocks and reports. It hands back the values to
// write into script tables and the completion callbacks of instances
// that finished on this tick; the caller applies both after the whole
// set has been advanced. Anything started from a completion callback is
// added after the advance pass and first moves on the next tick.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

//=== Internal Dependencies ===============================================

use super::sprite::SpriteAnimation;
use super::tween::Tween;
use crate::core::script::{pinned_by, ScriptRef, VmGeneration};

//=== Handles & Targets ===================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationHandle(pub u32);

impl fmt::Display for AnimationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "animation#{}", self.0)
    }
}

pub type NativeCompletionFn = Rc<RefCell<dyn FnMut(AnimationHandle)>>;

/// Where the animated value goes each tick.
#[derive(Clone, Default)]
pub enum AnimationTarget {
    /// A field of a script table.
    Script { table: Rc<ScriptRef>, field: String },
    /// A native cell, written directly during the advance pass.
    Native(Rc<Cell<f64>>),
    /// Clock only; useful as a timer with a completion callback.
    #[default]
    Detached,
}

impl fmt::Debug for AnimationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnimationTarget::Script { field, .. } => write!(f, "Script({field})"),
            AnimationTarget::Native(cell) => write!(f, "Native({})", cell.get()),
            AnimationTarget::Detached => f.write_str("Detached"),
        }
    }
}

#[derive(Clone)]
pub enum Completion {
    Script(Rc<ScriptRef>),
    Native(NativeCompletionFn),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Script(_) => f.write_str("Completion::Script"),
            Completion::Native(_) => f.write_str("Completion::Native"),
        }
    }
}

//=== Animator ============================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Animator {
    Tween(Tween),
    Sprite(SpriteAnimation),
}

/// A value produced by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnimatedValue {
    Number(f64),
    Frame(u32),
}

impl AnimatedValue {
    pub fn as_f64(self) -> f64 {
        match self {
            AnimatedValue::Number(n) => n,
            AnimatedValue::Frame(i) => f64::from(i),
        }
    }
}

impl Animator {
    fn advance(&mut self, dt: f32) -> bool {
        match self {
            Animator::Tween(tween) => tween.advance(dt),
            Animator::Sprite(sprite) => sprite.advance(dt),
        }
    }

    fn value(&self) -> Option<AnimatedValue> {
        match self {
            Animator::Tween(tween) => Some(AnimatedValue::Number(tween.value())),
            Animator::Sprite(sprite) => sprite.frame().map(AnimatedValue::Frame),
        }
    }
}

impl From<Tween> for Animator {
    fn from(tween: Tween) -> Self {
        Animator::Tween(tween)
    }
}

impl From<SpriteAnimation> for Animator {
    fn from(sprite: SpriteAnimation) -> Self {
        Animator::Sprite(sprite)
    }
}

//=== Advance Report ======================================================

/// A pending write into a script table.
#[derive(Debug, Clone)]
pub struct ScriptWrite {
    pub handle: AnimationHandle,
    pub table: Rc<ScriptRef>,
    pub field: String,
    pub value: AnimatedValue,
}

#[derive(Debug, Clone)]
pub struct Finished {
    pub handle: AnimationHandle,
    pub completions: Vec<Completion>,
}

#[derive(Debug, Default)]
pub struct AdvanceReport {
    pub writes: Vec<ScriptWrite>,
    pub finished: Vec<Finished>,
}

//=== AnimationManager ====================================================

struct Entry {
    handle: AnimationHandle,
    /// Generation that started it, `None` for native animations.
    origin: Option<VmGeneration>,
    animator: Animator,
    target: AnimationTarget,
    completions: Vec<Completion>,
}

#[derive(Default)]
pub struct AnimationManager {
    entries: Vec<Entry>,
    next_handle: u32,
}

impl fmt::Debug for AnimationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnimationManager")
            .field("active", &self.entries.len())
            .finish()
    }
}

impl AnimationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, animator: impl Into<Animator>, target: AnimationTarget) -> AnimationHandle {
        self.start_entry(None, animator.into(), target)
    }

    /// Starts an animation owned by script `generation`. It is dropped
    /// with that generation even when it has no script target.
    pub fn start_scripted(
        &mut self,
        generation: VmGeneration,
        animator: impl Into<Animator>,
        target: AnimationTarget,
    ) -> AnimationHandle {
        self.start_entry(Some(generation), animator.into(), target)
    }

    fn start_entry(
        &mut self,
        origin: Option<VmGeneration>,
        animator: Animator,
        target: AnimationTarget,
    ) -> AnimationHandle {
        self.next_handle += 1;
        let handle = AnimationHandle(self.next_handle);

        trace!(target: "animation", "Started {handle} -> {target:?}");

        self.entries.push(Entry {
            handle,
            origin,
            animator,
            target,
            completions: Vec::new(),
        });
        handle
    }

    /// Adds a completion callback. Returns `false` if `handle` is not running.
    pub fn on_complete(&mut self, handle: AnimationHandle, completion: Completion) -> bool {
        match self.entries.iter_mut().find(|e| e.handle == handle) {
            Some(entry) => {
                entry.completions.push(completion);
                true
            }
            None => false,
        }
    }

    pub fn on_complete_native<F>(&mut self, handle: AnimationHandle, f: F) -> bool
    where
        F: FnMut(AnimationHandle) + 'static,
    {
        self.on_complete(handle, Completion::Native(Rc::new(RefCell::new(f))))
    }

    /// Stops an animation without firing its completions.
    pub fn cancel(&mut self, handle: AnimationHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        let removed = self.entries.len() != before;
        if removed {
            debug!(target: "animation", "Cancelled {handle}");
        }
        removed
    }

    /// Origin of a running animation; `None` for unknown handles.
    pub fn origin(&self, handle: AnimationHandle) -> Option<Option<VmGeneration>> {
        self.entries.iter().find(|e| e.handle == handle).map(|e| e.origin)
    }

    pub fn is_active(&self, handle: AnimationHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn value(&self, handle: AnimationHandle) -> Option<AnimatedValue> {
        self.entries
            .iter()
            .find(|e| e.handle == handle)
            .and_then(|e| e.animator.value())
    }

    //--- Advance Pass -----------------------------------------------------

    /// Advances every instance by `dt` and removes the ones that finished.
    pub fn advance(&mut self, dt: f32) -> AdvanceReport {
        let mut report = AdvanceReport::default();

        for entry in &mut self.entries {
            let completed = entry.animator.advance(dt);

            if let Some(value) = entry.animator.value() {
                match &entry.target {
                    AnimationTarget::Native(cell) => cell.set(value.as_f64()),
                    AnimationTarget::Script { table, field } => report.writes.push(ScriptWrite {
                        handle: entry.handle,
                        table: Rc::clone(table),
                        field: field.clone(),
                        value,
                    }),
                    AnimationTarget::Detached => {}
                }
            }

            if completed {
                report.finished.push(Finished {
                    handle: entry.handle,
                    completions: std::mem::take(&mut entry.completions),
                });
            }
        }

        if !report.finished.is_empty() {
            let done: Vec<AnimationHandle> = report.finished.iter().map(|f| f.handle).collect();
            self.entries.retain(|e| !done.contains(&e.handle));
            trace!(target: "animation", "{} animations completed", done.len());
        }

        report
    }

    //--- Lifecycle --------------------------------------------------------

    /// Drops animations started by `generation` or targeting its tables,
    /// and completion callbacks pinned by it. Returns the number of
    /// animations and references released.
    pub fn release_generation(&mut self, generation: VmGeneration) -> usize {
        let mut released = 0;

        self.entries.retain_mut(|entry| {
            let targets_generation = matches!(
                &entry.target,
                AnimationTarget::Script { table, .. } if pinned_by(Some(table), generation)
            );
            if entry.origin == Some(generation) || targets_generation {
                released += 1 + entry.completions.len();
                return false;
            }
            let before = entry.completions.len();
            entry.completions.retain(|c| match c {
                Completion::Script(callback) => !pinned_by(Some(callback), generation),
                Completion::Native(_) => true,
            });
            released += before - entry.completions.len();
            true
        });

        released
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
