//=========================================================================
// Animation
//
// Tweens, sprite frame sequences and their completion callbacks.
//
// `update` runs two passes per frame:
//   1. advance every instance and write its value to its target
//   2. notify completions of the instances that finished in pass 1
//
// A completion callback therefore sees every animation already advanced,
// and an animation it starts is not advanced until the next frame.
//
//=========================================================================

//=== Submodules ==========================================================

mod easing;
mod manager;
mod sprite;
mod tween;

pub use easing::Easing;
pub use manager::{
    AdvanceReport, AnimatedValue, AnimationHandle, AnimationManager, AnimationTarget, Animator,
    Completion, Finished, NativeCompletionFn, ScriptWrite,
};
pub use sprite::SpriteAnimation;
pub use tween::{LoopMode, Tween};

//=== External Dependencies ===============================================

use log::warn;
use mlua::{Table, Value};

//=== Internal Dependencies ===============================================

use crate::core::runtime_context::RuntimeContext;
use crate::core::script::{FaultSite, ScriptFault, VmRef};

//=== update() ============================================================

pub fn update(ctx: &RuntimeContext, vm: &VmRef<'_>, dt: f32) {
    let report = ctx.animations.borrow_mut().advance(dt);

    for write in &report.writes {
        if let Err(fault) = apply_write(vm, write) {
            // A broken target would fault every frame; stop it here.
            ctx.animations.borrow_mut().cancel(write.handle);
            ctx.diagnostics.report(fault);
        }
    }

    for finished in report.finished {
        for completion in finished.completions {
            match completion {
                Completion::Native(f) => match f.try_borrow_mut() {
                    Ok(mut f) => (&mut *f)(finished.handle),
                    Err(_) => warn!(target: "animation", "Skipped reentrant completion"),
                },
                Completion::Script(callback) => {
                    let result =
                        vm.call_ref(FaultSite::AnimationCompletion, &callback, None, finished.handle.0);
                    if let Err(fault) = result {
                        ctx.diagnostics.report(fault);
                    }
                }
            }
        }
    }
}

fn apply_write(vm: &VmRef<'_>, write: &ScriptWrite) -> Result<(), ScriptFault> {
    let table: Table = vm.get(FaultSite::AnimationTarget, &write.table)?;
    let value = match write.value {
        AnimatedValue::Number(n) => Value::Number(n),
        AnimatedValue::Frame(i) => Value::Integer(i64::from(i)),
    };
    table
        .set(write.field.as_str(), value)
        .map_err(|e| ScriptFault::from_lua(FaultSite::AnimationTarget, &e))
}

//=========================================================================
// Unit Tests
//=========================================================================
