//=========================================================================
// Hot Reload Integration Tests
//=========================================================================

use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use aetheric_runtime::core::animation::AnimationHandle;
use aetheric_runtime::core::draw::{DrawCommand, RecordingBackend};
use aetheric_runtime::core::input::{InputEvent, KeyCode};
use aetheric_runtime::core::script::{FaultSite, ScriptHost, VmGeneration};
use aetheric_runtime::core::state_machine::MachineHandle;
use aetheric_runtime::core::{FrameOrchestrator, FrameSummary, RuntimeContext};
use tempfile::TempDir;

//--- Helpers -------------------------------------------------------------

struct Project {
    dir: TempDir,
    frames: FrameOrchestrator,
    backend: RecordingBackend,
    edits: u64,
}

impl Project {
    fn new(main: &str) -> Self {
        Self::with_files(main, &[])
    }

    fn with_files(main: &str, files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.lua"), main).unwrap();
        for (relative, source) in files {
            let path = dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, source).unwrap();
        }

        let ctx = RuntimeContext::shared();
        let mut host = ScriptHost::new(Rc::clone(&ctx), dir.path(), "main.lua");
        host.load().expect("first image loads");

        Self {
            dir,
            frames: FrameOrchestrator::new(ctx, host),
            backend: RecordingBackend::new(),
            edits: 0,
        }
    }

    fn ctx(&self) -> &Rc<RuntimeContext> {
        self.frames.context()
    }

    /// Rewrites a file and pushes its mtime past every earlier edit.
    fn edit(&mut self, relative: &str, source: &str) {
        self.edits += 1;
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, source).unwrap();
        bump_mtime(&path, self.edits * 10);
    }

    fn frame(&mut self, events: &[InputEvent]) -> FrameSummary {
        self.frames.frame(0.016, events, &mut self.backend)
    }

    fn drawn_texts(&self) -> Vec<String> {
        self.backend
            .last_frame()
            .unwrap()
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

fn bump_mtime(path: &Path, seconds: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(seconds)).unwrap();
}

const V1: &str = r#"
function init()
    input.define_action("jump", "space")
    input.on("jump", "pressed", function() jumps = (jumps or 0) + 1 end)
    events.subscribe("custom", function() end)
end
function draw() draw.text("v1", 0, 0) end
"#;

//=========================================================================
// Failed Reloads
//=========================================================================

#[test]
fn failed_init_leaves_draw_output_and_bindings_unchanged() {
    let mut project = Project::new(V1);
    project.frame(&[]);
    assert_eq!(project.drawn_texts(), vec!["v1"]);

    project.edit(
        "main.lua",
        r#"
        function init()
            input.define_action("jump", "x")
            events.emit("from broken init")
            error("half-written edit")
        end
        function draw() draw.text("v2", 0, 0) end
        "#,
    );

    let summary = project.frame(&[InputEvent::key_down(KeyCode::Space)]);

    assert!(summary.reloaded);
    assert_eq!(summary.banner, None);
    assert_eq!(project.drawn_texts(), vec!["v1"]);
    assert!(project.ctx().input.borrow().is_pressed("jump"), "still bound to space");
    assert_eq!(project.frames.host().generation(), Some(VmGeneration(1)));

    let fault = project.frames.host().last_error().unwrap();
    assert_eq!(fault.site, FaultSite::Init);
    assert!(fault.message.contains("half-written edit"));

    let jumps: i64 = project.frames.host().vm().unwrap().lua().globals().get("jumps").unwrap();
    assert_eq!(jumps, 1, "v1 callback still live");
}

#[test]
fn failed_reload_releases_what_the_new_image_registered() {
    let mut project = Project::new(V1);
    let callbacks = project.ctx().input.borrow().callback_count();
    let subscriptions = project.ctx().events.borrow().subscriber_count();

    project.edit(
        "main.lua",
        r#"
        function init()
            input.on("jump", "pressed", function() end)
            events.subscribe("custom", function() end)
            state_machine.create({}, "idle")
            error("nope")
        end
        "#,
    );
    project.frame(&[]);

    assert_eq!(project.ctx().input.borrow().callback_count(), callbacks);
    assert_eq!(project.ctx().events.borrow().subscriber_count(), subscriptions);
    assert!(project.ctx().machines.borrow().is_empty());
}

#[test]
fn failed_init_leaves_camera_unchanged() {
    let mut project = Project::new(
        r#"
        function init() camera.set_position(30, 40) end
        function draw() draw.text("v1", 0, 0) end
        "#,
    );
    project.frame(&[]);
    let before = project.backend.last_frame().unwrap().view;

    project.edit(
        "main.lua",
        r#"
        function init()
            camera.set_position(500, 500)
            camera.set_zoom(4)
            error("broken")
        end
        "#,
    );
    assert!(project.frame(&[]).reloaded);

    assert_eq!(project.backend.last_frame().unwrap().view, before);
    assert_eq!(project.ctx().camera.borrow().position(), (30.0, 40.0));
}

#[test]
fn failed_init_cannot_touch_the_running_image_registrations() {
    let mut project = Project::new(
        r#"
        hero = { x = 0 }
        function init()
            input.define_action("jump", "space")
            callback = input.on("jump", "pressed", function() end)
            subscription = events.subscribe("custom", function() end)
            machine = state_machine.create(nil, "idle")
            tween = animation.tween{ target = hero, field = "x", to = 1, duration = 10 }
        end
        "#,
    );
    project.frame(&[]);
    let (callback, subscription, machine, tween): (u32, u32, u32, u32) = project
        .frames
        .host()
        .vm()
        .unwrap()
        .lua()
        .load("return callback, subscription, machine, tween")
        .eval()
        .unwrap();

    project.edit(
        "main.lua",
        &format!(
            r#"
            function init()
                input.off({callback})
                events.unsubscribe({subscription})
                state_machine.set_state({machine}, "dead")
                state_machine.set_active({machine}, false)
                animation.cancel({tween})
                error("broken")
            end
            "#
        ),
    );
    assert!(project.frame(&[]).reloaded);

    let ctx = project.ctx();
    assert_eq!(project.frames.host().generation(), Some(VmGeneration(1)));
    assert_eq!(ctx.input.borrow().callback_count(), 1);
    assert_eq!(ctx.events.borrow().subscriber_count(), 1);
    assert_eq!(ctx.machines.borrow().current(MachineHandle(machine)), Some("idle"));
    assert!(ctx.machines.borrow().get(MachineHandle(machine)).unwrap().is_active());
    assert!(ctx.animations.borrow().is_active(AnimationHandle(tween)));
}

#[test]
fn successful_reload_may_not_reach_into_the_old_image_either() {
    let mut project = Project::new(
        r#"
        function init() machine = state_machine.create(nil, "idle") end
        "#,
    );
    let machine: u32 = project.frames.host().vm().unwrap().lua().globals().get("machine").unwrap();

    project.edit(
        "main.lua",
        &format!(
            r#"
            function init() moved = state_machine.set_state({machine}, "dead") end
            "#
        ),
    );
    project.frame(&[]);

    let moved: bool = project.frames.host().vm().unwrap().lua().globals().get("moved").unwrap();
    assert!(!moved);
    assert_eq!(project.frames.host().generation(), Some(VmGeneration(2)));
    assert!(project.ctx().machines.borrow().is_empty(), "old image's machine released");
}

#[test]
fn syntax_error_keeps_running_image() {
    let mut project = Project::new(V1);
    project.edit("main.lua", "function draw( draw.text('oops') end");

    let summary = project.frame(&[]);

    assert!(summary.reloaded);
    assert_eq!(project.drawn_texts(), vec!["v1"]);
    assert_eq!(project.frames.host().last_error().unwrap().kind, "SyntaxError");
}

#[test]
fn broken_edit_is_not_retried_every_frame() {
    let mut project = Project::new(V1);
    project.edit("main.lua", "error('broken')");

    assert!(project.frame(&[]).reloaded);
    assert!(!project.frame(&[]).reloaded);
    assert_eq!(project.ctx().diagnostics.fault_count(), 1);
}

//=========================================================================
// Successful Reloads
//=========================================================================

#[test]
fn successful_reload_swaps_image_and_releases_old_registrations() {
    let mut project = Project::new(V1);
    assert_eq!(project.ctx().input.borrow().callback_count(), 1);
    assert_eq!(project.ctx().events.borrow().subscriber_count(), 1);

    project.edit(
        "main.lua",
        r#"
        function init() input.define_action("jump", "x") end
        function draw() draw.text("v2", 0, 0) end
        "#,
    );
    let summary = project.frame(&[InputEvent::key_down(KeyCode::KeyX)]);

    assert!(summary.reloaded);
    assert_eq!(project.drawn_texts(), vec!["v2"]);
    assert_eq!(project.frames.host().generation(), Some(VmGeneration(2)));
    assert_eq!(project.ctx().input.borrow().callback_count(), 0);
    assert_eq!(project.ctx().events.borrow().subscriber_count(), 0);
    assert!(project.ctx().input.borrow().is_pressed("jump"));
}

#[test]
fn recovery_after_failed_reload() {
    let mut project = Project::new(V1);
    project.edit("main.lua", "function init() error('first try') end");
    project.frame(&[]);

    project.edit("main.lua", "function draw() draw.text('fixed', 0, 0) end");
    project.frame(&[]);

    assert_eq!(project.drawn_texts(), vec!["fixed"]);
    assert_eq!(project.frames.host().generation(), Some(VmGeneration(3)));
    assert!(project.frames.host().last_error().is_none());
}

#[test]
fn edits_to_required_modules_trigger_reload() {
    let mut project = Project::with_files(
        r#"
        local label = require("lib.label")
        function draw() draw.text(label.text, 0, 0) end
        "#,
        &[("lib/label.lua", "return { text = 'one' }")],
    );
    project.frame(&[]);
    assert_eq!(project.drawn_texts(), vec!["one"]);

    project.edit("lib/label.lua", "return { text = 'two' }");
    project.frame(&[]);
    assert_eq!(project.drawn_texts(), vec!["two"]);
}

#[test]
fn machines_from_old_image_are_dropped_on_swap() {
    let mut project = Project::new(
        r#"
        function init()
            m = state_machine.create({ name = "hero" }, "idle")
            state_machine.define_state(m, "idle", { enter = function() end })
        end
        "#,
    );
    assert_eq!(project.ctx().machines.borrow().len(), 1);

    project.edit("main.lua", "function init() end");
    project.frame(&[]);

    assert!(project.ctx().machines.borrow().is_empty());
}
