//=========================================================================
// Frame Orchestrator Integration Tests
//=========================================================================
//
// Whole frames against a real Lua VM: script trees are written into a
// temp dir, frames run against a `RecordingBackend`.
//
//=========================================================================

use std::fs;
use std::rc::Rc;

use aetheric_runtime::core::draw::{DrawCommand, RecordingBackend};
use aetheric_runtime::core::input::{InputEvent, KeyCode, MouseButton};
use aetheric_runtime::core::script::{FaultSite, ScriptHost};
use aetheric_runtime::core::{FrameOrchestrator, RuntimeContext};
use tempfile::TempDir;

const DT: f32 = 0.016;

struct Harness {
    _dir: TempDir,
    frames: FrameOrchestrator,
    backend: RecordingBackend,
}

impl Harness {
    fn new(main: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.lua"), main).unwrap();

        let ctx = RuntimeContext::shared();
        let mut host = ScriptHost::new(Rc::clone(&ctx), dir.path(), "main.lua").with_hot_reload(false);
        host.load().expect("script loads");

        Self {
            _dir: dir,
            frames: FrameOrchestrator::new(ctx, host),
            backend: RecordingBackend::new(),
        }
    }

    fn frame(&mut self, events: &[InputEvent]) {
        self.frames.frame(DT, events, &mut self.backend);
    }

    fn eval<T: for<'lua> mlua::FromLua<'lua>>(&self, expr: &str) -> T {
        self.frames
            .host()
            .vm()
            .unwrap()
            .lua()
            .load(format!("return {expr}"))
            .eval()
            .unwrap()
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

//=========================================================================
// Input
//=========================================================================

#[test]
fn any_binding_holds_the_action_down() {
    let mut h = Harness::new(
        r#"
        function init() input.define_action("fire", { "space", "mouse:left" }) end
        function update() down = input.down("fire") end
        "#,
    );

    h.frame(&[InputEvent::button_down(MouseButton::Left)]);
    assert!(h.eval::<bool>("down"));

    h.frame(&[InputEvent::button_up(MouseButton::Left)]);
    assert!(!h.eval::<bool>("down"));

    h.frame(&[InputEvent::key_down(KeyCode::Space)]);
    assert!(h.eval::<bool>("down"));
}

#[test]
fn global_action_resolves_under_another_context() {
    let mut h = Harness::new(
        r#"
        function init()
            input.define_action("jump", "space")
            input.push_context("menu")
        end
        function update()
            context = input.current_context()
            pressed = input.pressed("jump")
        end
        "#,
    );

    h.frame(&[InputEvent::key_down(KeyCode::Space)]);
    assert_eq!(h.eval::<String>("context"), "menu");
    assert!(h.eval::<bool>("pressed"));

    h.frame(&[]);
    assert!(!h.eval::<bool>("pressed"), "pressed only on the transition frame");
}

#[test]
fn receiver_scoped_callback_runs_before_update() {
    let mut h = Harness::new(
        r#"
        hero = { jumps = 0 }
        function hero:on_jump(action, phase) self.jumps = self.jumps + 1 end
        function init()
            input.define_action("jump", "space")
            input.on("jump", "pressed", hero.on_jump, hero)
        end
        function update() seen = hero.jumps end
        "#,
    );

    h.frame(&[InputEvent::key_down(KeyCode::Space)]);
    h.frame(&[]);
    assert_eq!(h.eval::<i64>("seen"), 1);
}

//=========================================================================
// Events
//=========================================================================

#[test]
fn events_emitted_during_dispatch_wait_for_next_frame() {
    let mut h = Harness::new(
        r#"
        received = {}
        function init()
            events.subscribe("custom", function(e)
                table.insert(received, e.name)
                if e.name == "ping" then events.emit("pong") end
            end)
            events.emit("ping")
        end
        "#,
    );

    h.frame(&[]);
    assert_eq!(h.eval::<Vec<String>>("received"), vec!["ping"]);

    h.frame(&[]);
    assert_eq!(h.eval::<Vec<String>>("received"), vec!["ping", "pong"]);
}

#[test]
fn unsubscribing_inside_own_callback_fires_once() {
    let mut h = Harness::new(
        r#"
        count = 0
        function init()
            local handle
            handle = events.subscribe("custom", function()
                count = count + 1
                events.unsubscribe(handle)
            end)
            events.emit("a")
            events.emit("b")
        end
        "#,
    );

    h.frame(&[]);
    h.frame(&[]);
    assert_eq!(h.eval::<i64>("count"), 1);
}

#[test]
fn failing_subscriber_is_isolated() {
    let mut h = Harness::new(
        r#"
        later = 0
        function init()
            events.subscribe("custom", function() error("first subscriber broke") end)
            events.subscribe("custom", function() later = later + 1 end)
            events.emit("go")
        end
        function update() updated = true end
        "#,
    );

    h.frame(&[]);

    assert_eq!(h.eval::<i64>("later"), 1);
    assert!(h.eval::<bool>("updated"));
    let fault = h.frames.context().diagnostics.last_fault().unwrap();
    assert_eq!(fault.site, FaultSite::EventSubscriber);
    assert!(fault.message.contains("first subscriber broke"));
}

//=========================================================================
// State Machines
//=========================================================================

#[test]
fn input_binding_requires_matching_current_state() {
    let mut h = Harness::new(
        r#"
        function init()
            input.define_action("jump", "space")
            m = state_machine.create(nil, "idle")
            state_machine.bind_input(m, { from = "idle", to = "air", action = "jump" })
            state_machine.set_state(m, "crouch")
        end
        function update() now = state_machine.current(m) end
        "#,
    );

    h.frame(&[InputEvent::key_down(KeyCode::Space)]);
    assert_eq!(h.eval::<String>("now"), "crouch");
}

#[test]
fn forced_binding_skips_condition() {
    let mut h = Harness::new(
        r#"
        function init()
            input.define_action("dash", "left_shift")
            m = state_machine.create(nil, "idle")
            state_machine.bind_input(m, {
                from = "idle", to = "dash", action = "dash", forced = true,
                condition = function() return false end,
            })
        end
        function update() now = state_machine.current(m) end
        "#,
    );

    h.frame(&[InputEvent::key_down(KeyCode::ShiftLeft)]);
    assert_eq!(h.eval::<String>("now"), "dash");
}

#[test]
fn state_change_is_announced_on_next_frame() {
    let mut h = Harness::new(
        r#"
        changes = {}
        function init()
            input.define_action("jump", "space")
            m = state_machine.create(nil, "idle")
            state_machine.bind_input(m, { from = "idle", to = "air", action = "jump" })
            events.subscribe("state_changed", function(e)
                table.insert(changes, e.from .. ">" .. e.to)
            end)
        end
        "#,
    );

    h.frame(&[InputEvent::key_down(KeyCode::Space)]);
    assert!(h.eval::<Vec<String>>("changes").is_empty());

    h.frame(&[]);
    assert_eq!(h.eval::<Vec<String>>("changes"), vec!["idle>air"]);
}

//=========================================================================
// Animation
//=========================================================================

#[test]
fn animation_started_on_completion_waits_a_frame() {
    let mut h = Harness::new(
        r#"
        box = { x = 0 }
        function init()
            animation.tween{ target = box, field = "x", to = 1, duration = 0.01,
                on_complete = function()
                    animation.tween{ target = box, field = "y", from = 0, to = 10, duration = 1 }
                end }
        end
        "#,
    );

    h.frame(&[]);
    assert_eq!(h.eval::<f64>("box.x"), 1.0);
    assert_eq!(h.eval::<f64>("box.y or 0"), 0.0);

    h.frame(&[]);
    let y: f64 = h.eval("box.y");
    assert!((y - 10.0 * f64::from(DT)).abs() < 1e-4, "advanced once, got {y}");
}

//=========================================================================
// Drawing
//=========================================================================

#[test]
fn equal_z_draws_in_queue_order_and_lower_z_first() {
    let mut h = Harness::new(
        r#"
        function draw()
            draw.queue{ kind = "text", text = "a", x = 0, y = 0, z = 1 }
            draw.queue{ kind = "text", text = "b", x = 0, y = 0, z = 1 }
            draw.queue{ kind = "text", text = "under", x = 0, y = 0, z = 0 }
            draw.queue{ kind = "text", text = "c", x = 0, y = 0, z = 1 }
        end
        "#,
    );

    h.frame(&[]);
    assert_eq!(h.drawn_texts(), vec!["under", "a", "b", "c"]);
}

#[test]
fn camera_view_reaches_backend() {
    let mut h = Harness::new(
        r#"
        function init() camera.set_position(30, 40); camera.set_zoom(2) end
        "#,
    );

    h.frame(&[]);
    let view = h.backend.last_frame().unwrap().view;
    assert_eq!((view.x, view.y, view.zoom), (30.0, 40.0, 2.0));
}

#[test]
fn update_fault_does_not_stop_draw() {
    let mut h = Harness::new(
        r#"
        function update() error("update broke") end
        function draw() draw.text("still drawing", 0, 0) end
        "#,
    );

    h.frame(&[]);
    assert_eq!(h.drawn_texts(), vec!["still drawing"]);
    assert_eq!(
        h.frames.context().diagnostics.last_fault().unwrap().site,
        FaultSite::Update
    );
}
