//! Phase-ordered frame scheduler
//!
//! One call to [`Scene::tick`] runs a frame in a strict phase order:
//!
//! 1. Advance the clock.
//! 2. Flush first-tick hooks queued since the previous pass.
//! 3. Fire due timers through the invoke dispatch hook.
//! 4. `on_tick` across active behaviors, in registration order.
//! 5. Advance coroutines.
//! 6. `on_late_tick` across active behaviors.
//! 7. Process the deferred-destroy queue (children first, depth-first).
//! 8. Advance the frame counter and clear input edges.
//!
//! Every queue is snapshot-then-iterated, so hooks can register behaviors,
//! toggle activity, or schedule destruction mid-pass without invalidating
//! the iteration. Behaviors are checked out of their registry slot for the
//! duration of a hook call; a hook aimed at the behavior currently running
//! is deferred until that call returns.
//!
//! A panic inside any hook is caught here, logged with the behavior and
//! hook names, and isolated to that behavior — the frame always completes.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::Scene;
use crate::ecs::{ComponentId, ComponentKind, EntityId, LifecycleState};

/// Scheduler queues, owned by the scene.
#[derive(Default)]
pub(crate) struct Scheduler {
    /// Every registered behavior, in registration order. Pruned on destroy.
    pub behaviors: Vec<ComponentId>,
    /// Behaviors whose first tick is due on the next pass.
    pub pending_first_tick: Vec<ComponentId>,
    /// Pending timer invocations.
    pub invokes: Vec<InvokeEntry>,
    /// Pending destructions.
    pub destroy_queue: Vec<DestroyEntry>,
    /// Hooks aimed at a behavior that was checked out when they fired.
    pub deferred: Vec<(ComponentId, Hook)>,
}

/// A scheduled timer invocation.
pub(crate) struct InvokeEntry {
    pub owner: ComponentId,
    pub method: String,
    pub countdown: f32,
    pub repeat: Option<f32>,
}

/// A scheduled destruction.
pub(crate) struct DestroyEntry {
    pub target: DestroyTarget,
    pub countdown: f32,
}

pub(crate) enum DestroyTarget {
    Entity(EntityId),
    Component(ComponentId),
}

/// Which behavior hook to call.
#[derive(Clone)]
pub(crate) enum Hook {
    Attach,
    Activate,
    FirstTick,
    Tick,
    LateTick,
    FixedTick,
    Deactivate,
    Release,
    Invoke(String),
}

impl Hook {
    fn label(&self) -> &'static str {
        match self {
            Self::Attach => "on_attach",
            Self::Activate => "on_activate",
            Self::FirstTick => "on_first_tick",
            Self::Tick => "on_tick",
            Self::LateTick => "on_late_tick",
            Self::FixedTick => "on_fixed_tick",
            Self::Deactivate => "on_deactivate",
            Self::Release => "on_release",
            Self::Invoke(_) => "on_invoke",
        }
    }
}

impl Scene {
    /// Run one frame with the given raw host delta.
    pub fn tick(&mut self, raw_delta: f32) {
        // Phase 1: clock.
        self.time.advance(raw_delta);
        let dt = self.time.delta();

        // Phase 2: first ticks queued since the previous pass. Snapshot,
        // then clear — hooks may queue new entries for the next frame.
        let pending = std::mem::take(&mut self.sched.pending_first_tick);
        for component in pending {
            let Some(cell) = self.world.behavior_cell_mut(component) else {
                continue;
            };
            if cell.started || cell.state != LifecycleState::Enabled {
                // Not active at flush time: stays unstarted and is queued
                // again on the next activation.
                continue;
            }
            cell.started = true;
            self.dispatch(component, Hook::FirstTick);
        }

        // Phase 3: timers.
        self.run_invokes(dt);

        // Phase 4: ticks.
        self.run_hook_pass(Hook::Tick);

        // Phase 5: coroutines — strictly between tick and late tick.
        self.advance_coroutines(dt);

        // Phase 6: late ticks.
        self.run_hook_pass(Hook::LateTick);

        // Phase 7: deferred destruction.
        self.process_destroy_queue(dt);

        // Phase 8: frame counter and input edges.
        self.time.advance_frame();
        self.input.end_frame();
    }

    /// Run one pass of the externally driven fixed-cadence loop.
    ///
    /// Applies the same active filter and per-behavior panic isolation as
    /// the variable-rate tick. Pacing is the host's business; this must be
    /// called on the same logical turn as [`Scene::tick`], never
    /// concurrently with it.
    pub fn fixed_tick(&mut self) {
        self.run_hook_pass(Hook::FixedTick);
    }

    /// Call one hook across all currently active behaviors, in
    /// registration order. A behavior deactivated earlier in the pass is
    /// skipped for the rest of it, and a behavior whose first tick has not
    /// fired yet (registered or activated mid-frame) waits for the next
    /// pass.
    fn run_hook_pass(&mut self, hook: Hook) {
        let snapshot = self.sched.behaviors.clone();
        for component in snapshot {
            let Some(cell) = self.world.behavior_cell(component) else {
                continue;
            };
            if cell.state != LifecycleState::Enabled || !cell.started {
                continue;
            }
            self.dispatch(component, hook.clone());
        }
    }

    fn run_invokes(&mut self, dt: f32) {
        let mut entries = std::mem::take(&mut self.sched.invokes);
        let mut due: Vec<(ComponentId, String)> = Vec::new();
        {
            let world = &self.world;
            entries.retain_mut(|entry| {
                // An entry whose owner died is pruned, never fired again.
                if world.behavior_cell(entry.owner).is_none() {
                    return false;
                }
                entry.countdown -= dt;
                if entry.countdown > 0.0 {
                    return true;
                }
                due.push((entry.owner, entry.method.clone()));
                match entry.repeat {
                    Some(interval) => {
                        entry.countdown += interval;
                        true
                    }
                    None => false,
                }
            });
        }
        // Hooks fired below may schedule new timers; merge those behind the
        // surviving entries.
        let mut newly_scheduled = std::mem::replace(&mut self.sched.invokes, entries);
        self.sched.invokes.append(&mut newly_scheduled);

        for (owner, method) in due {
            if self.world.behavior_cell(owner).is_some() {
                self.dispatch(owner, Hook::Invoke(method));
            }
        }
    }

    fn process_destroy_queue(&mut self, dt: f32) {
        let entries = std::mem::take(&mut self.sched.destroy_queue);
        let mut due = Vec::new();
        let mut kept = Vec::new();
        for mut entry in entries {
            if entry.countdown <= 0.0 {
                due.push(entry.target);
            } else {
                entry.countdown -= dt;
                kept.push(entry);
            }
        }
        // Teardown hooks may schedule more destructions; those run next
        // frame.
        let mut newly_scheduled = std::mem::replace(&mut self.sched.destroy_queue, kept);
        self.sched.destroy_queue.append(&mut newly_scheduled);

        for target in due {
            match target {
                DestroyTarget::Entity(entity) => self.destroy_entity_now(entity),
                DestroyTarget::Component(component) => self.destroy_component_now(component),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Hook dispatch
    // -------------------------------------------------------------------------

    /// Check the behavior out of its slot, run one hook with panic
    /// isolation, and put it back. If the behavior is already checked out
    /// (the hook targets the behavior currently running), the call is
    /// deferred until the in-flight hook returns.
    pub(crate) fn dispatch(&mut self, component: ComponentId, hook: Hook) {
        let Some(entity) = self.world.owner_of(component) else {
            return;
        };
        let Some(transform) = self.world.transform_of(entity) else {
            return;
        };
        let mut behavior = {
            let Some(cell) = self.world.behavior_cell_mut(component) else {
                return;
            };
            match cell.behavior.take() {
                Some(behavior) => behavior,
                None => {
                    self.sched.deferred.push((component, hook));
                    return;
                }
            }
        };

        let name = behavior.name();
        let label = hook.label();
        let mut unhandled_invoke = false;
        let outcome = {
            let mut ctx = crate::ecs::Context {
                scene: self,
                entity,
                this: component,
                transform,
            };
            catch_unwind(AssertUnwindSafe(|| match &hook {
                Hook::Attach => behavior.on_attach(&mut ctx),
                Hook::Activate => behavior.on_activate(&mut ctx),
                Hook::FirstTick => behavior.on_first_tick(&mut ctx),
                Hook::Tick => behavior.on_tick(&mut ctx),
                Hook::LateTick => behavior.on_late_tick(&mut ctx),
                Hook::FixedTick => behavior.on_fixed_tick(&mut ctx),
                Hook::Deactivate => behavior.on_deactivate(&mut ctx),
                Hook::Release => behavior.on_release(&mut ctx),
                Hook::Invoke(method) => {
                    if !behavior.on_invoke(method, &mut ctx) {
                        unhandled_invoke = true;
                    }
                }
            }))
        };

        if outcome.is_err() {
            log::error!("behavior `{name}` panicked in {label}; continuing the frame");
        } else if unhandled_invoke && let Hook::Invoke(method) = &hook {
            log::warn!("behavior `{name}` has no invoke target `{method}`");
        }

        if let Some(cell) = self.world.behavior_cell_mut(component) {
            cell.behavior = Some(behavior);
        }

        // One drain per call: anything re-deferred here is picked up by the
        // dispatch that still has its target checked out.
        if !self.sched.deferred.is_empty() {
            let deferred = std::mem::take(&mut self.sched.deferred);
            for (deferred_component, deferred_hook) in deferred {
                self.dispatch(deferred_component, deferred_hook);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Destroy an entity now: children depth-first, then the entity's own
    /// components in registration order, then the entity itself.
    pub(crate) fn destroy_entity_now(&mut self, entity: EntityId) {
        if !self.world.is_alive(entity) {
            return;
        }

        let transform = self.world.transform_of(entity);
        if let Some(t) = transform {
            let children: Vec<ComponentId> = self
                .world
                .transform(t)
                .map(|tr| tr.children().to_vec())
                .unwrap_or_default();
            for child in children {
                if let Some(owner) = self.world.owner_of(child) {
                    self.destroy_entity_now(owner);
                }
            }
        }

        let components: Vec<ComponentId> = self.world.components_of(entity).to_vec();
        for component in components {
            if transform == Some(component) {
                continue;
            }
            self.teardown_component(component);
        }
        // Release hooks may have attached more components mid-teardown;
        // sweep whatever is left so no slot outlives its owner.
        let stragglers: Vec<ComponentId> = self
            .world
            .components_of(entity)
            .iter()
            .copied()
            .filter(|&c| transform != Some(c) && self.world.is_component_alive(c))
            .collect();
        for component in stragglers {
            self.teardown_component(component);
        }

        if let Some(t) = transform {
            if let Some(parent) = self.world.transform(t).and_then(|tr| tr.parent())
                && let Some(parent_tr) = self.world.transform_mut(parent)
            {
                parent_tr.children.retain(|child| *child != t);
            }
            self.world.free_component(t);
        }
        self.world.free_entity(entity);
    }

    /// Destroy a single component now and unlink it from its owner.
    pub(crate) fn destroy_component_now(&mut self, component: ComponentId) {
        let Some(record) = self.world.record(component) else {
            return;
        };
        if matches!(record.kind, ComponentKind::Transform(_)) {
            return;
        }
        let owner = record.owner;
        self.teardown_component(component);
        if let Some(entity) = self.world.entity_mut(owner) {
            entity.components.retain(|c| *c != component);
        }
    }

    /// Run teardown hooks (behaviors only) and free the slot.
    fn teardown_component(&mut self, component: ComponentId) {
        if self.world.behavior_cell(component).is_some() {
            self.teardown_behavior(component);
        }
        self.world.free_component(component);
    }

    /// Deactivate-if-enabled, then release, exactly once, then unlink from
    /// the scheduler.
    fn teardown_behavior(&mut self, component: ComponentId) {
        let Some(cell) = self.world.behavior_cell_mut(component) else {
            return;
        };
        if cell.state == LifecycleState::Destroyed {
            return;
        }
        if cell.state == LifecycleState::Enabled {
            cell.state = LifecycleState::Disabled;
            self.dispatch(component, Hook::Deactivate);
        }
        // Terminal before the release hook runs, so nothing re-enables a
        // behavior that is going away.
        if let Some(cell) = self.world.behavior_cell_mut(component) {
            cell.state = LifecycleState::Destroyed;
        }
        self.dispatch(component, Hook::Release);
        self.sched.behaviors.retain(|&b| b != component);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use crate::core::Scene;
    use crate::ecs::{Behavior, Context};

    type Log = Rc<RefCell<Vec<String>>>;

    fn new_log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    /// Records every lifecycle hook it receives.
    struct Probe {
        log: Log,
    }

    impl Probe {
        fn new(log: &Log) -> Self {
            Self { log: Rc::clone(log) }
        }

        fn push(&self, hook: &str) {
            self.log.borrow_mut().push(hook.to_string());
        }
    }

    impl Behavior for Probe {
        fn name(&self) -> &'static str {
            "Probe"
        }
        fn on_attach(&mut self, _ctx: &mut Context) {
            self.push("attach");
        }
        fn on_activate(&mut self, _ctx: &mut Context) {
            self.push("activate");
        }
        fn on_first_tick(&mut self, _ctx: &mut Context) {
            self.push("first_tick");
        }
        fn on_tick(&mut self, _ctx: &mut Context) {
            self.push("tick");
        }
        fn on_late_tick(&mut self, _ctx: &mut Context) {
            self.push("late_tick");
        }
        fn on_fixed_tick(&mut self, _ctx: &mut Context) {
            self.push("fixed_tick");
        }
        fn on_deactivate(&mut self, _ctx: &mut Context) {
            self.push("deactivate");
        }
        fn on_release(&mut self, _ctx: &mut Context) {
            self.push("release");
        }
    }

    /// Pushes a fixed label from on_tick, for ordering assertions.
    struct Tagged {
        log: Log,
        label: &'static str,
    }

    impl Behavior for Tagged {
        fn name(&self) -> &'static str {
            "Tagged"
        }
        fn on_tick(&mut self, _ctx: &mut Context) {
            self.log.borrow_mut().push(self.label.to_string());
        }
    }

    #[test]
    fn test_attach_fires_once_strictly_first() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("probe");
        scene.add_behavior(e, Probe::new(&log));
        scene.tick(0.016);
        scene.tick(0.016);
        scene.destroy(e);
        scene.tick(0.016);

        let entries = log.borrow();
        assert_eq!(entries.iter().filter(|h| *h == "attach").count(), 1);
        assert_eq!(entries.iter().filter(|h| *h == "release").count(), 1);
        assert_eq!(entries[0], "attach");
        assert_eq!(entries[1], "activate");
        // First tick precedes the frame's regular tick.
        assert_eq!(entries[2], "first_tick");
        assert_eq!(entries[3], "tick");
        assert_eq!(entries.last().map(String::as_str), Some("release"));
    }

    #[test]
    fn test_first_tick_fires_on_next_pass_only_once() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("probe");
        scene.add_behavior(e, Probe::new(&log));

        // Registration alone fires attach + activate, no ticks.
        assert_eq!(*log.borrow(), vec!["attach", "activate"]);

        scene.tick(0.016);
        scene.tick(0.016);
        let first_ticks = log.borrow().iter().filter(|h| *h == "first_tick").count();
        assert_eq!(first_ticks, 1);
    }

    #[test]
    fn test_first_tick_waits_for_activation() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("probe");
        scene.set_active(e, false);
        scene.add_behavior(e, Probe::new(&log));

        scene.tick(0.016);
        assert!(!log.borrow().iter().any(|h| h == "first_tick"));

        scene.set_active(e, true);
        scene.tick(0.016);
        let entries = log.borrow();
        assert_eq!(entries.iter().filter(|h| *h == "first_tick").count(), 1);
        // Attach fired at registration even while inactive.
        assert_eq!(entries[0], "attach");
    }

    #[test]
    fn test_tick_runs_in_registration_order() {
        let log = new_log();
        let mut scene = Scene::new();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        scene.add_behavior(a, Tagged { log: Rc::clone(&log), label: "first" });
        scene.add_behavior(b, Tagged { log: Rc::clone(&log), label: "second" });

        scene.tick(0.016);

        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    /// Disables another behavior from its own on_tick.
    struct Disabler {
        target: Rc<Cell<Option<crate::ecs::ComponentId>>>,
    }

    impl Behavior for Disabler {
        fn name(&self) -> &'static str {
            "Disabler"
        }
        fn on_tick(&mut self, ctx: &mut Context) {
            if let Some(target) = self.target.get() {
                ctx.scene.set_enabled(target, false);
            }
        }
    }

    #[test]
    fn test_behavior_deactivated_mid_pass_is_skipped() {
        let log = new_log();
        let target = Rc::new(Cell::new(None));
        let mut scene = Scene::new();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        scene.add_behavior(a, Disabler { target: Rc::clone(&target) });
        let victim = scene.add_behavior(b, Probe::new(&log)).unwrap();
        target.set(Some(victim));

        scene.tick(0.016);

        let entries = log.borrow();
        // The victim was deactivated before its slot in the pass: no tick,
        // but the deactivate hook fired.
        assert!(!entries.iter().any(|h| h == "tick"));
        assert!(entries.iter().any(|h| h == "deactivate"));
        drop(entries);

        // It stays registered: re-enabling brings it back next frame.
        scene.set_enabled(victim, true);
        scene.tick(0.016);
        assert!(log.borrow().iter().any(|h| h == "tick"));
    }

    /// Destroys its own entity during the tick of a chosen frame.
    struct SelfDestruct {
        log: Log,
        on_frame: u64,
    }

    impl Behavior for SelfDestruct {
        fn name(&self) -> &'static str {
            "SelfDestruct"
        }
        fn on_tick(&mut self, ctx: &mut Context) {
            self.log.borrow_mut().push(format!("tick{}", ctx.time().frame()));
            if ctx.time().frame() == self.on_frame {
                ctx.destroy_self();
            }
        }
        fn on_release(&mut self, _ctx: &mut Context) {
            self.log.borrow_mut().push("release".to_string());
        }
    }

    #[test]
    fn test_self_destroy_releases_same_frame_and_never_ticks_again() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("doomed");
        // Frame counter is 0-based: frame index 2 is the third tick.
        scene.add_behavior(e, SelfDestruct { log: Rc::clone(&log), on_frame: 2 });

        for _ in 0..5 {
            scene.tick(0.016);
        }

        assert_eq!(*log.borrow(), vec!["tick0", "tick1", "tick2", "release"]);
        assert!(!scene.is_alive(e));
    }

    #[test]
    fn test_no_hook_fires_after_release() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("probe");
        let id = scene.add_behavior(e, Probe::new(&log)).unwrap();

        scene.destroy(e);
        scene.tick(0.016);
        let len_after_destroy = log.borrow().len();

        // Stale handles are inert: nothing here may reach the behavior.
        scene.set_enabled(id, true);
        scene.invoke(id, "anything", 0.0);
        scene.tick(0.016);
        scene.tick(0.016);

        assert_eq!(log.borrow().len(), len_after_destroy);
        assert_eq!(
            log.borrow().iter().filter(|h| *h == "release").count(),
            1
        );
    }

    /// Panics in on_tick, every frame.
    struct Panicker;

    impl Behavior for Panicker {
        fn name(&self) -> &'static str {
            "Panicker"
        }
        fn on_tick(&mut self, _ctx: &mut Context) {
            panic!("boom");
        }
    }

    #[test]
    fn test_panic_is_isolated_to_the_behavior() {
        let log = new_log();
        let mut scene = Scene::new();
        let a = scene.create_entity("a");
        let b = scene.create_entity("b");
        scene.add_behavior(a, Panicker);
        scene.add_behavior(b, Probe::new(&log));

        scene.tick(0.016);

        // The behavior after the panicking one still ran, and so did the
        // late-tick phase.
        let entries = log.borrow();
        assert!(entries.iter().any(|h| h == "tick"));
        assert!(entries.iter().any(|h| h == "late_tick"));
        assert_eq!(scene.time().frame(), 1);
    }

    /// Counts invocations of the `pulse` method.
    struct Pulsed {
        count: Rc<Cell<u32>>,
    }

    impl Behavior for Pulsed {
        fn name(&self) -> &'static str {
            "Pulsed"
        }
        fn on_invoke(&mut self, method: &str, _ctx: &mut Context) -> bool {
            if method == "pulse" {
                self.count.set(self.count.get() + 1);
                return true;
            }
            false
        }
    }

    #[test]
    fn test_repeating_invoke_schedule() {
        let count = Rc::new(Cell::new(0));
        let mut scene = Scene::new();
        let e = scene.create_entity("timer");
        let id = scene
            .add_behavior(e, Pulsed { count: Rc::clone(&count) })
            .unwrap();

        // Initial delay 1s, interval 2s, simulated for 7s in 1s steps:
        // fires at t = 1, 3, 5, 7.
        scene.invoke_repeating(id, "pulse", 1.0, 2.0);
        for _ in 0..7 {
            scene.tick(1.0);
        }

        assert_eq!(count.get(), 4);
    }

    #[test]
    fn test_single_shot_invoke_fires_once() {
        let count = Rc::new(Cell::new(0));
        let mut scene = Scene::new();
        let e = scene.create_entity("timer");
        let id = scene
            .add_behavior(e, Pulsed { count: Rc::clone(&count) })
            .unwrap();

        scene.invoke(id, "pulse", 0.5);
        for _ in 0..4 {
            scene.tick(0.3);
        }

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_missing_invoke_target_is_a_noop() {
        let count = Rc::new(Cell::new(0));
        let mut scene = Scene::new();
        let e = scene.create_entity("timer");
        let id = scene
            .add_behavior(e, Pulsed { count: Rc::clone(&count) })
            .unwrap();

        scene.invoke(id, "no_such_method", 0.0);
        scene.tick(0.016);

        assert_eq!(count.get(), 0);
        assert_eq!(scene.time().frame(), 1);
    }

    #[test]
    fn test_cancel_invoke() {
        let count = Rc::new(Cell::new(0));
        let mut scene = Scene::new();
        let e = scene.create_entity("timer");
        let id = scene
            .add_behavior(e, Pulsed { count: Rc::clone(&count) })
            .unwrap();

        scene.invoke_repeating(id, "pulse", 0.5, 0.5);
        scene.tick(1.0);
        assert_eq!(count.get(), 1);

        scene.cancel_invoke(id, "pulse");
        scene.tick(1.0);
        scene.tick(1.0);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_invoke_pruned_when_owner_destroyed() {
        let count = Rc::new(Cell::new(0));
        let mut scene = Scene::new();
        let e = scene.create_entity("timer");
        let id = scene
            .add_behavior(e, Pulsed { count: Rc::clone(&count) })
            .unwrap();

        // Due on the third frame; the owner is gone at the end of the
        // second, so the entry is pruned before it ever fires.
        scene.invoke(id, "pulse", 3.0);
        scene.tick(1.0);
        scene.destroy(e);
        scene.tick(1.0);
        scene.tick(1.0);
        scene.tick(1.0);

        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_destroy_after_counts_down_in_scaled_time() {
        let mut scene = Scene::new();
        let e = scene.create_entity("delayed");

        scene.destroy_after(e, 1.0);
        scene.tick(0.5);
        assert!(scene.is_alive(e));
        scene.tick(0.5);
        assert!(scene.is_alive(e));
        // Countdown reached zero last frame; this frame's destroy phase
        // collects it.
        scene.tick(0.5);
        assert!(!scene.is_alive(e));
    }

    #[test]
    fn test_destroy_cascades_depth_first() {
        let log = new_log();
        let mut scene = Scene::new();
        let parent = scene.create_entity("parent");
        let child = scene.create_entity("child");
        let grandchild = scene.create_entity("grandchild");
        let parent_t = scene.world().transform_of(parent).unwrap();
        let child_t = scene.world().transform_of(child).unwrap();
        let grandchild_t = scene.world().transform_of(grandchild).unwrap();
        scene.set_parent(child_t, Some(parent_t), false);
        scene.set_parent(grandchild_t, Some(child_t), false);

        scene.add_behavior(parent, Tagged { log: Rc::clone(&log), label: "parent" });
        scene.add_behavior(child, Tagged { log: Rc::clone(&log), label: "child" });
        scene.add_behavior(
            grandchild,
            ReleaseTag { log: Rc::clone(&log), label: "grandchild" },
        );

        // Re-register release taggers for parent and child so teardown
        // order is observable.
        scene.add_behavior(parent, ReleaseTag { log: Rc::clone(&log), label: "parent" });
        scene.add_behavior(child, ReleaseTag { log: Rc::clone(&log), label: "child" });

        log.borrow_mut().clear();
        scene.destroy(parent);
        scene.tick(0.016);

        let releases: Vec<String> = log
            .borrow()
            .iter()
            .filter(|h| h.starts_with("release:"))
            .cloned()
            .collect();
        assert_eq!(releases, vec![
            "release:grandchild",
            "release:child",
            "release:parent",
        ]);
        assert!(!scene.is_alive(parent));
        assert!(!scene.is_alive(child));
        assert!(!scene.is_alive(grandchild));
    }

    /// Pushes a labelled entry from on_release.
    struct ReleaseTag {
        log: Log,
        label: &'static str,
    }

    impl Behavior for ReleaseTag {
        fn name(&self) -> &'static str {
            "ReleaseTag"
        }
        fn on_release(&mut self, _ctx: &mut Context) {
            self.log.borrow_mut().push(format!("release:{}", self.label));
        }
    }

    /// Disables itself from its own on_tick.
    struct SelfDisabler {
        log: Log,
    }

    impl Behavior for SelfDisabler {
        fn name(&self) -> &'static str {
            "SelfDisabler"
        }
        fn on_tick(&mut self, ctx: &mut Context) {
            self.log.borrow_mut().push("tick".to_string());
            let this = ctx.this;
            ctx.scene.set_enabled(this, false);
        }
        fn on_deactivate(&mut self, _ctx: &mut Context) {
            self.log.borrow_mut().push("deactivate".to_string());
        }
    }

    #[test]
    fn test_self_disable_defers_hook_until_tick_returns() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("loner");
        scene.add_behavior(e, SelfDisabler { log: Rc::clone(&log) });

        scene.tick(0.016);
        assert_eq!(*log.borrow(), vec!["tick", "deactivate"]);

        scene.tick(0.016);
        // Disabled: no further ticks.
        assert_eq!(log.borrow().len(), 2);
    }

    /// Registers a fresh entity + behavior from its own on_tick, once.
    struct Spawner {
        log: Log,
        spawned: bool,
    }

    impl Behavior for Spawner {
        fn name(&self) -> &'static str {
            "Spawner"
        }
        fn on_tick(&mut self, ctx: &mut Context) {
            if !self.spawned {
                self.spawned = true;
                let child = ctx.scene.create_entity("spawned");
                ctx.scene.add_behavior(child, Probe::new(&self.log));
            }
        }
    }

    #[test]
    fn test_registration_during_tick_is_safe_and_deferred_to_next_frame() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("spawner");
        scene.add_behavior(e, Spawner { log: Rc::clone(&log), spawned: false });

        scene.tick(0.016);
        // The new behavior attached and activated mid-pass, but did not
        // tick this frame.
        assert_eq!(*log.borrow(), vec!["attach", "activate"]);

        scene.tick(0.016);
        let entries = log.borrow();
        assert!(entries.iter().any(|h| h == "first_tick"));
        assert!(entries.iter().any(|h| h == "tick"));
    }

    #[test]
    fn test_set_active_cascades_to_descendants() {
        let log = new_log();
        let mut scene = Scene::new();
        let root = scene.create_entity("root");
        let leaf = scene.create_entity("leaf");
        let root_t = scene.world().transform_of(root).unwrap();
        let leaf_t = scene.world().transform_of(leaf).unwrap();
        scene.set_parent(leaf_t, Some(root_t), false);
        scene.add_behavior(leaf, Probe::new(&log));

        scene.set_active(root, false);
        assert!(log.borrow().iter().any(|h| h == "deactivate"));

        scene.tick(0.016);
        assert!(!log.borrow().iter().any(|h| h == "tick"));

        scene.set_active(root, true);
        scene.tick(0.016);
        assert!(log.borrow().iter().any(|h| h == "tick"));
    }

    #[test]
    fn test_reparent_under_inactive_ancestor_deactivates() {
        let log = new_log();
        let mut scene = Scene::new();
        let off = scene.create_entity("off");
        scene.set_active(off, false);
        let mover = scene.create_entity("mover");
        let off_t = scene.world().transform_of(off).unwrap();
        let mover_t = scene.world().transform_of(mover).unwrap();
        scene.add_behavior(mover, Probe::new(&log));

        scene.set_parent(mover_t, Some(off_t), false);
        assert!(log.borrow().iter().any(|h| h == "deactivate"));

        scene.set_parent(mover_t, None, false);
        let activations = log.borrow().iter().filter(|h| *h == "activate").count();
        assert_eq!(activations, 2);
    }

    #[test]
    fn test_fixed_tick_applies_active_filter() {
        let log = new_log();
        let mut scene = Scene::new();
        let e = scene.create_entity("probe");
        let id = scene.add_behavior(e, Probe::new(&log)).unwrap();

        // The fixed pass shares the variable pass's filter: nothing runs
        // before the behavior's first tick.
        scene.fixed_tick();
        assert!(!log.borrow().iter().any(|h| h == "fixed_tick"));

        scene.tick(0.016);
        scene.fixed_tick();
        assert!(log.borrow().iter().any(|h| h == "fixed_tick"));

        scene.set_enabled(id, false);
        log.borrow_mut().clear();
        scene.fixed_tick();
        assert!(!log.borrow().iter().any(|h| h == "fixed_tick"));
    }
}
