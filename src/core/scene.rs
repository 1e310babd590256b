//! Scene — the runtime instance
//!
//! A [`Scene`] owns everything: the entity registry, the clock, input
//! state, the scheduler queues, and the coroutine engine. There is no
//! process-wide state anywhere in the crate; hosts create as many
//! independent scenes as they like (handy for tests, which run in
//! parallel).
//!
//! All mutation that can fire lifecycle hooks goes through the scene:
//! behavior registration, enabled/active toggles, re-parenting, and
//! destruction. The [`World`](crate::ecs::World) accessor exposes
//! everything hook-free (poses, searches, typed behavior access).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::Time;
use crate::core::coroutine::CoroutineEngine;
use crate::core::scheduler::{DestroyEntry, DestroyTarget, Hook, InvokeEntry, Scheduler};
use crate::ecs::{
    Behavior, BehaviorCell, ComponentId, ComponentKind, EntityId, LifecycleState, World,
};
use crate::input::{Input, InputEvent};
use crate::physics::RigidBody;
use crate::render::Renderable;

/// Scene configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Scene name, used in log messages.
    pub name: String,
    /// Multiplier applied to host deltas for the scaled timeline.
    pub time_scale: f32,
    /// Delta used by the externally driven fixed-cadence pass.
    pub fixed_delta: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            name: String::from("scene"),
            time_scale: 1.0,
            fixed_delta: 1.0 / 50.0,
        }
    }
}

impl SceneConfig {
    /// Set the scene name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the time scale.
    pub fn with_time_scale(mut self, scale: f32) -> Self {
        self.time_scale = scale;
        self
    }

    /// Set the fixed-cadence delta.
    pub fn with_fixed_delta(mut self, delta: f32) -> Self {
        self.fixed_delta = delta;
        self
    }

    /// Load a configuration from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        ron::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save the configuration to a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }
}

/// Errors from configuration loading and saving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(String),
}

/// A self-contained runtime instance.
pub struct Scene {
    pub(crate) world: World,
    pub(crate) time: Time,
    pub(crate) input: Input,
    pub(crate) config: SceneConfig,
    pub(crate) sched: Scheduler,
    pub(crate) coroutines: CoroutineEngine,
}

impl Scene {
    /// Create a scene with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene from a configuration.
    #[must_use]
    pub fn with_config(config: SceneConfig) -> Self {
        let mut time = Time::new();
        time.set_time_scale(config.time_scale);
        time.set_fixed_delta(config.fixed_delta);
        Self {
            world: World::new(),
            time,
            input: Input::new(),
            config,
            sched: Scheduler::default(),
            coroutines: CoroutineEngine::default(),
        }
    }

    /// The scene configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// The scene clock.
    #[must_use]
    pub fn time(&self) -> &Time {
        &self.time
    }

    /// Mutable clock access (time scale, fixed delta).
    pub fn time_mut(&mut self) -> &mut Time {
        &mut self.time
    }

    /// The entity registry.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable registry access. Everything here is hook-free; operations
    /// that fire lifecycle hooks live on the scene itself.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Current input state.
    #[must_use]
    pub fn input(&self) -> &Input {
        &self.input
    }

    /// Feed one host input event into the scene.
    pub fn push_input(&mut self, event: InputEvent) {
        self.input.process(event);
    }

    // -------------------------------------------------------------------------
    // Entities and components
    // -------------------------------------------------------------------------

    /// Create an entity with a default Transform.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        self.world.create_entity(name)
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.world.entity_count()
    }

    /// Whether an entity handle is live.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.world.is_alive(entity)
    }

    /// Whether a component handle is live.
    #[must_use]
    pub fn is_component_alive(&self, component: ComponentId) -> bool {
        self.world.is_component_alive(component)
    }

    /// First live entity with the given name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.world.find_by_name(name)
    }

    /// All live entities with the given tag.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<EntityId> {
        self.world.find_by_tag(tag)
    }

    /// Register a behavior on an entity.
    ///
    /// The attach hook runs synchronously before this returns; if the
    /// entity is active, the activate hook runs too and the first-tick hook
    /// is queued for the next scheduler pass. Returns `None` (with a
    /// warning) if the entity is dead.
    pub fn add_behavior<B: Behavior>(
        &mut self,
        entity: EntityId,
        behavior: B,
    ) -> Option<ComponentId> {
        self.add_boxed_behavior(entity, Box::new(behavior))
    }

    /// Boxed variant of [`Scene::add_behavior`].
    pub fn add_boxed_behavior(
        &mut self,
        entity: EntityId,
        behavior: Box<dyn Behavior>,
    ) -> Option<ComponentId> {
        let id = self
            .world
            .add_component(entity, ComponentKind::Behavior(BehaviorCell::new(behavior)))?;
        self.sched.behaviors.push(id);
        if let Some(cell) = self.world.behavior_cell_mut(id) {
            cell.state = LifecycleState::Awoken;
        }
        self.dispatch(id, Hook::Attach);
        self.refresh_behavior(id);
        Some(id)
    }

    /// Attach a renderable component for the render backend to consume.
    pub fn add_renderable(
        &mut self,
        entity: EntityId,
        renderable: Renderable,
    ) -> Option<ComponentId> {
        self.world
            .add_component(entity, ComponentKind::Renderable(renderable))
    }

    /// Attach a rigid body component for the physics backend to consume.
    pub fn add_rigid_body(&mut self, entity: EntityId, body: RigidBody) -> Option<ComponentId> {
        self.world.add_component(entity, ComponentKind::RigidBody(body))
    }

    // -------------------------------------------------------------------------
    // Activity
    // -------------------------------------------------------------------------

    /// Toggle an entity's own active flag, firing activate/deactivate
    /// transitions across the whole subtree.
    pub fn set_active(&mut self, entity: EntityId, active: bool) {
        if !self.world.is_alive(entity) {
            log::warn!("set_active on a dead entity; ignoring");
            return;
        }
        if self.world.is_self_active(entity) == active {
            return;
        }
        self.world.set_self_active_flag(entity, active);
        self.refresh_subtree(entity);
    }

    /// Toggle a behavior's own enabled flag, firing its transition hooks.
    pub fn set_enabled(&mut self, component: ComponentId, enabled: bool) {
        match self.world.behavior_cell_mut(component) {
            Some(cell) => {
                if cell.enabled == enabled {
                    return;
                }
                cell.enabled = enabled;
            }
            None => {
                log::warn!("set_enabled on a dead or non-behavior component; ignoring");
                return;
            }
        }
        self.refresh_behavior(component);
    }

    /// Re-parent a transform, then reconcile activation across the moved
    /// subtree (a subtree moved under an inactive ancestor deactivates).
    ///
    /// Returns `true` if the hierarchy changed; cycle-creating requests are
    /// rejected with a warning.
    pub fn set_parent(
        &mut self,
        transform: ComponentId,
        new_parent: Option<ComponentId>,
        keep_world_pose: bool,
    ) -> bool {
        let changed = self.world.set_parent(transform, new_parent, keep_world_pose);
        if changed && let Some(owner) = self.world.owner_of(transform) {
            self.refresh_subtree(owner);
        }
        changed
    }

    // -------------------------------------------------------------------------
    // Destruction
    // -------------------------------------------------------------------------

    /// Schedule an entity for destruction in this frame's destroy phase.
    ///
    /// Children are destroyed depth-first before the entity itself; each
    /// behavior receives deactivate-then-release exactly once. Destroying
    /// an already-destroyed entity is a no-op.
    pub fn destroy(&mut self, entity: EntityId) {
        self.destroy_after(entity, 0.0);
    }

    /// Schedule an entity for destruction after `delay` seconds of scaled
    /// time.
    pub fn destroy_after(&mut self, entity: EntityId, delay: f32) {
        if !self.world.is_alive(entity) {
            return;
        }
        self.sched.destroy_queue.push(DestroyEntry {
            target: DestroyTarget::Entity(entity),
            countdown: delay.max(0.0),
        });
    }

    /// Schedule a single component for destruction in this frame's destroy
    /// phase.
    pub fn destroy_component(&mut self, component: ComponentId) {
        self.destroy_component_after(component, 0.0);
    }

    /// Schedule a single component for destruction after `delay` seconds.
    ///
    /// A Transform cannot be destroyed on its own — it lives and dies with
    /// its entity — so that request is a logged no-op.
    pub fn destroy_component_after(&mut self, component: ComponentId, delay: f32) {
        let Some(record) = self.world.record(component) else {
            return;
        };
        if matches!(record.kind, ComponentKind::Transform(_)) {
            log::warn!("a Transform cannot be destroyed on its own; destroy the entity instead");
            return;
        }
        self.sched.destroy_queue.push(DestroyEntry {
            target: DestroyTarget::Component(component),
            countdown: delay.max(0.0),
        });
    }

    // -------------------------------------------------------------------------
    // Timers
    // -------------------------------------------------------------------------

    /// Call `method` on the owning behavior's invoke hook after `delay`
    /// seconds of scaled time.
    pub fn invoke(&mut self, owner: ComponentId, method: impl Into<String>, delay: f32) {
        self.schedule_invoke(owner, method.into(), delay, None);
    }

    /// Like [`Scene::invoke`], then repeating every `interval` seconds.
    pub fn invoke_repeating(
        &mut self,
        owner: ComponentId,
        method: impl Into<String>,
        delay: f32,
        interval: f32,
    ) {
        let method = method.into();
        if interval <= 0.0 {
            log::warn!("invoke_repeating `{method}` with a non-positive interval; scheduling once");
            self.schedule_invoke(owner, method, delay, None);
            return;
        }
        self.schedule_invoke(owner, method, delay, Some(interval));
    }

    /// Cancel pending invocations of `method` on a behavior.
    pub fn cancel_invoke(&mut self, owner: ComponentId, method: &str) {
        self.sched
            .invokes
            .retain(|entry| entry.owner != owner || entry.method != method);
    }

    /// Cancel every pending invocation on a behavior.
    pub fn cancel_invokes(&mut self, owner: ComponentId) {
        self.sched.invokes.retain(|entry| entry.owner != owner);
    }

    fn schedule_invoke(
        &mut self,
        owner: ComponentId,
        method: String,
        delay: f32,
        repeat: Option<f32>,
    ) {
        if self.world.behavior_cell(owner).is_none() {
            log::warn!("invoke `{method}` on a dead or non-behavior component; ignoring");
            return;
        }
        self.sched.invokes.push(InvokeEntry {
            owner,
            method,
            countdown: delay.max(0.0),
            repeat,
        });
    }

    // -------------------------------------------------------------------------
    // Reset
    // -------------------------------------------------------------------------

    /// Tear the whole scene down and start over.
    ///
    /// Every live behavior receives its deactivate/release hooks, then all
    /// registries, queues, input state, and the clock are reset. Handles
    /// from before the reset read as dead.
    pub fn clear(&mut self) {
        log::info!("clearing scene `{}`", self.config.name);
        let roots: Vec<EntityId> = self
            .world
            .entity_ids()
            .into_iter()
            .filter(|&e| {
                self.world
                    .transform_of(e)
                    .and_then(|t| self.world.transform(t))
                    .is_none_or(|tr| tr.parent().is_none())
            })
            .collect();
        for root in roots {
            self.destroy_entity_now(root);
        }
        self.world.reset();
        self.sched = Scheduler::default();
        self.coroutines = CoroutineEngine::default();
        self.input = Input::new();
        self.time = Time::new();
        self.time.set_time_scale(self.config.time_scale);
        self.time.set_fixed_delta(self.config.fixed_delta);
    }

    // -------------------------------------------------------------------------
    // Activation reconciliation
    // -------------------------------------------------------------------------

    /// Re-derive the lifecycle state of every behavior in an entity's
    /// subtree after an activity-affecting change.
    pub(crate) fn refresh_subtree(&mut self, entity: EntityId) {
        let mut stack = vec![entity];
        let mut behaviors = Vec::new();
        while let Some(e) = stack.pop() {
            for &component in self.world.components_of(e) {
                if self.world.behavior_cell(component).is_some() {
                    behaviors.push(component);
                }
            }
            if let Some(t) = self.world.transform_of(e)
                && let Some(tr) = self.world.transform(t)
            {
                for &child in tr.children() {
                    if let Some(owner) = self.world.owner_of(child) {
                        stack.push(owner);
                    }
                }
            }
        }
        for component in behaviors {
            self.refresh_behavior(component);
        }
    }

    /// Re-derive one behavior's lifecycle state, firing the transition
    /// hook (and queueing the first tick) when it changes.
    pub(crate) fn refresh_behavior(&mut self, component: ComponentId) {
        enum Change {
            None,
            Activated { queue_start: bool },
            Deactivated,
        }

        let Some(owner) = self.world.owner_of(component) else {
            return;
        };
        let active = self.world.active_in_hierarchy(owner);
        let change = match self.world.behavior_cell_mut(component) {
            Some(cell) => {
                let effective = cell.enabled && active;
                match cell.state {
                    LifecycleState::Enabled if !effective => {
                        cell.state = LifecycleState::Disabled;
                        Change::Deactivated
                    }
                    LifecycleState::Awoken | LifecycleState::Disabled if effective => {
                        cell.state = LifecycleState::Enabled;
                        Change::Activated {
                            queue_start: !cell.started,
                        }
                    }
                    _ => Change::None,
                }
            }
            None => Change::None,
        };

        match change {
            Change::Activated { queue_start } => {
                if queue_start {
                    self.sched.pending_first_tick.push(component);
                }
                self.dispatch(component, Hook::Activate);
            }
            Change::Deactivated => self.dispatch(component, Hook::Deactivate),
            Change::None => {}
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
