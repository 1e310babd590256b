//! Behavior trait and lifecycle state machine
//!
//! A behavior is a component with logic: the scheduler drives it through a
//! fixed set of lifecycle hooks. The state machine is strict:
//!
//! - `Constructed` → `Awoken` when [`Behavior::on_attach`] runs, exactly
//!   once, at registration, regardless of active state.
//! - `Awoken` → `Enabled` (firing [`Behavior::on_activate`]) when the
//!   behavior is active in the hierarchy; `Enabled` ⇄ `Disabled` on every
//!   later activity change.
//! - Any state → `Destroyed` during the deferred-destroy phase: deactivate
//!   first if enabled, then [`Behavior::on_release`] exactly once. Terminal.
//!
//! [`Behavior::on_first_tick`] fires on the first scheduler pass where the
//! behavior is active, at most once ever, before that pass's regular ticks.
//!
//! Hooks receive a [`Context`] carrying the scene and the behavior's own
//! handles, so a behavior can query or mutate the scene it lives in —
//! including destroying itself. A panic inside any hook is caught by the
//! scheduler, logged, and isolated to that behavior.

use std::any::Any;

use crate::core::Scene;
use crate::core::Time;
use crate::ecs::{ComponentId, EntityId, World};

/// Lifecycle position of a behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Allocated, attach hook not yet run.
    Constructed,
    /// Attach hook has run; not currently active.
    Awoken,
    /// Active in the hierarchy; receives ticks.
    Enabled,
    /// Explicitly or transitively inactive.
    Disabled,
    /// Torn down. No hook ever fires again.
    Destroyed,
}

/// Context passed to every behavior hook.
///
/// Carries the scene plus the receiving behavior's own identity. The scene
/// reference is the full mutable API — hooks may create entities, toggle
/// activity, schedule destruction, or start coroutines mid-pass.
pub struct Context<'a> {
    /// The scene this behavior lives in.
    pub scene: &'a mut Scene,
    /// The entity owning this behavior.
    pub entity: EntityId,
    /// This behavior's own component handle.
    pub this: ComponentId,
    /// The owning entity's Transform handle.
    pub transform: ComponentId,
}

impl Context<'_> {
    /// Scene clock.
    #[must_use]
    pub fn time(&self) -> &Time {
        self.scene.time()
    }

    /// Shared access to the entity registry.
    #[must_use]
    pub fn world(&self) -> &World {
        self.scene.world()
    }

    /// Mutable access to the entity registry.
    pub fn world_mut(&mut self) -> &mut World {
        self.scene.world_mut()
    }

    /// Schedule this behavior's entity for destruction at the end of the
    /// current frame.
    pub fn destroy_self(&mut self) {
        let entity = self.entity;
        self.scene.destroy(entity);
    }
}

/// A component with lifecycle hooks, driven by the scheduler.
///
/// All hooks default to no-ops; implement the ones the behavior needs.
/// `name` is required and used in log messages when a hook panics or an
/// invoke target is missing.
pub trait Behavior: Any {
    /// Behavior name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Runs exactly once, synchronously at registration.
    fn on_attach(&mut self, _ctx: &mut Context) {}

    /// Runs on every transition into the enabled state.
    fn on_activate(&mut self, _ctx: &mut Context) {}

    /// Runs once, on the first scheduler pass where this behavior is active.
    fn on_first_tick(&mut self, _ctx: &mut Context) {}

    /// Runs every frame while active, in registration order.
    fn on_tick(&mut self, _ctx: &mut Context) {}

    /// Runs every frame while active, after coroutines have advanced.
    fn on_late_tick(&mut self, _ctx: &mut Context) {}

    /// Runs on every pass of the externally driven fixed-cadence loop.
    fn on_fixed_tick(&mut self, _ctx: &mut Context) {}

    /// Runs on every transition out of the enabled state.
    fn on_deactivate(&mut self, _ctx: &mut Context) {}

    /// Runs exactly once when the behavior is destroyed.
    fn on_release(&mut self, _ctx: &mut Context) {}

    /// Dispatch hook for named timer invocations.
    ///
    /// Return `true` if `method` was recognized and handled. Unknown names
    /// are reported by the scheduler as a warning, never an error.
    fn on_invoke(&mut self, _method: &str, _ctx: &mut Context) -> bool {
        false
    }
}

/// Registry-side state for one behavior component.
pub(crate) struct BehaviorCell {
    /// Lifecycle position.
    pub state: LifecycleState,
    /// The behavior's own enabled flag (one of the three AND-ed activity
    /// conditions).
    pub enabled: bool,
    /// Whether `on_first_tick` has fired.
    pub started: bool,
    /// The behavior itself. `None` while a hook on it is in flight — the
    /// scheduler checks the behavior out of its slot for the duration of a
    /// call, so re-entrant scene access can never alias it.
    pub behavior: Option<Box<dyn Behavior>>,
}

impl BehaviorCell {
    pub fn new(behavior: Box<dyn Behavior>) -> Self {
        Self {
            state: LifecycleState::Constructed,
            enabled: true,
            started: false,
            behavior: Some(behavior),
        }
    }
}

impl std::fmt::Debug for BehaviorCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorCell")
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("started", &self.started)
            .field("checked_out", &self.behavior.is_none())
            .finish()
    }
}
