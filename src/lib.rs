//! An entity/behavior runtime with a cooperative, phase-ordered scheduler
//!
//! This crate provides:
//! - Entities with generational-handle identity and a transform hierarchy
//! - Behaviors driven through a strict lifecycle state machine
//! - A per-frame scheduler with deferred destruction and timer invocation
//! - A coroutine engine with typed suspension points
//! - Narrow interfaces for external render and physics backends
//!
//! The model is single-threaded and cooperative: a host calls
//! [`Scene::tick`](core::Scene::tick) once per frame with a time delta, and
//! every hook runs to completion on that turn.

pub mod core;
pub mod ecs;
pub mod input;
pub mod physics;
pub mod render;

// Re-exports for convenience
pub use glam;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::core::{ConfigError, Scene, SceneConfig, Sequence, Step, Time, Wait};
    pub use crate::ecs::{
        Behavior, ComponentId, Context, CoroutineId, EntityId, LifecycleState, Transform, World,
    };
    pub use crate::input::{Button, Input, InputEvent};
    pub use crate::physics::{BodyPose, PhysicsBackend, RigidBody};
    pub use crate::render::{MaterialId, MeshId, RenderView, Renderable};
    pub use glam::{Mat3, Quat, Vec2, Vec3};
}
