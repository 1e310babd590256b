//! Physics backend interface
//!
//! The physics simulation is an external collaborator behind
//! [`PhysicsBackend`]. The contract is exactly two sync points per physics
//! step, with no implicit polling in between:
//!
//! 1. [`Scene::sync_to_physics`] pushes each active body's world pose (and
//!    body state) into the backend. A backend sees a body for the first
//!    time at this point and registers it from that pose.
//! 2. The backend steps on its own.
//! 3. [`Scene::sync_from_physics`] pulls the updated pose and velocities
//!    back, writing position/rotation through the transform graph's
//!    world→local conversion.
//!
//! Kinematic bodies are pushed but never pulled — the scene drives them,
//! the simulation only observes them.
//!
//! The backend may run on its own cadence, but both sync points must be
//! called on the scheduler's logical turn, never concurrently with a pass.

use glam::{Quat, Vec3};

use crate::core::Scene;
use crate::ecs::ComponentId;

/// A component consumed by the physics backend.
#[derive(Debug, Clone, Copy)]
pub struct RigidBody {
    /// Linear velocity, world space.
    pub linear_velocity: Vec3,
    /// Angular velocity, world space.
    pub angular_velocity: Vec3,
    /// Kinematic bodies are driven by the scene, not the simulation.
    pub kinematic: bool,
}

impl RigidBody {
    /// A dynamic body at rest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A kinematic body: pushed into the simulation, never pulled back.
    #[must_use]
    pub fn kinematic() -> Self {
        Self {
            kinematic: true,
            ..Self::default()
        }
    }
}

impl Default for RigidBody {
    fn default() -> Self {
        Self {
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            kinematic: false,
        }
    }
}

/// Pose and velocity pulled out of a backend after a step.
#[derive(Debug, Clone, Copy)]
pub struct BodyPose {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// The narrow interface a physics simulation implements.
pub trait PhysicsBackend {
    /// Receive one body's current world pose and state. Called for every
    /// active body at each sync-to point; the first call for a given key
    /// registers the body.
    fn sync_body(&mut self, body: ComponentId, position: Vec3, rotation: Quat, state: &RigidBody);

    /// Advance the simulation.
    fn step(&mut self, dt: f32);

    /// Report one body's pose after stepping, or `None` if the backend
    /// does not know it.
    fn fetch_body(&mut self, body: ComponentId) -> Option<BodyPose>;
}

impl Scene {
    /// Push every active body's world pose into the backend.
    pub fn sync_to_physics(&self, backend: &mut dyn PhysicsBackend) {
        for (component, entity) in self.active_bodies() {
            let Some(transform) = self.world.transform_of(entity) else {
                continue;
            };
            let Some((position, rotation)) = self.world.world_pose(transform) else {
                continue;
            };
            let Some(state) = self.world.rigid_body(component) else {
                continue;
            };
            backend.sync_body(component, position, rotation, state);
        }
    }

    /// Pull stepped poses back into the transform graph and body state.
    pub fn sync_from_physics(&mut self, backend: &mut dyn PhysicsBackend) {
        for (component, entity) in self.active_bodies() {
            if self.world.rigid_body(component).is_none_or(|b| b.kinematic) {
                continue;
            }
            let Some(pose) = backend.fetch_body(component) else {
                continue;
            };
            let Some(transform) = self.world.transform_of(entity) else {
                continue;
            };
            self.world.set_world_position(transform, pose.position);
            self.world.set_world_rotation(transform, pose.rotation);
            if let Some(body) = self.world.rigid_body_mut(component) {
                body.linear_velocity = pose.linear_velocity;
                body.angular_velocity = pose.angular_velocity;
            }
        }
    }

    /// Push, step, pull — one full physics step.
    pub fn step_physics(&mut self, backend: &mut dyn PhysicsBackend, dt: f32) {
        self.sync_to_physics(backend);
        backend.step(dt);
        self.sync_from_physics(backend);
    }

    /// Live rigid bodies on entities that are active in the hierarchy.
    fn active_bodies(&self) -> Vec<(ComponentId, crate::ecs::EntityId)> {
        let mut bodies = Vec::new();
        for entity in self.world.entity_ids() {
            if !self.world.active_in_hierarchy(entity) {
                continue;
            }
            for &component in self.world.components_of(entity) {
                if self.world.rigid_body(component).is_some() {
                    bodies.push((component, entity));
                }
            }
        }
        bodies
    }
}
