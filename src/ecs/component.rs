//! Component records
//!
//! Every component belongs to exactly one entity, fixed at construction.
//! The component payload is a tagged union: the Transform that every entity
//! carries, a boxed [`Behavior`](crate::ecs::Behavior) participating in the
//! lifecycle state machine, or one of the backend-facing components
//! consumed by a renderer or physics backend.

use crate::ecs::EntityId;
use crate::ecs::behavior::BehaviorCell;
use crate::ecs::transform::Transform;
use crate::physics::RigidBody;
use crate::render::Renderable;

/// A component slot's payload plus its owner.
#[derive(Debug)]
pub(crate) struct ComponentRecord {
    /// Owning entity. Never changes after construction.
    pub owner: EntityId,
    /// The component payload.
    pub kind: ComponentKind,
}

/// The concrete component kinds the runtime knows about.
///
/// User-defined component logic lives behind the `Behavior` variant; the
/// other variants are plain data the runtime or an external backend reads.
#[derive(Debug)]
pub(crate) enum ComponentKind {
    Transform(Transform),
    Behavior(BehaviorCell),
    Renderable(Renderable),
    RigidBody(RigidBody),
}

impl ComponentKind {
    /// Short label for log messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Transform(_) => "transform",
            Self::Behavior(_) => "behavior",
            Self::Renderable(_) => "renderable",
            Self::RigidBody(_) => "rigid body",
        }
    }
}
