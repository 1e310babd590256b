//! Entity record
//!
//! An entity is an identity plus bookkeeping: display name, tag, layer, its
//! own active flag, and the ordered list of components it owns. Exactly one
//! of those components is a Transform, created together with the entity and
//! kept for the entity's whole life.

use smallvec::SmallVec;

use crate::ecs::ComponentId;

/// An entity owned by a [`World`](crate::ecs::World).
///
/// Component insertion order is the iteration order used everywhere; the
/// Transform is always the first entry.
#[derive(Debug)]
pub struct Entity {
    /// Display name (not required to be unique).
    pub(crate) name: String,
    /// Free-form tag for group lookups.
    pub(crate) tag: String,
    /// Layer index for coarse filtering.
    pub(crate) layer: u32,
    /// The entity's own active flag. Effective activity also requires every
    /// ancestor's flag; see [`World::active_in_hierarchy`](crate::ecs::World::active_in_hierarchy).
    pub(crate) self_active: bool,
    /// Owned components, in insertion order.
    pub(crate) components: SmallVec<[ComponentId; 4]>,
    /// The entity's Transform component (also present in `components`).
    pub(crate) transform: ComponentId,
}

impl Entity {
    pub(crate) fn new(name: impl Into<String>, transform: ComponentId) -> Self {
        let mut components = SmallVec::new();
        components.push(transform);
        Self {
            name: name.into(),
            tag: String::new(),
            layer: 0,
            self_active: true,
            components,
            transform,
        }
    }
}
