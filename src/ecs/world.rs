//! Entity registry
//!
//! The [`World`] owns every entity and component in a scene. Both live in
//! slot arenas addressed by generational handles: freeing a slot bumps its
//! generation, so stale handles held anywhere — closures, coroutine locals,
//! cached fields — read as dead instead of aliasing a recycled object.
//!
//! Lookups (`find_by_name`, `find_by_tag`, typed behavior access) are
//! linear scans filtered by liveness. O(n) is the right trade at the
//! expected cardinality of tens to low hundreds of entities per scene, and
//! it keeps the registry free of secondary indices that could drift.
//!
//! The `World` itself never fires lifecycle hooks. Everything that does —
//! behavior registration, activity toggles, destruction — goes through
//! [`Scene`](crate::core::Scene).

use std::any::Any;

use crate::ecs::behavior::{Behavior, BehaviorCell};
use crate::ecs::component::{ComponentKind, ComponentRecord};
use crate::ecs::entity::Entity;
use crate::ecs::transform::Transform;
use crate::ecs::{ComponentId, EntityId};
use crate::physics::RigidBody;
use crate::render::Renderable;

#[derive(Debug)]
struct EntitySlot {
    generation: u32,
    entity: Option<Entity>,
}

#[derive(Debug)]
struct ComponentSlot {
    generation: u32,
    record: Option<ComponentRecord>,
}

/// Registry of all entities and components in a scene.
#[derive(Debug, Default)]
pub struct World {
    entities: Vec<EntitySlot>,
    free_entities: Vec<u32>,
    components: Vec<ComponentSlot>,
    free_components: Vec<u32>,
}

impl World {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -------------------------------------------------------------------------
    // Entity management
    // -------------------------------------------------------------------------

    /// Create an entity with the given display name.
    ///
    /// The entity's Transform is created atomically with it and stays for
    /// the entity's whole life.
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let entity_id = self.alloc_entity_slot();
        let transform_id = self.alloc_component_slot(ComponentRecord {
            owner: entity_id,
            kind: ComponentKind::Transform(Transform::new()),
        });
        let slot = &mut self.entities[entity_id.index() as usize];
        slot.entity = Some(Entity::new(name, transform_id));
        entity_id
    }

    /// Whether the handle refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.entity(entity).is_some()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.iter().filter(|s| s.entity.is_some()).count()
    }

    /// Snapshot of all live entity handles, in slot order.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entity.is_some())
            .map(|(index, slot)| EntityId::new(index as u32, slot.generation))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Entity accessors
    // -------------------------------------------------------------------------

    /// Display name, or `None` for a dead handle.
    #[must_use]
    pub fn name(&self, entity: EntityId) -> Option<&str> {
        self.entity(entity).map(|e| e.name.as_str())
    }

    /// Rename an entity. No-op on a dead handle.
    pub fn set_name(&mut self, entity: EntityId, name: impl Into<String>) {
        if let Some(e) = self.entity_mut(entity) {
            e.name = name.into();
        }
    }

    /// Tag, or `None` for a dead handle.
    #[must_use]
    pub fn tag(&self, entity: EntityId) -> Option<&str> {
        self.entity(entity).map(|e| e.tag.as_str())
    }

    /// Retag an entity. No-op on a dead handle.
    pub fn set_tag(&mut self, entity: EntityId, tag: impl Into<String>) {
        if let Some(e) = self.entity_mut(entity) {
            e.tag = tag.into();
        }
    }

    /// Layer index, or `None` for a dead handle.
    #[must_use]
    pub fn layer(&self, entity: EntityId) -> Option<u32> {
        self.entity(entity).map(|e| e.layer)
    }

    /// Move an entity to a layer. No-op on a dead handle.
    pub fn set_layer(&mut self, entity: EntityId, layer: u32) {
        if let Some(e) = self.entity_mut(entity) {
            e.layer = layer;
        }
    }

    /// The entity's own active flag, ignoring ancestors.
    #[must_use]
    pub fn is_self_active(&self, entity: EntityId) -> bool {
        self.entity(entity).is_some_and(|e| e.self_active)
    }

    /// Own flag AND every ancestor's own flag, walked through the
    /// transform hierarchy.
    #[must_use]
    pub fn active_in_hierarchy(&self, entity: EntityId) -> bool {
        let mut current = Some(entity);
        while let Some(e) = current {
            let Some(record) = self.entity(e) else {
                return false;
            };
            if !record.self_active {
                return false;
            }
            current = self
                .transform(record.transform)
                .and_then(|tr| tr.parent)
                .and_then(|parent| self.owner_of(parent));
        }
        true
    }

    /// The entity's Transform component.
    #[must_use]
    pub fn transform_of(&self, entity: EntityId) -> Option<ComponentId> {
        self.entity(entity).map(|e| e.transform)
    }

    /// The entity's components in insertion order (Transform first).
    ///
    /// Empty for a dead handle.
    #[must_use]
    pub fn components_of(&self, entity: EntityId) -> &[ComponentId] {
        self.entity(entity)
            .map(|e| e.components.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn set_self_active_flag(&mut self, entity: EntityId, active: bool) {
        if let Some(e) = self.entity_mut(entity) {
            e.self_active = active;
        }
    }

    // -------------------------------------------------------------------------
    // Searches (linear scans, liveness filtered)
    // -------------------------------------------------------------------------

    /// First live entity with the given name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.entity_ids()
            .into_iter()
            .find(|&e| self.name(e) == Some(name))
    }

    /// All live entities with the given tag.
    #[must_use]
    pub fn find_by_tag(&self, tag: &str) -> Vec<EntityId> {
        self.entity_ids()
            .into_iter()
            .filter(|&e| self.tag(e) == Some(tag))
            .collect()
    }

    /// All live entities on the given layer.
    #[must_use]
    pub fn find_by_layer(&self, layer: u32) -> Vec<EntityId> {
        self.entity_ids()
            .into_iter()
            .filter(|&e| self.layer(e) == Some(layer))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Component access
    // -------------------------------------------------------------------------

    /// Whether the handle refers to a live component.
    #[must_use]
    pub fn is_component_alive(&self, component: ComponentId) -> bool {
        self.record(component).is_some()
    }

    /// Owning entity of a component. The owner never changes.
    #[must_use]
    pub fn owner_of(&self, component: ComponentId) -> Option<EntityId> {
        self.record(component).map(|r| r.owner)
    }

    /// Shared access to a Transform payload.
    #[must_use]
    pub fn transform(&self, component: ComponentId) -> Option<&Transform> {
        match self.record(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Transform(tr),
                ..
            }) => Some(tr),
            _ => None,
        }
    }

    /// Mutable access to a Transform payload.
    pub fn transform_mut(&mut self, component: ComponentId) -> Option<&mut Transform> {
        match self.record_mut(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Transform(tr),
                ..
            }) => Some(tr),
            _ => None,
        }
    }

    /// Shared access to a Renderable payload.
    #[must_use]
    pub fn renderable(&self, component: ComponentId) -> Option<&Renderable> {
        match self.record(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Renderable(r),
                ..
            }) => Some(r),
            _ => None,
        }
    }

    /// Mutable access to a Renderable payload.
    pub fn renderable_mut(&mut self, component: ComponentId) -> Option<&mut Renderable> {
        match self.record_mut(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Renderable(r),
                ..
            }) => Some(r),
            _ => None,
        }
    }

    /// Shared access to a RigidBody payload.
    #[must_use]
    pub fn rigid_body(&self, component: ComponentId) -> Option<&RigidBody> {
        match self.record(component) {
            Some(ComponentRecord {
                kind: ComponentKind::RigidBody(rb),
                ..
            }) => Some(rb),
            _ => None,
        }
    }

    /// Mutable access to a RigidBody payload.
    pub fn rigid_body_mut(&mut self, component: ComponentId) -> Option<&mut RigidBody> {
        match self.record_mut(component) {
            Some(ComponentRecord {
                kind: ComponentKind::RigidBody(rb),
                ..
            }) => Some(rb),
            _ => None,
        }
    }

    /// First Renderable on an entity.
    #[must_use]
    pub fn renderable_on(&self, entity: EntityId) -> Option<ComponentId> {
        self.components_of(entity)
            .iter()
            .copied()
            .find(|&c| self.renderable(c).is_some())
    }

    /// First RigidBody on an entity.
    #[must_use]
    pub fn rigid_body_on(&self, entity: EntityId) -> Option<ComponentId> {
        self.components_of(entity)
            .iter()
            .copied()
            .find(|&c| self.rigid_body(c).is_some())
    }

    // -------------------------------------------------------------------------
    // Typed behavior access
    // -------------------------------------------------------------------------

    /// Downcast a behavior component to its concrete type.
    ///
    /// Returns `None` for dead handles, non-behavior components, type
    /// mismatches, or while the behavior is checked out for a hook call.
    #[must_use]
    pub fn behavior<T: Behavior>(&self, component: ComponentId) -> Option<&T> {
        let behavior = self.behavior_cell(component)?.behavior.as_deref()?;
        (behavior as &dyn Any).downcast_ref::<T>()
    }

    /// Mutable variant of [`World::behavior`].
    pub fn behavior_mut<T: Behavior>(&mut self, component: ComponentId) -> Option<&mut T> {
        let behavior = self.behavior_cell_mut(component)?.behavior.as_deref_mut()?;
        (behavior as &mut dyn Any).downcast_mut::<T>()
    }

    /// First behavior of type `T` on an entity.
    #[must_use]
    pub fn behavior_on<T: Behavior>(&self, entity: EntityId) -> Option<ComponentId> {
        self.components_of(entity)
            .iter()
            .copied()
            .find(|&c| self.behavior::<T>(c).is_some())
    }

    /// All behavior components on an entity, in registration order.
    #[must_use]
    pub fn behaviors_on(&self, entity: EntityId) -> Vec<ComponentId> {
        self.components_of(entity)
            .iter()
            .copied()
            .filter(|&c| self.behavior_cell(c).is_some())
            .collect()
    }

    /// Whether a behavior's own enabled flag is set.
    #[must_use]
    pub fn is_enabled(&self, component: ComponentId) -> bool {
        self.behavior_cell(component)
            .is_some_and(|cell| cell.enabled)
    }

    /// Current lifecycle state of a behavior, or `None` for a dead handle
    /// or non-behavior component.
    #[must_use]
    pub fn lifecycle_state(&self, component: ComponentId) -> Option<crate::ecs::LifecycleState> {
        self.behavior_cell(component).map(|cell| cell.state)
    }

    // -------------------------------------------------------------------------
    // Crate-internal plumbing
    // -------------------------------------------------------------------------

    pub(crate) fn entity(&self, entity: EntityId) -> Option<&Entity> {
        let slot = self.entities.get(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.entity.as_ref()
    }

    pub(crate) fn entity_mut(&mut self, entity: EntityId) -> Option<&mut Entity> {
        let slot = self.entities.get_mut(entity.index() as usize)?;
        if slot.generation != entity.generation() {
            return None;
        }
        slot.entity.as_mut()
    }

    pub(crate) fn record(&self, component: ComponentId) -> Option<&ComponentRecord> {
        let slot = self.components.get(component.index() as usize)?;
        if slot.generation != component.generation() {
            return None;
        }
        slot.record.as_ref()
    }

    pub(crate) fn record_mut(&mut self, component: ComponentId) -> Option<&mut ComponentRecord> {
        let slot = self.components.get_mut(component.index() as usize)?;
        if slot.generation != component.generation() {
            return None;
        }
        slot.record.as_mut()
    }

    pub(crate) fn behavior_cell(&self, component: ComponentId) -> Option<&BehaviorCell> {
        match self.record(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Behavior(cell),
                ..
            }) => Some(cell),
            _ => None,
        }
    }

    pub(crate) fn behavior_cell_mut(
        &mut self,
        component: ComponentId,
    ) -> Option<&mut BehaviorCell> {
        match self.record_mut(component) {
            Some(ComponentRecord {
                kind: ComponentKind::Behavior(cell),
                ..
            }) => Some(cell),
            _ => None,
        }
    }

    /// Allocate a component slot and link it into the owner's list.
    ///
    /// Returns `None` if the owner is dead.
    pub(crate) fn add_component(
        &mut self,
        owner: EntityId,
        kind: ComponentKind,
    ) -> Option<ComponentId> {
        if !self.is_alive(owner) {
            log::warn!("adding a {} to a dead entity; ignoring", kind.label());
            return None;
        }
        let id = self.alloc_component_slot(ComponentRecord { owner, kind });
        if let Some(entity) = self.entity_mut(owner) {
            entity.components.push(id);
        }
        Some(id)
    }

    /// Free a component slot. The owner's component list is not touched;
    /// callers unlink as part of teardown. No-op on a dead handle.
    pub(crate) fn free_component(&mut self, component: ComponentId) {
        let index = component.index() as usize;
        let Some(slot) = self.components.get_mut(index) else {
            return;
        };
        if slot.generation != component.generation() || slot.record.is_none() {
            return;
        }
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_components.push(component.index());
    }

    /// Free an entity slot. Components are the caller's responsibility.
    pub(crate) fn free_entity(&mut self, entity: EntityId) {
        let index = entity.index() as usize;
        let Some(slot) = self.entities.get_mut(index) else {
            return;
        };
        if slot.generation != entity.generation() || slot.entity.is_none() {
            return;
        }
        slot.entity = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_entities.push(entity.index());
    }

    /// Drop everything and start over. Generations are not preserved, so
    /// handles from before the reset all read as dead.
    pub(crate) fn reset(&mut self) {
        self.entities.clear();
        self.free_entities.clear();
        self.components.clear();
        self.free_components.clear();
    }

    fn alloc_entity_slot(&mut self) -> EntityId {
        match self.free_entities.pop() {
            Some(index) => {
                let slot = &mut self.entities[index as usize];
                EntityId::new(index, slot.generation)
            }
            None => {
                let index = self.entities.len() as u32;
                self.entities.push(EntitySlot {
                    generation: 0,
                    entity: None,
                });
                EntityId::new(index, 0)
            }
        }
    }

    fn alloc_component_slot(&mut self, record: ComponentRecord) -> ComponentId {
        match self.free_components.pop() {
            Some(index) => {
                let slot = &mut self.components[index as usize];
                slot.record = Some(record);
                ComponentId::new(index, slot.generation)
            }
            None => {
                let index = self.components.len() as u32;
                self.components.push(ComponentSlot {
                    generation: 0,
                    record: Some(record),
                });
                ComponentId::new(index, 0)
            }
        }
    }
}
