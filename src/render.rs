//! Render backend interface
//!
//! The renderer is an external collaborator. Once per frame, after the
//! scheduler pass, a host extracts [`RenderView`]s: every renderable that
//! is visible and active in the hierarchy, with its world pose resolved
//! through the transform graph. Extraction is read-only — a render backend
//! never mutates core state.

use glam::{Quat, Vec3};

use crate::core::Scene;
use crate::ecs::EntityId;

/// Reference to a mesh asset owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// Reference to a material asset owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// A component consumed by the render backend.
#[derive(Debug, Clone, Copy)]
pub struct Renderable {
    /// Mesh to draw.
    pub mesh: MeshId,
    /// Material to draw with.
    pub material: MaterialId,
    /// Hidden renderables are skipped at extraction without touching the
    /// owning entity's activity.
    pub visible: bool,
}

impl Renderable {
    /// A visible renderable.
    #[must_use]
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            mesh,
            material,
            visible: true,
        }
    }
}

/// One renderable, resolved for the backend.
#[derive(Debug, Clone, Copy)]
pub struct RenderView {
    /// Owning entity.
    pub entity: EntityId,
    /// Mesh to draw.
    pub mesh: MeshId,
    /// Material to draw with.
    pub material: MaterialId,
    /// World-space position.
    pub position: Vec3,
    /// World-space rotation.
    pub rotation: Quat,
    /// Lossy world-space scale.
    pub scale: Vec3,
}

impl Scene {
    /// Extract the currently visible renderables with resolved world
    /// poses, in entity slot order.
    #[must_use]
    pub fn render_views(&self) -> Vec<RenderView> {
        let mut views = Vec::new();
        for entity in self.world.entity_ids() {
            if !self.world.active_in_hierarchy(entity) {
                continue;
            }
            let Some(transform) = self.world.transform_of(entity) else {
                continue;
            };
            for &component in self.world.components_of(entity) {
                let Some(renderable) = self.world.renderable(component) else {
                    continue;
                };
                if !renderable.visible {
                    continue;
                }
                let Some((position, rotation)) = self.world.world_pose(transform) else {
                    continue;
                };
                let Some(scale) = self.world.lossy_scale(transform) else {
                    continue;
                };
                views.push(RenderView {
                    entity,
                    mesh: renderable.mesh,
                    material: renderable.material,
                    position,
                    rotation,
                    scale,
                });
            }
        }
        views
    }
}
