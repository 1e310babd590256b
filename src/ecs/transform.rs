//! Transform hierarchy with on-demand world poses
//!
//! Every entity owns exactly one [`Transform`]: a local position, rotation,
//! and (non-uniform) scale, plus non-owning parent/child back-references
//! into the same registry. World poses are *computed on demand* by walking
//! the parent chain — never cached. Walking a handful of parents per query
//! is cheap at scene sizes of tens to low hundreds of entities, and there
//! is no cache to invalidate.
//!
//! Composition rules:
//!
//! - `world_position = parent.world_rotation * local_position + parent.world_position`
//! - `world_rotation = parent.world_rotation * local_rotation`
//! - `lossy_scale` multiplies local scales down the chain. Combining
//!   non-uniform scale with rotation produces shear this model does not
//!   represent; the lossy scale is exactly that — lossy.
//!
//! Re-parenting always detaches before attaching and refuses to create a
//! cycle: parenting a transform under one of its own descendants is a
//! logged no-op.

use glam::{Mat3, Quat, Vec3};
use smallvec::SmallVec;

use crate::ecs::{ComponentId, World};

/// Squared length below which a direction is treated as degenerate.
const DEGENERATE_AXIS: f32 = 1e-8;

/// Spatial state of an entity.
///
/// Local pose fields are public; hierarchy links are maintained through
/// [`World::set_parent`](crate::core::Scene::set_parent) so the parent and
/// child back-references can never disagree.
#[derive(Debug, Clone)]
pub struct Transform {
    /// Position relative to the parent (or the world, if unparented).
    pub local_position: Vec3,
    /// Rotation relative to the parent.
    pub local_rotation: Quat,
    /// Scale relative to the parent.
    pub local_scale: Vec3,
    /// Parent transform, if any. Non-owning back-reference.
    pub(crate) parent: Option<ComponentId>,
    /// Child transforms, in attach order. Non-owning back-references;
    /// ownership of the child entities lives with the registry.
    pub(crate) children: SmallVec<[ComponentId; 8]>,
}

impl Transform {
    /// Identity transform at the origin.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The parent transform, if any.
    #[must_use]
    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    /// Child transforms in attach order.
    #[must_use]
    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            local_scale: Vec3::ONE,
            parent: None,
            children: SmallVec::new(),
        }
    }
}

impl World {
    // -------------------------------------------------------------------------
    // World pose getters
    // -------------------------------------------------------------------------

    /// World-space position of a transform, composed up the parent chain.
    ///
    /// Returns `None` for a dead handle.
    #[must_use]
    pub fn world_position(&self, transform: ComponentId) -> Option<Vec3> {
        self.world_pose(transform).map(|(position, _)| position)
    }

    /// World-space rotation of a transform.
    ///
    /// Returns `None` for a dead handle.
    #[must_use]
    pub fn world_rotation(&self, transform: ComponentId) -> Option<Quat> {
        self.world_pose(transform).map(|(_, rotation)| rotation)
    }

    /// Componentwise product of local scales down the parent chain.
    ///
    /// Returns `None` for a dead handle.
    #[must_use]
    pub fn lossy_scale(&self, transform: ComponentId) -> Option<Vec3> {
        let tr = self.transform(transform)?;
        let mut scale = tr.local_scale;
        let mut current = tr.parent;
        while let Some(parent) = current {
            let parent_tr = self.transform(parent)?;
            scale *= parent_tr.local_scale;
            current = parent_tr.parent;
        }
        Some(scale)
    }

    /// World-space forward direction (local -Z).
    #[must_use]
    pub fn forward(&self, transform: ComponentId) -> Option<Vec3> {
        self.world_rotation(transform).map(|r| r * Vec3::NEG_Z)
    }

    /// World-space right direction (local +X).
    #[must_use]
    pub fn right(&self, transform: ComponentId) -> Option<Vec3> {
        self.world_rotation(transform).map(|r| r * Vec3::X)
    }

    /// World-space up direction (local +Y).
    #[must_use]
    pub fn up(&self, transform: ComponentId) -> Option<Vec3> {
        self.world_rotation(transform).map(|r| r * Vec3::Y)
    }

    /// World position and rotation in one walk.
    pub(crate) fn world_pose(&self, transform: ComponentId) -> Option<(Vec3, Quat)> {
        let tr = self.transform(transform)?;
        Some(match tr.parent {
            Some(parent) => {
                let (parent_position, parent_rotation) = self.world_pose(parent)?;
                (
                    parent_rotation * tr.local_position + parent_position,
                    parent_rotation * tr.local_rotation,
                )
            }
            None => (tr.local_position, tr.local_rotation),
        })
    }

    // -------------------------------------------------------------------------
    // World pose setters
    // -------------------------------------------------------------------------

    /// Set the world-space position by converting into the parent's local
    /// space. No-op on a dead handle.
    pub fn set_world_position(&mut self, transform: ComponentId, position: Vec3) {
        let local = match self.parent_pose(transform) {
            Some((parent_position, parent_rotation)) => {
                parent_rotation.inverse() * (position - parent_position)
            }
            None => position,
        };
        if let Some(tr) = self.transform_mut(transform) {
            tr.local_position = local;
        }
    }

    /// Set the world-space rotation by converting into the parent's local
    /// space. No-op on a dead handle.
    pub fn set_world_rotation(&mut self, transform: ComponentId, rotation: Quat) {
        let local = match self.parent_pose(transform) {
            Some((_, parent_rotation)) => parent_rotation.inverse() * rotation,
            None => rotation,
        };
        if let Some(tr) = self.transform_mut(transform) {
            tr.local_rotation = local;
        }
    }

    /// World pose of the parent, or `None` if unparented or dead.
    fn parent_pose(&self, transform: ComponentId) -> Option<(Vec3, Quat)> {
        let parent = self.transform(transform)?.parent?;
        self.world_pose(parent)
    }

    // -------------------------------------------------------------------------
    // Re-parenting
    // -------------------------------------------------------------------------

    /// Relink `transform` under `new_parent` (or to the root when `None`).
    ///
    /// Detaches from the old parent before attaching. With
    /// `keep_world_pose`, the world position and rotation captured before
    /// the relink are reapplied by converting them into the new parent's
    /// local space, so the entity does not move across the call.
    ///
    /// Refuses (with a warning) to parent a transform under itself or one
    /// of its own descendants. Returns `true` if the hierarchy changed.
    pub(crate) fn set_parent(
        &mut self,
        transform: ComponentId,
        new_parent: Option<ComponentId>,
        keep_world_pose: bool,
    ) -> bool {
        if self.transform(transform).is_none() {
            log::warn!("set_parent on a dead or non-transform component; ignoring");
            return false;
        }
        if let Some(parent) = new_parent {
            if self.transform(parent).is_none() {
                log::warn!("set_parent to a dead or non-transform parent; ignoring");
                return false;
            }
            // Walk the prospective parent's chain; finding ourselves there
            // would close a cycle.
            let mut current = Some(parent);
            while let Some(ancestor) = current {
                if ancestor == transform {
                    log::warn!("refusing to parent a transform under its own descendant");
                    return false;
                }
                current = self.transform(ancestor).and_then(|tr| tr.parent);
            }
        }

        let old_parent = self.transform(transform).and_then(|tr| tr.parent);
        if old_parent == new_parent {
            return false;
        }

        let captured = if keep_world_pose {
            self.world_pose(transform)
        } else {
            None
        };

        if let Some(old) = old_parent
            && let Some(tr) = self.transform_mut(old)
        {
            tr.children.retain(|child| *child != transform);
        }
        if let Some(new) = new_parent
            && let Some(tr) = self.transform_mut(new)
        {
            tr.children.push(transform);
        }
        if let Some(tr) = self.transform_mut(transform) {
            tr.parent = new_parent;
        }

        if let Some((world_position, world_rotation)) = captured {
            let (local_position, local_rotation) = match new_parent.and_then(|p| self.world_pose(p))
            {
                Some((parent_position, parent_rotation)) => {
                    let inverse = parent_rotation.inverse();
                    (
                        inverse * (world_position - parent_position),
                        inverse * world_rotation,
                    )
                }
                None => (world_position, world_rotation),
            };
            if let Some(tr) = self.transform_mut(transform) {
                tr.local_position = local_position;
                tr.local_rotation = local_rotation;
            }
        }

        true
    }

    // -------------------------------------------------------------------------
    // Convenience operations
    // -------------------------------------------------------------------------

    /// Move by a world-space delta.
    pub fn translate(&mut self, transform: ComponentId, delta: Vec3) {
        let local_delta = match self.parent_pose(transform) {
            Some((_, parent_rotation)) => parent_rotation.inverse() * delta,
            None => delta,
        };
        if let Some(tr) = self.transform_mut(transform) {
            tr.local_position += local_delta;
        }
    }

    /// Apply a world-space rotation on top of the current one.
    pub fn rotate(&mut self, transform: ComponentId, rotation: Quat) {
        if let Some(world_rotation) = self.world_rotation(transform) {
            self.set_world_rotation(transform, rotation * world_rotation);
        }
    }

    /// Orbit around `point` by `angle` radians about `axis`, rotating the
    /// transform's orientation along with it.
    pub fn rotate_around(&mut self, transform: ComponentId, point: Vec3, axis: Vec3, angle: f32) {
        if axis.length_squared() < DEGENERATE_AXIS {
            log::warn!("rotate_around with a zero-length axis; ignoring");
            return;
        }
        let rotation = Quat::from_axis_angle(axis.normalize(), angle);
        if let Some((world_position, world_rotation)) = self.world_pose(transform) {
            self.set_world_position(transform, point + rotation * (world_position - point));
            self.set_world_rotation(transform, rotation * world_rotation);
        }
    }

    /// Point the forward axis (-Z) at `target`, keeping `up` as the up
    /// hint.
    ///
    /// Builds an orthonormal basis with cross products. When the look
    /// direction is parallel to the up hint the basis would degenerate, so
    /// a fallback up axis is substituted instead of producing a zero-length
    /// cross product.
    pub fn look_at(&mut self, transform: ComponentId, target: Vec3, up: Vec3) {
        let Some((world_position, _)) = self.world_pose(transform) else {
            return;
        };
        let forward = target - world_position;
        if forward.length_squared() < DEGENERATE_AXIS {
            log::warn!("look_at target coincides with the transform position; ignoring");
            return;
        }
        let forward = forward.normalize();

        let mut up_hint = if up.length_squared() < DEGENERATE_AXIS {
            Vec3::Y
        } else {
            up.normalize()
        };
        if forward.cross(up_hint).length_squared() < DEGENERATE_AXIS {
            // Forward is parallel to the hint; pick whichever world axis is
            // not.
            up_hint = if forward.y.abs() < 0.99 { Vec3::Y } else { Vec3::Z };
        }

        let z_axis = -forward;
        let x_axis = up_hint.cross(z_axis).normalize();
        let y_axis = z_axis.cross(x_axis);
        let rotation = Quat::from_mat3(&Mat3::from_cols(x_axis, y_axis, z_axis));
        self.set_world_rotation(transform, rotation);
    }
}
