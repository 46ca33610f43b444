//! Transform components.

use glam::{Mat4, Quat, Vec3};

/// Position, rotation and scale of an actor with cached matrices.
///
/// `world` is only meaningful after the scene has propagated matrices from
/// the root; setters go through [`Actor`](crate::Actor) so the owning actor
/// is marked dirty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformComponent {
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) scale: Vec3,
    local: Mat4,
    world: Mat4,
}

impl Default for TransformComponent {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }
}

impl TransformComponent {
    pub fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let local = Mat4::from_scale_rotation_translation(scale, rotation, position);
        Self {
            position,
            rotation,
            scale,
            local,
            world: local,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY, Vec3::ONE)
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local matrix as of the last propagation.
    #[inline]
    pub fn local_matrix(&self) -> Mat4 {
        self.local
    }

    /// World matrix as of the last propagation.
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.world
    }

    /// Recompute the local matrix and compose it with the parent's world matrix.
    pub fn update_world_matrix(&mut self, parent_world: Mat4) -> Mat4 {
        self.local = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position);
        self.world = parent_world * self.local;
        self.world
    }
}

/// Extra copies of an actor drawn from the same geometry.
///
/// Each local matrix is relative to the actor's parent, like the actor's own
/// transform, so one actor can stand in for many merged siblings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstancedTransformComponent {
    locals: Vec<Mat4>,
    worlds: Vec<Mat4>,
}

impl InstancedTransformComponent {
    pub fn new(locals: Vec<Mat4>) -> Self {
        let worlds = locals.clone();
        Self { locals, worlds }
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    pub fn local_matrices(&self) -> &[Mat4] {
        &self.locals
    }

    pub fn world_matrices(&self) -> &[Mat4] {
        &self.worlds
    }

    pub(crate) fn locals_mut(&mut self) -> &mut Vec<Mat4> {
        &mut self.locals
    }

    pub(crate) fn update_world_matrices(&mut self, parent_world: Mat4) {
        self.worlds.clear();
        self.worlds
            .extend(self.locals.iter().map(|local| parent_world * *local));
    }
}
