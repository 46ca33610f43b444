//! Camera component.
//!
//! The eye sits at the owning actor's world position and looks down the
//! actor's local -Z axis.

use glam::{Mat4, Vec3};
use scenic_core::Frustum;

/// Perspective camera attached to an actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraComponent {
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Only the first active camera in the scene drives culling.
    pub active: bool,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            active: true,
        }
    }
}

impl CameraComponent {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov,
            aspect,
            near,
            far,
            active: true,
        }
    }

    /// Set the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self, world: Mat4) -> Mat4 {
        let position = world.transform_point3(Vec3::ZERO);
        let direction = world.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
        let up = world.transform_vector3(Vec3::Y).normalize_or_zero();
        Mat4::look_to_rh(position, direction, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self, world: Mat4) -> Mat4 {
        self.projection_matrix() * self.view_matrix(world)
    }

    /// Extract frustum planes for a camera placed at `world`.
    pub fn frustum(&self, world: Mat4) -> Frustum {
        Frustum::from_view_projection(self.view_projection_matrix(world))
    }
}
