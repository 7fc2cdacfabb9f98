use std::cell::RefCell;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

/// A camera shared between the host and the passes that read it.
pub type SharedCamera = Rc<RefCell<Camera>>;

/// A perspective camera.
///
/// Passes only read it: scene passes hand it to the renderer and depth-aware
/// effects take the clip planes from it to linearize depth.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedCamera {
        Rc::new(RefCell::new(self))
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        self.forward = (Vec3::new(target_x, target_y, target_z) - self.position).normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Compute the right vector from forward and up.
    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up).normalize_or_zero()
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Perspective projection with a `[0, 1]` depth range.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }

    /// Projects a world position to uv space (origin top left). Returns `None` for
    /// points behind the camera.
    pub fn project_to_uv(&self, world: Vec3, aspect: f32) -> Option<glam::Vec2> {
        let clip = self.view_projection(aspect) * Vec4::new(world.x, world.y, world.z, 1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(glam::Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ahead_projects_to_center() {
        let camera = Camera::new().at(0.0, 0.0, 5.0).looking_at(0.0, 0.0, 0.0);
        let uv = camera.project_to_uv(Vec3::ZERO, 1.0).unwrap();
        assert!((uv - glam::Vec2::splat(0.5)).length() < 1e-5);
    }

    #[test]
    fn point_behind_is_rejected() {
        let camera = Camera::new();
        assert!(camera.project_to_uv(Vec3::new(0.0, 0.0, 10.0), 1.0).is_none());
    }

    #[test]
    fn right_is_orthogonal() {
        let camera = Camera::new();
        assert!(camera.right().dot(camera.forward).abs() < 1e-6);
        assert_eq!(camera.right(), Vec3::X);
    }
}
