//! Orbit camera for preview renders.

use std::f32::consts::PI;

use nalgebra::{Matrix4, Point3, Vector3};

/// Orbit camera that looks at a target point from a distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitCamera {
    /// Target point to orbit around.
    pub target: Point3<f32>,
    /// Distance from target.
    pub distance: f32,
    /// Horizontal angle (radians).
    pub azimuth: f32,
    /// Vertical angle (radians), clamped to avoid flipping over the pole.
    pub elevation: f32,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Near clip plane.
    pub near: f32,
    /// Far clip plane.
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            distance: 3.0,
            azimuth: 0.0,
            elevation: 0.3,
            fov: PI / 4.0, // 45 degrees
            near: 0.01,
            far: 100.0,
        }
    }
}

impl OrbitCamera {
    /// Create a camera looking at `target` from `distance`.
    pub fn new(target: Point3<f32>, distance: f32) -> Self {
        Self {
            target,
            distance,
            ..Default::default()
        }
    }

    /// Frame an axis-aligned box so that its bounding sphere fills the view.
    pub fn framing(min: Point3<f32>, max: Point3<f32>) -> Self {
        let target = nalgebra::center(&min, &max);
        let radius = ((max - min).norm() * 0.5).max(1e-3);
        let mut camera = Self::new(target, 1.0);
        camera.distance = radius / (camera.fov * 0.5).sin() * 1.1;
        camera.near = camera.distance * 0.01;
        camera.far = camera.distance + radius * 4.0;
        camera
    }

    /// Set the orbit angles.
    pub fn with_angles(mut self, azimuth: f32, elevation: f32) -> Self {
        self.azimuth = 0.0;
        self.elevation = 0.0;
        self.rotate(azimuth, elevation);
        self
    }

    /// The camera's eye position in world space.
    pub fn eye_position(&self) -> Point3<f32> {
        let cos_elev = self.elevation.cos();
        let sin_elev = self.elevation.sin();
        let cos_azim = self.azimuth.cos();
        let sin_azim = self.azimuth.sin();

        self.target
            + Vector3::new(
                self.distance * cos_elev * sin_azim,
                self.distance * sin_elev,
                self.distance * cos_elev * cos_azim,
            )
    }

    /// World to camera transform.
    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.eye_position(), &self.target, &Vector3::y())
    }

    /// Camera to clip transform.
    pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        Matrix4::new_perspective(aspect, self.fov, self.near, self.far)
    }

    /// Combined world to clip transform.
    pub fn view_projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    /// Rotate the camera by the given deltas (in radians).
    pub fn rotate(&mut self, delta_azimuth: f32, delta_elevation: f32) {
        self.azimuth += delta_azimuth;
        self.elevation += delta_elevation;

        let limit = PI / 2.0 - 0.01;
        self.elevation = self.elevation.clamp(-limit, limit);
    }

    /// Zoom the camera by the given factor.
    pub fn zoom(&mut self, factor: f32) {
        self.distance = (self.distance * factor).max(self.near * 2.0);
    }
}
