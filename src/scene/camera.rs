//! Camera

use super::TransformId;
use glam::{Mat4, Vec4};

/// Perspective camera attached to a transform.
///
/// Projections follow the GL clip convention (depth in `[-w, w]`); shaders
/// remap depth when writing clip positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub transform: TransformId,
    /// Vertical field of view in radians
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
}

impl Camera {
    pub fn new(transform: TransformId) -> Self {
        Self {
            transform,
            fovy: 60f32.to_radians(),
            aspect: 1.0,
            near: 0.01,
        }
    }

    /// Infinite perspective projection
    pub fn make_projection(&self) -> Mat4 {
        let f = 1.0 / (0.5 * self.fovy).tan();
        Mat4::from_cols(
            Vec4::new(f / self.aspect, 0.0, 0.0, 0.0),
            Vec4::new(0.0, f, 0.0, 0.0),
            Vec4::new(0.0, 0.0, -1.0, -1.0),
            Vec4::new(0.0, 0.0, -2.0 * self.near, 0.0),
        )
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_near_plane_maps_to_minus_one() {
        let camera = Camera {
            near: 0.5,
            ..Camera::new(TransformId(0))
        };
        let clip = camera.make_projection() * Vec3::new(0.0, 0.0, -0.5).extend(1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-5);

        let far = camera.make_projection() * Vec3::new(0.0, 0.0, -1.0e6).extend(1.0);
        assert!(far.z / far.w < 1.0);
    }

    #[test]
    fn test_aspect_from_size() {
        let mut camera = Camera::new(TransformId(0));
        camera.set_aspect(1600, 900);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect(10, 0);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
    }
}
