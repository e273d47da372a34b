//! Light types for the scene

use super::TransformId;
use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Inner cone half-angle as a fraction of the outer half-angle
pub const SPOT_FALLOFF_RATIO: f32 = 0.85;

/// Near and far planes of the spotlight's shadow projection
pub const SPOT_NEAR: f32 = 0.1;
pub const SPOT_FAR: f32 = 100.0;

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightKind {
    Point,
    Hemisphere,
    Spot,
    Directional,
}

/// A light attached to a transform. It shines along its local -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub transform: TransformId,
    pub kind: LightKind,
    pub color: Vec3,
    pub energy: f32,
    /// Full cone angle in radians, for spot lights
    pub spot_fov: f32,
}

impl Light {
    pub fn new(transform: TransformId, kind: LightKind) -> Self {
        Self {
            transform,
            kind,
            color: Vec3::ONE,
            energy: 1.0,
            spot_fov: 45f32.to_radians(),
        }
    }

    /// Shadow projection for a spot light, GL clip convention
    pub fn make_projection(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.spot_fov, 1.0, SPOT_NEAR, SPOT_FAR)
    }

    pub fn spot_outer_inner(&self) -> Vec2 {
        spot_outer_inner(self.spot_fov)
    }
}

/// Cosines of the outer and inner cone half-angles for a cone of `fov` radians.
///
/// Falloff runs from the outer cosine (dark) to the inner one (full light).
pub fn spot_outer_inner(fov: f32) -> Vec2 {
    Vec2::new((0.5 * fov).cos(), (SPOT_FALLOFF_RATIO * 0.5 * fov).cos())
}

/// Maps GL clip space `[-1, 1]` to texture space `[0, 1]`, with a small depth bias
pub fn clip_to_texture_bias() -> Mat4 {
    Mat4::from_cols_array(&[
        0.5, 0.0, 0.0, 0.0, //
        0.0, 0.5, 0.0, 0.0, //
        0.0, 0.0, 0.5, 0.0, //
        0.5, 0.5, 0.5 + 0.00001, 1.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_bias_maps_clip_corners() {
        let bias = clip_to_texture_bias();
        let low = bias * Vec4::new(-1.0, -1.0, -1.0, 1.0);
        let high = bias * Vec4::new(1.0, 1.0, 1.0, 1.0);
        assert!(low.truncate().abs_diff_eq(Vec3::new(0.0, 0.0, 0.00001), 1e-6));
        assert!(high.truncate().abs_diff_eq(Vec3::new(1.0, 1.0, 1.00001), 1e-6));
    }

    #[test]
    fn test_outer_inner_for_right_angle_cone() {
        let falloff = spot_outer_inner(std::f32::consts::FRAC_PI_2);
        assert!((falloff.x - std::f32::consts::FRAC_PI_4.cos()).abs() < 1e-6);
        assert!(falloff.y > falloff.x);
    }
}
