//! Scene description files
//!
//! Scenes are stored as RON. Meshes, cameras and lights refer to transforms by
//! their index in `transforms`; a transform's parent must come before it.

use super::{LightKind, SceneError};
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A scene file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    pub transforms: Vec<TransformDesc>,
    #[serde(default)]
    pub meshes: Vec<MeshDesc>,
    #[serde(default)]
    pub cameras: Vec<CameraDesc>,
    #[serde(default)]
    pub lights: Vec<LightDesc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDesc {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub position: [f32; 3],
    /// Euler angles in degrees, applied X then Y then Z
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl TransformDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: unit_scale(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn rotation(&self) -> Quat {
        let [x, y, z] = self.rotation.map(f32::to_radians);
        Quat::from_euler(EulerRot::XYZ, x, y, z)
    }

    pub fn scale(&self) -> Vec3 {
        Vec3::from_array(self.scale)
    }
}

/// A mesh instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshDesc {
    pub transform: usize,
    pub mesh: String,
    /// Whether the instance is drawn into the shadow map
    #[serde(default = "enabled")]
    pub cast_shadow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDesc {
    pub transform: usize,
    #[serde(default = "default_fovy_degrees")]
    pub fovy_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightDesc {
    pub transform: usize,
    pub kind: LightKind,
    #[serde(default = "white")]
    pub color: [f32; 3],
    #[serde(default = "unit_energy")]
    pub energy: f32,
    #[serde(default = "default_spot_fov_degrees")]
    pub spot_fov_degrees: f32,
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

fn enabled() -> bool {
    true
}

fn default_fovy_degrees() -> f32 {
    60.0
}

fn default_near() -> f32 {
    0.01
}

fn white() -> [f32; 3] {
    [1.0; 3]
}

fn unit_energy() -> f32 {
    1.0
}

fn default_spot_fov_degrees() -> f32 {
    45.0
}

impl SceneDescription {
    /// Load a scene file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SceneError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_ron(&content)
    }

    pub fn from_ron(content: &str) -> Result<Self, SceneError> {
        let description: SceneDescription =
            ron::from_str(content).map_err(|e| SceneError::Deserialize(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    pub fn to_ron(&self) -> Result<String, SceneError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SceneError::Deserialize(e.to_string()))
    }

    /// Check transform references. Mesh names are checked when the scene is built.
    pub fn validate(&self) -> Result<(), SceneError> {
        let count = self.transforms.len();
        for (index, transform) in self.transforms.iter().enumerate() {
            if let Some(parent) = transform.parent {
                if parent >= index {
                    return Err(SceneError::InvalidParent {
                        index,
                        name: transform.name.clone(),
                        parent,
                    });
                }
            }
        }

        let references = self
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| ("Mesh", i, m.transform))
            .chain(self.cameras.iter().enumerate().map(|(i, c)| ("Camera", i, c.transform)))
            .chain(self.lights.iter().enumerate().map(|(i, l)| ("Light", i, l.transform)));
        for (kind, index, transform) in references {
            if transform >= count {
                return Err(SceneError::InvalidTransform {
                    kind,
                    index,
                    transform,
                    count,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
(
    transforms: [
        (name: "SpotParent"),
        (name: "Spot", parent: Some(0), position: (0.0, 0.0, 4.0)),
        (name: "Camera", position: (0.0, -5.0, 2.0), rotation: (70.0, 0.0, 0.0)),
        (name: "Platform", scale: (10.0, 10.0, 1.0)),
    ],
    meshes: [
        (transform: 3, mesh: "plane", cast_shadow: false),
    ],
    cameras: [
        (transform: 2),
    ],
    lights: [
        (transform: 1, kind: Spot, spot_fov_degrees: 60.0),
    ],
)
"#;

    #[test]
    fn test_parse_with_defaults() {
        let description = SceneDescription::from_ron(SCENE).unwrap();
        assert_eq!(description.transforms.len(), 4);
        assert_eq!(description.transforms[1].parent, Some(0));
        assert_eq!(description.transforms[0].scale, [1.0; 3]);
        assert!(!description.meshes[0].cast_shadow);
        assert_eq!(description.cameras[0].fovy_degrees, 60.0);
        assert_eq!(description.lights[0].kind, LightKind::Spot);
        assert_eq!(description.lights[0].color, [1.0; 3]);
    }

    #[test]
    fn test_rotation_is_in_degrees() {
        let mut transform = TransformDesc::new("T");
        transform.rotation = [0.0, 0.0, 90.0];
        let x = transform.rotation() * Vec3::X;
        assert!(x.abs_diff_eq(Vec3::Y, 1e-5));
    }

    #[test]
    fn test_parent_must_precede_child() {
        let mut description = SceneDescription::from_ron(SCENE).unwrap();
        description.transforms[0].parent = Some(1);
        assert!(matches!(
            description.validate(),
            Err(SceneError::InvalidParent { index: 0, parent: 1, .. })
        ));
    }

    #[test]
    fn test_reference_out_of_range() {
        let mut description = SceneDescription::from_ron(SCENE).unwrap();
        description.lights[0].transform = 9;
        assert!(matches!(
            description.validate(),
            Err(SceneError::InvalidTransform { kind: "Light", transform: 9, .. })
        ));
    }

    #[test]
    fn test_round_trip_through_ron() {
        let description = SceneDescription::from_ron(SCENE).unwrap();
        let text = description.to_ron().unwrap();
        assert_eq!(SceneDescription::from_ron(&text).unwrap(), description);
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            SceneDescription::from_ron("(transforms: ["),
            Err(SceneError::Deserialize(_))
        ));
    }
}
