//! Named scene entities the renderer and controller work with

use super::{Camera, Light, LightKind, Scene, SceneError, TransformId};

pub const SPOT_PARENT_NAME: &str = "SpotParent";
pub const CAMERA_NAME: &str = "Camera";
pub const SPOT_NAME: &str = "Spot";

/// The camera, spotlight and spotlight parent of a scene, resolved by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneContext {
    /// Index into `Scene::cameras`
    pub camera: usize,
    /// Index into `Scene::lights`
    pub spot: usize,
    pub spot_parent: TransformId,
}

/// The single item matching `pred`, or a missing/duplicate error
fn exactly_one<T>(
    mut matches: impl Iterator<Item = T>,
    kind: &'static str,
    name: &'static str,
) -> Result<T, SceneError> {
    let first = matches.next().ok_or(SceneError::Missing { kind, name })?;
    if matches.next().is_some() {
        return Err(SceneError::Duplicate { kind, name });
    }
    Ok(first)
}

impl SceneContext {
    /// Resolve exactly one `SpotParent` transform, one `Camera` camera and one
    /// `Spot` light, which must be a spotlight.
    pub fn resolve(scene: &Scene) -> Result<Self, SceneError> {
        let spot_parent = exactly_one(scene.transforms.find(SPOT_PARENT_NAME), "transform", SPOT_PARENT_NAME)?;

        let named = |transform: TransformId, name: &str| {
            scene.transforms.get(transform).is_some_and(|t| t.name == name)
        };
        let camera = exactly_one(
            scene
                .cameras
                .iter()
                .enumerate()
                .filter(|(_, c)| named(c.transform, CAMERA_NAME))
                .map(|(i, _)| i),
            "camera",
            CAMERA_NAME,
        )?;
        let spot = exactly_one(
            scene
                .lights
                .iter()
                .enumerate()
                .filter(|(_, l)| named(l.transform, SPOT_NAME))
                .map(|(i, _)| i),
            "light",
            SPOT_NAME,
        )?;
        if scene.lights[spot].kind != LightKind::Spot {
            return Err(SceneError::NotASpotLight(SPOT_NAME.to_string()));
        }

        Ok(Self {
            camera,
            spot,
            spot_parent,
        })
    }

    pub fn camera<'a>(&self, scene: &'a Scene) -> &'a Camera {
        &scene.cameras[self.camera]
    }

    pub fn camera_mut<'a>(&self, scene: &'a mut Scene) -> &'a mut Camera {
        &mut scene.cameras[self.camera]
    }

    pub fn spot<'a>(&self, scene: &'a Scene) -> &'a Light {
        &scene.lights[self.spot]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Transform, Transforms};
    use rstest::rstest;

    fn scene(names: &[&str], cameras: &[usize], lights: &[(usize, LightKind)]) -> Scene {
        let mut transforms = Transforms::new();
        for name in names {
            transforms.add(Transform::new(name));
        }
        Scene {
            transforms,
            drawables: Vec::new(),
            cameras: cameras.iter().map(|&t| Camera::new(TransformId(t))).collect(),
            lights: lights.iter().map(|&(t, kind)| Light::new(TransformId(t), kind)).collect(),
        }
    }

    #[test]
    fn test_resolves_named_entities() {
        let scene = scene(
            &["SpotParent", "Spot", "Other", "Camera"],
            &[2, 3],
            &[(2, LightKind::Point), (1, LightKind::Spot)],
        );
        let context = SceneContext::resolve(&scene).unwrap();
        assert_eq!(context.camera, 1);
        assert_eq!(context.spot, 1);
        assert_eq!(context.spot_parent, TransformId(0));
    }

    #[rstest]
    #[case(&["Spot", "Camera"], &[1], &[(0, LightKind::Spot)], "SpotParent")]
    #[case(&["SpotParent", "Spot", "Camera"], &[], &[(1, LightKind::Spot)], "Camera")]
    #[case(&["SpotParent", "Spot", "Camera"], &[2], &[], "Spot")]
    fn test_missing_entity(
        #[case] names: &[&str],
        #[case] cameras: &[usize],
        #[case] lights: &[(usize, LightKind)],
        #[case] expected: &str,
    ) {
        let result = SceneContext::resolve(&scene(names, cameras, lights));
        assert!(matches!(result, Err(SceneError::Missing { name, .. }) if name == expected));
    }

    #[test]
    fn test_duplicate_spot_parent() {
        let scene = scene(
            &["SpotParent", "SpotParent", "Spot", "Camera"],
            &[3],
            &[(2, LightKind::Spot)],
        );
        assert!(matches!(
            SceneContext::resolve(&scene),
            Err(SceneError::Duplicate { name: "SpotParent", .. })
        ));
    }

    #[test]
    fn test_duplicate_camera() {
        let scene = scene(&["SpotParent", "Spot", "Camera"], &[2, 2], &[(1, LightKind::Spot)]);
        assert!(matches!(
            SceneContext::resolve(&scene),
            Err(SceneError::Duplicate { name: "Camera", .. })
        ));
    }

    #[test]
    fn test_spot_must_be_a_spotlight() {
        let scene = scene(&["SpotParent", "Spot", "Camera"], &[2], &[(1, LightKind::Directional)]);
        assert!(matches!(
            SceneContext::resolve(&scene),
            Err(SceneError::NotASpotLight(_))
        ));
    }
}
