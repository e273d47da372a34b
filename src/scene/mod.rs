//! Scene management
//!
//! A [`Scene`] is a transform hierarchy plus the drawables, cameras and
//! lights attached to it. It is built once from a [`SceneDescription`].

mod camera;
mod context;
mod controller;
mod description;
mod light;
mod transform;

pub use camera::*;
pub use context::*;
pub use controller::*;
pub use description::*;
pub use light::*;
pub use transform::*;

use crate::backend::{BackendResult, GraphicsBackend, UniformValue};
use crate::pipeline::{PipelineSet, PipelineType};
use crate::resources::{MeshLookup, MeshRange};
use glam::{Mat3, Mat4, Vec3};
use thiserror::Error;

/// Scene loading error
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to read scene: {0}")]
    Io(String),
    #[error("Failed to parse scene: {0}")]
    Deserialize(String),
    #[error("{kind} {index} refers to transform {transform}, but the scene has {count} transforms")]
    InvalidTransform {
        kind: &'static str,
        index: usize,
        transform: usize,
        count: usize,
    },
    #[error("Transform {index} ('{name}') has parent {parent}, which does not come before it")]
    InvalidParent { index: usize, name: String, parent: usize },
    #[error("Unknown mesh '{0}'")]
    UnknownMesh(String),
    #[error("No '{name}' {kind} in scene")]
    Missing { kind: &'static str, name: &'static str },
    #[error("Multiple '{name}' {kind} objects in scene")]
    Duplicate { kind: &'static str, name: &'static str },
    #[error("Lamp '{0}' is not a spotlight")]
    NotASpotLight(String),
}

/// A mesh instance drawn through one pipeline per pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawable {
    pub transform: TransformId,
    pub pipelines: PipelineSet,
}

/// The scene containing all renderable content
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub transforms: Transforms,
    pub drawables: Vec<Drawable>,
    pub cameras: Vec<Camera>,
    pub lights: Vec<Light>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a scene from its description.
    ///
    /// `make_pipelines` is called once per mesh instance with its transform,
    /// its vertex range and its description, and returns the drawable's
    /// pipelines.
    pub fn from_description<F>(
        description: &SceneDescription,
        meshes: &dyn MeshLookup,
        mut make_pipelines: F,
    ) -> Result<Self, SceneError>
    where
        F: FnMut(&Transform, MeshRange, &MeshDesc) -> PipelineSet,
    {
        description.validate()?;
        let mut scene = Scene::new();

        for (index, desc) in description.transforms.iter().enumerate() {
            let mut transform = Transform::new(&desc.name)
                .with_position(desc.position())
                .with_rotation(desc.rotation())
                .with_scale(desc.scale());
            transform.parent = desc.parent.map(TransformId);
            scene.transforms.add(transform).ok_or_else(|| SceneError::InvalidParent {
                index,
                name: desc.name.clone(),
                parent: desc.parent.unwrap_or(index),
            })?;
        }

        for mesh in &description.meshes {
            let range = meshes
                .lookup(&mesh.mesh)
                .ok_or_else(|| SceneError::UnknownMesh(mesh.mesh.clone()))?;
            let transform = TransformId(mesh.transform);
            let pipelines = make_pipelines(&scene.transforms[transform], range, mesh);
            scene.drawables.push(Drawable { transform, pipelines });
        }

        for camera in &description.cameras {
            scene.cameras.push(Camera {
                fovy: camera.fovy_degrees.to_radians(),
                near: camera.near,
                ..Camera::new(TransformId(camera.transform))
            });
        }

        for light in &description.lights {
            scene.lights.push(Light {
                color: Vec3::from_array(light.color),
                energy: light.energy,
                spot_fov: light.spot_fov_degrees.to_radians(),
                ..Light::new(TransformId(light.transform), light.kind)
            });
        }

        Ok(scene)
    }

    /// Draw every drawable that has a pipeline of type `ty`, returning the number of draws.
    ///
    /// Drawables without such a pipeline are skipped.
    pub fn draw(
        &self,
        backend: &mut dyn GraphicsBackend,
        world_to_clip: Mat4,
        ty: PipelineType,
    ) -> BackendResult<usize> {
        let mut issued = 0;
        for drawable in &self.drawables {
            let Some(pipeline) = drawable.pipelines.get(ty) else {
                continue;
            };
            let world_from_local = self.transforms.world_from_local(drawable.transform);

            pipeline.bind(backend);
            let uniforms = &pipeline.uniforms;
            backend.set_uniform(
                uniforms.clip_from_object,
                UniformValue::Mat4(world_to_clip * Mat4::from(world_from_local)),
            );
            backend.set_uniform(uniforms.light_from_object, UniformValue::Mat4x3(world_from_local));
            backend.set_uniform(
                uniforms.light_from_normal,
                UniformValue::Mat3(Mat3::from(world_from_local.matrix3).inverse().transpose()),
            );
            pipeline.issue(backend)?;
            issued += 1;
        }

        backend.use_program(None);
        backend.bind_vertex_array(None);
        log::trace!("{} pass: {} draws", ty.name(), issued);
        Ok(issued)
    }
}
