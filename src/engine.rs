//! Main engine orchestrator
//!
//! Owns the backend, the scene and the offscreen targets, and renders each
//! frame in two passes: depth from the spotlight into the shadow map, then the
//! lit scene from the camera, sampling the shadow map.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::input::InputEvent;
use crate::pipeline::shadowed_color_texture::{self, LightUniforms, SHADOW_UNIT, SURFACE_UNIT};
use crate::pipeline::{depth_only, Pipeline, PipelineSet, PipelineType};
use crate::resources::{FramebufferError, Framebuffers, MeshBuffer, MeshRange, TextureData, TextureError};
use crate::scene::{
    clip_to_texture_bias, InteractionController, Scene, SceneContext, SceneDescription, SceneError,
};
use crate::EngineConfig;
use glam::{Mat4, Vec3};
use thiserror::Error;

/// Drawables with these names get the wood and marble surface textures
pub const PLATFORM_NAME: &str = "Platform";
pub const PEDESTAL_NAME: &str = "Pedestal";

const SHADOW_CLEAR_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 0.0];
const LIT_CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
const CLEAR_DEPTH: f32 = 1.0;

const SUN_COLOR: Vec3 = Vec3::ZERO;
const SUN_DIRECTION: Vec3 = Vec3::NEG_Z;
const SKY_COLOR: Vec3 = Vec3::new(0.2, 0.2, 0.3);
const SKY_DIRECTION: Vec3 = Vec3::Z;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Texture(#[from] TextureError),
    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),
    #[error("Window error: {0}")]
    Window(String),
}

/// Draw counts of one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub shadow_draws: usize,
    pub lit_draws: usize,
}

/// CPU-side content loaded before the engine starts
#[derive(Debug, Clone)]
pub struct SceneAssets {
    pub description: SceneDescription,
    pub meshes: MeshBuffer,
    pub wood: TextureData,
    pub marble: TextureData,
}

impl SceneAssets {
    pub fn new(description: SceneDescription, meshes: MeshBuffer, wood: TextureData, marble: TextureData) -> Self {
        Self {
            description,
            meshes,
            wood,
            marble,
        }
    }

    /// Read the scene file and the surface textures named by `config`
    pub fn load(config: &EngineConfig) -> Result<Self, EngineError> {
        let description = SceneDescription::load(&config.scene_path)?;
        let textures = config.asset_dir.join("textures");
        let wood = TextureData::from_file(textures.join("wood.png"))?;
        let marble = TextureData::from_file(textures.join("marble.png"))?;
        Ok(Self::new(description, MeshBuffer::standard(), wood, marble))
    }
}

/// Per-pass templates every drawable's pipelines are copied from
#[derive(Debug, Clone)]
pub struct PipelineTemplates {
    pub lit: Pipeline,
    pub shadow: Pipeline,
    pub wood: TextureHandle,
    pub marble: TextureHandle,
}

impl PipelineTemplates {
    /// Surface texture for a drawable, `None` keeps the template's white
    pub fn surface_texture(&self, name: &str) -> Option<TextureHandle> {
        match name {
            PLATFORM_NAME => Some(self.wood),
            PEDESTAL_NAME => Some(self.marble),
            _ => None,
        }
    }

    /// Pipelines for the drawable `name` covering `range`
    pub fn pipelines_for(&self, name: &str, range: MeshRange, cast_shadow: bool) -> PipelineSet {
        let mut lit = self.lit.for_range(range);
        if let Some(texture) = self.surface_texture(name) {
            lit.set_texture(SURFACE_UNIT, texture);
        }
        let mut pipelines = PipelineSet::new().with(PipelineType::Default, lit);
        if cast_shadow {
            pipelines.set(PipelineType::Shadow, self.shadow.for_range(range));
        }
        pipelines
    }
}

/// The main graphics engine
pub struct Engine<B: GraphicsBackend> {
    backend: B,
    scene: Scene,
    context: SceneContext,
    controller: InteractionController,
    framebuffers: Framebuffers,
    templates: PipelineTemplates,
    lights: LightUniforms,
    vertices: BufferHandle,
    white: TextureHandle,
    shadow_map_size: u32,
}

impl<B: GraphicsBackend> Engine<B> {
    /// Upload meshes and textures, compile programs and build the scene.
    pub fn new(mut backend: B, assets: SceneAssets, config: &EngineConfig) -> Result<Self, EngineError> {
        let vertices = assets.meshes.upload(&mut backend)?;

        let white = TextureData::white().upload(&mut backend, &SamplerDescriptor::clamped(FilterMode::Nearest))?;
        let wood = assets.wood.upload(&mut backend, &SamplerDescriptor::trilinear_repeat())?;
        let marble = assets.marble.upload(&mut backend, &SamplerDescriptor::trilinear_repeat())?;

        let shadow = depth_only::build_template(&mut backend, vertices)?;
        let (lit, lights) = shadowed_color_texture::build_template(&mut backend, vertices, white)?;
        log::info!("Compiled programs {} and {}", depth_only::LABEL, shadowed_color_texture::LABEL);

        let templates = PipelineTemplates {
            lit,
            shadow,
            wood,
            marble,
        };
        let scene = Scene::from_description(&assets.description, &assets.meshes, |transform, range, mesh| {
            templates.pipelines_for(&transform.name, range, mesh.cast_shadow)
        })?;
        let context = SceneContext::resolve(&scene)?;
        log::info!(
            "Scene loaded: {} transforms, {} drawables, {} cameras, {} lights",
            scene.transforms.len(),
            scene.drawables.len(),
            scene.cameras.len(),
            scene.lights.len()
        );

        Ok(Self {
            backend,
            scene,
            context,
            controller: InteractionController::new(config.move_speed),
            framebuffers: Framebuffers::new(),
            templates,
            lights,
            vertices,
            white,
            shadow_map_size: config.shadow_map_size,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn context(&self) -> &SceneContext {
        &self.context
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn framebuffers(&self) -> &Framebuffers {
        &self.framebuffers
    }

    pub fn templates(&self) -> &PipelineTemplates {
        &self.templates
    }

    /// Forward an input event to the interaction controller
    pub fn handle_event(&mut self, event: &InputEvent, window_size: (u32, u32)) -> bool {
        self.controller
            .handle_event(event, window_size, &mut self.scene, &self.context)
    }

    /// Advance the simulation by `elapsed` seconds
    pub fn update(&mut self, elapsed: f32) {
        self.controller.update(elapsed, &mut self.scene, &self.context);
    }

    pub fn wants_pointer_capture(&self) -> bool {
        self.controller.wants_pointer_capture()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.backend.resize(width, height);
    }

    /// Render one frame at `drawable_size`.
    ///
    /// A zero-sized drawable skips the frame.
    pub fn draw(&mut self, drawable_size: (u32, u32)) -> Result<FrameStats, EngineError> {
        let (width, height) = drawable_size;
        if width == 0 || height == 0 {
            return Ok(FrameStats::default());
        }

        let shadow_size = (self.shadow_map_size, self.shadow_map_size);
        self.framebuffers
            .allocate(&mut self.backend, drawable_size, shadow_size)?;
        let (shadow_framebuffer, shadow_depth) = self.framebuffers.shadow_pass_targets()?;

        self.backend.begin_frame()?;

        let spot = self.context.spot(&self.scene);
        let spot_local_from_world = Mat4::from(self.scene.transforms.local_from_world(spot.transform));
        let spot_view_projection = spot.make_projection() * spot_local_from_world;

        // Shadow pass
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: PipelineType::Shadow.name().to_string(),
            target: RenderTarget::Framebuffer(shadow_framebuffer),
            clear_color: Some(SHADOW_CLEAR_COLOR),
            clear_depth: Some(CLEAR_DEPTH),
        })?;
        self.backend.set_viewport(0, 0, shadow_size.0, shadow_size.1);
        self.backend.set_render_state(&RenderState {
            depth_test: true,
            blend: None,
            cull_mode: CullMode::Front,
        });
        let shadow_draws = self
            .scene
            .draw(&mut self.backend, spot_view_projection, PipelineType::Shadow)?;
        self.backend.set_render_state(&RenderState {
            depth_test: true,
            blend: None,
            cull_mode: CullMode::None,
        });
        self.backend.end_render_pass();
        self.log_errors(PipelineType::Shadow);

        // Lit pass
        self.backend.begin_render_pass(&RenderPassDescriptor {
            label: PipelineType::Default.name().to_string(),
            target: RenderTarget::Surface,
            clear_color: Some(LIT_CLEAR_COLOR),
            clear_depth: Some(CLEAR_DEPTH),
        })?;
        self.backend.set_viewport(0, 0, width, height);
        self.context.camera_mut(&mut self.scene).set_aspect(width, height);
        self.backend.set_render_state(&RenderState {
            depth_test: true,
            blend: Some(BlendState::alpha_blending()),
            cull_mode: CullMode::None,
        });

        self.backend.use_program(Some(self.templates.lit.program));
        self.set_light_uniforms(spot_view_projection);
        self.backend.bind_texture(SHADOW_UNIT, Some(shadow_depth));
        self.backend.set_texture_sampler(
            shadow_depth,
            &SamplerDescriptor::clamped(FilterMode::Linear).with_compare(CompareFunction::Less),
        )?;

        let camera = self.context.camera(&self.scene);
        let camera_view = Mat4::from(self.scene.transforms.local_from_world(camera.transform));
        let lit_draws = self
            .scene
            .draw(&mut self.backend, camera.make_projection() * camera_view, PipelineType::Default)?;

        self.backend.bind_texture(SHADOW_UNIT, None);
        self.backend.end_render_pass();
        self.log_errors(PipelineType::Default);

        self.backend.end_frame()?;

        let stats = FrameStats {
            shadow_draws,
            lit_draws,
        };
        log::trace!("Frame drawn: {:?}", stats);
        Ok(stats)
    }

    /// Write the sky, sun and spotlight uniforms of the bound lit program
    fn set_light_uniforms(&mut self, spot_view_projection: Mat4) {
        let spot = self.context.spot(&self.scene);
        let spot_world = self.scene.transforms.world_from_local(spot.transform);
        let spot_position = Vec3::from(spot_world.translation);
        let spot_direction = -Vec3::from(spot_world.matrix3.z_axis).normalize_or_zero();
        let spot_color = spot.color * spot.energy;
        let spot_outer_inner = spot.spot_outer_inner();

        let lights = self.lights;
        let backend = &mut self.backend;
        backend.set_uniform(lights.sun_color, UniformValue::Vec3(SUN_COLOR));
        backend.set_uniform(lights.sun_direction, UniformValue::Vec3(SUN_DIRECTION));
        backend.set_uniform(lights.sky_color, UniformValue::Vec3(SKY_COLOR));
        backend.set_uniform(lights.sky_direction, UniformValue::Vec3(SKY_DIRECTION));
        backend.set_uniform(
            lights.light_to_spot,
            UniformValue::Mat4(clip_to_texture_bias() * spot_view_projection),
        );
        backend.set_uniform(lights.spot_position, UniformValue::Vec3(spot_position));
        backend.set_uniform(lights.spot_direction, UniformValue::Vec3(spot_direction));
        backend.set_uniform(lights.spot_color, UniformValue::Vec3(spot_color));
        backend.set_uniform(lights.spot_outer_inner, UniformValue::Vec2(spot_outer_inner));
    }

    fn log_errors(&mut self, pass: PipelineType) {
        for error in self.backend.take_errors() {
            log::error!("{} pass: {}", pass.name(), error);
        }
    }

    /// Destroy every GPU resource the engine created and hand the backend back
    pub fn into_backend(mut self) -> B {
        self.framebuffers.release(&mut self.backend);
        for texture in [self.white, self.templates.wood, self.templates.marble] {
            self.backend.destroy_texture(texture);
        }
        self.backend.destroy_buffer(self.vertices);
        self.backend
    }
}
