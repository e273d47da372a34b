//! Frame-level tests against the recording backend

use glam::{Mat4, Vec3};
use rstest::rstest;
use shadowmap_engine::backend::dummy::{Command, DummyBackend};
use shadowmap_engine::backend::{CullMode, FramebufferStatus, RenderTarget, UniformValue};
use shadowmap_engine::engine::{Engine, EngineError, SceneAssets};
use shadowmap_engine::pipeline::shadowed_color_texture::{SHADOW_UNIT, SURFACE_UNIT};
use shadowmap_engine::pipeline::PipelineType;
use shadowmap_engine::resources::{FramebufferError, MeshBuffer, TextureData};
use shadowmap_engine::scene::{clip_to_texture_bias, spot_outer_inner, SceneDescription, SceneError};
use shadowmap_engine::EngineConfig;

const SCENE: &str = include_str!("../assets/scenes/shadow_vignette.ron");
const SIZE: (u32, u32) = (800, 600);

fn assets() -> SceneAssets {
    SceneAssets::new(
        SceneDescription::from_ron(SCENE).unwrap(),
        MeshBuffer::standard(),
        TextureData::solid_color([120, 80, 40, 255], "wood"),
        TextureData::solid_color([230, 230, 225, 255], "marble"),
    )
}

fn engine() -> Engine<DummyBackend> {
    Engine::new(DummyBackend::new(SIZE.0, SIZE.1), assets(), &EngineConfig::default()).unwrap()
}

#[test]
fn test_pass_draw_counts() {
    let mut engine = engine();
    let stats = engine.draw(SIZE).unwrap();

    // The platform does not cast a shadow
    assert_eq!(stats.shadow_draws, 3);
    assert_eq!(stats.lit_draws, 4);
    assert_eq!(engine.backend().draws_in_pass(PipelineType::Shadow.name()).len(), 3);
    assert_eq!(engine.backend().draws_in_pass(PipelineType::Default.name()).len(), 4);
}

#[test]
fn test_drawable_without_pipeline_is_skipped() {
    let mut description = SceneDescription::from_ron(SCENE).unwrap();
    for mesh in &mut description.meshes {
        mesh.cast_shadow = false;
    }
    let assets = SceneAssets {
        description,
        ..assets()
    };
    let mut engine = Engine::new(DummyBackend::new(SIZE.0, SIZE.1), assets, &EngineConfig::default()).unwrap();

    let stats = engine.draw(SIZE).unwrap();
    assert_eq!(stats.shadow_draws, 0);
    assert_eq!(stats.lit_draws, 4);
}

#[rstest]
#[case("Platform", Some("wood"))]
#[case("Pedestal", Some("marble"))]
#[case("Ball", None)]
#[case("Crate", None)]
fn test_surface_texture_selection(#[case] name: &str, #[case] expected: Option<&str>) {
    let engine = engine();
    let scene = engine.scene();
    let templates = engine.templates();

    let drawable = scene
        .drawables
        .iter()
        .find(|d| scene.transforms[d.transform].name == name)
        .unwrap();
    let texture = drawable.pipelines[PipelineType::Default]
        .as_ref()
        .and_then(|p| p.texture(SURFACE_UNIT))
        .unwrap();

    let expected = match expected {
        Some("wood") => templates.wood,
        Some(_) => templates.marble,
        None => templates.lit.texture(SURFACE_UNIT).unwrap(),
    };
    assert_eq!(texture, expected);
    assert!(engine.backend().texture(texture).is_some());
}

#[test]
fn test_lit_draws_sample_the_shadow_map() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    let shadow_depth = engine.framebuffers().shadow_depth_texture().unwrap();

    for draw in engine.backend().draws_in_pass(PipelineType::Default.name()) {
        assert!(draw.textures.contains(&(SHADOW_UNIT, shadow_depth)));
        assert!(draw.textures.iter().any(|(unit, _)| *unit == SURFACE_UNIT));
    }
    for draw in engine.backend().draws_in_pass(PipelineType::Shadow.name()) {
        assert!(draw.textures.is_empty());
        assert_eq!(draw.render_state.cull_mode, CullMode::Front);
    }
}

#[test]
fn test_second_frame_allocates_nothing() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    engine.backend_mut().clear_commands();

    engine.draw(SIZE).unwrap();
    assert_eq!(engine.backend().allocation_count(), 0);
}

#[test]
fn test_resize_reallocates_screen_target_only() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    let shadow = engine.framebuffers().shadow().clone();
    engine.backend_mut().clear_commands();

    engine.draw((1024, 768)).unwrap();

    assert_eq!(engine.framebuffers().screen_size(), Some((1024, 768)));
    assert_eq!(engine.framebuffers().shadow_size(), Some((512, 512)));
    assert_eq!(engine.framebuffers().shadow(), &shadow);

    let backend = engine.backend();
    let created: Vec<_> = backend.commands().iter().filter(|c| c.is_allocation()).collect();
    // Color texture, depth renderbuffer and framebuffer
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|c| match c {
        Command::CreateTexture { width, height, .. } => (*width, *height) == (1024, 768),
        Command::CreateRenderbuffer { width, height, .. } => (*width, *height) == (1024, 768),
        _ => true,
    }));
}

#[test]
fn test_zero_sized_drawable_skips_frame() {
    let mut engine = engine();
    engine.backend_mut().clear_commands();

    let stats = engine.draw((0, 600)).unwrap();
    assert_eq!(stats.shadow_draws + stats.lit_draws, 0);
    assert!(engine.backend().commands().is_empty());
}

#[test]
fn test_incomplete_framebuffer_is_fatal() {
    let mut engine = engine();
    engine
        .backend_mut()
        .force_framebuffer_status(Some(FramebufferStatus::IncompleteAttachment));

    let result = engine.draw(SIZE);
    assert!(matches!(
        result,
        Err(EngineError::Framebuffer(FramebufferError::Incomplete {
            status: FramebufferStatus::IncompleteAttachment,
            ..
        }))
    ));
}

#[rstest]
#[case("Spot", "Lamp")]
#[case("Camera", "Eye")]
#[case("SpotParent", "Pivot")]
fn test_missing_named_entity_is_fatal(#[case] from: &str, #[case] to: &str) {
    let mut description = SceneDescription::from_ron(SCENE).unwrap();
    for transform in &mut description.transforms {
        if transform.name == from {
            transform.name = to.to_string();
        }
    }
    let assets = SceneAssets {
        description,
        ..assets()
    };
    let result = Engine::new(DummyBackend::new(SIZE.0, SIZE.1), assets, &EngineConfig::default());
    assert!(matches!(
        result,
        Err(EngineError::Scene(SceneError::Missing { name, .. })) if name == from
    ));
}

#[test]
fn test_pass_state_sequence() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    let shadow_framebuffer = engine.framebuffers().shadow_framebuffer().unwrap();
    let shadow_depth = engine.framebuffers().shadow_depth_texture().unwrap();

    let commands = engine.backend().commands();
    let shadow_begin = commands
        .iter()
        .position(|c| {
            matches!(c, Command::BeginRenderPass { target: RenderTarget::Framebuffer(fb), clear_color: Some(color), .. }
                if *fb == shadow_framebuffer && *color == [1.0, 0.0, 1.0, 0.0])
        })
        .unwrap();
    let lit_begin = commands
        .iter()
        .position(|c| {
            matches!(c, Command::BeginRenderPass { target: RenderTarget::Surface, clear_color: Some(color), .. }
                if *color == [0.0; 4])
        })
        .unwrap();
    assert!(shadow_begin < lit_begin);

    let shadow_pass = &commands[shadow_begin..lit_begin];
    assert_eq!(shadow_pass[1], Command::SetViewport { width: 512, height: 512 });
    let cull_states: Vec<_> = shadow_pass
        .iter()
        .filter_map(|c| match c {
            Command::SetRenderState(state) => Some((state.depth_test, state.cull_mode, state.blend.is_some())),
            _ => None,
        })
        .collect();
    assert_eq!(cull_states, vec![(true, CullMode::Front, false), (true, CullMode::None, false)]);
    assert_eq!(shadow_pass.last(), Some(&Command::EndRenderPass));

    let lit_pass = &commands[lit_begin..];
    assert_eq!(lit_pass[1], Command::SetViewport { width: SIZE.0, height: SIZE.1 });
    assert!(matches!(lit_pass[2], Command::SetRenderState(state) if state.depth_test && state.blend.is_some()));

    let bind = lit_pass
        .iter()
        .position(|c| *c == Command::BindTexture { unit: SHADOW_UNIT, texture: Some(shadow_depth) })
        .unwrap();
    let unbind = lit_pass
        .iter()
        .rposition(|c| *c == Command::BindTexture { unit: SHADOW_UNIT, texture: None })
        .unwrap();
    let first_draw = lit_pass.iter().position(|c| matches!(c, Command::Draw(_))).unwrap();
    let last_draw = lit_pass.iter().rposition(|c| matches!(c, Command::Draw(_))).unwrap();
    assert!(bind < first_draw && last_draw < unbind);
    assert_eq!(lit_pass.last(), Some(&Command::EndRenderPass));
}

#[test]
fn test_light_uniforms() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    let backend = engine.backend();

    assert_eq!(
        backend.last_uniform("spot_outer_inner"),
        Some(UniformValue::Vec2(spot_outer_inner(60f32.to_radians())))
    );
    assert_eq!(backend.last_uniform("sun_color"), Some(UniformValue::Vec3(Vec3::ZERO)));
    let Some(UniformValue::Vec3(direction)) = backend.last_uniform("spot_direction") else {
        panic!("spot_direction not written");
    };
    // The spotlight points down and towards the origin
    assert!(direction.z < -0.5);
    assert!((direction.length() - 1.0).abs() < 1e-5);
}

#[test]
fn test_light_to_spot_maps_into_shadow_texture_space() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();

    let scene = engine.scene();
    let spot = engine.context().spot(scene);
    let spot_local_from_world = Mat4::from(scene.transforms.local_from_world(spot.transform));
    let expected = clip_to_texture_bias() * spot.make_projection() * spot_local_from_world;

    let Some(UniformValue::Mat4(light_to_spot)) = engine.backend().last_uniform("LIGHT_TO_SPOT") else {
        panic!("LIGHT_TO_SPOT not written");
    };
    assert!(light_to_spot.abs_diff_eq(expected, 1e-5));

    // The ball sits inside the spot cone
    let ball = scene.transforms.find("Ball").next().unwrap();
    let center = Vec3::from(scene.transforms.world_from_local(ball).translation);
    let mapped = light_to_spot * center.extend(1.0);
    let mapped = mapped.truncate() / mapped.w;
    assert!(
        mapped.cmpge(Vec3::ZERO).all() && mapped.cmple(Vec3::ONE).all(),
        "ball maps to {:?}",
        mapped
    );

    let spot_world = scene.transforms.world_from_local(spot.transform);
    let backend = engine.backend();
    assert_eq!(backend.last_uniform("sky_color"), Some(UniformValue::Vec3(Vec3::new(0.2, 0.2, 0.3))));
    assert_eq!(backend.last_uniform("sky_direction"), Some(UniformValue::Vec3(Vec3::Z)));
    assert_eq!(backend.last_uniform("spot_color"), Some(UniformValue::Vec3(Vec3::ONE)));
    assert_eq!(
        backend.last_uniform("spot_position"),
        Some(UniformValue::Vec3(Vec3::from(spot_world.translation)))
    );
}

#[test]
fn test_backend_errors_do_not_stop_the_frame() {
    let mut engine = engine();
    engine.backend_mut().report_error("validation: something odd");
    let stats = engine.draw(SIZE).unwrap();
    assert_eq!(stats.lit_draws, 4);
}

#[rstest]
#[case(0.05)]
#[case(0.5)]
#[case(1.0)]
#[case(2.0)]
#[case(3.1)]
fn test_falloff_inner_exceeds_outer(#[case] fov: f32) {
    let falloff = spot_outer_inner(fov);
    assert!(falloff.y > falloff.x, "fov {}: {:?}", fov, falloff);
}

#[test]
fn test_release_destroys_framebuffers() {
    let mut engine = engine();
    engine.draw(SIZE).unwrap();
    let backend = engine.into_backend();
    assert_eq!(backend.live_texture_count(), 0);
}
