//! Interaction controller tests through the engine

use glam::{Quat, Vec2, Vec3};
use rstest::rstest;
use shadowmap_engine::backend::dummy::DummyBackend;
use shadowmap_engine::engine::{Engine, SceneAssets};
use shadowmap_engine::input::{InputEvent, KeyCode, MouseButton, MouseButtons};
use shadowmap_engine::resources::{MeshBuffer, TextureData};
use shadowmap_engine::scene::SceneDescription;
use shadowmap_engine::EngineConfig;

const SCENE: &str = include_str!("../assets/scenes/shadow_vignette.ron");
const SIZE: (u32, u32) = (800, 600);

fn engine() -> Engine<DummyBackend> {
    let assets = SceneAssets::new(
        SceneDescription::from_ron(SCENE).unwrap(),
        MeshBuffer::standard(),
        TextureData::white(),
        TextureData::white(),
    );
    Engine::new(DummyBackend::new(SIZE.0, SIZE.1), assets, &EngineConfig::default()).unwrap()
}

fn camera_position(engine: &Engine<DummyBackend>) -> Vec3 {
    let camera = engine.context().camera(engine.scene()).transform;
    engine.scene().transforms[camera].position
}

fn press(engine: &mut Engine<DummyBackend>, keys: &[KeyCode]) {
    for key in keys {
        assert!(engine.handle_event(&InputEvent::KeyDown(*key), SIZE));
    }
}

#[rstest]
#[case(&[KeyCode::W])]
#[case(&[KeyCode::S])]
#[case(&[KeyCode::A])]
#[case(&[KeyCode::W, KeyCode::D])]
#[case(&[KeyCode::S, KeyCode::A])]
#[case(&[KeyCode::W, KeyCode::A, KeyCode::D])]
fn test_movement_is_normalized(#[case] keys: &[KeyCode]) {
    let mut engine = engine();
    let speed = EngineConfig::default().move_speed;
    let elapsed = 0.25;
    let before = camera_position(&engine);

    press(&mut engine, keys);
    engine.update(elapsed);

    let moved = (camera_position(&engine) - before).length();
    assert!((moved - speed * elapsed).abs() < 1e-4, "{:?} moved {}", keys, moved);
}

#[test]
fn test_opposite_keys_cancel() {
    let mut engine = engine();
    let before = camera_position(&engine);
    press(&mut engine, &[KeyCode::W, KeyCode::S]);
    engine.update(1.0);
    assert!(camera_position(&engine).abs_diff_eq(before, 1e-6));
}

#[test]
fn test_key_release_stops_movement() {
    let mut engine = engine();
    press(&mut engine, &[KeyCode::D]);
    engine.handle_event(&InputEvent::KeyUp(KeyCode::D), SIZE);
    let before = camera_position(&engine);
    engine.update(1.0);
    assert!(camera_position(&engine).abs_diff_eq(before, 1e-6));
}

#[test]
fn test_forward_follows_camera_orientation() {
    let mut engine = engine();
    let before = camera_position(&engine);
    press(&mut engine, &[KeyCode::W]);
    engine.update(1.0);

    // The scene camera looks down at the origin from -Y
    let step = camera_position(&engine) - before;
    assert!(step.y > 0.0 && step.z < 0.0);
    assert!(step.x.abs() < 1e-4);
}

#[test]
fn test_spin_accumulates_across_drags() {
    let mut engine = engine();
    let drags = [40.0, -15.0, 120.0, 3.0];

    engine.handle_event(&InputEvent::ButtonDown(MouseButton::Secondary), SIZE);
    for dx in drags {
        let motion = InputEvent::MouseMotion {
            delta: Vec2::new(dx, 7.0),
            buttons: MouseButtons::SECONDARY,
        };
        assert!(engine.handle_event(&motion, SIZE));
    }
    engine.handle_event(&InputEvent::ButtonUp(MouseButton::Secondary), SIZE);

    let expected: f32 = drags.iter().map(|dx| 5.0 * dx / SIZE.0 as f32).sum();
    assert!((engine.controller().spot_spin - expected).abs() < 1e-6);

    engine.update(0.016);
    let parent = engine.context().spot_parent;
    let rotation = engine.scene().transforms[parent].rotation;
    assert!(rotation.abs_diff_eq(Quat::from_rotation_z(expected), 1e-6));
}

#[test]
fn test_spin_does_not_move_camera() {
    let mut engine = engine();
    let camera = engine.context().camera(engine.scene()).transform;
    let rotation = engine.scene().transforms[camera].rotation;

    engine.handle_event(&InputEvent::ButtonDown(MouseButton::Secondary), SIZE);
    let motion = InputEvent::MouseMotion {
        delta: Vec2::new(50.0, 50.0),
        buttons: MouseButtons::SECONDARY,
    };
    engine.handle_event(&motion, SIZE);
    assert_eq!(engine.scene().transforms[camera].rotation, rotation);
}

#[test]
fn test_escape_releases_capture() {
    let mut engine = engine();
    engine.handle_event(&InputEvent::ButtonDown(MouseButton::Primary), SIZE);
    assert!(engine.wants_pointer_capture());

    assert!(engine.handle_event(&InputEvent::KeyDown(KeyCode::Escape), SIZE));
    assert!(!engine.wants_pointer_capture());

    let motion = InputEvent::MouseMotion {
        delta: Vec2::new(10.0, 0.0),
        buttons: MouseButtons::SECONDARY,
    };
    assert!(!engine.handle_event(&motion, SIZE));
    assert_eq!(engine.controller().spot_spin, 0.0);
}

#[test]
fn test_unknown_key_is_ignored() {
    let mut engine = engine();
    assert!(!engine.handle_event(&InputEvent::KeyDown(KeyCode::Other), SIZE));
    assert!(!engine.handle_event(&InputEvent::KeyUp(KeyCode::Other), SIZE));
}

#[test]
fn test_press_counters_reset_after_update() {
    let mut engine = engine();
    press(&mut engine, &[KeyCode::W, KeyCode::A]);
    engine.handle_event(&InputEvent::KeyUp(KeyCode::W), SIZE);
    press(&mut engine, &[KeyCode::W]);
    assert_eq!(engine.controller().up.downs, 2);
    assert_eq!(engine.controller().left.downs, 1);

    engine.update(0.016);
    let controller = engine.controller();
    assert_eq!(controller.up.downs, 0);
    assert_eq!(controller.left.downs, 0);
    assert!(controller.up.pressed && controller.left.pressed);
}

#[test]
fn test_look_is_scaled_by_field_of_view() {
    let mut engine = engine();
    let camera = engine.context().camera(engine.scene());
    let (id, fovy) = (camera.transform, camera.fovy);
    let before = engine.scene().transforms[id].rotation;

    engine.handle_event(&InputEvent::ButtonDown(MouseButton::Primary), SIZE);
    let motion = InputEvent::MouseMotion {
        delta: Vec2::new(SIZE.1 as f32 * 0.5, 0.0),
        buttons: MouseButtons::PRIMARY,
    };
    engine.handle_event(&motion, SIZE);

    // Half a window height of horizontal drag yaws by half the field of view
    let expected = (before * Quat::from_rotation_y(-0.5 * fovy)).normalize();
    assert!(engine.scene().transforms[id].rotation.abs_diff_eq(expected, 1e-5));
}
