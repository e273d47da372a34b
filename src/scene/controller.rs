//! Interaction controller
//!
//! - WASD: move the camera along its right/forward vectors
//! - Primary button drag: look around (yaw and pitch scaled by the field of view)
//! - Secondary button drag: spin the spotlight around its parent
//! - Escape: release the pointer

use glam::{Quat, Vec2, Vec3};

use super::{Scene, SceneContext};
use crate::input::{InputEvent, KeyCode, MouseButtons};

/// Spotlight spin in radians per window width of horizontal drag
pub const SPOT_SPIN_RATE: f32 = 5.0;

/// Held state of a movement key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    /// Presses since the last update
    pub downs: u8,
    pub pressed: bool,
}

impl ButtonState {
    fn press(&mut self) {
        self.downs = self.downs.saturating_add(1);
        self.pressed = true;
    }

    fn release(&mut self) {
        self.pressed = false;
    }

    fn axis(&self) -> f32 {
        if self.pressed {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    pub left: ButtonState,
    pub right: ButtonState,
    pub up: ButtonState,
    pub down: ButtonState,
    /// Accumulated spotlight rotation around +Z, in radians
    pub spot_spin: f32,
    pub camera_spin: f32,
    /// Units per second
    pub move_speed: f32,
    captured: bool,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl InteractionController {
    pub fn new(move_speed: f32) -> Self {
        Self {
            left: ButtonState::default(),
            right: ButtonState::default(),
            up: ButtonState::default(),
            down: ButtonState::default(),
            spot_spin: 0.0,
            camera_spin: 0.0,
            move_speed,
            captured: false,
        }
    }

    /// Whether relative pointer motion should be captured
    pub fn wants_pointer_capture(&self) -> bool {
        self.captured
    }

    fn key(&mut self, key: KeyCode) -> Option<&mut ButtonState> {
        match key {
            KeyCode::A => Some(&mut self.left),
            KeyCode::D => Some(&mut self.right),
            KeyCode::W => Some(&mut self.up),
            KeyCode::S => Some(&mut self.down),
            KeyCode::Escape | KeyCode::Other => None,
        }
    }

    /// Apply an input event. Returns whether the event was handled.
    pub fn handle_event(
        &mut self,
        event: &InputEvent,
        window_size: (u32, u32),
        scene: &mut Scene,
        context: &SceneContext,
    ) -> bool {
        match *event {
            InputEvent::KeyDown(KeyCode::Escape) => {
                self.captured = false;
                true
            }
            InputEvent::KeyDown(key) => match self.key(key) {
                Some(state) => {
                    state.press();
                    true
                }
                None => false,
            },
            InputEvent::KeyUp(key) => match self.key(key) {
                Some(state) => {
                    state.release();
                    true
                }
                None => false,
            },
            InputEvent::ButtonDown(_) => {
                self.captured = true;
                true
            }
            InputEvent::ButtonUp(_) => {
                self.captured = false;
                true
            }
            InputEvent::MouseMotion { delta, buttons } => {
                if !self.captured {
                    return false;
                }
                let (width, height) = window_size;
                // Primary takes precedence when both are held
                if buttons.contains(MouseButtons::PRIMARY) {
                    if height > 0 {
                        let motion = Vec2::new(delta.x, -delta.y) / height as f32;
                        self.look(motion, scene, context);
                    }
                } else if buttons.contains(MouseButtons::SECONDARY) && width > 0 {
                    self.spot_spin += SPOT_SPIN_RATE * delta.x / width as f32;
                }
                true
            }
        }
    }

    /// Rotate the camera by a motion given in window heights, y up
    fn look(&mut self, motion: Vec2, scene: &mut Scene, context: &SceneContext) {
        let camera = context.camera(scene);
        let (fovy, id) = (camera.fovy, camera.transform);
        let transform = &mut scene.transforms[id];
        let yaw = Quat::from_axis_angle(Vec3::Y, -motion.x * fovy);
        let pitch = Quat::from_axis_angle(Vec3::X, motion.y * fovy);
        transform.rotation = (transform.rotation * yaw * pitch).normalize();
    }

    /// The move intent as (right, forward), normalized when nonzero
    pub fn move_intent(&self) -> Vec2 {
        Vec2::new(
            self.right.axis() - self.left.axis(),
            self.up.axis() - self.down.axis(),
        )
        .normalize_or_zero()
    }

    /// Advance by `elapsed` seconds
    pub fn update(&mut self, elapsed: f32, scene: &mut Scene, context: &SceneContext) {
        scene.transforms[context.spot_parent].rotation =
            Quat::from_axis_angle(Vec3::Z, self.spot_spin);

        let intent = self.move_intent() * self.move_speed * elapsed;
        let camera = context.camera(scene).transform;
        let transform = &mut scene.transforms[camera];
        let offset = transform.right() * intent.x + transform.forward() * intent.y;
        transform.position += offset;

        for state in [&mut self.left, &mut self.right, &mut self.up, &mut self.down] {
            state.downs = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::MouseButton;
    use crate::scene::{Camera, Light, LightKind, Transform, TransformId};

    fn scene() -> (Scene, SceneContext) {
        let mut scene = Scene::new();
        let parent = scene.transforms.add(Transform::new("SpotParent")).unwrap();
        let spot = scene
            .transforms
            .add(Transform::new("Spot").with_parent(parent))
            .unwrap();
        let camera = scene.transforms.add(Transform::new("Camera")).unwrap();
        scene.cameras.push(Camera::new(camera));
        scene.lights.push(Light::new(spot, LightKind::Spot));
        let context = SceneContext::resolve(&scene).unwrap();
        (scene, context)
    }

    const SIZE: (u32, u32) = (800, 600);

    #[test]
    fn test_unknown_key_is_not_handled() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::default();
        assert!(!controller.handle_event(&InputEvent::KeyDown(KeyCode::Other), SIZE, &mut scene, &context));
        assert!(controller.handle_event(&InputEvent::KeyDown(KeyCode::W), SIZE, &mut scene, &context));
        assert!(controller.up.pressed);
        assert_eq!(controller.up.downs, 1);
    }

    #[test]
    fn test_motion_without_capture_is_ignored() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::default();
        let motion = InputEvent::MouseMotion {
            delta: Vec2::new(100.0, 0.0),
            buttons: MouseButtons::SECONDARY,
        };
        assert!(!controller.handle_event(&motion, SIZE, &mut scene, &context));
        assert_eq!(controller.spot_spin, 0.0);
    }

    #[test]
    fn test_look_keeps_rotation_normalized() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::default();
        controller.handle_event(&InputEvent::ButtonDown(MouseButton::Primary), SIZE, &mut scene, &context);
        for _ in 0..100 {
            let motion = InputEvent::MouseMotion {
                delta: Vec2::new(13.0, -7.0),
                buttons: MouseButtons::PRIMARY,
            };
            controller.handle_event(&motion, SIZE, &mut scene, &context);
        }
        let camera = TransformId(2);
        let rotation = scene.transforms[camera].rotation;
        assert!((rotation.length() - 1.0).abs() < 1e-5);
        assert!(!rotation.abs_diff_eq(Quat::IDENTITY, 1e-3));
    }

    #[test]
    fn test_primary_takes_precedence_over_secondary() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::default();
        let camera = context.camera(&scene).transform;
        let before = scene.transforms[camera].rotation;

        controller.handle_event(&InputEvent::ButtonDown(MouseButton::Primary), SIZE, &mut scene, &context);
        let motion = InputEvent::MouseMotion {
            delta: Vec2::new(80.0, 0.0),
            buttons: MouseButtons::PRIMARY | MouseButtons::SECONDARY,
        };
        assert!(controller.handle_event(&motion, SIZE, &mut scene, &context));

        assert_eq!(controller.spot_spin, 0.0);
        assert!(!scene.transforms[camera].rotation.abs_diff_eq(before, 1e-4));
    }

    #[test]
    fn test_update_sets_spot_parent_rotation() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::default();
        controller.spot_spin = 0.5;
        controller.update(0.016, &mut scene, &context);
        controller.update(0.016, &mut scene, &context);
        let rotation = scene.transforms[context.spot_parent].rotation;
        assert!(rotation.abs_diff_eq(Quat::from_rotation_z(0.5), 1e-6));
    }

    #[test]
    fn test_forward_moves_along_minus_z() {
        let (mut scene, context) = scene();
        let mut controller = InteractionController::new(2.0);
        controller.handle_event(&InputEvent::KeyDown(KeyCode::W), SIZE, &mut scene, &context);
        controller.update(0.5, &mut scene, &context);
        let position = scene.transforms[TransformId(2)].position;
        assert!(position.abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), 1e-6));
    }
}
