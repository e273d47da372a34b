//! Window management using winit

use crate::backend::wgpu_backend::WgpuBackend;
use crate::backend::{BackendError, GraphicsBackend};
use crate::engine::{Engine, EngineError, SceneAssets};
use crate::input::{InputEvent, KeyCode, MouseButton, MouseButtons};
use crate::EngineConfig;
use glam::Vec2;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    dpi::PhysicalSize,
    event::{DeviceEvent, ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{self, PhysicalKey},
    window::{CursorGrabMode, Window as WinitWindow, WindowBuilder},
};

/// Wrapper around winit window with additional state
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    cursor_grabbed: bool,
    buttons: MouseButtons,
}

impl Window {
    /// Create a new window with the given title and dimensions
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, EngineError> {
        let window = WindowBuilder::new()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .build(event_loop)
            .map_err(|e| EngineError::Window(e.to_string()))?;

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
            cursor_grabbed: false,
            buttons: MouseButtons::default(),
        })
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    /// Get current window dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Grab and hide the cursor, or release it
    pub fn set_cursor_grabbed(&mut self, grabbed: bool) {
        if grabbed == self.cursor_grabbed {
            return;
        }
        let mode = if grabbed { CursorGrabMode::Locked } else { CursorGrabMode::None };
        let result = self.window.set_cursor_grab(mode).or_else(|e| {
            if grabbed {
                self.window.set_cursor_grab(CursorGrabMode::Confined)
            } else {
                Err(e)
            }
        });
        if let Err(e) = result {
            log::warn!("Cursor grab failed: {}", e);
        }
        self.window.set_cursor_visible(!grabbed);
        self.cursor_grabbed = grabbed;
    }

    /// Translate a window event into an input event, tracking held buttons
    fn translate(&mut self, event: &WindowEvent) -> Option<InputEvent> {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if event.repeat {
                    return None;
                }
                let PhysicalKey::Code(code) = event.physical_key else {
                    return None;
                };
                let key = map_key(code);
                Some(match event.state {
                    ElementState::Pressed => InputEvent::KeyDown(key),
                    ElementState::Released => InputEvent::KeyUp(key),
                })
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = map_button(*button);
                Some(match state {
                    ElementState::Pressed => {
                        self.buttons.insert(button);
                        InputEvent::ButtonDown(button)
                    }
                    ElementState::Released => {
                        self.buttons.remove(button);
                        InputEvent::ButtonUp(button)
                    }
                })
            }
            _ => None,
        }
    }
}

fn map_key(code: keyboard::KeyCode) -> KeyCode {
    match code {
        keyboard::KeyCode::KeyW => KeyCode::W,
        keyboard::KeyCode::KeyA => KeyCode::A,
        keyboard::KeyCode::KeyS => KeyCode::S,
        keyboard::KeyCode::KeyD => KeyCode::D,
        keyboard::KeyCode::Escape => KeyCode::Escape,
        _ => KeyCode::Other,
    }
}

fn map_button(button: winit::event::MouseButton) -> MouseButton {
    match button {
        winit::event::MouseButton::Left => MouseButton::Primary,
        winit::event::MouseButton::Right => MouseButton::Secondary,
        winit::event::MouseButton::Middle => MouseButton::Middle,
        winit::event::MouseButton::Back => MouseButton::Other(3),
        winit::event::MouseButton::Forward => MouseButton::Other(4),
        winit::event::MouseButton::Other(n) => MouseButton::Other(n),
    }
}

/// Open the window, build the engine and run until the window closes.
///
/// Returns the first fatal error raised while rendering.
pub fn run(config: EngineConfig) -> Result<(), EngineError> {
    let assets = SceneAssets::load(&config)?;

    let event_loop = EventLoop::new().map_err(|e| EngineError::Window(e.to_string()))?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    let mut engine = Engine::new(backend, assets, &config)?;

    let mut last_frame = Instant::now();
    let mut result = Ok(());

    event_loop
        .run(|event, elwt: &EventLoopWindowTarget<()>| {
            elwt.set_control_flow(ControlFlow::Poll);

            match event {
                Event::WindowEvent { event, .. } => match event {
                    WindowEvent::CloseRequested => elwt.exit(),
                    WindowEvent::Resized(size) => {
                        window.width = size.width;
                        window.height = size.height;
                        engine.resize(size.width, size.height);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = render_frame(&mut engine) {
                            result = Err(e);
                            elwt.exit();
                        }
                    }
                    event => {
                        if let Some(input) = window.translate(&event) {
                            engine.handle_event(&input, window.dimensions());
                            window.set_cursor_grabbed(engine.wants_pointer_capture());
                        }
                    }
                },
                Event::DeviceEvent {
                    event: DeviceEvent::MouseMotion { delta },
                    ..
                } => {
                    let input = InputEvent::MouseMotion {
                        delta: Vec2::new(delta.0 as f32, delta.1 as f32),
                        buttons: window.buttons,
                    };
                    engine.handle_event(&input, window.dimensions());
                }
                Event::AboutToWait => {
                    let now = Instant::now();
                    engine.update((now - last_frame).as_secs_f32());
                    last_frame = now;
                    window.window.request_redraw();
                }
                _ => {}
            }
        })
        .map_err(|e| EngineError::Window(e.to_string()))?;

    result
}

/// Draw one frame. A lost surface is reconfigured and the frame skipped.
fn render_frame(engine: &mut Engine<WgpuBackend>) -> Result<(), EngineError> {
    let size = engine.backend().surface_size();
    match engine.draw(size) {
        Ok(_) => Ok(()),
        Err(EngineError::Backend(BackendError::SurfaceLost)) => {
            log::warn!("Surface lost, reconfiguring");
            engine.resize(size.0, size.1);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(map_key(keyboard::KeyCode::KeyW), KeyCode::W);
        assert_eq!(map_key(keyboard::KeyCode::Escape), KeyCode::Escape);
        assert_eq!(map_key(keyboard::KeyCode::KeyQ), KeyCode::Other);
    }

    #[test]
    fn test_button_mapping() {
        assert_eq!(map_button(winit::event::MouseButton::Left), MouseButton::Primary);
        assert_eq!(map_button(winit::event::MouseButton::Right), MouseButton::Secondary);
        assert_eq!(map_button(winit::event::MouseButton::Other(9)), MouseButton::Other(9));
    }
}
