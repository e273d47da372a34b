//! Shadow-mapped spotlight renderer
//!
//! Renders a small scene lit by a sky term and one spotlight whose shadows
//! come from a depth map rendered from the light each frame.
//!
//! # Features
//! - GL-style command interface with a wgpu backend and a recording dummy backend
//! - Two-pass rendering: spotlight depth, then the lit scene sampling it
//! - RON scene descriptions resolved into a transform hierarchy
//! - Interactive camera and spotlight control

pub mod backend;
pub mod engine;
pub mod input;
pub mod pipeline;
pub mod resources;
pub mod scene;
pub mod window;

use std::path::PathBuf;

pub use backend::wgpu_backend::WgpuBackend;
pub use engine::{Engine, EngineError, FrameStats, SceneAssets};

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Width and height of the square shadow map
    pub shadow_map_size: u32,
    /// Camera movement speed in units per second
    pub move_speed: f32,
    /// Scene description file
    pub scene_path: PathBuf,
    /// Directory containing `textures/`
    pub asset_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Shadow Map".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            shadow_map_size: 512,
            move_speed: 3.0,
            scene_path: PathBuf::from("assets/scenes/shadow_vignette.ron"),
            asset_dir: PathBuf::from("assets"),
        }
    }
}
