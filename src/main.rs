//! Shadow map viewer
//!
//! Controls:
//!   WASD          - Move camera
//!   Left drag     - Look around
//!   Right drag    - Spin the spotlight
//!   Escape        - Release the cursor

use clap::Parser;
use shadowmap_engine::{window, EngineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Two-pass shadow-mapped spotlight renderer")]
struct Args {
    /// Scene description file
    #[arg(long)]
    scene: Option<PathBuf>,

    /// Asset directory containing textures/
    #[arg(long)]
    assets: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    width: u32,

    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Shadow map resolution
    #[arg(long, default_value_t = 512)]
    shadow_map_size: u32,

    /// Disable vsync
    #[arg(long)]
    no_vsync: bool,
}

impl Args {
    fn into_config(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            shadow_map_size: self.shadow_map_size,
            scene_path: self.scene.unwrap_or(defaults.scene_path.clone()),
            asset_dir: self.assets.unwrap_or(defaults.asset_dir.clone()),
            ..defaults
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    log::info!("Loading scene {}", config.scene_path.display());

    if let Err(e) = window::run(config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
