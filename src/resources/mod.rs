//! Resource management
//!
//! Handles mesh buffers, texture loading and the offscreen render targets.

mod framebuffers;
mod mesh;
mod texture;

pub use framebuffers::*;
pub use mesh::*;
pub use texture::*;
