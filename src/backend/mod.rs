//! Backend abstraction layer
//!
//! Provides the command interface the renderer is written against and its
//! implementations.

pub mod reflect;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

#[cfg(feature = "dummy")]
pub mod dummy;

pub use traits::*;
pub use types::*;
