//! Core backend abstraction traits
//!
//! The renderer talks to the GPU through a small, GL-shaped command interface:
//! bind a program, write named uniforms, bind textures to units, draw a vertex
//! range. Both the wgpu backend and the recording dummy backend implement it.

use crate::backend::types::*;
use std::ops::Range;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to create shader: {0}")]
    ShaderCreationFailed(String),
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a render-only attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub(crate) u64);

/// Handle to a framebuffer (a set of render attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Handle to a compiled shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to a vertex buffer bound with a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayHandle(pub(crate) u64);

/// Depth attachment of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthAttachment {
    Renderbuffer(RenderbufferHandle),
    /// Sampleable depth texture
    Texture(TextureHandle),
}

/// Framebuffer descriptor
#[derive(Debug, Clone)]
pub struct FramebufferDescriptor {
    pub label: Option<String>,
    pub color: Option<TextureHandle>,
    pub depth: Option<DepthAttachment>,
}

/// Shader program descriptor.
///
/// `source` is WGSL with `vs_main`/`fs_main` entry points. Uniforms live in a
/// single struct at `@group(0) @binding(0)`. Texture unit `n` is declared at
/// `@group(1) @binding(2n)` with its sampler at `@binding(2n + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub texture_units: &'a [TextureUnitLayout],
}

/// Vertex array descriptor
#[derive(Debug, Clone)]
pub struct VertexArrayDescriptor {
    pub label: Option<String>,
    pub program: ProgramHandle,
    pub buffer: BufferHandle,
    pub layout: VertexBufferLayout,
}

/// Where a render pass draws to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTarget {
    /// The window surface
    Surface,
    Framebuffer(FramebufferHandle),
}

/// Render pass descriptor
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor {
    pub label: String,
    pub target: RenderTarget,
    /// `None` keeps the previous contents
    pub clear_color: Option<[f32; 4]>,
    pub clear_depth: Option<f32>,
}

/// The GPU command interface used by the renderer
pub trait GraphicsBackend {
    /// Get the current surface size
    fn surface_size(&self) -> (u32, u32);

    /// Resize the surface
    fn resize(&mut self, width: u32, height: u32);

    /// Begin a new frame
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Submit the recorded frame and present it
    fn end_frame(&mut self) -> BackendResult<()>;

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle>;

    /// Create a texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload pixels to one mip level of a texture
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Set the sampling parameters used when the texture is bound to a unit
    fn set_texture_sampler(&mut self, texture: TextureHandle, sampler: &SamplerDescriptor) -> BackendResult<()>;

    /// Create a renderbuffer
    fn create_renderbuffer(&mut self, desc: &RenderbufferDescriptor) -> BackendResult<RenderbufferHandle>;

    /// Create a framebuffer from existing attachments
    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<FramebufferHandle>;

    /// Check whether a framebuffer can be rendered to
    fn check_framebuffer(&self, framebuffer: FramebufferHandle) -> FramebufferStatus;

    /// Compile a shader program
    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Resolve a named uniform; unknown names give [`UniformLocation::UNUSED`]
    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation;

    /// Create a vertex array
    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> BackendResult<VertexArrayHandle>;

    /// Begin a render pass
    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<()>;

    /// End the current render pass
    fn end_render_pass(&mut self);

    /// Set the viewport
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Set depth, blend and cull state for subsequent draws
    fn set_render_state(&mut self, state: &RenderState);

    /// Bind a program; uniforms are written to the bound program
    fn use_program(&mut self, program: Option<ProgramHandle>);

    /// Write a uniform of the bound program
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    /// Bind a vertex array
    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>);

    /// Bind a texture to a unit
    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>);

    /// Draw a range of vertices with the current bindings
    fn draw(&mut self, vertices: Range<u32>) -> BackendResult<()>;

    /// Drain errors reported by the device since the last call
    fn take_errors(&mut self) -> Vec<String>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Destroy a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Destroy a renderbuffer
    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    /// Destroy a framebuffer
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);
}
