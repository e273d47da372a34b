//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It validates handles
//! and command order, and records every call so tests can inspect what the
//! renderer issued: allocations, render passes, state changes, uniforms and
//! draws.

use std::collections::HashMap;
use std::ops::Range;

use super::reflect::UniformBlockLayout;
use super::traits::*;
use super::types::*;

/// A draw issued to the dummy backend
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Label of the render pass the draw was recorded in
    pub pass: String,
    pub program: ProgramHandle,
    pub vertex_array: VertexArrayHandle,
    pub vertices: Range<u32>,
    /// Bound texture units at draw time
    pub textures: Vec<(u32, TextureHandle)>,
    pub render_state: RenderState,
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateBuffer(BufferHandle),
    CreateTexture {
        texture: TextureHandle,
        width: u32,
        height: u32,
        format: TextureFormat,
    },
    CreateRenderbuffer {
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    },
    CreateFramebuffer(FramebufferHandle),
    CreateProgram {
        program: ProgramHandle,
        label: String,
    },
    CreateVertexArray(VertexArrayHandle),
    WriteTexture {
        texture: TextureHandle,
        mip_level: u32,
    },
    SetTextureSampler {
        texture: TextureHandle,
        sampler: SamplerDescriptor,
    },
    BeginRenderPass {
        label: String,
        target: RenderTarget,
        clear_color: Option<[f32; 4]>,
    },
    EndRenderPass,
    SetViewport {
        width: u32,
        height: u32,
    },
    SetRenderState(RenderState),
    UseProgram(Option<ProgramHandle>),
    SetUniform {
        program: ProgramHandle,
        name: String,
        value: UniformValue,
    },
    BindVertexArray(Option<VertexArrayHandle>),
    BindTexture {
        unit: u32,
        texture: Option<TextureHandle>,
    },
    Draw(DrawCall),
    DestroyBuffer(BufferHandle),
    DestroyTexture(TextureHandle),
    DestroyRenderbuffer(RenderbufferHandle),
    DestroyFramebuffer(FramebufferHandle),
}

impl Command {
    /// Whether the command allocates GPU memory.
    pub fn is_allocation(&self) -> bool {
        matches!(
            self,
            Command::CreateBuffer(_)
                | Command::CreateTexture { .. }
                | Command::CreateRenderbuffer { .. }
                | Command::CreateFramebuffer(_)
        )
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    surface_size: (u32, u32),
    next_id: u64,
    commands: Vec<Command>,

    buffers: HashMap<u64, usize>,
    textures: HashMap<u64, TextureDescriptor>,
    samplers: HashMap<u64, SamplerDescriptor>,
    renderbuffers: HashMap<u64, RenderbufferDescriptor>,
    framebuffers: HashMap<u64, FramebufferDescriptor>,
    programs: HashMap<u64, UniformBlockLayout>,
    vertex_arrays: HashMap<u64, VertexArrayDescriptor>,

    frame_active: bool,
    pass: Option<String>,
    program: Option<ProgramHandle>,
    vertex_array: Option<VertexArrayHandle>,
    render_state: RenderState,
    texture_units: [Option<TextureHandle>; MAX_TEXTURE_UNITS],

    forced_framebuffer_status: Option<FramebufferStatus>,
    errors: Vec<String>,
}

impl DummyBackend {
    /// Create a new dummy backend with a surface of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: (width, height),
            next_id: 1,
            commands: Vec::new(),
            buffers: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            frame_active: false,
            pass: None,
            program: None,
            vertex_array: None,
            render_state: RenderState::default(),
            texture_units: [None; MAX_TEXTURE_UNITS],
            forced_framebuffer_status: None,
            errors: Vec::new(),
        }
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    /// All commands recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Forget recorded commands. Resources stay alive.
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of recorded allocation calls.
    pub fn allocation_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_allocation()).count()
    }

    /// Recorded draws, in issue order.
    pub fn draws(&self) -> impl Iterator<Item = &DrawCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::Draw(draw) => Some(draw),
            _ => None,
        })
    }

    /// Recorded draws issued inside the named render pass.
    pub fn draws_in_pass(&self, pass: &str) -> Vec<&DrawCall> {
        self.draws().filter(|d| d.pass == pass).collect()
    }

    /// Last value written to the named uniform of any program.
    pub fn last_uniform(&self, name: &str) -> Option<UniformValue> {
        self.commands.iter().rev().find_map(|c| match c {
            Command::SetUniform { name: n, value, .. } if n == name => Some(*value),
            _ => None,
        })
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    pub fn texture_sampler(&self, texture: TextureHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&texture.0)
    }

    pub fn renderbuffer(&self, renderbuffer: RenderbufferHandle) -> Option<&RenderbufferDescriptor> {
        self.renderbuffers.get(&renderbuffer.0)
    }

    pub fn framebuffer(&self, framebuffer: FramebufferHandle) -> Option<&FramebufferDescriptor> {
        self.framebuffers.get(&framebuffer.0)
    }

    /// Number of textures currently alive.
    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Make every framebuffer check report `status`.
    pub fn force_framebuffer_status(&mut self, status: Option<FramebufferStatus>) {
        self.forced_framebuffer_status = status;
    }

    /// Queue an error to be returned by the next `take_errors`.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn color_slot(&self, texture: Option<TextureHandle>) -> AttachmentSlot {
        match texture {
            None => AttachmentSlot::Empty,
            Some(texture) => self.textures.get(&texture.0).map_or(AttachmentSlot::Dangling, |d| {
                AttachmentSlot::Attached {
                    width: d.width,
                    height: d.height,
                    format: d.format,
                }
            }),
        }
    }

    fn depth_slot(&self, depth: Option<DepthAttachment>) -> AttachmentSlot {
        match depth {
            None => AttachmentSlot::Empty,
            Some(DepthAttachment::Texture(texture)) => self.color_slot(Some(texture)),
            Some(DepthAttachment::Renderbuffer(rb)) => self.renderbuffers.get(&rb.0).map_or(AttachmentSlot::Dangling, |d| {
                AttachmentSlot::Attached {
                    width: d.width,
                    height: d.height,
                    format: d.format,
                }
            }),
        }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl GraphicsBackend for DummyBackend {
    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        log::trace!("DummyBackend: resize {}x{}", width, height);
        self.surface_size = (width.max(1), height.max(1));
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if self.frame_active {
            return Err(BackendError::InvalidCommand("frame already begun".into()));
        }
        self.frame_active = true;
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if !self.frame_active {
            return Err(BackendError::InvalidCommand("end_frame without begin_frame".into()));
        }
        if let Some(pass) = &self.pass {
            return Err(BackendError::InvalidCommand(format!("render pass {} still open", pass)));
        }
        self.frame_active = false;
        Ok(())
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        log::trace!("DummyBackend: creating buffer {:?} ({} bytes)", desc.label, data.len());
        let handle = BufferHandle(self.allocate_id());
        self.buffers.insert(handle.0, data.len());
        self.commands.push(Command::CreateBuffer(handle));
        Ok(handle)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: empty extent {}x{} ({} mips)",
                desc.label, desc.width, desc.height, desc.mip_levels
            )));
        }
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(handle.0, desc.clone());
        self.samplers.insert(handle.0, SamplerDescriptor::default());
        self.commands.push(Command::CreateTexture {
            texture: handle,
            width: desc.width,
            height: desc.height,
            format: desc.format,
        });
        Ok(handle)
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        mip_level: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> BackendResult<()> {
        let desc = self.textures.get(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        let expected = (width * height * desc.format.bytes_per_pixel()) as usize;
        if mip_level >= desc.mip_levels || data.len() != expected {
            return Err(BackendError::InvalidCommand(format!(
                "write_texture: level {} with {} bytes, expected {}",
                mip_level,
                data.len(),
                expected
            )));
        }
        self.commands.push(Command::WriteTexture { texture, mip_level });
        Ok(())
    }

    fn set_texture_sampler(&mut self, texture: TextureHandle, sampler: &SamplerDescriptor) -> BackendResult<()> {
        let slot = self.samplers.get_mut(&texture.0).ok_or(BackendError::InvalidHandle {
            kind: "texture",
            id: texture.0,
        })?;
        *slot = *sampler;
        self.commands.push(Command::SetTextureSampler {
            texture,
            sampler: *sampler,
        });
        Ok(())
    }

    fn create_renderbuffer(&mut self, desc: &RenderbufferDescriptor) -> BackendResult<RenderbufferHandle> {
        log::trace!(
            "DummyBackend: creating renderbuffer {:?} ({}x{})",
            desc.label,
            desc.width,
            desc.height
        );
        let handle = RenderbufferHandle(self.allocate_id());
        self.renderbuffers.insert(handle.0, desc.clone());
        self.commands.push(Command::CreateRenderbuffer {
            renderbuffer: handle,
            width: desc.width,
            height: desc.height,
        });
        Ok(handle)
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDescriptor) -> BackendResult<FramebufferHandle> {
        log::trace!("DummyBackend: creating framebuffer {:?}", desc.label);
        let handle = FramebufferHandle(self.allocate_id());
        self.framebuffers.insert(handle.0, desc.clone());
        self.commands.push(Command::CreateFramebuffer(handle));
        Ok(handle)
    }

    fn check_framebuffer(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        if let Some(status) = self.forced_framebuffer_status {
            return status;
        }
        let Some(desc) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Unsupported;
        };
        FramebufferStatus::evaluate(self.color_slot(desc.color), self.depth_slot(desc.depth))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let layout = UniformBlockLayout::reflect(desc.label, desc.source)?;
        let handle = ProgramHandle(self.allocate_id());
        self.programs.insert(handle.0, layout);
        self.commands.push(Command::CreateProgram {
            program: handle,
            label: desc.label.to_string(),
        });
        Ok(handle)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> UniformLocation {
        self.programs
            .get(&program.0)
            .map(|layout| layout.location(name))
            .unwrap_or(UniformLocation::UNUSED)
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> BackendResult<VertexArrayHandle> {
        if !self.programs.contains_key(&desc.program.0) {
            return Err(BackendError::InvalidHandle {
                kind: "program",
                id: desc.program.0,
            });
        }
        if !self.buffers.contains_key(&desc.buffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "buffer",
                id: desc.buffer.0,
            });
        }
        let handle = VertexArrayHandle(self.allocate_id());
        self.vertex_arrays.insert(handle.0, desc.clone());
        self.commands.push(Command::CreateVertexArray(handle));
        Ok(handle)
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) -> BackendResult<()> {
        if !self.frame_active {
            return Err(BackendError::InvalidCommand("render pass outside of a frame".into()));
        }
        if let Some(open) = &self.pass {
            return Err(BackendError::InvalidCommand(format!(
                "render pass {} begun while {} is open",
                desc.label, open
            )));
        }
        if let RenderTarget::Framebuffer(framebuffer) = desc.target {
            let status = self.check_framebuffer(framebuffer);
            if !status.is_complete() {
                return Err(BackendError::InvalidCommand(format!(
                    "render pass {} targets a framebuffer that is {}",
                    desc.label, status
                )));
            }
        }
        log::trace!("DummyBackend: begin render pass {}", desc.label);
        self.pass = Some(desc.label.clone());
        self.commands.push(Command::BeginRenderPass {
            label: desc.label.clone(),
            target: desc.target,
            clear_color: desc.clear_color,
        });
        Ok(())
    }

    fn end_render_pass(&mut self) {
        self.pass = None;
        self.commands.push(Command::EndRenderPass);
    }

    fn set_viewport(&mut self, _x: u32, _y: u32, width: u32, height: u32) {
        self.commands.push(Command::SetViewport { width, height });
    }

    fn set_render_state(&mut self, state: &RenderState) {
        self.render_state = *state;
        self.commands.push(Command::SetRenderState(*state));
    }

    fn use_program(&mut self, program: Option<ProgramHandle>) {
        self.program = program;
        self.commands.push(Command::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.program else {
            return;
        };
        let Some(member) = self.programs.get(&program.0).and_then(|layout| layout.member(location)) else {
            return;
        };
        self.commands.push(Command::SetUniform {
            program,
            name: member.name.clone(),
            value,
        });
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayHandle>) {
        self.vertex_array = vertex_array;
        self.commands.push(Command::BindVertexArray(vertex_array));
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<TextureHandle>) {
        if let Some(slot) = self.texture_units.get_mut(unit as usize) {
            *slot = texture;
        }
        self.commands.push(Command::BindTexture { unit, texture });
    }

    fn draw(&mut self, vertices: Range<u32>) -> BackendResult<()> {
        let pass = self
            .pass
            .clone()
            .ok_or_else(|| BackendError::InvalidCommand("draw outside of a render pass".into()))?;
        let program = self
            .program
            .ok_or_else(|| BackendError::InvalidCommand("draw without a program".into()))?;
        let vertex_array = self
            .vertex_array
            .ok_or_else(|| BackendError::InvalidCommand("draw without a vertex array".into()))?;
        let desc = self.vertex_arrays.get(&vertex_array.0).ok_or(BackendError::InvalidHandle {
            kind: "vertex array",
            id: vertex_array.0,
        })?;
        let buffer_len = self.buffers.get(&desc.buffer.0).copied().unwrap_or(0) as u64;
        if vertices.end as u64 * desc.layout.array_stride > buffer_len {
            return Err(BackendError::InvalidCommand(format!(
                "draw of vertices {:?} overruns a {} byte buffer",
                vertices, buffer_len
            )));
        }

        let textures = self
            .texture_units
            .iter()
            .enumerate()
            .filter_map(|(unit, texture)| texture.map(|t| (unit as u32, t)))
            .collect();
        self.commands.push(Command::Draw(DrawCall {
            pass,
            program,
            vertex_array,
            vertices,
            textures,
            render_state: self.render_state,
        }));
        Ok(())
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
        self.commands.push(Command::DestroyBuffer(buffer));
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.samplers.remove(&texture.0);
        self.commands.push(Command::DestroyTexture(texture));
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        self.renderbuffers.remove(&renderbuffer.0);
        self.commands.push(Command::DestroyRenderbuffer(renderbuffer));
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        self.commands.push(Command::DestroyFramebuffer(framebuffer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_texture(backend: &mut DummyBackend, width: u32, height: u32) -> TextureHandle {
        backend
            .create_texture(&TextureDescriptor {
                width,
                height,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_framebuffer_dimension_mismatch() {
        let mut backend = DummyBackend::default();
        let color = color_texture(&mut backend, 64, 64);
        let depth = backend
            .create_renderbuffer(&RenderbufferDescriptor {
                label: None,
                width: 32,
                height: 32,
                format: TextureFormat::Depth24Plus,
            })
            .unwrap();
        let fb = backend
            .create_framebuffer(&FramebufferDescriptor {
                label: None,
                color: Some(color),
                depth: Some(DepthAttachment::Renderbuffer(depth)),
            })
            .unwrap();
        assert_eq!(backend.check_framebuffer(fb), FramebufferStatus::IncompleteDimensions);
    }

    #[test]
    fn test_framebuffer_with_destroyed_attachment() {
        let mut backend = DummyBackend::default();
        let color = color_texture(&mut backend, 16, 16);
        let fb = backend
            .create_framebuffer(&FramebufferDescriptor {
                label: None,
                color: Some(color),
                depth: None,
            })
            .unwrap();
        assert!(backend.check_framebuffer(fb).is_complete());
        backend.destroy_texture(color);
        assert_eq!(backend.check_framebuffer(fb), FramebufferStatus::Unsupported);
    }

    #[test]
    fn test_draw_requires_pass() {
        let mut backend = DummyBackend::default();
        assert!(backend.draw(0..3).is_err());
    }

    #[test]
    fn test_frame_rejects_open_pass() {
        let mut backend = DummyBackend::default();
        backend.begin_frame().unwrap();
        backend
            .begin_render_pass(&RenderPassDescriptor {
                label: "Main".into(),
                target: RenderTarget::Surface,
                clear_color: None,
                clear_depth: None,
            })
            .unwrap();
        assert!(backend.end_frame().is_err());
        backend.end_render_pass();
        assert!(backend.end_frame().is_ok());
    }
}
