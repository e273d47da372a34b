//! Per-object pipeline descriptors
//!
//! A [`Pipeline`] fully determines one draw call: the program, the vertex
//! array, the uniform locations written at draw time, the textures bound to
//! each sampler unit and the vertex range. Each drawable keeps one pipeline
//! per [`PipelineType`], so the same geometry can be drawn through the
//! depth-only shadow program and through the lit program.

pub mod depth_only;
pub mod shadowed_color_texture;

use crate::backend::{
    BackendResult, GraphicsBackend, ProgramHandle, TextureHandle, TextureTarget, UniformLocation, VertexArrayHandle,
    MAX_TEXTURE_UNITS,
};
use crate::resources::MeshRange;
use std::ops::{Index, IndexMut};

/// Uniform names shared by both programs
pub const OBJECT_TO_CLIP: &str = "OBJECT_TO_CLIP";
pub const OBJECT_TO_LIGHT: &str = "OBJECT_TO_LIGHT";
pub const NORMAL_TO_LIGHT: &str = "NORMAL_TO_LIGHT";

/// Rendering purpose a pipeline is built for
#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    /// Lit, textured, shadowed color pass
    Default = 0,
    /// Depth-only pass into the shadow map
    Shadow = 1,
}

impl PipelineType {
    pub const COUNT: usize = 2;
    pub const ALL: [PipelineType; Self::COUNT] = [PipelineType::Default, PipelineType::Shadow];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineType::Default => "Default",
            PipelineType::Shadow => "Shadow",
        }
    }
}

/// Per-object uniform locations written by the scene at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineUniforms {
    pub clip_from_object: UniformLocation,
    pub light_from_object: UniformLocation,
    pub light_from_normal: UniformLocation,
}

impl PipelineUniforms {
    /// Resolve the per-object uniforms of `program`; undeclared ones stay unused.
    pub fn resolve(backend: &dyn GraphicsBackend, program: ProgramHandle) -> Self {
        Self {
            clip_from_object: backend.uniform_location(program, OBJECT_TO_CLIP),
            light_from_object: backend.uniform_location(program, OBJECT_TO_LIGHT),
            light_from_normal: backend.uniform_location(program, NORMAL_TO_LIGHT),
        }
    }
}

/// A texture bound to a sampler unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub texture: TextureHandle,
    pub target: TextureTarget,
}

/// Everything needed to issue one draw call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub program: ProgramHandle,
    pub vertex_array: VertexArrayHandle,
    pub uniforms: PipelineUniforms,
    /// Indexed by sampler unit
    pub textures: [Option<TextureBinding>; MAX_TEXTURE_UNITS],
    pub start: u32,
    pub count: u32,
}

impl Pipeline {
    pub fn new(program: ProgramHandle, vertex_array: VertexArrayHandle, uniforms: PipelineUniforms) -> Self {
        Self {
            program,
            vertex_array,
            uniforms,
            textures: [None; MAX_TEXTURE_UNITS],
            start: 0,
            count: 0,
        }
    }

    /// Copy of this template drawing `range`
    pub fn for_range(&self, range: MeshRange) -> Self {
        Self {
            start: range.start,
            count: range.count,
            ..self.clone()
        }
    }

    /// Bind `texture` to `unit`, replacing what the template had there.
    pub fn set_texture(&mut self, unit: u32, texture: TextureHandle) {
        match self.textures.get_mut(unit as usize) {
            Some(slot) => {
                *slot = Some(TextureBinding {
                    texture,
                    target: TextureTarget::D2,
                })
            }
            None => log::warn!("Sampler unit {} out of range", unit),
        }
    }

    pub fn texture(&self, unit: u32) -> Option<TextureHandle> {
        self.textures.get(unit as usize).copied().flatten().map(|b| b.texture)
    }

    /// Bind the program and vertex array. Uniforms written after this go to
    /// this pipeline's program.
    pub fn bind(&self, backend: &mut dyn GraphicsBackend) {
        backend.use_program(Some(self.program));
        backend.bind_vertex_array(Some(self.vertex_array));
    }

    /// Bind textures, draw the vertex range, then unbind the textures again.
    pub fn issue(&self, backend: &mut dyn GraphicsBackend) -> BackendResult<()> {
        for (unit, binding) in self.textures.iter().enumerate() {
            if let Some(binding) = binding {
                backend.bind_texture(unit as u32, Some(binding.texture));
            }
        }
        let result = backend.draw(self.start..self.start + self.count);
        for (unit, binding) in self.textures.iter().enumerate() {
            if binding.is_some() {
                backend.bind_texture(unit as u32, None);
            }
        }
        result
    }
}

/// One optional pipeline per [`PipelineType`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSet {
    pipelines: [Option<Pipeline>; PipelineType::COUNT],
}

impl PipelineSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ty: PipelineType, pipeline: Pipeline) -> Self {
        self.set(ty, pipeline);
        self
    }

    pub fn set(&mut self, ty: PipelineType, pipeline: Pipeline) {
        self.pipelines[ty as usize] = Some(pipeline);
    }

    pub fn remove(&mut self, ty: PipelineType) -> Option<Pipeline> {
        self.pipelines[ty as usize].take()
    }

    pub fn get(&self, ty: PipelineType) -> Option<&Pipeline> {
        self.pipelines[ty as usize].as_ref()
    }

    pub fn get_mut(&mut self, ty: PipelineType) -> Option<&mut Pipeline> {
        self.pipelines[ty as usize].as_mut()
    }
}

impl Index<PipelineType> for PipelineSet {
    type Output = Option<Pipeline>;

    fn index(&self, ty: PipelineType) -> &Self::Output {
        &self.pipelines[ty as usize]
    }
}

impl IndexMut<PipelineType> for PipelineSet {
    fn index_mut(&mut self, ty: PipelineType) -> &mut Self::Output {
        &mut self.pipelines[ty as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        Pipeline::new(ProgramHandle(1), VertexArrayHandle(2), PipelineUniforms::default())
    }

    #[test]
    fn test_pipeline_set_indexing() {
        let mut set = PipelineSet::new();
        assert!(set[PipelineType::Default].is_none());
        set.set(PipelineType::Shadow, pipeline());
        assert!(set.get(PipelineType::Shadow).is_some());
        assert!(set.get(PipelineType::Default).is_none());
        assert!(set.remove(PipelineType::Shadow).is_some());
        assert!(set[PipelineType::Shadow].is_none());
    }

    #[test]
    fn test_range_copy_keeps_textures() {
        let mut template = pipeline();
        template.set_texture(0, TextureHandle(7));
        let copy = template.for_range(MeshRange { start: 36, count: 12 });
        assert_eq!((copy.start, copy.count), (36, 12));
        assert_eq!(copy.texture(0), Some(TextureHandle(7)));
        assert_eq!(template.count, 0);
    }

    #[test]
    fn test_out_of_range_unit_is_ignored() {
        let mut p = pipeline();
        p.set_texture(MAX_TEXTURE_UNITS as u32, TextureHandle(3));
        assert!(p.textures.iter().all(Option::is_none));
    }
}
