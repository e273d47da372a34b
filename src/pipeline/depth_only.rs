//! Depth-only program used to render the shadow map

use super::{Pipeline, PipelineUniforms};
use crate::backend::{
    BackendResult, BufferHandle, GraphicsBackend, ProgramDescriptor, Vertex, VertexArrayDescriptor, VertexBufferLayout,
};

pub const LABEL: &str = "depth_only";

/// Color written to the shadow color attachment, only visible when debugging
pub const DEBUG_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

pub const SOURCE: &str = r#"
struct Uniforms {
    OBJECT_TO_CLIP: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    let clip = u.OBJECT_TO_CLIP * vec4<f32>(position, 1.0);
    // GL clip depth [-w, w] to [0, w]
    return vec4<f32>(clip.xy, 0.5 * (clip.z + clip.w), clip.w);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
"#;

pub fn program_descriptor() -> ProgramDescriptor<'static> {
    ProgramDescriptor {
        label: LABEL,
        source: SOURCE,
        texture_units: &[],
    }
}

/// Position and normal only
pub fn vertex_layout() -> VertexBufferLayout {
    Vertex::layout().with_locations(&[Vertex::POSITION, Vertex::NORMAL])
}

/// Compile the program and build the shadow template over `vertices`.
///
/// The template has an empty vertex range and no textures.
pub fn build_template(backend: &mut dyn GraphicsBackend, vertices: BufferHandle) -> BackendResult<Pipeline> {
    let program = backend.create_program(&program_descriptor())?;
    let vertex_array = backend.create_vertex_array(&VertexArrayDescriptor {
        label: Some(LABEL.into()),
        program,
        buffer: vertices,
        layout: vertex_layout(),
    })?;
    let uniforms = PipelineUniforms::resolve(&*backend, program);
    Ok(Pipeline::new(program, vertex_array, uniforms))
}
