//! Lit, textured program shadowed by the spotlight's depth map
//!
//! Lighting is a hemisphere term, a directional sun and one spotlight. The
//! spotlight cone is attenuated by a depth comparison against the shadow map
//! on [`SHADOW_UNIT`].

use super::{Pipeline, PipelineUniforms};
use crate::backend::{
    BackendResult, BufferHandle, GraphicsBackend, ProgramDescriptor, ProgramHandle, TextureHandle, TextureSampleKind,
    TextureUnitLayout, UniformLocation, Vertex, VertexArrayDescriptor,
};

pub const LABEL: &str = "shadowed_color_texture";

/// Sampler unit of the per-object surface texture
pub const SURFACE_UNIT: u32 = 0;
/// Sampler unit of the shadow depth texture
pub const SHADOW_UNIT: u32 = 1;

pub const TEXTURE_UNITS: [TextureUnitLayout; 2] = [
    TextureUnitLayout {
        unit: SURFACE_UNIT,
        kind: TextureSampleKind::Color,
    },
    TextureUnitLayout {
        unit: SHADOW_UNIT,
        kind: TextureSampleKind::Depth,
    },
];

pub const SOURCE: &str = r#"
struct Uniforms {
    OBJECT_TO_CLIP: mat4x4<f32>,
    OBJECT_TO_LIGHT: mat4x3<f32>,
    NORMAL_TO_LIGHT: mat3x3<f32>,
    LIGHT_TO_SPOT: mat4x4<f32>,
    sun_color: vec3<f32>,
    sun_direction: vec3<f32>,
    sky_color: vec3<f32>,
    sky_direction: vec3<f32>,
    spot_position: vec3<f32>,
    spot_direction: vec3<f32>,
    spot_color: vec3<f32>,
    spot_outer_inner: vec2<f32>,
}

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
    @location(3) tex_coord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
    @location(3) tex_coord: vec2<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var surface_texture: texture_2d<f32>;
@group(1) @binding(1) var surface_sampler: sampler;
@group(1) @binding(2) var spot_depth: texture_depth_2d;
@group(1) @binding(3) var spot_sampler: sampler_comparison;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let clip = u.OBJECT_TO_CLIP * vec4<f32>(in.position, 1.0);
    out.clip_position = vec4<f32>(clip.xy, 0.5 * (clip.z + clip.w), clip.w);
    out.position = u.OBJECT_TO_LIGHT * vec4<f32>(in.position, 1.0);
    out.normal = u.NORMAL_TO_LIGHT * in.normal;
    out.color = in.color;
    out.tex_coord = in.tex_coord;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);

    var light = u.sky_color * (0.5 + 0.5 * dot(n, u.sky_direction));
    light += u.sun_color * max(0.0, dot(n, u.sun_direction));

    let l = normalize(u.spot_position - in.position);
    let cone = smoothstep(u.spot_outer_inner.x, u.spot_outer_inner.y, dot(l, -u.spot_direction));
    let spot = u.LIGHT_TO_SPOT * vec4<f32>(in.position, 1.0);
    let coord = spot.xyz / spot.w;
    // Render targets have a top-left origin
    let shadow = textureSampleCompare(spot_depth, spot_sampler, vec2<f32>(coord.x, 1.0 - coord.y), coord.z);
    light += u.spot_color * cone * shadow * max(0.0, dot(n, l));

    let surface = textureSample(surface_texture, surface_sampler, in.tex_coord);
    return surface * vec4<f32>(in.color.rgb * light, in.color.a);
}
"#;

/// Light uniforms written once per lit pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightUniforms {
    pub sun_color: UniformLocation,
    pub sun_direction: UniformLocation,
    pub sky_color: UniformLocation,
    pub sky_direction: UniformLocation,
    pub spot_position: UniformLocation,
    pub spot_direction: UniformLocation,
    pub spot_color: UniformLocation,
    pub spot_outer_inner: UniformLocation,
    pub light_to_spot: UniformLocation,
}

impl LightUniforms {
    pub fn resolve(backend: &dyn GraphicsBackend, program: ProgramHandle) -> Self {
        let location = |name: &str| backend.uniform_location(program, name);
        Self {
            sun_color: location("sun_color"),
            sun_direction: location("sun_direction"),
            sky_color: location("sky_color"),
            sky_direction: location("sky_direction"),
            spot_position: location("spot_position"),
            spot_direction: location("spot_direction"),
            spot_color: location("spot_color"),
            spot_outer_inner: location("spot_outer_inner"),
            light_to_spot: location("LIGHT_TO_SPOT"),
        }
    }
}

pub fn program_descriptor() -> ProgramDescriptor<'static> {
    ProgramDescriptor {
        label: LABEL,
        source: SOURCE,
        texture_units: &TEXTURE_UNITS,
    }
}

/// Compile the program and build the lit template over `vertices`, with
/// `white` on the surface unit.
pub fn build_template(
    backend: &mut dyn GraphicsBackend,
    vertices: BufferHandle,
    white: TextureHandle,
) -> BackendResult<(Pipeline, LightUniforms)> {
    let program = backend.create_program(&program_descriptor())?;
    let vertex_array = backend.create_vertex_array(&VertexArrayDescriptor {
        label: Some(LABEL.into()),
        program,
        buffer: vertices,
        layout: Vertex::layout(),
    })?;
    let mut template = Pipeline::new(program, vertex_array, PipelineUniforms::resolve(&*backend, program));
    template.set_texture(SURFACE_UNIT, white);
    Ok((template, LightUniforms::resolve(&*backend, program)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reflect::UniformBlockLayout;

    #[test]
    fn test_every_light_uniform_is_declared() {
        let layout = UniformBlockLayout::reflect(LABEL, SOURCE).unwrap();
        for name in [
            "OBJECT_TO_CLIP",
            "OBJECT_TO_LIGHT",
            "NORMAL_TO_LIGHT",
            "LIGHT_TO_SPOT",
            "sun_color",
            "sun_direction",
            "sky_color",
            "sky_direction",
            "spot_position",
            "spot_direction",
            "spot_color",
            "spot_outer_inner",
        ] {
            assert!(layout.location(name).is_used(), "{} is not declared", name);
        }
    }

    #[test]
    fn test_matrix_members_match_uniform_sizes() {
        let layout = UniformBlockLayout::reflect(LABEL, SOURCE).unwrap();
        let size = |name| layout.member(layout.location(name)).unwrap().size;
        assert_eq!(size("OBJECT_TO_LIGHT"), 64);
        assert_eq!(size("NORMAL_TO_LIGHT"), 48);
        assert_eq!(size("spot_outer_inner"), 8);
    }
}
