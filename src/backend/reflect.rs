//! Uniform block reflection for WGSL programs
//!
//! Programs declare their uniforms as members of one struct bound at
//! `@group(0) @binding(0)`. Parsing the source with naga gives the byte offset
//! and size of every member, which is what named uniform lookup resolves to.

use super::traits::{BackendError, BackendResult};
use super::types::UniformLocation;

/// A named member of the uniform block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Layout of a program's uniform block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformBlockLayout {
    pub members: Vec<UniformMember>,
    /// Total block size in bytes, including trailing padding
    pub size: u32,
}

impl UniformBlockLayout {
    /// Parse `source` and extract the block at `@group(0) @binding(0)`.
    ///
    /// A program without uniforms has an empty layout.
    pub fn reflect(label: &str, source: &str) -> BackendResult<Self> {
        let module = naga::front::wgsl::parse_str(source).map_err(|e| {
            BackendError::ShaderCreationFailed(format!("{}: {}", label, e.emit_to_string(source)))
        })?;

        let block = module.global_variables.iter().find_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            (var.space == naga::AddressSpace::Uniform && binding.group == 0 && binding.binding == 0)
                .then_some(var)
        });
        let Some(block) = block else {
            return Ok(Self::default());
        };

        match &module.types[block.ty].inner {
            naga::TypeInner::Struct { members, span } => Ok(Self {
                members: members
                    .iter()
                    .filter_map(|member| {
                        Some(UniformMember {
                            name: member.name.clone()?,
                            offset: member.offset,
                            size: module.types[member.ty].inner.size(module.to_ctx()),
                        })
                    })
                    .collect(),
                size: *span,
            }),
            _ => Err(BackendError::ShaderCreationFailed(format!(
                "{}: uniform block at group 0 binding 0 must be a struct",
                label
            ))),
        }
    }

    pub fn location(&self, name: &str) -> UniformLocation {
        self.members
            .iter()
            .position(|m| m.name == name)
            .map(|i| UniformLocation(i as u32))
            .unwrap_or(UniformLocation::UNUSED)
    }

    pub fn member(&self, location: UniformLocation) -> Option<&UniformMember> {
        self.members.get(location.index()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
struct Uniforms {
    OBJECT_TO_CLIP: mat4x4<f32>,
    NORMAL_TO_LIGHT: mat3x3<f32>,
    tint: vec3<f32>,
    strength: f32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@location(0) position: vec4<f32>) -> @builtin(position) vec4<f32> {
    return u.OBJECT_TO_CLIP * position;
}
"#;

    #[test]
    fn test_reflect_member_offsets() {
        let layout = UniformBlockLayout::reflect("test", SOURCE).unwrap();
        let offsets: Vec<_> = layout.members.iter().map(|m| (m.name.as_str(), m.offset, m.size)).collect();
        assert_eq!(
            offsets,
            vec![
                ("OBJECT_TO_CLIP", 0, 64),
                ("NORMAL_TO_LIGHT", 64, 48),
                ("tint", 112, 12),
                ("strength", 124, 4),
            ]
        );
        assert_eq!(layout.size, 128);
    }

    #[test]
    fn test_unknown_name_is_unused() {
        let layout = UniformBlockLayout::reflect("test", SOURCE).unwrap();
        assert_eq!(layout.location("missing"), UniformLocation::UNUSED);
        assert!(layout.member(UniformLocation::UNUSED).is_none());
        assert_eq!(layout.member(layout.location("tint")).unwrap().offset, 112);
    }

    #[test]
    fn test_parse_error() {
        let result = UniformBlockLayout::reflect("broken", "fn {");
        assert!(matches!(result, Err(BackendError::ShaderCreationFailed(_))));
    }
}
