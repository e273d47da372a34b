//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, Mat3, Mat4, Vec2, Vec3, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Depth32Float,
    Depth24Plus,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float | TextureFormat::Depth24Plus)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        4
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_DST: Self = Self(1 << 3);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Texture descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Renderbuffer descriptor. Renderbuffers are render-only attachments and
/// can never be sampled.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderbufferDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub usage: BufferUsage,
}

/// Result of a framebuffer completeness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// An attachment has a format that cannot be rendered to in its slot
    IncompleteAttachment,
    /// The framebuffer has no attachments at all
    MissingAttachment,
    /// Attachments disagree on their dimensions
    IncompleteDimensions,
    /// A referenced attachment no longer exists
    Unsupported,
}

impl FramebufferStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, FramebufferStatus::Complete)
    }
}

/// What a backend knows about one framebuffer attachment slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttachmentSlot {
    Empty,
    /// The slot refers to a resource that no longer exists
    Dangling,
    Attached {
        width: u32,
        height: u32,
        format: TextureFormat,
    },
}

impl FramebufferStatus {
    /// Completeness rules shared by every backend.
    pub(crate) fn evaluate(color: AttachmentSlot, depth: AttachmentSlot) -> Self {
        use AttachmentSlot::*;
        match (color, depth) {
            (Empty, Empty) => FramebufferStatus::MissingAttachment,
            (Dangling, _) | (_, Dangling) => FramebufferStatus::Unsupported,
            (Attached { format, .. }, _) if format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (_, Attached { format, .. }) if !format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (
                Attached {
                    width: cw, height: ch, ..
                },
                Attached {
                    width: dw, height: dh, ..
                },
            ) if (cw, ch) != (dw, dh) => FramebufferStatus::IncompleteDimensions,
            _ => FramebufferStatus::Complete,
        }
    }
}

impl std::fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FramebufferStatus::Complete => "complete",
            FramebufferStatus::IncompleteAttachment => "incomplete attachment",
            FramebufferStatus::MissingAttachment => "missing attachment",
            FramebufferStatus::IncompleteDimensions => "incomplete dimensions",
            FramebufferStatus::Unsupported => "unsupported",
        };
        f.write_str(text)
    }
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// Keep only the attributes at the given shader locations.
    pub fn with_locations(&self, locations: &[u32]) -> Self {
        Self {
            array_stride: self.array_stride,
            attributes: self
                .attributes
                .iter()
                .filter(|a| locations.contains(&a.location))
                .cloned()
                .collect(),
        }
    }
}

/// Vertex with position, normal, color, and texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: [u8; 4],
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const POSITION: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const COLOR: u32 = 2;
    pub const TEX_COORD: u32 = 3;

    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            color: [0xff; 4],
            tex_coord,
        }
    }

    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as u64,
            attributes: vec![
                VertexAttribute {
                    location: Self::POSITION,
                    format: VertexFormat::Float32x3,
                    offset: 0,
                },
                VertexAttribute {
                    location: Self::NORMAL,
                    format: VertexFormat::Float32x3,
                    offset: 12,
                },
                VertexAttribute {
                    location: Self::COLOR,
                    format: VertexFormat::Unorm8x4,
                    offset: 24,
                },
                VertexAttribute {
                    location: Self::TEX_COORD,
                    format: VertexFormat::Float32x2,
                    offset: 28,
                },
            ],
        }
    }
}

/// Cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// Compare function for depth tests and shadow samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

/// Blend operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
}

/// Blend component state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl Default for BlendComponent {
    fn default() -> Self {
        Self {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::Zero,
            operation: BlendOperation::Add,
        }
    }
}

/// Blend state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    /// `src * src_alpha + dst * (1 - src_alpha)` on every channel.
    pub fn alpha_blending() -> Self {
        let over = BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        };
        Self {
            color: over,
            alpha: over,
        }
    }
}

/// Fixed-function state applied to subsequent draws.
///
/// The default is depth test off, blending off, no culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState {
    pub depth_test: bool,
    pub blend: Option<BlendState>,
    pub cull_mode: CullMode,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

/// Sampling parameters attached to a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `None` samples the base level only
    pub mipmap_filter: Option<FilterMode>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    /// Depth comparison; only meaningful for depth textures
    pub compare: Option<CompareFunction>,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self::clamped(FilterMode::Linear)
    }
}

impl SamplerDescriptor {
    /// Single filter, clamp to edge, no mipmaps.
    pub fn clamped(filter: FilterMode) -> Self {
        Self {
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            compare: None,
        }
    }

    /// Trilinear filtering with repeat wrap.
    pub fn trilinear_repeat() -> Self {
        Self {
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
            mipmap_filter: Some(FilterMode::Linear),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            compare: None,
        }
    }

    pub fn with_compare(mut self, compare: CompareFunction) -> Self {
        self.compare = Some(compare);
        self
    }
}

/// Number of texture units a program can bind
pub const MAX_TEXTURE_UNITS: usize = 4;

/// Texture bind target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureTarget {
    D2,
}

/// What a program expects to find on a texture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSampleKind {
    /// Filterable color texture with a regular sampler
    Color,
    /// Depth texture with a comparison sampler
    Depth,
}

/// Texture unit declared by a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureUnitLayout {
    pub unit: u32,
    pub kind: TextureSampleKind,
}

/// Location of a named uniform inside a program.
///
/// Names the program does not declare resolve to [`UniformLocation::UNUSED`];
/// writing to it is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub(crate) u32);

impl UniformLocation {
    pub const UNUSED: Self = Self(u32::MAX);

    pub fn is_used(&self) -> bool {
        *self != Self::UNUSED
    }

    pub(crate) fn index(&self) -> Option<usize> {
        self.is_used().then_some(self.0 as usize)
    }
}

impl Default for UniformLocation {
    fn default() -> Self {
        Self::UNUSED
    }
}

/// Value written to a uniform slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    /// Affine transform stored as four vec3 columns
    Mat4x3(Affine3A),
    Mat4(Mat4),
}

impl UniformValue {
    /// Size in bytes under WGSL uniform layout rules.
    pub fn size(&self) -> usize {
        match self {
            UniformValue::Float(_) | UniformValue::Int(_) => 4,
            UniformValue::Vec2(_) => 8,
            UniformValue::Vec3(_) => 12,
            UniformValue::Vec4(_) => 16,
            UniformValue::Mat3(_) => 48,
            UniformValue::Mat4x3(_) | UniformValue::Mat4(_) => 64,
        }
    }

    /// Write the value into `dst`, truncating to `dst.len()`.
    ///
    /// Matrix columns with three rows are padded to 16 bytes.
    pub fn write_to(&self, dst: &mut [u8]) {
        let mut words = [0u32; 16];
        let len = match *self {
            UniformValue::Float(v) => {
                words[0] = v.to_bits();
                1
            }
            UniformValue::Int(v) => {
                words[0] = u32::from_ne_bytes(v.to_ne_bytes());
                1
            }
            UniformValue::Vec2(v) => put(&mut words, 0, &v.to_array()),
            UniformValue::Vec3(v) => put(&mut words, 0, &v.to_array()),
            UniformValue::Vec4(v) => put(&mut words, 0, &v.to_array()),
            UniformValue::Mat3(m) => {
                for (i, column) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
                    put(&mut words, i * 4, &column.to_array());
                }
                12
            }
            UniformValue::Mat4x3(a) => {
                let columns = [
                    a.matrix3.x_axis,
                    a.matrix3.y_axis,
                    a.matrix3.z_axis,
                    a.translation,
                ];
                for (i, column) in columns.iter().enumerate() {
                    put(&mut words, i * 4, &column.to_array());
                }
                16
            }
            UniformValue::Mat4(m) => put(&mut words, 0, &m.to_cols_array()),
        };
        let bytes: &[u8] = bytemuck::cast_slice(&words[..len]);
        let n = bytes.len().min(dst.len());
        dst[..n].copy_from_slice(&bytes[..n]);
    }
}

fn put(words: &mut [u32; 16], at: usize, values: &[f32]) -> usize {
    for (i, v) in values.iter().enumerate() {
        words[at + i] = v.to_bits();
    }
    at + values.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn test_vertex_layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 36);
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + last.format.size(), layout.array_stride);
    }

    #[test]
    fn test_mat3_columns_are_padded() {
        let value = UniformValue::Mat3(Mat3::from_cols(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::new(7.0, 8.0, 9.0),
        ));
        let mut bytes = vec![0u8; value.size()];
        value.write_to(&mut bytes);
        assert_eq!(
            floats(&bytes),
            vec![1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 0.0, 7.0, 8.0, 9.0, 0.0]
        );
    }

    #[test]
    fn test_mat4x3_translation_is_last_column() {
        let value = UniformValue::Mat4x3(Affine3A::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let mut bytes = vec![0u8; value.size()];
        value.write_to(&mut bytes);
        assert_eq!(&floats(&bytes)[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(floats(&bytes)[0], 1.0);
    }

    #[test]
    fn test_write_truncates_to_destination() {
        let mut bytes = [0u8; 8];
        UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)).write_to(&mut bytes);
        assert_eq!(floats(&bytes), vec![1.0, 2.0]);
    }

    #[test]
    fn test_unused_location() {
        assert!(!UniformLocation::UNUSED.is_used());
        assert_eq!(UniformLocation::default(), UniformLocation::UNUSED);
        assert_eq!(UniformLocation(3).index(), Some(3));
    }
}
