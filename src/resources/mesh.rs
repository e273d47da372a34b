//! Mesh data structures and generation
//!
//! Generators build indexed meshes in a Z-up frame. [`MeshBuffer`] expands
//! them into one non-indexed triangle list so that every named mesh is a
//! contiguous vertex range of a single vertex buffer.

use crate::backend::traits::*;
use crate::backend::types::*;
use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// A mesh with vertex and index data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub name: String,
}

impl Mesh {
    pub fn new(name: &str) -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Rename the mesh
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the vertex color of every vertex
    pub fn with_color(mut self, color: [u8; 4]) -> Self {
        for vertex in &mut self.vertices {
            vertex.color = color;
        }
        self
    }

    fn push_quad(&mut self, corners: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&corners);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Create a unit cube centered at origin
    pub fn cube() -> Self {
        let mut mesh = Mesh::new("cube");

        // (normal, u axis, v axis) with u x v == normal
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (-Vec3::X, -Vec3::Y, Vec3::Z),
            (Vec3::Y, -Vec3::X, Vec3::Z),
            (-Vec3::Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (-Vec3::Z, -Vec3::X, Vec3::Y),
        ];

        for (normal, u, v) in faces {
            let corner = |su: f32, sv: f32| {
                Vertex::new(
                    (normal + u * su + v * sv) * 0.5,
                    normal,
                    Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5),
                )
            };
            mesh.push_quad([
                corner(-1.0, -1.0),
                corner(1.0, -1.0),
                corner(1.0, 1.0),
                corner(-1.0, 1.0),
            ]);
        }

        mesh
    }

    /// Create a UV sphere of diameter 1 with its poles on the Z axis
    pub fn sphere(segments: u32, rings: u32) -> Self {
        let mut mesh = Mesh::new("sphere");
        let segments = segments.max(3);
        let rings = rings.max(2);

        let segment_angle = TAU / segments as f32;
        let ring_angle = PI / rings as f32;

        for ring in 0..=rings {
            let phi = ring as f32 * ring_angle;
            let z = phi.cos();
            let ring_radius = phi.sin();

            for segment in 0..=segments {
                let theta = segment as f32 * segment_angle;
                let normal = Vec3::new(ring_radius * theta.cos(), ring_radius * theta.sin(), z);
                mesh.vertices.push(Vertex::new(
                    normal * 0.5,
                    normal.normalize_or_zero(),
                    Vec2::new(segment as f32 / segments as f32, 1.0 - ring as f32 / rings as f32),
                ));
            }
        }

        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;

                mesh.indices
                    .extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
            }
        }

        mesh
    }

    /// Create a plane in the XY plane facing +Z
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let mut mesh = Mesh::new("plane");
        let subdivisions = subdivisions.max(1);

        let step_x = width / subdivisions as f32;
        let step_y = depth / subdivisions as f32;

        for y in 0..=subdivisions {
            for x in 0..=subdivisions {
                mesh.vertices.push(Vertex::new(
                    Vec3::new(
                        -width / 2.0 + x as f32 * step_x,
                        -depth / 2.0 + y as f32 * step_y,
                        0.0,
                    ),
                    Vec3::Z,
                    Vec2::new(x as f32, y as f32),
                ));
            }
        }

        for y in 0..subdivisions {
            for x in 0..subdivisions {
                let current = y * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;

                mesh.indices
                    .extend_from_slice(&[current, current + 1, next + 1, current, next + 1, next]);
            }
        }

        mesh
    }

    /// Create a capped cylinder along the Z axis
    pub fn cylinder(radius: f32, height: f32, segments: u32) -> Self {
        let mut mesh = Mesh::new("cylinder");
        let segments = segments.max(3);

        let half_height = height / 2.0;
        let angle_step = TAU / segments as f32;

        for i in 0..segments {
            let (a0, a1) = (i as f32 * angle_step, (i + 1) as f32 * angle_step);
            let n0 = Vec3::new(a0.cos(), a0.sin(), 0.0);
            let n1 = Vec3::new(a1.cos(), a1.sin(), 0.0);
            let (u0, u1) = (i as f32 / segments as f32, (i + 1) as f32 / segments as f32);

            mesh.push_quad([
                Vertex::new(n0 * radius - Vec3::Z * half_height, n0, Vec2::new(u0, 0.0)),
                Vertex::new(n1 * radius - Vec3::Z * half_height, n1, Vec2::new(u1, 0.0)),
                Vertex::new(n1 * radius + Vec3::Z * half_height, n1, Vec2::new(u1, 1.0)),
                Vertex::new(n0 * radius + Vec3::Z * half_height, n0, Vec2::new(u0, 1.0)),
            ]);

            for normal in [Vec3::Z, -Vec3::Z] {
                let base = mesh.vertices.len() as u32;
                let cap = |n: Vec3| {
                    Vertex::new(
                        n * radius + normal * half_height,
                        normal,
                        Vec2::new(0.5 + n.x * 0.5, 0.5 + n.y * 0.5),
                    )
                };
                mesh.vertices.push(Vertex::new(normal * half_height, normal, Vec2::splat(0.5)));
                mesh.vertices.push(cap(n0));
                mesh.vertices.push(cap(n1));
                mesh.indices.extend_from_slice(&[base, base + 1, base + 2]);
            }
        }

        mesh
    }
}

/// Contiguous vertex range of a named mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshRange {
    pub start: u32,
    pub count: u32,
}

/// Resolves mesh names to vertex ranges
pub trait MeshLookup {
    fn lookup(&self, name: &str) -> Option<MeshRange>;
}

/// Named non-indexed triangle lists packed into one vertex buffer
#[derive(Debug, Clone, Default)]
pub struct MeshBuffer {
    vertices: Vec<Vertex>,
    ranges: Vec<(String, MeshRange)>,
}

impl MeshBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The meshes scene files can refer to
    pub fn standard() -> Self {
        let mut buffer = Self::new();
        buffer.add(&Mesh::cube());
        buffer.add(&Mesh::sphere(32, 16).with_color([0xff, 0xc0, 0x80, 0xff]));
        buffer.add(&Mesh::cylinder(0.5, 1.0, 32));
        buffer.add(&Mesh::plane(1.0, 1.0, 1));
        buffer
    }

    /// Append `mesh` under its name and return its range.
    ///
    /// Triangles are rewound so that their counter-clockwise face points
    /// along the vertex normals.
    pub fn add(&mut self, mesh: &Mesh) -> MeshRange {
        let start = self.vertices.len() as u32;
        for triangle in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[triangle[i] as usize]);
            let face = (b.position - a.position).cross(c.position - a.position);
            if face.dot(a.normal + b.normal + c.normal) < 0.0 {
                self.vertices.extend_from_slice(&[a, c, b]);
            } else {
                self.vertices.extend_from_slice(&[a, b, c]);
            }
        }
        let range = MeshRange {
            start,
            count: self.vertices.len() as u32 - start,
        };
        self.ranges.push((mesh.name.clone(), range));
        range
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.ranges.iter().map(|(name, _)| name.as_str())
    }

    /// Upload every vertex into one vertex buffer
    pub fn upload(&self, backend: &mut dyn GraphicsBackend) -> BackendResult<BufferHandle> {
        backend.create_buffer_init(
            &BufferDescriptor {
                label: Some("Mesh Buffer".into()),
                usage: BufferUsage::VERTEX,
            },
            bytemuck::cast_slice(&self.vertices),
        )
    }
}

impl MeshLookup for MeshBuffer {
    fn lookup(&self, name: &str) -> Option<MeshRange> {
        self.ranges.iter().find(|(n, _)| n == name).map(|(_, range)| *range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outward(buffer: &MeshBuffer, range: MeshRange) -> bool {
        let vertices = &buffer.vertices()[range.start as usize..(range.start + range.count) as usize];
        vertices.chunks_exact(3).all(|t| {
            let face = (t[1].position - t[0].position).cross(t[2].position - t[0].position);
            face.dot(t[0].normal + t[1].normal + t[2].normal) >= 0.0
        })
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let buffer = MeshBuffer::standard();
        let cube = buffer.lookup("cube").unwrap();
        let sphere = buffer.lookup("sphere").unwrap();
        assert_eq!(cube, MeshRange { start: 0, count: 36 });
        assert_eq!(sphere.start, 36);
        assert!(buffer.lookup("teapot").is_none());
        let total: u32 = ["cube", "sphere", "cylinder", "plane"]
            .iter()
            .map(|n| buffer.lookup(n).unwrap().count)
            .sum();
        assert_eq!(total as usize, buffer.vertices().len());
    }

    #[test]
    fn test_triangles_face_outward() {
        let buffer = MeshBuffer::standard();
        for name in ["cube", "sphere", "cylinder", "plane"] {
            assert!(outward(&buffer, buffer.lookup(name).unwrap()), "{} has inverted faces", name);
        }
    }

    #[test]
    fn test_cube_is_unit_sized() {
        let cube = Mesh::cube();
        for vertex in &cube.vertices {
            assert_eq!(vertex.position.abs().max_element(), 0.5);
        }
        assert_eq!(cube.triangle_count(), 12);
    }
}
