//! Transform hierarchy
//!
//! Transforms live in an arena and refer to their parent by [`TransformId`].
//! A parent is always added before its children.

use glam::{Affine3A, Quat, Vec3};
use std::ops::{Index, IndexMut};

/// Index of a transform in its scene's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformId(pub(crate) usize);

impl TransformId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A named node of the transform hierarchy
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub name: String,
    pub parent: Option<TransformId>,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    pub fn with_parent(mut self, parent: TransformId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn parent_from_local(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    pub fn local_from_parent(&self) -> Affine3A {
        self.parent_from_local().inverse()
    }

    /// Local +X in parent space
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Local -Z in parent space
    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }
}

/// Arena of transforms
#[derive(Debug, Clone, Default)]
pub struct Transforms {
    items: Vec<Transform>,
}

impl Transforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform. Returns `None` if its parent is not already in the arena.
    pub fn add(&mut self, transform: Transform) -> Option<TransformId> {
        if let Some(parent) = transform.parent {
            if parent.0 >= self.items.len() {
                return None;
            }
        }
        self.items.push(transform);
        Some(TransformId(self.items.len() - 1))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: TransformId) -> Option<&Transform> {
        self.items.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TransformId, &Transform)> {
        self.items.iter().enumerate().map(|(i, t)| (TransformId(i), t))
    }

    /// Every transform with the given name
    pub fn find<'a>(&'a self, name: &'a str) -> impl Iterator<Item = TransformId> + 'a {
        self.iter().filter(move |(_, t)| t.name == name).map(|(id, _)| id)
    }

    /// Compose local-to-parent matrices up to the root
    pub fn world_from_local(&self, id: TransformId) -> Affine3A {
        let mut result = Affine3A::IDENTITY;
        let mut current = Some(id);
        while let Some(transform) = current.and_then(|id| self.get(id)) {
            result = transform.parent_from_local() * result;
            current = transform.parent;
        }
        result
    }

    pub fn local_from_world(&self, id: TransformId) -> Affine3A {
        self.world_from_local(id).inverse()
    }
}

impl Index<TransformId> for Transforms {
    type Output = Transform;

    fn index(&self, id: TransformId) -> &Transform {
        &self.items[id.0]
    }
}

impl IndexMut<TransformId> for Transforms {
    fn index_mut(&mut self, id: TransformId) -> &mut Transform {
        &mut self.items[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_from_local_composes_parents() {
        let mut transforms = Transforms::new();
        let parent = transforms
            .add(Transform::new("Parent").with_rotation(Quat::from_rotation_z(FRAC_PI_2)))
            .unwrap();
        let child = transforms
            .add(
                Transform::new("Child")
                    .with_parent(parent)
                    .with_position(Vec3::new(2.0, 0.0, 0.0)),
            )
            .unwrap();

        let origin = transforms.world_from_local(child).transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

        let back = transforms.local_from_world(child).transform_point3(origin);
        assert!(back.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn test_parent_must_exist() {
        let mut transforms = Transforms::new();
        assert!(transforms.add(Transform::new("Orphan").with_parent(TransformId(3))).is_none());
        assert!(transforms.is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let mut transforms = Transforms::new();
        transforms.add(Transform::new("A"));
        transforms.add(Transform::new("B"));
        transforms.add(Transform::new("A"));
        assert_eq!(transforms.find("A").count(), 2);
        assert_eq!(transforms.find("B").collect::<Vec<_>>(), vec![TransformId(1)]);
    }
}
