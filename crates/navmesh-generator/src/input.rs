//! Input geometry of a navmesh build
//!
//! The host hands over triangle meshes with their placement and an owner id.
//! Records are appended when geometry is collected and removed by owner; they
//! are never edited in place.

use std::ops::Range;
use std::sync::Arc;

use glam::{Affine3A, Vec3};
use recast_common::TriMesh;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Bounds of a mesh in its own space
    pub fn from_mesh(mesh: &TriMesh) -> Self {
        let (min, max) = mesh.calculate_bounds();
        Self { min, max }
    }

    /// Bounds of this box after `transform`
    pub fn transformed(&self, transform: &Affine3A) -> Self {
        let corners = [
            Vec3::new(self.min.x, self.min.y, self.min.z),
            Vec3::new(self.max.x, self.min.y, self.min.z),
            Vec3::new(self.min.x, self.max.y, self.min.z),
            Vec3::new(self.max.x, self.max.y, self.min.z),
            Vec3::new(self.min.x, self.min.y, self.max.z),
            Vec3::new(self.max.x, self.min.y, self.max.z),
            Vec3::new(self.min.x, self.max.y, self.max.z),
            Vec3::new(self.max.x, self.max.y, self.max.z),
        ];
        corners.iter().fold(
            Self::new(Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |acc, &c| {
                let p = transform.transform_point3(c);
                Self::new(acc.min.min(p), acc.max.max(p))
            },
        )
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Inclusive overlap test on the XZ plane
    pub fn intersects_xz(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x && self.min.z <= other.max.z && self.max.z >= other.min.z
    }
}

/// One piece of input geometry
#[derive(Debug, Clone)]
pub struct InputRecord {
    pub mesh: Arc<TriMesh>,
    /// Placement of the mesh in the world
    pub transform: Affine3A,
    /// Bounds of the mesh in its own space
    pub aabb: Aabb,
    /// Opaque id used to remove the geometry again
    pub owner_id: i64,
}

impl InputRecord {
    pub fn new(mesh: Arc<TriMesh>, transform: Affine3A, owner_id: i64) -> Self {
        let aabb = Aabb::from_mesh(&mesh);
        Self {
            mesh,
            transform,
            aabb,
            owner_id,
        }
    }

    /// Bounds of the placed mesh
    pub fn world_aabb(&self) -> Aabb {
        self.aabb.transformed(&self.transform)
    }
}

/// Input records in insertion order
#[derive(Debug, Clone, Default)]
pub struct GeometryBatch {
    records: Vec<InputRecord>,
}

impl GeometryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: InputRecord) {
        self.records.push(record);
    }

    /// Appends records, returning the positions they landed at
    pub fn extend(&mut self, records: impl IntoIterator<Item = InputRecord>) -> Range<usize> {
        let start = self.records.len();
        self.records.extend(records);
        start..self.records.len()
    }

    /// Span of positions holding records of `owner_id`
    pub fn owner_range(&self, owner_id: i64) -> Option<Range<usize>> {
        let start = self.records.iter().position(|r| r.owner_id == owner_id)?;
        let end = self.records.iter().rposition(|r| r.owner_id == owner_id)? + 1;
        Some(start..end)
    }

    /// Removes every record of `owner_id`. Returns the span of positions the
    /// removed records occupied, empty when the owner had none.
    pub fn remove_owner(&mut self, owner_id: i64) -> Range<usize> {
        let Some(range) = self.owner_range(owner_id) else {
            return 0..0;
        };
        self.records.retain(|r| r.owner_id != owner_id);
        range
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InputRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[InputRecord] {
        &self.records
    }

    /// Union of all placed bounds, `None` for an empty batch
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.records.iter().map(InputRecord::world_aabb).reduce(|a, b| a.union(&b))
    }
}

impl<'a> IntoIterator for &'a GeometryBatch {
    type Item = &'a InputRecord;
    type IntoIter = std::slice::Iter<'a, InputRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_geometry::plane;

    #[test]
    fn test_transformed_bounds() {
        let aabb = Aabb::new(Vec3::new(-1.0, 0.0, -2.0), Vec3::new(1.0, 1.0, 2.0));
        let moved = aabb.transformed(&Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(9.0, 0.0, -2.0));
        assert_eq!(moved.max, Vec3::new(11.0, 1.0, 2.0));

        let turned = aabb.transformed(&Affine3A::from_rotation_y(std::f32::consts::FRAC_PI_2));
        assert!((turned.max.x - 2.0).abs() < 1e-5);
        assert!((turned.max.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_intersects_is_inclusive() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let touching = Aabb::new(Vec3::new(1.0, 5.0, 0.0), Vec3::new(2.0, 6.0, 1.0));
        let apart = Aabb::new(Vec3::new(1.1, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert!(a.intersects_xz(&touching));
        assert!(!a.intersects_xz(&apart));
    }

    #[test]
    fn test_batch_owner_removal() {
        let mesh = Arc::new(plane(4.0));
        let mut batch = GeometryBatch::new();
        batch.push(InputRecord::new(mesh.clone(), Affine3A::IDENTITY, 1));
        let added = batch.extend([
            InputRecord::new(mesh.clone(), Affine3A::from_translation(Vec3::X * 4.0), 2),
            InputRecord::new(mesh.clone(), Affine3A::from_translation(Vec3::X * 8.0), 2),
        ]);
        assert_eq!(added, 1..3);
        batch.push(InputRecord::new(mesh, Affine3A::IDENTITY, 3));

        assert_eq!(batch.owner_range(2), Some(1..3));
        assert_eq!(batch.remove_owner(2), 1..3);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.remove_owner(2), 0..0);
        assert!(batch.iter().all(|r| r.owner_id != 2));
    }

    #[test]
    fn test_world_bounds() {
        let mesh = Arc::new(plane(4.0));
        let mut batch = GeometryBatch::new();
        assert!(batch.world_bounds().is_none());
        batch.push(InputRecord::new(mesh.clone(), Affine3A::IDENTITY, 1));
        batch.push(InputRecord::new(mesh, Affine3A::from_translation(Vec3::new(10.0, 1.0, 0.0)), 1));
        let bounds = batch.world_bounds().unwrap();
        assert_eq!(bounds.min, Vec3::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(14.0, 1.0, 4.0));
    }
}
