//! Dirty-tile tracking
//!
//! Geometry edits mark the tiles their bounds overlap. The generator later
//! rebuilds only those tiles. Each tile is built from geometry reaching into
//! its border, so bounds are widened by that border before marking.

use glam::{Affine3A, Vec3};

use crate::input::InputRecord;

/// Grid of tiles waiting for a rebuild
#[derive(Debug, Clone, Default)]
pub struct DirtyTileSet {
    tiles_x: i32,
    tiles_z: i32,
    /// World-unit border gathered around each tile
    border: f32,
    cells: Vec<bool>,
}

impl DirtyTileSet {
    /// Creates a clean grid of `tiles_x * tiles_z` tiles
    pub fn new(tiles_x: i32, tiles_z: i32) -> Self {
        let tiles_x = tiles_x.max(0);
        let tiles_z = tiles_z.max(0);
        Self {
            tiles_x,
            tiles_z,
            border: 0.0,
            cells: vec![false; (tiles_x * tiles_z) as usize],
        }
    }

    /// Widens every marked footprint by `border` on X and Z
    pub fn with_border(mut self, border: f32) -> Self {
        self.border = border.max(0.0);
        self
    }

    pub fn dimensions(&self) -> (i32, i32) {
        (self.tiles_x, self.tiles_z)
    }

    fn index(&self, x: i32, z: i32) -> Option<usize> {
        (x >= 0 && z >= 0 && x < self.tiles_x && z < self.tiles_z).then(|| (x + z * self.tiles_x) as usize)
    }

    /// Marks one tile; coordinates outside the grid are ignored
    pub fn mark(&mut self, x: i32, z: i32) {
        if let Some(i) = self.index(x, z) {
            self.cells[i] = true;
        }
    }

    pub fn is_dirty(&self, x: i32, z: i32) -> bool {
        self.index(x, z).is_some_and(|i| self.cells[i])
    }

    pub fn clear(&mut self, x: i32, z: i32) {
        if let Some(i) = self.index(x, z) {
            self.cells[i] = false;
        }
    }

    pub fn dirty_count(&self) -> usize {
        self.cells.iter().filter(|&&d| d).count()
    }

    /// Dirty tiles in row order
    pub fn dirty_tiles(&self) -> Vec<(i32, i32)> {
        (0..self.tiles_z)
            .flat_map(|z| (0..self.tiles_x).map(move |x| (x, z)))
            .filter(|&(x, z)| self.is_dirty(x, z))
            .collect()
    }

    /// Marks every tile overlapping the navmesh-space bounds `min`..`max`.
    ///
    /// `origin` is the corner of tile (0, 0) and `tile_edge` the tile edge
    /// length.
    pub fn mark_bounds(&mut self, min: Vec3, max: Vec3, origin: Vec3, tile_edge: f32) {
        let pad = Vec3::new(self.border, 0.0, self.border);
        let (min, max) = (min - pad, max + pad);
        let x0 = ((min.x - origin.x) / tile_edge).floor() as i32;
        let x1 = ((max.x - origin.x) / tile_edge).floor() as i32;
        let z0 = ((min.z - origin.z) / tile_edge).floor() as i32;
        let z1 = ((max.z - origin.z) / tile_edge).floor() as i32;

        for z in z0.max(0)..=z1.min(self.tiles_z - 1) {
            for x in x0.max(0)..=x1.min(self.tiles_x - 1) {
                self.mark(x, z);
            }
        }
    }

    /// Marks the footprint of each record. `to_local` maps world space into
    /// navmesh space.
    pub fn mark_records<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a InputRecord>,
        to_local: &Affine3A,
        origin: Vec3,
        tile_edge: f32,
    ) {
        for record in records {
            let bounds = record.world_aabb().transformed(to_local);
            self.mark_bounds(bounds.min, bounds.max, origin, tile_edge);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputRecord;
    use crate::test_geometry::plane;
    use std::sync::Arc;

    #[test]
    fn test_mark_and_clear() {
        let mut set = DirtyTileSet::new(4, 3);
        set.mark(1, 2);
        set.mark(7, 7);
        set.mark(-1, 0);
        assert!(set.is_dirty(1, 2));
        assert_eq!(set.dirty_count(), 1);
        set.clear(1, 2);
        assert_eq!(set.dirty_count(), 0);
    }

    #[test]
    fn test_record_inside_one_tile_marks_only_it() {
        let mut set = DirtyTileSet::new(5, 5);
        // Tile (2, 3) spans x 20..30 and z 30..40
        let record = InputRecord::new(
            Arc::new(plane(4.0)),
            Affine3A::from_translation(Vec3::new(23.0, 0.0, 33.0)),
            7,
        );
        set.mark_records([&record], &Affine3A::IDENTITY, Vec3::ZERO, 10.0);
        assert_eq!(set.dirty_tiles(), vec![(2, 3)]);
    }

    #[test]
    fn test_straddling_record_marks_neighbour() {
        let mut set = DirtyTileSet::new(5, 5);
        let record = InputRecord::new(
            Arc::new(plane(4.0)),
            Affine3A::from_translation(Vec3::new(28.0, 0.0, 33.0)),
            7,
        );
        set.mark_records([&record], &Affine3A::IDENTITY, Vec3::ZERO, 10.0);
        assert_eq!(set.dirty_tiles(), vec![(2, 3), (3, 3)]);
    }

    #[test]
    fn test_navmesh_transform_is_applied() {
        let mut set = DirtyTileSet::new(5, 5);
        let record = InputRecord::new(
            Arc::new(plane(4.0)),
            Affine3A::from_translation(Vec3::new(123.0, 0.0, 3.0)),
            7,
        );
        let to_local = Affine3A::from_translation(Vec3::new(-100.0, 0.0, 0.0));
        set.mark_records([&record], &to_local, Vec3::ZERO, 10.0);
        assert_eq!(set.dirty_tiles(), vec![(2, 0)]);
    }

    #[test]
    fn test_bounds_outside_grid_are_clamped() {
        let mut set = DirtyTileSet::new(2, 2);
        set.mark_bounds(Vec3::splat(-50.0), Vec3::splat(-40.0), Vec3::ZERO, 10.0);
        assert_eq!(set.dirty_count(), 0);
        set.mark_bounds(Vec3::splat(-50.0), Vec3::splat(50.0), Vec3::ZERO, 10.0);
        assert_eq!(set.dirty_count(), 4);
    }

    #[test]
    fn test_border_reaches_neighbour() {
        // x 11..12 is inside tile 1 but within 2 units of tile 0
        let record = InputRecord::new(
            Arc::new(plane(1.0)),
            Affine3A::from_translation(Vec3::new(11.0, 0.0, 5.0)),
            7,
        );
        let mut plain = DirtyTileSet::new(3, 3);
        plain.mark_records([&record], &Affine3A::IDENTITY, Vec3::ZERO, 10.0);
        assert_eq!(plain.dirty_tiles(), vec![(1, 0)]);

        let mut padded = DirtyTileSet::new(3, 3).with_border(2.0);
        padded.mark_records([&record], &Affine3A::IDENTITY, Vec3::ZERO, 10.0);
        assert_eq!(padded.dirty_tiles(), vec![(0, 0), (1, 0)]);
    }
}
