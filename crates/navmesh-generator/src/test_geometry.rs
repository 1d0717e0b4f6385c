//! Geometry fixtures shared by the unit tests

use std::sync::Arc;

use glam::{Affine3A, Vec3};
use recast_common::TriMesh;

use crate::config::BuildParameters;
use crate::input::InputRecord;

/// Flat square at y = 0 spanning 0..size on X and Z
pub fn plane(size: f32) -> TriMesh {
    TriMesh::from_parts(
        vec![0.0, 0.0, 0.0, 0.0, 0.0, size, size, 0.0, size, size, 0.0, 0.0],
        vec![0, 1, 2, 0, 2, 3],
    )
    .unwrap()
}

/// Closed box spanning `min..max`
pub fn block(min: Vec3, max: Vec3) -> TriMesh {
    let (a, b) = (min, max);
    TriMesh::from_parts(
        vec![
            a.x, a.y, a.z, b.x, a.y, a.z, b.x, a.y, b.z, a.x, a.y, b.z, //
            a.x, b.y, a.z, b.x, b.y, a.z, b.x, b.y, b.z, a.x, b.y, b.z,
        ],
        vec![
            4, 7, 6, 4, 6, 5, // top
            0, 2, 3, 0, 1, 2, // bottom
            0, 4, 5, 0, 5, 1, //
            1, 5, 6, 1, 6, 2, //
            2, 6, 7, 2, 7, 3, //
            3, 7, 4, 3, 4, 0,
        ],
    )
    .unwrap()
}

/// Flat square of `size` centred on `center`
pub fn square_record(center: Vec3, size: f32, owner_id: i64) -> InputRecord {
    let half = size * 0.5;
    InputRecord::new(
        Arc::new(plane(size)),
        Affine3A::from_translation(center - Vec3::new(half, 0.0, half)),
        owner_id,
    )
}

/// Coarse settings that keep test builds fast: 0.5 cells, tiles of 16 cells
pub fn test_params() -> BuildParameters {
    BuildParameters::default()
        .with_cell_size(0.5, 0.25)
        .with_agent(2.0, 0.5, 0.75)
        .with_tile_size(16)
        .with_region_sizes(4.0, 16.0)
        .with_detail_sampling(6.0, 1.0)
        .with_cache_limits(4, 32)
}
