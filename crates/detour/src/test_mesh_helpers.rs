//! Tile fixtures shared by the unit tests

use crate::binary_format::save_tile_to_binary;
use crate::nav_mesh::{MeshTile, Poly, PolyDetail, TileHeader};
use crate::{NavMeshParams, PolyFlags, DT_EXT_LINK};

/// Parameters for a row of `tiles` tiles of 10x10 units
pub fn grid_params(tiles: i32) -> NavMeshParams {
    NavMeshParams::for_tile_grid([0.0; 3], 10.0, 10.0, tiles, 1)
}

/// Blob of a tile at (x, y) holding one flat square polygon that covers the
/// whole tile, with portals on all four sides and a detail fan around a
/// centre vertex.
pub fn single_quad_tile_data(x: i32, y: i32, size: f32) -> Vec<u8> {
    let (x0, z0) = (x as f32 * size, y as f32 * size);
    let (x1, z1) = (x0 + size, z0 + size);

    let mut tile = MeshTile::new(TileHeader {
        x,
        y,
        layer: 0,
        user_id: 0,
        walkable_height: 2.0,
        walkable_radius: 0.6,
        walkable_climb: 0.9,
        bmin: [x0, 0.0, z0],
        bmax: [x1, 1.0, z1],
    });
    tile.verts = vec![x0, 0.0, z0, x0, 0.0, z1, x1, 0.0, z1, x1, 0.0, z0];

    let mut poly = Poly {
        flags: PolyFlags::WALK,
        area: 63,
        vert_count: 4,
        ..Default::default()
    };
    poly.verts[..4].copy_from_slice(&[0, 1, 2, 3]);
    // -x, +z, +x, -z
    poly.neis[..4].copy_from_slice(&[DT_EXT_LINK | 4, DT_EXT_LINK | 2, DT_EXT_LINK, DT_EXT_LINK | 6]);
    tile.polys.push(poly);

    tile.detail_meshes.push(PolyDetail {
        vert_base: 0,
        tri_base: 0,
        vert_count: 1,
        tri_count: 4,
    });
    tile.detail_verts = vec![(x0 + x1) * 0.5, 0.0, (z0 + z1) * 0.5];
    tile.detail_tris = vec![0, 1, 4, 0, 1, 2, 4, 0, 2, 3, 4, 0, 3, 0, 4, 0];

    save_tile_to_binary(&tile).expect("fixture tile serializes")
}
