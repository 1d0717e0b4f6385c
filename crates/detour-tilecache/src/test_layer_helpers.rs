//! Layer fixtures shared by the unit tests

use glam::Vec3;
use recast::{RecastBuilder, RecastConfig, RecastContext};

use crate::tile_cache::TileCacheParams;
use crate::tile_cache_data::{TileCacheLayer, TileCacheLayerHeader};

/// Tiles of 16 cells of 0.5 units, agent 2.0 high with radius 0.5
pub fn test_params() -> TileCacheParams {
    TileCacheParams {
        origin: [0.0; 3],
        cs: 0.5,
        ch: 0.25,
        width: 16,
        height: 16,
        walkable_height: 2.0,
        walkable_radius: 0.5,
        walkable_climb: 0.75,
        max_simplification_error: 1.3,
        max_tiles: 64,
        max_obstacles: 16,
    }
}

/// Region and detail settings used with [`test_params`]
pub fn test_config() -> RecastConfig {
    RecastConfig {
        max_edge_len: 24,
        min_region_area: 4,
        merge_region_area: 16,
        detail_sample_dist: 3.0,
        detail_sample_max_error: 0.25,
        ..RecastConfig::default()
    }
}

/// Voxelizes a flat plane at y = 0 spanning `extent` units from the origin
/// and returns the layers of tile (tx, ty)
pub fn plane_layers(tx: i32, ty: i32, extent: f32) -> Vec<TileCacheLayer> {
    let params = test_params();
    let mut cfg = test_config();
    cfg.cs = params.cs;
    cfg.ch = params.ch;
    cfg.walkable_height = 8;
    cfg.walkable_climb = 3;
    cfg.walkable_radius = 1;
    cfg.tile_size = params.width;
    cfg.border_size = cfg.walkable_radius + 3;

    let tile_len = params.width as f32 * params.cs;
    let pad = cfg.border_size as f32 * params.cs;
    let bmin = Vec3::new(tx as f32 * tile_len - pad, -1.0, ty as f32 * tile_len - pad);
    let bmax = Vec3::new((tx + 1) as f32 * tile_len + pad, 2.0, (ty + 1) as f32 * tile_len + pad);
    cfg.bmin = bmin;
    cfg.bmax = bmax;
    cfg.width = params.width + cfg.border_size * 2;
    cfg.height = params.height + cfg.border_size * 2;

    let verts = vec![0.0, 0.0, 0.0, 0.0, 0.0, extent, extent, 0.0, extent, extent, 0.0, 0.0];
    let tris = vec![0, 1, 2, 0, 2, 3];

    let builder = RecastBuilder::new(cfg);
    let mut ctx = RecastContext::new();
    let chf = builder.build_compact_heightfield(&mut ctx, &verts, &tris).unwrap();
    builder
        .build_layers(&mut ctx, &chf)
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, layer)| TileCacheLayer::from_heightfield_layer(layer, tx, ty, i as i32).unwrap())
        .collect()
}

/// Hand-made walkable layer of `size` x `size` cells at unit cell size
pub fn flat_layer(tx: i32, ty: i32, size: u16) -> TileCacheLayer {
    let cells = size as usize * size as usize;
    TileCacheLayer {
        header: TileCacheLayerHeader {
            tx,
            ty,
            tlayer: 0,
            bmin: [0.0, 0.0, 0.0],
            bmax: [size as f32, 2.0, size as f32],
            hmin: 0,
            hmax: 0,
            width: size,
            height: size,
            minx: 0,
            maxx: size - 1,
            miny: 0,
            maxy: size - 1,
        },
        heights: vec![0; cells],
        areas: vec![63; cells],
        cons: vec![0xf; cells],
    }
}
