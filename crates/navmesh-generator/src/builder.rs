//! Tile build strategies
//!
//! A [`TileBuilder`] turns the triangles gathered for one tile into navmesh
//! tiles. [`DirectTileBuilder`] runs the whole Recast pipeline down to the
//! polygon mesh. [`CachedTileBuilder`] stops at heightfield layers, stores
//! them in a [`TileCache`] and polygonizes from there so obstacles can be
//! applied later without re-voxelizing.

use std::fmt;

use detour::{NavMesh, NavMeshBuilder, NavMeshCreateParams};
use detour_tilecache::{MeshProcess, TileCache, TileCacheLayer};
use recast::{RecastBuilder, RecastConfig, RecastContext};
use recast_common::Result;

use crate::config::BuildParameters;

/// Geometry and settings of one tile
#[derive(Debug)]
pub struct TileInput<'a> {
    pub x: i32,
    pub z: i32,
    /// Voxel settings with the bounds of the tile, border included
    pub config: RecastConfig,
    /// Navmesh-space vertices `[x, y, z, ...]`
    pub verts: &'a [f32],
    /// Triangle indices into `verts`
    pub tris: &'a [i32],
}

/// Strategy used to build a tile from its triangles
pub trait TileBuilder: fmt::Debug {
    /// Builds tile (x, z) and puts it in `nav_mesh`, replacing what was
    /// there. A tile without polygons is left out of the navmesh.
    fn build_tile(&mut self, input: &TileInput<'_>, nav_mesh: &mut NavMesh, process: &dyn MeshProcess) -> Result<()>;

    /// Drops everything stored for (x, z)
    fn clear_tile(&mut self, x: i32, z: i32, nav_mesh: &mut NavMesh);

    /// The tile cache, for strategies that keep one
    fn tile_cache(&self) -> Option<&TileCache> {
        None
    }

    fn tile_cache_mut(&mut self) -> Option<&mut TileCache> {
        None
    }
}

/// Removes every layer of the navmesh at (x, z)
fn remove_nav_tiles_at(nav_mesh: &mut NavMesh, x: i32, z: i32) {
    let layers: Vec<i32> = nav_mesh.tiles_at(x, z).iter().map(|t| t.header.layer).collect();
    for layer in layers {
        nav_mesh.remove_tile_at(x, z, layer);
    }
}

/// Builds polygon tiles straight from the triangles
#[derive(Debug, Clone)]
pub struct DirectTileBuilder {
    agent_height: f32,
    agent_radius: f32,
    agent_max_climb: f32,
}

impl DirectTileBuilder {
    pub fn new(params: &BuildParameters) -> Self {
        Self {
            agent_height: params.agent_height,
            agent_radius: params.agent_radius,
            agent_max_climb: params.agent_max_climb,
        }
    }
}

impl TileBuilder for DirectTileBuilder {
    fn build_tile(&mut self, input: &TileInput<'_>, nav_mesh: &mut NavMesh, process: &dyn MeshProcess) -> Result<()> {
        let mut ctx = RecastContext::new();
        let meshes = RecastBuilder::new(input.config.clone()).build_mesh(&mut ctx, input.verts, input.tris)?;
        ctx.log_timings("tile build");

        remove_nav_tiles_at(nav_mesh, input.x, input.z);
        let Some((pmesh, dmesh)) = meshes else {
            log::debug!("tile ({}, {}) has no polygons", input.x, input.z);
            return Ok(());
        };

        let mut params = NavMeshCreateParams::from_meshes(&pmesh, &dmesh)
            .with_tile(input.x, input.z, 0)
            .with_agent(self.agent_height, self.agent_radius, self.agent_max_climb);
        process.process(&mut params);

        let data = NavMeshBuilder::create_nav_mesh_data(&params)?;
        nav_mesh.add_tile(data)?;
        Ok(())
    }

    fn clear_tile(&mut self, x: i32, z: i32, nav_mesh: &mut NavMesh) {
        remove_nav_tiles_at(nav_mesh, x, z);
    }
}

/// Builds tiles through compressed heightfield layers
#[derive(Debug)]
pub struct CachedTileBuilder {
    cache: TileCache,
    max_layers: usize,
}

impl CachedTileBuilder {
    pub fn new(cache: TileCache, max_layers: usize) -> Self {
        Self { cache, max_layers }
    }
}

impl TileBuilder for CachedTileBuilder {
    fn build_tile(&mut self, input: &TileInput<'_>, nav_mesh: &mut NavMesh, process: &dyn MeshProcess) -> Result<()> {
        let mut ctx = RecastContext::new();
        let builder = RecastBuilder::new(input.config.clone());
        let chf = builder.build_compact_heightfield(&mut ctx, input.verts, input.tris)?;
        let mut layers = builder.build_layers(&mut ctx, &chf)?;
        ctx.log_timings("tile layers");

        self.clear_tile(input.x, input.z, nav_mesh);
        if layers.len() > self.max_layers {
            log::warn!(
                "tile ({}, {}) has {} layers, keeping {}",
                input.x,
                input.z,
                layers.len(),
                self.max_layers
            );
            layers.truncate(self.max_layers);
        }

        for (i, layer) in layers.iter().enumerate() {
            let layer = TileCacheLayer::from_heightfield_layer(layer, input.x, input.z, i as i32)?;
            self.cache.add_layer(&layer)?;
        }
        self.cache.build_tiles_at(input.x, input.z, nav_mesh, process)?;
        Ok(())
    }

    fn clear_tile(&mut self, x: i32, z: i32, nav_mesh: &mut NavMesh) {
        self.cache.remove_tiles_at(x, z);
        remove_nav_tiles_at(nav_mesh, x, z);
    }

    fn tile_cache(&self) -> Option<&TileCache> {
        Some(&self.cache)
    }

    fn tile_cache_mut(&mut self) -> Option<&mut TileCache> {
        Some(&mut self.cache)
    }
}
