//! Navmesh generation session
//!
//! [`NavMeshGenerator`] owns the input geometry, the navmesh built from it
//! and, with the cached strategy, the tile cache. It performs the joint build,
//! rebuilds single tiles or the tiles marked dirty by geometry edits, drives
//! obstacles, and saves or loads the result.

use std::ops::{Bound, Range, RangeBounds};
use std::path::Path;

use glam::{Affine3A, Vec3};

use detour::{NavMesh, NavMeshParams, QueryFilter};
use detour_tilecache::{MeshProcess, ObstacleRef, TileCache, WalkableFlags};
use recast_common::{calc_grid_size, Error, Result};

use crate::builder::{CachedTileBuilder, DirectTileBuilder, TileBuilder, TileInput};
use crate::config::BuildParameters;
use crate::dirty::DirtyTileSet;
use crate::input::{Aabb, GeometryBatch, InputRecord};
use crate::query::{NavigationQuery, PathResult};
use crate::serializer::{self, SavedNavMesh};

/// How tiles are built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum TileStrategy {
    /// Straight from triangles to polygons
    #[default]
    Direct,
    /// Through compressed heightfield layers, with obstacle support
    Cached,
}

/// State that exists once the navmesh has been allocated
#[derive(Debug)]
struct BuildState {
    nav_mesh: NavMesh,
    builder: Box<dyn TileBuilder>,
    /// Navmesh-space bounds; `min` is the corner of tile (0, 0)
    bounds: Aabb,
    tiles_x: i32,
    tiles_z: i32,
    dirty: DirtyTileSet,
}

/// Incremental tiled navmesh generation
#[derive(Debug)]
pub struct NavMeshGenerator {
    params: BuildParameters,
    strategy: TileStrategy,
    transform: Affine3A,
    inverse: Affine3A,
    batch: GeometryBatch,
    process: Box<dyn MeshProcess>,
    state: Option<BuildState>,
}

fn not_built() -> Error {
    Error::NavMeshGeneration("the navmesh has not been built".to_string())
}

fn no_tile_cache() -> Error {
    Error::TileCache("obstacles need a navmesh built with the cached tile strategy".to_string())
}

impl NavMeshGenerator {
    /// Creates a session with no geometry
    pub fn new(params: BuildParameters, strategy: TileStrategy) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            strategy,
            transform: Affine3A::IDENTITY,
            inverse: Affine3A::IDENTITY,
            batch: GeometryBatch::new(),
            process: Box::new(WalkableFlags),
            state: None,
        })
    }

    /// Places the navmesh in the world
    pub fn with_transform(mut self, transform: Affine3A) -> Self {
        self.transform = transform;
        self.inverse = transform.inverse();
        self
    }

    /// Replaces the hook applied to each tile's polygons before packing
    pub fn with_mesh_process(mut self, process: Box<dyn MeshProcess>) -> Self {
        self.process = process;
        self
    }

    pub fn params(&self) -> &BuildParameters {
        &self.params
    }

    pub fn strategy(&self) -> TileStrategy {
        self.strategy
    }

    pub fn transform(&self) -> &Affine3A {
        &self.transform
    }

    pub fn batch(&self) -> &GeometryBatch {
        &self.batch
    }

    pub fn nav_mesh(&self) -> Option<&NavMesh> {
        self.state.as_ref().map(|s| &s.nav_mesh)
    }

    pub fn tile_cache(&self) -> Option<&TileCache> {
        self.state.as_ref().and_then(|s| s.builder.tile_cache())
    }

    /// Number of tiles along X and Z once built
    pub fn tile_counts(&self) -> Option<(i32, i32)> {
        self.state.as_ref().map(|s| (s.tiles_x, s.tiles_z))
    }

    /// Tiles waiting for [`recalculate_tiles`](Self::recalculate_tiles)
    pub fn dirty_tiles(&self) -> Vec<(i32, i32)> {
        self.state.as_ref().map(|s| s.dirty.dirty_tiles()).unwrap_or_default()
    }

    /// Allocates the navmesh around all input geometry and builds every
    /// tile. Returns the number of tiles that built, empty tiles included.
    pub fn build(&mut self) -> Result<u32> {
        let bounds = self
            .batch
            .iter()
            .map(|r| r.world_aabb().transformed(&self.inverse))
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| Error::NavMeshGeneration("no input geometry".to_string()))?;
        // Room below the lowest floor and above the highest one
        let bounds = Aabb::new(
            bounds.min - Vec3::Y * self.params.cell_height,
            bounds.max + Vec3::Y * self.params.agent_height,
        );

        let (grid_w, grid_h) = calc_grid_size(bounds.min.to_array(), bounds.max.to_array(), self.params.cell_size);
        let ts = self.params.tile_size;
        let tiles_x = ((grid_w + ts - 1) / ts).max(1);
        let tiles_z = ((grid_h + ts - 1) / ts).max(1);
        let edge = self.params.tile_edge_length();

        // Cached tiles may stack several layers in one grid cell
        let stacked_z = match self.strategy {
            TileStrategy::Direct => tiles_z,
            TileStrategy::Cached => tiles_z * self.params.max_layers,
        };
        let nav_params = NavMeshParams::for_tile_grid(bounds.min.to_array(), edge, edge, tiles_x, stacked_z);
        let nav_mesh = NavMesh::new(nav_params)?;
        let builder: Box<dyn TileBuilder> = match self.strategy {
            TileStrategy::Direct => Box::new(DirectTileBuilder::new(&self.params)),
            TileStrategy::Cached => {
                let cache_params = self.params.tile_cache_params(bounds.min.to_array(), tiles_x * tiles_z);
                let cache = TileCache::new(cache_params, self.params.to_recast_config())?;
                Box::new(CachedTileBuilder::new(cache, self.params.max_layers as usize))
            }
        };

        log::info!(
            "building {}x{} tiles of {} cells ({:?})",
            tiles_x,
            tiles_z,
            ts,
            self.strategy
        );
        self.state = Some(BuildState {
            nav_mesh,
            builder,
            bounds,
            tiles_x,
            tiles_z,
            dirty: DirtyTileSet::new(tiles_x, tiles_z).with_border(tile_border(&self.params)),
        });

        let built = self.build_tiles(0, 0, tiles_x - 1, tiles_z - 1)?;
        log::info!("built {} of {} tiles", built, tiles_x * tiles_z);
        Ok(built)
    }

    /// Builds the inclusive tile rectangle (x1, z1)..=(x2, z2). Returns the
    /// number of tiles that built.
    pub fn build_tiles(&mut self, x1: i32, z1: i32, x2: i32, z2: i32) -> Result<u32> {
        if self.state.is_none() {
            return Err(not_built());
        }
        let mut built = 0;
        for z in z1..=z2 {
            for x in x1..=x2 {
                if self.build_tile(x, z) {
                    built += 1;
                }
            }
        }
        self.drain_tile_cache()?;
        Ok(built)
    }

    /// Rebuilds tile (x, z) from the input geometry.
    ///
    /// Returns true when the tile built or correctly came out empty, false
    /// when it failed. A failed tile is left out of the navmesh.
    pub fn build_tile(&mut self, x: i32, z: i32) -> bool {
        let Some(state) = self.state.as_mut() else {
            log::warn!("tile ({x}, {z}) requested before the navmesh was built");
            return false;
        };
        if x < 0 || z < 0 || x >= state.tiles_x || z >= state.tiles_z {
            log::warn!("tile ({x}, {z}) is outside the {}x{} grid", state.tiles_x, state.tiles_z);
            return false;
        }
        state.dirty.clear(x, z);

        match build_one_tile(&self.params, &self.inverse, &self.batch, state, &*self.process, x, z) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to build tile ({x}, {z}): {e}");
                state.builder.clear_tile(x, z, &mut state.nav_mesh);
                false
            }
        }
    }

    /// Rebuilds every dirty tile. Returns the number of tiles that built.
    pub fn recalculate_tiles(&mut self) -> Result<u32> {
        let dirty = self.state.as_ref().ok_or_else(not_built)?.dirty.dirty_tiles();
        if !dirty.is_empty() {
            log::debug!("recalculating {} dirty tiles", dirty.len());
        }
        let built = dirty.iter().filter(|&&(x, z)| self.build_tile(x, z)).count() as u32;
        self.drain_tile_cache()?;
        Ok(built)
    }

    /// Marks the tiles under the records at `range` of the batch dirty
    pub fn mark_dirty(&mut self, range: impl RangeBounds<usize>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        let len = self.batch.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e + 1,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .min(len);
        if start >= end {
            return;
        }
        state.dirty.mark_records(
            &self.batch.as_slice()[start..end],
            &self.inverse,
            state.bounds.min,
            self.params.tile_edge_length(),
        );
    }

    /// Appends geometry and marks the tiles it covers dirty. Returns the
    /// positions of the new records.
    pub fn add_geometry(&mut self, records: impl IntoIterator<Item = InputRecord>) -> Range<usize> {
        let range = self.batch.extend(records);
        self.mark_dirty(range.clone());
        range
    }

    /// Marks the tiles under every record of `owner_id` dirty, then removes
    /// the records. Returns how many were removed.
    pub fn remove_collision_shape(&mut self, owner_id: i64) -> usize {
        if let (Some(range), Some(state)) = (self.batch.owner_range(owner_id), self.state.as_mut()) {
            let owned = self.batch.as_slice()[range].iter().filter(|r| r.owner_id == owner_id);
            state
                .dirty
                .mark_records(owned, &self.inverse, state.bounds.min, self.params.tile_edge_length());
        }
        let before = self.batch.len();
        self.batch.remove_owner(owner_id);
        before - self.batch.len()
    }

    fn tile_cache_mut(&mut self) -> Result<&mut TileCache> {
        self.state
            .as_mut()
            .and_then(|s| s.builder.tile_cache_mut())
            .ok_or_else(no_tile_cache)
    }

    /// Queues a box obstacle at a world position. `yaw` is in navmesh space.
    pub fn add_box_obstacle(&mut self, pos: Vec3, half_extents: Vec3, yaw: f32) -> Result<ObstacleRef> {
        let local = self.inverse.transform_point3(pos);
        self.tile_cache_mut()?.add_box_obstacle(local, half_extents, yaw)
    }

    /// Queues a cylinder obstacle standing on a world position
    pub fn add_cylinder_obstacle(&mut self, pos: Vec3, radius: f32, height: f32) -> Result<ObstacleRef> {
        let local = self.inverse.transform_point3(pos);
        self.tile_cache_mut()?.add_cylinder_obstacle(local, radius, height)
    }

    pub fn remove_obstacle(&mut self, obstacle: ObstacleRef) -> Result<()> {
        self.tile_cache_mut()?.remove_obstacle(obstacle)
    }

    /// Applies queued obstacle changes. Returns true once everything is
    /// applied; call again on the next tick until it does.
    pub fn update(&mut self, dt: f32) -> Result<bool> {
        let state = self.state.as_mut().ok_or_else(no_tile_cache)?;
        let cache = state.builder.tile_cache_mut().ok_or_else(no_tile_cache)?;
        cache.update(dt, &mut state.nav_mesh, &*self.process)
    }

    fn drain_tile_cache(&mut self) -> Result<()> {
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        if let Some(cache) = state.builder.tile_cache_mut() {
            while !cache.update(0.0, &mut state.nav_mesh, &*self.process)? {}
        }
        Ok(())
    }

    /// A reusable query over the navmesh in world space
    pub fn query(&self) -> Result<NavigationQuery<'_>> {
        let nav_mesh = self.nav_mesh().ok_or_else(not_built)?;
        Ok(NavigationQuery::new(nav_mesh, self.transform))
    }

    /// Finds a world-space path. An empty result means there is no path.
    pub fn find_path(&self, start: Vec3, end: Vec3, extents: Vec3, filter: &QueryFilter) -> Result<PathResult> {
        self.query()?.find_path(start, end, extents, filter)
    }

    /// Serializes the navmesh, as a `TSET` with the cached strategy and an
    /// `MSET` otherwise
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let state = self.state.as_ref().ok_or_else(not_built)?;
        match state.builder.tile_cache() {
            Some(cache) => serializer::save_tile_cache(&state.nav_mesh, cache),
            None => serializer::save_nav_mesh(&state.nav_mesh),
        }
    }

    /// Restores a session from [`to_bytes`](Self::to_bytes) output. `params`
    /// supplies the settings used for later rebuilds; the input geometry
    /// starts out empty.
    pub fn from_bytes(params: BuildParameters, data: &[u8]) -> Result<Self> {
        let mut generator = Self::new(params, TileStrategy::Direct)?;
        let config = generator.params.to_recast_config();
        let saved = serializer::load(data, config, &*generator.process)?;

        let (nav_mesh, builder): (NavMesh, Box<dyn TileBuilder>) = match saved {
            SavedNavMesh::Plain(nav_mesh) => (nav_mesh, Box::new(DirectTileBuilder::new(&generator.params))),
            SavedNavMesh::Cached(nav_mesh, cache) => {
                generator.strategy = TileStrategy::Cached;
                let max_layers = generator.params.max_layers as usize;
                (nav_mesh, Box::new(CachedTileBuilder::new(cache, max_layers)))
            }
        };

        let origin = Vec3::from_array(nav_mesh.params().origin);
        let edge_x = nav_mesh.params().tile_width;
        let edge_z = nav_mesh.params().tile_height;
        let (mut tiles_x, mut tiles_z, mut top) = (1, 1, origin.y);
        for (_, tile) in nav_mesh.tiles() {
            tiles_x = tiles_x.max(tile.header.x + 1);
            tiles_z = tiles_z.max(tile.header.y + 1);
            top = top.max(tile.header.bmax[1]);
        }
        if let Some(cache) = builder.tile_cache() {
            for (_, tile) in cache.tiles() {
                tiles_x = tiles_x.max(tile.header.tx + 1);
                tiles_z = tiles_z.max(tile.header.ty + 1);
                top = top.max(tile.header.bmax[1]);
            }
        }

        let bounds = Aabb::new(
            origin,
            Vec3::new(origin.x + tiles_x as f32 * edge_x, top, origin.z + tiles_z as f32 * edge_z),
        );
        generator.state = Some(BuildState {
            nav_mesh,
            builder,
            bounds,
            tiles_x,
            tiles_z,
            dirty: DirtyTileSet::new(tiles_x, tiles_z).with_border(tile_border(&generator.params)),
        });
        Ok(generator)
    }

    /// Writes [`to_bytes`](Self::to_bytes) output to `path`
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), bytes)?;
        log::info!("saved navmesh to {}", path.as_ref().display());
        Ok(())
    }

    /// Reads a file written by [`save_to_file`](Self::save_to_file)
    pub fn load_from_file<P: AsRef<Path>>(params: BuildParameters, path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(params, &data)
    }
}

/// World-unit margin of geometry gathered around each tile
fn tile_border(params: &BuildParameters) -> f32 {
    params.border_size() as f32 * params.cell_size
}

/// Gathers the triangles of tile (x, z) and hands them to the tile builder
fn build_one_tile(
    params: &BuildParameters,
    to_local: &Affine3A,
    batch: &GeometryBatch,
    state: &mut BuildState,
    process: &dyn MeshProcess,
    x: i32,
    z: i32,
) -> Result<()> {
    let edge = params.tile_edge_length();
    let pad = tile_border(params);
    let origin = state.bounds.min;
    let tile_box = Aabb::new(
        Vec3::new(origin.x + x as f32 * edge - pad, state.bounds.min.y, origin.z + z as f32 * edge - pad),
        Vec3::new(
            origin.x + (x + 1) as f32 * edge + pad,
            state.bounds.max.y,
            origin.z + (z + 1) as f32 * edge + pad,
        ),
    );

    let mut verts = Vec::new();
    let mut tris = Vec::new();
    for record in batch {
        if !record.world_aabb().transformed(to_local).intersects_xz(&tile_box) {
            continue;
        }
        let to_tile = *to_local * record.transform;
        let base = (verts.len() / 3) as i32;
        for v in record.mesh.vertices.chunks_exact(3) {
            verts.extend_from_slice(&to_tile.transform_point3(Vec3::from_slice(v)).to_array());
        }
        tris.extend(record.mesh.indices.iter().map(|&i| i + base));
    }

    if tris.is_empty() {
        log::debug!("tile ({x}, {z}) has no geometry");
        state.builder.clear_tile(x, z, &mut state.nav_mesh);
        return Ok(());
    }

    let mut config = params.to_recast_config();
    config.bmin = tile_box.min;
    config.bmax = tile_box.max;

    let input = TileInput {
        x,
        z,
        config,
        verts: &verts,
        tris: &tris,
    };
    state.builder.build_tile(&input, &mut state.nav_mesh, process)
}
