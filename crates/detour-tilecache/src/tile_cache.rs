//! Tile cache implementation for Detour
//!
//! The [`TileCache`] keeps compressed heightfield layers per tile and a set
//! of runtime obstacles. Obstacle requests are queued and applied by
//! [`TileCache::update`], which rebuilds the touched tiles from their layers
//! and swaps them into the [`NavMesh`].

use std::collections::{BTreeMap, VecDeque};
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;

use detour::{NavMesh, Status};
use recast::{RecastConfig, RecastContext};
use recast_common::{Error, Result};

use super::tile_cache_builder::{MeshProcess, ObstacleShape, TileCacheBuilder};
use super::tile_cache_data::{Lz4Compressor, TileCacheCompressor, TileCacheLayer, TileCacheLayerHeader};

/// Maximum number of pending obstacle requests
pub const MAX_REQUESTS: usize = 64;

/// Most layer slots a cache may hold: 2^14 tiles of 16 layers
pub const MAX_CACHE_TILES: i32 = 1 << 18;

/// Most obstacle slots a cache may hold
pub const MAX_OBSTACLES: i32 = 1 << 16;

/// Serialized size of [`TileCacheParams`]
pub const TILE_CACHE_PARAMS_SIZE: usize = 13 * 4;

/// Tile cache parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheParams {
    /// Origin of the tile grid
    pub origin: [f32; 3],
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Tile width in cells, border excluded
    pub width: i32,
    /// Tile depth in cells, border excluded
    pub height: i32,
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent max climb in world units
    pub walkable_climb: f32,
    /// Contour simplification error
    pub max_simplification_error: f32,
    /// Maximum number of cached layers
    pub max_tiles: i32,
    /// Maximum number of obstacles
    pub max_obstacles: i32,
}

impl TileCacheParams {
    /// Tile edge lengths in world units
    pub fn tile_size(&self) -> (f32, f32) {
        (self.width as f32 * self.cs, self.height as f32 * self.cs)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for v in self.origin {
            writer.write_f32::<LittleEndian>(v)?;
        }
        writer.write_f32::<LittleEndian>(self.cs)?;
        writer.write_f32::<LittleEndian>(self.ch)?;
        writer.write_i32::<LittleEndian>(self.width)?;
        writer.write_i32::<LittleEndian>(self.height)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        writer.write_f32::<LittleEndian>(self.max_simplification_error)?;
        writer.write_i32::<LittleEndian>(self.max_tiles)?;
        writer.write_i32::<LittleEndian>(self.max_obstacles)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut origin = [0.0; 3];
        for v in &mut origin {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        Ok(Self {
            origin,
            cs: reader.read_f32::<LittleEndian>()?,
            ch: reader.read_f32::<LittleEndian>()?,
            width: reader.read_i32::<LittleEndian>()?,
            height: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            max_simplification_error: reader.read_f32::<LittleEndian>()?,
            max_tiles: reader.read_i32::<LittleEndian>()?,
            max_obstacles: reader.read_i32::<LittleEndian>()?,
        })
    }

    fn validate(&self) -> Result<()> {
        let sizes = [self.cs, self.ch, self.walkable_height];
        if sizes.iter().any(|v| !v.is_finite() || *v <= 0.0) || self.origin.iter().any(|v| !v.is_finite()) {
            return Err(Error::TileCache(Status::InvalidParam.to_string()));
        }
        if self.width <= 0 || self.height <= 0 || self.max_tiles <= 0 || self.max_obstacles <= 0 {
            return Err(Error::TileCache(Status::InvalidParam.to_string()));
        }
        let max_width = i32::from(u16::MAX);
        if self.width > max_width
            || self.height > max_width
            || self.max_tiles > MAX_CACHE_TILES
            || self.max_obstacles > MAX_OBSTACLES
        {
            log::warn!(
                "tile cache limits out of range: {}x{} cells, {} layers, {} obstacles",
                self.width,
                self.height,
                self.max_tiles,
                self.max_obstacles
            );
            return Err(Error::TileCache(Status::OutOfMemory.to_string()));
        }
        Ok(())
    }
}

/// Reference to a compressed layer: salt above the slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CompressedTileRef(u32);

impl CompressedTileRef {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// Reference to an obstacle: salt above the slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObstacleRef(u32);

impl ObstacleRef {
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// A cached layer in its stored form
#[derive(Debug, Clone)]
pub struct CompressedTile {
    /// Header of the uncompressed layer
    pub header: TileCacheLayerHeader,
    /// Compressed layer blob
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct TileSlot {
    salt: u32,
    tile: Option<CompressedTile>,
}

/// Lifecycle of an obstacle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleState {
    /// Added, touched tiles not yet rebuilt
    Processing,
    /// All touched tiles rebuilt with the obstacle
    Processed,
    /// Removal requested, touched tiles not yet rebuilt
    Removing,
}

/// Obstacle tracked by the cache
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub shape: ObstacleShape,
    pub state: ObstacleState,
    /// Tiles the footprint overlaps
    touched: Vec<(i32, i32)>,
    /// Touched tiles still waiting for a rebuild
    pending: Vec<(i32, i32)>,
}

impl Obstacle {
    /// Tile coordinates the obstacle overlaps
    pub fn touched(&self) -> &[(i32, i32)] {
        &self.touched
    }
}

#[derive(Debug, Default)]
struct ObstacleSlot {
    salt: u32,
    obstacle: Option<Obstacle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy)]
struct ObstacleRequest {
    action: RequestAction,
    reference: ObstacleRef,
}

/// Compressed layer storage with runtime obstacles
#[derive(Debug)]
pub struct TileCache {
    params: TileCacheParams,
    builder: TileCacheBuilder,
    compressor: Box<dyn TileCacheCompressor>,
    tiles: Vec<TileSlot>,
    free_tiles: Vec<usize>,
    lookup: BTreeMap<(i32, i32, i32), usize>,
    tile_bits: u32,
    obstacles: Vec<ObstacleSlot>,
    free_obstacles: Vec<usize>,
    obstacle_bits: u32,
    requests: VecDeque<ObstacleRequest>,
    update_queue: VecDeque<(i32, i32)>,
    max_updates_per_call: usize,
}

fn bits_for(count: usize) -> u32 {
    count.next_power_of_two().trailing_zeros().max(1)
}

fn next_salt(salt: u32, salt_bits: u32) -> u32 {
    let mask = if salt_bits >= 32 { u32::MAX } else { (1u32 << salt_bits) - 1 };
    match salt.wrapping_add(1) & mask {
        0 => 1,
        s => s,
    }
}

impl TileCache {
    /// Creates an empty cache storing layers with LZ4
    pub fn new(params: TileCacheParams, config: RecastConfig) -> Result<Self> {
        Self::with_compressor(params, config, Box::new(Lz4Compressor))
    }

    /// Creates an empty cache storing layers with `compressor`
    pub fn with_compressor(
        params: TileCacheParams,
        config: RecastConfig,
        compressor: Box<dyn TileCacheCompressor>,
    ) -> Result<Self> {
        params.validate()?;
        let max_tiles = params.max_tiles as usize;
        let max_obstacles = params.max_obstacles as usize;

        let tiles = (0..max_tiles).map(|_| TileSlot { salt: 1, tile: None }).collect();
        let obstacles = (0..max_obstacles)
            .map(|_| ObstacleSlot {
                salt: 1,
                obstacle: None,
            })
            .collect();

        log::debug!(
            "tile cache: {} layer slots, {} obstacle slots, tiles of {}x{} cells",
            max_tiles,
            max_obstacles,
            params.width,
            params.height
        );

        Ok(Self {
            builder: TileCacheBuilder::new(&params, config),
            tile_bits: bits_for(max_tiles),
            obstacle_bits: bits_for(max_obstacles),
            params,
            compressor,
            tiles,
            free_tiles: (0..max_tiles).rev().collect(),
            lookup: BTreeMap::new(),
            obstacles,
            free_obstacles: (0..max_obstacles).rev().collect(),
            requests: VecDeque::with_capacity(MAX_REQUESTS),
            update_queue: VecDeque::new(),
            max_updates_per_call: 1,
        })
    }

    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    /// The builder rebuilding layers into tiles
    pub fn builder(&self) -> &TileCacheBuilder {
        &self.builder
    }

    /// Sets how many tiles one [`update`](Self::update) call rebuilds
    pub fn set_max_updates_per_call(&mut self, count: usize) {
        self.max_updates_per_call = count.max(1);
    }

    /// Number of stored layers
    pub fn tile_count(&self) -> usize {
        self.lookup.len()
    }

    fn encode_tile_ref(&self, salt: u32, idx: usize) -> CompressedTileRef {
        CompressedTileRef((salt << self.tile_bits) | idx as u32)
    }

    fn decode_tile_ref(&self, reference: CompressedTileRef) -> Option<usize> {
        let idx = (reference.0 & ((1 << self.tile_bits) - 1)) as usize;
        let salt = reference.0 >> self.tile_bits;
        let slot = self.tiles.get(idx)?;
        (slot.tile.is_some() && slot.salt == salt).then_some(idx)
    }

    /// Stores a compressed layer blob. The blob is decompressed once to read
    /// its header; a blob that does not parse is rejected.
    pub fn add_tile(&mut self, data: Vec<u8>) -> Result<CompressedTileRef> {
        let raw = self.compressor.decompress(&data)?;
        let layer = TileCacheLayer::from_bytes(&raw)?;
        self.insert(layer.header, data)
    }

    /// Compresses and stores `layer`
    pub fn add_layer(&mut self, layer: &TileCacheLayer) -> Result<CompressedTileRef> {
        let data = self.compressor.compress(&layer.to_bytes()?)?;
        self.insert(layer.header.clone(), data)
    }

    fn insert(&mut self, header: TileCacheLayerHeader, data: Vec<u8>) -> Result<CompressedTileRef> {
        let key = (header.tx, header.ty, header.tlayer);
        if self.lookup.contains_key(&key) {
            return Err(Error::TileCache(Status::AlreadyExists.to_string()));
        }
        let Some(idx) = self.free_tiles.pop() else {
            log::warn!("tile cache is full, dropping layer {:?}", key);
            return Err(Error::TileCache(Status::OutOfMemory.to_string()));
        };
        self.tiles[idx].tile = Some(CompressedTile { header, data });
        self.lookup.insert(key, idx);
        Ok(self.encode_tile_ref(self.tiles[idx].salt, idx))
    }

    /// Removes a layer, returning its compressed blob
    pub fn remove_tile(&mut self, reference: CompressedTileRef) -> Result<Vec<u8>> {
        let idx = self
            .decode_tile_ref(reference)
            .ok_or_else(|| Error::TileCache(Status::InvalidParam.to_string()))?;
        let salt_bits = 32 - self.tile_bits;
        let slot = &mut self.tiles[idx];
        let tile = slot.tile.take().ok_or_else(|| Error::TileCache(Status::InvalidParam.to_string()))?;
        slot.salt = next_salt(slot.salt, salt_bits);
        self.lookup.remove(&(tile.header.tx, tile.header.ty, tile.header.tlayer));
        self.free_tiles.push(idx);
        Ok(tile.data)
    }

    /// Removes every layer at (tx, ty). Returns how many were removed.
    pub fn remove_tiles_at(&mut self, tx: i32, ty: i32) -> usize {
        let refs = self.tiles_at(tx, ty);
        refs.into_iter().filter(|r| self.remove_tile(*r).is_ok()).count()
    }

    pub fn tile_by_ref(&self, reference: CompressedTileRef) -> Option<&CompressedTile> {
        self.decode_tile_ref(reference).and_then(|idx| self.tiles[idx].tile.as_ref())
    }

    pub fn tile_at(&self, tx: i32, ty: i32, tlayer: i32) -> Option<&CompressedTile> {
        self.lookup.get(&(tx, ty, tlayer)).and_then(|&idx| self.tiles[idx].tile.as_ref())
    }

    /// References of all layers at (tx, ty), lowest layer first
    pub fn tiles_at(&self, tx: i32, ty: i32) -> Vec<CompressedTileRef> {
        self.lookup
            .range((tx, ty, i32::MIN)..=(tx, ty, i32::MAX))
            .map(|(_, &idx)| self.encode_tile_ref(self.tiles[idx].salt, idx))
            .collect()
    }

    /// All stored layers in coordinate order
    pub fn tiles(&self) -> impl Iterator<Item = (CompressedTileRef, &CompressedTile)> + '_ {
        self.lookup.values().filter_map(move |&idx| {
            let slot = &self.tiles[idx];
            slot.tile.as_ref().map(|t| (self.encode_tile_ref(slot.salt, idx), t))
        })
    }

    /// Decompresses and parses a stored layer
    pub fn decode_layer(&self, reference: CompressedTileRef) -> Result<TileCacheLayer> {
        let tile = self
            .tile_by_ref(reference)
            .ok_or_else(|| Error::TileCache(Status::InvalidParam.to_string()))?;
        let raw = self.compressor.decompress(&tile.data)?;
        TileCacheLayer::from_bytes(&raw)
    }

    /// Queues a cylinder obstacle standing on `pos`
    pub fn add_cylinder_obstacle(&mut self, pos: Vec3, radius: f32, height: f32) -> Result<ObstacleRef> {
        self.add_obstacle(ObstacleShape::Cylinder { pos, radius, height })
    }

    /// Queues a box obstacle centred on `center` and rotated by `yaw` radians
    pub fn add_box_obstacle(&mut self, center: Vec3, half_extents: Vec3, yaw: f32) -> Result<ObstacleRef> {
        self.add_obstacle(ObstacleShape::Box {
            center,
            half_extents,
            yaw,
        })
    }

    /// Queues an obstacle. It takes effect on the next [`update`](Self::update).
    pub fn add_obstacle(&mut self, shape: ObstacleShape) -> Result<ObstacleRef> {
        if self.requests.len() >= MAX_REQUESTS {
            return Err(Error::TileCache(format!("{}: obstacle request queue full", Status::BufferTooSmall)));
        }
        let Some(idx) = self.free_obstacles.pop() else {
            return Err(Error::TileCache(Status::OutOfMemory.to_string()));
        };
        let slot = &mut self.obstacles[idx];
        slot.obstacle = Some(Obstacle {
            shape,
            state: ObstacleState::Processing,
            touched: Vec::new(),
            pending: Vec::new(),
        });
        let reference = ObstacleRef((slot.salt << self.obstacle_bits) | idx as u32);
        self.requests.push_back(ObstacleRequest {
            action: RequestAction::Add,
            reference,
        });
        Ok(reference)
    }

    /// Queues the removal of an obstacle
    pub fn remove_obstacle(&mut self, reference: ObstacleRef) -> Result<()> {
        if self.obstacle_index(reference).is_none() {
            return Err(Error::TileCache(Status::NotFound.to_string()));
        }
        if self.requests.len() >= MAX_REQUESTS {
            return Err(Error::TileCache(format!("{}: obstacle request queue full", Status::BufferTooSmall)));
        }
        self.requests.push_back(ObstacleRequest {
            action: RequestAction::Remove,
            reference,
        });
        Ok(())
    }

    fn obstacle_index(&self, reference: ObstacleRef) -> Option<usize> {
        let idx = (reference.0 & ((1 << self.obstacle_bits) - 1)) as usize;
        let salt = reference.0 >> self.obstacle_bits;
        let slot = self.obstacles.get(idx)?;
        (slot.obstacle.is_some() && slot.salt == salt).then_some(idx)
    }

    pub fn obstacle(&self, reference: ObstacleRef) -> Option<&Obstacle> {
        self.obstacle_index(reference).and_then(|idx| self.obstacles[idx].obstacle.as_ref())
    }

    /// Number of live obstacles, removals in flight included
    pub fn obstacle_count(&self) -> usize {
        self.obstacles.iter().filter(|s| s.obstacle.is_some()).count()
    }

    /// Whether no request or tile rebuild is pending
    pub fn is_up_to_date(&self) -> bool {
        self.requests.is_empty() && self.update_queue.is_empty()
    }

    /// Tiles with a layer overlapping the given world bounds on XZ
    fn query_tiles(&self, bmin: Vec3, bmax: Vec3) -> Vec<(i32, i32)> {
        let (tw, th) = self.params.tile_size();
        let origin = Vec3::from_array(self.params.origin);
        // Layers carry a border, so neighbours can overlap too
        let tx0 = ((bmin.x - origin.x) / tw).floor() as i32 - 1;
        let tx1 = ((bmax.x - origin.x) / tw).floor() as i32 + 1;
        let ty0 = ((bmin.z - origin.z) / th).floor() as i32 - 1;
        let ty1 = ((bmax.z - origin.z) / th).floor() as i32 + 1;

        let mut result = Vec::new();
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let overlaps = self
                    .lookup
                    .range((tx, ty, i32::MIN)..=(tx, ty, i32::MAX))
                    .filter_map(|(_, &idx)| self.tiles[idx].tile.as_ref())
                    .any(|t| {
                        let h = &t.header;
                        bmin.x <= h.bmax[0] && bmax.x >= h.bmin[0] && bmin.z <= h.bmax[2] && bmax.z >= h.bmin[2]
                    });
                if overlaps {
                    result.push((tx, ty));
                }
            }
        }
        result
    }

    fn queue_update(&mut self, tile: (i32, i32)) {
        if !self.update_queue.contains(&tile) {
            self.update_queue.push_back(tile);
        }
    }

    /// Applies queued obstacle requests and rebuilds up to
    /// `max_updates_per_call` tiles into `nav_mesh`.
    ///
    /// Returns true once nothing is left to do. Callers keep calling until
    /// it does before treating the mesh as consistent.
    pub fn update(&mut self, _dt: f32, nav_mesh: &mut NavMesh, process: &dyn MeshProcess) -> Result<bool> {
        while let Some(request) = self.requests.pop_front() {
            let Some(idx) = self.obstacle_index(request.reference) else {
                continue;
            };
            let touched = match request.action {
                RequestAction::Add => {
                    let Some(ob) = self.obstacles[idx].obstacle.as_ref() else {
                        continue;
                    };
                    let (bmin, bmax) = ob.shape.bounds();
                    self.query_tiles(bmin, bmax)
                }
                RequestAction::Remove => match self.obstacles[idx].obstacle.as_ref() {
                    Some(ob) => ob.touched.clone(),
                    None => continue,
                },
            };
            for &tile in &touched {
                self.queue_update(tile);
            }
            if let Some(ob) = self.obstacles[idx].obstacle.as_mut() {
                if request.action == RequestAction::Remove {
                    ob.state = ObstacleState::Removing;
                }
                ob.pending = touched.clone();
                ob.touched = touched;
            }
        }

        let mut rebuilt = Vec::new();
        while rebuilt.len() < self.max_updates_per_call {
            let Some((tx, ty)) = self.update_queue.pop_front() else {
                break;
            };
            self.build_tiles_at(tx, ty, nav_mesh, process)?;
            rebuilt.push((tx, ty));
        }

        let obstacle_salt_bits = 32 - self.obstacle_bits;
        for (idx, slot) in self.obstacles.iter_mut().enumerate() {
            let Some(ob) = slot.obstacle.as_mut() else {
                continue;
            };
            if ob.state == ObstacleState::Processed {
                continue;
            }
            ob.pending.retain(|t| !rebuilt.contains(t));
            if !ob.pending.is_empty() {
                continue;
            }
            match ob.state {
                ObstacleState::Processing => ob.state = ObstacleState::Processed,
                ObstacleState::Removing => {
                    slot.obstacle = None;
                    slot.salt = next_salt(slot.salt, obstacle_salt_bits);
                    self.free_obstacles.push(idx);
                }
                ObstacleState::Processed => {}
            }
        }

        Ok(self.is_up_to_date())
    }

    /// Shapes of the obstacles in effect for tile (tx, ty)
    fn active_obstacles(&self, tx: i32, ty: i32) -> Vec<ObstacleShape> {
        self.obstacles
            .iter()
            .filter_map(|s| s.obstacle.as_ref())
            .filter(|ob| ob.state != ObstacleState::Removing && ob.touched.contains(&(tx, ty)))
            .map(|ob| ob.shape)
            .collect()
    }

    /// Rebuilds every layer at (tx, ty) into `nav_mesh`. Returns the number
    /// of layers rebuilt, empty results included.
    pub fn build_tiles_at(
        &self,
        tx: i32,
        ty: i32,
        nav_mesh: &mut NavMesh,
        process: &dyn MeshProcess,
    ) -> Result<usize> {
        let built = self
            .tiles_at(tx, ty)
            .into_iter()
            .filter(|&reference| self.build_layer(reference, nav_mesh, process))
            .count();
        Ok(built)
    }

    /// Polygonizes one stored layer into `nav_mesh`, replacing the tile at
    /// its coordinate.
    ///
    /// A layer that fails to decode or build is logged and its navmesh tile
    /// removed; other layers are unaffected. Returns false in that case.
    pub fn build_layer(&self, reference: CompressedTileRef, nav_mesh: &mut NavMesh, process: &dyn MeshProcess) -> bool {
        let Some(tile) = self.tile_by_ref(reference) else {
            return false;
        };
        let (tx, ty, tlayer) = (tile.header.tx, tile.header.ty, tile.header.tlayer);
        let obstacles = self.active_obstacles(tx, ty);

        let mut ctx = RecastContext::new();
        let result = self
            .decode_layer(reference)
            .and_then(|layer| self.builder.build_tile_from_layer(&mut ctx, &layer, &obstacles, process));
        ctx.log_timings("tile cache rebuild");

        match result {
            Ok(Some(data)) => match nav_mesh.replace_tile(data) {
                Ok(_) => true,
                Err(e) => {
                    log::warn!("tile ({tx}, {ty}, {tlayer}) rejected by the navmesh: {e}");
                    nav_mesh.remove_tile_at(tx, ty, tlayer);
                    false
                }
            },
            Ok(None) => {
                log::debug!("tile ({tx}, {ty}, {tlayer}) is empty");
                nav_mesh.remove_tile_at(tx, ty, tlayer);
                true
            }
            Err(e) => {
                log::warn!("failed to rebuild layer ({tx}, {ty}, {tlayer}): {e}");
                nav_mesh.remove_tile_at(tx, ty, tlayer);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_layer_helpers::{flat_layer, plane_layers, test_config, test_params};
    use crate::WalkableFlags;
    use detour::NavMeshParams;

    fn nav_mesh_for(params: &TileCacheParams, tiles: i32) -> NavMesh {
        let (tw, th) = params.tile_size();
        NavMesh::new(NavMeshParams::for_tile_grid(params.origin, tw, th, tiles, tiles)).unwrap()
    }

    fn drain(cache: &mut TileCache, nav_mesh: &mut NavMesh) -> usize {
        let mut calls = 1;
        while !cache.update(0.1, nav_mesh, &WalkableFlags).unwrap() {
            calls += 1;
            assert!(calls < 100, "update never drained");
        }
        calls
    }

    fn tile_polys(nav_mesh: &NavMesh, x: i32, y: i32) -> Vec<(Vec<f32>, u8)> {
        let tile = nav_mesh.tile_at(x, y, 0).expect("tile present");
        tile.polys.iter().map(|p| (tile.poly_verts(p), p.area)).collect()
    }

    #[test]
    fn test_params_round_trip() {
        let params = test_params();
        let mut bytes = Vec::new();
        params.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), TILE_CACHE_PARAMS_SIZE);
        let back = TileCacheParams::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, params);
        assert!(TileCacheParams::read_from(&mut &bytes[..20]).is_err());
    }

    #[test]
    fn test_invalid_params() {
        let mut params = test_params();
        params.cs = 0.0;
        assert!(TileCache::new(params, test_config()).is_err());
        let mut params = test_params();
        params.max_obstacles = 0;
        assert!(TileCache::new(params, test_config()).is_err());
    }

    #[test]
    fn test_oversized_limits_rejected() {
        let mut params = test_params();
        params.max_tiles = i32::MAX;
        assert!(matches!(TileCache::new(params, test_config()), Err(Error::TileCache(_))));

        let mut params = test_params();
        params.max_tiles = MAX_CACHE_TILES + 1;
        assert!(TileCache::new(params, test_config()).is_err());

        let mut params = test_params();
        params.max_obstacles = MAX_OBSTACLES + 1;
        assert!(TileCache::new(params, test_config()).is_err());

        let mut params = test_params();
        params.width = 1 << 20;
        assert!(TileCache::new(params, test_config()).is_err());

        let mut params = test_params();
        params.max_obstacles = MAX_OBSTACLES;
        assert!(TileCache::new(params, test_config()).is_ok());
    }

    #[test]
    fn test_add_and_remove_layers() {
        let mut cache = TileCache::new(test_params(), test_config()).unwrap();
        let a = cache.add_layer(&flat_layer(0, 0, 8)).unwrap();
        let mut upper = flat_layer(0, 0, 8);
        upper.header.tlayer = 1;
        let b = cache.add_layer(&upper).unwrap();
        cache.add_layer(&flat_layer(1, 0, 8)).unwrap();

        assert_eq!(cache.tile_count(), 3);
        assert_eq!(cache.tiles_at(0, 0), vec![a, b]);
        assert!(cache.add_layer(&flat_layer(0, 0, 8)).is_err());

        let data = cache.remove_tile(a).unwrap();
        assert!(cache.tile_by_ref(a).is_none());
        // Stale reference after removal
        assert!(cache.remove_tile(a).is_err());

        // Re-adding the raw blob yields a new reference
        let again = cache.add_tile(data).unwrap();
        assert_ne!(again, a);
        assert_eq!(cache.tile_at(0, 0, 0).map(|t| t.header.tx), Some(0));
        assert_eq!(cache.remove_tiles_at(0, 0), 2);
        assert_eq!(cache.tile_count(), 1);
    }

    #[test]
    fn test_add_tile_rejects_garbage() {
        let mut cache = TileCache::new(test_params(), test_config()).unwrap();
        assert!(cache.add_tile(vec![1, 2, 3, 4, 5]).is_err());
        let compressed = lz4_flex::compress_prepend_size(b"not a layer");
        assert!(cache.add_tile(compressed).is_err());
        assert_eq!(cache.tile_count(), 0);
    }

    #[test]
    fn test_cache_capacity() {
        let mut params = test_params();
        params.max_tiles = 2;
        let mut cache = TileCache::new(params, test_config()).unwrap();
        cache.add_layer(&flat_layer(0, 0, 4)).unwrap();
        cache.add_layer(&flat_layer(1, 0, 4)).unwrap();
        let err = cache.add_layer(&flat_layer(2, 0, 4)).unwrap_err();
        assert!(err.to_string().contains("memory"));
    }

    #[test]
    fn test_request_queue_is_bounded() {
        let mut params = test_params();
        params.max_obstacles = 128;
        let mut cache = TileCache::new(params, test_config()).unwrap();
        for _ in 0..MAX_REQUESTS {
            cache.add_cylinder_obstacle(Vec3::ZERO, 1.0, 1.0).unwrap();
        }
        assert!(cache.add_cylinder_obstacle(Vec3::ZERO, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_remove_unknown_obstacle() {
        let mut cache = TileCache::new(test_params(), test_config()).unwrap();
        assert!(cache.remove_obstacle(ObstacleRef::default()).is_err());
    }

    #[test]
    fn test_obstacle_round_trip_restores_tile() {
        let params = test_params();
        let mut cache = TileCache::new(params.clone(), test_config()).unwrap();
        let mut nav_mesh = nav_mesh_for(&params, 4);
        for layer in plane_layers(0, 0, 16.0) {
            cache.add_layer(&layer).unwrap();
        }
        for layer in plane_layers(1, 0, 16.0) {
            cache.add_layer(&layer).unwrap();
        }
        for tx in 0..2 {
            assert_eq!(cache.build_tiles_at(tx, 0, &mut nav_mesh, &WalkableFlags).unwrap(), 1);
        }
        let before = tile_polys(&nav_mesh, 0, 0);
        assert!(cache.is_up_to_date());

        let id = cache
            .add_box_obstacle(Vec3::new(4.0, 0.0, 4.0), Vec3::new(1.0, 1.0, 1.0), 0.0)
            .unwrap();
        assert_eq!(cache.obstacle(id).map(|o| o.state), Some(ObstacleState::Processing));
        drain(&mut cache, &mut nav_mesh);
        assert_eq!(cache.obstacle(id).map(|o| o.state), Some(ObstacleState::Processed));
        assert!(cache.obstacle(id).unwrap().touched().contains(&(0, 0)));
        let blocked = tile_polys(&nav_mesh, 0, 0);
        assert_ne!(blocked, before);

        cache.remove_obstacle(id).unwrap();
        drain(&mut cache, &mut nav_mesh);
        assert!(cache.obstacle(id).is_none());
        assert_eq!(cache.obstacle_count(), 0);
        assert_eq!(tile_polys(&nav_mesh, 0, 0), before);
        assert!(nav_mesh.tile_at(1, 0, 0).is_some());
    }

    #[test]
    fn test_update_is_bounded_per_call() {
        let params = test_params();
        let mut cache = TileCache::new(params.clone(), test_config()).unwrap();
        let mut nav_mesh = nav_mesh_for(&params, 4);
        for tx in 0..2 {
            for layer in plane_layers(tx, 0, 16.0) {
                cache.add_layer(&layer).unwrap();
            }
        }
        // On the shared edge, so both tiles are touched
        cache.add_cylinder_obstacle(Vec3::new(8.0, -0.5, 4.0), 1.0, 2.0).unwrap();
        assert!(!cache.update(0.1, &mut nav_mesh, &WalkableFlags).unwrap());
        assert!(cache.update(0.1, &mut nav_mesh, &WalkableFlags).unwrap());
        assert_eq!(nav_mesh.tile_count(), 2);

        cache.set_max_updates_per_call(8);
        cache.add_cylinder_obstacle(Vec3::new(8.0, -0.5, 4.0), 0.5, 2.0).unwrap();
        assert!(cache.update(0.1, &mut nav_mesh, &WalkableFlags).unwrap());
    }

    #[test]
    fn test_corrupt_layer_drops_only_that_tile() {
        let params = test_params();
        let mut cache = TileCache::new(params.clone(), test_config()).unwrap();
        let mut nav_mesh = nav_mesh_for(&params, 4);
        for tx in 0..2 {
            for layer in plane_layers(tx, 0, 16.0) {
                cache.add_layer(&layer).unwrap();
            }
            cache.build_tiles_at(tx, 0, &mut nav_mesh, &WalkableFlags).unwrap();
        }
        assert_eq!(nav_mesh.tile_count(), 2);

        let reference = cache.tiles_at(0, 0)[0];
        let idx = cache.decode_tile_ref(reference).unwrap();
        if let Some(tile) = cache.tiles[idx].tile.as_mut() {
            tile.data.truncate(8);
        }
        assert_eq!(cache.build_tiles_at(0, 0, &mut nav_mesh, &WalkableFlags).unwrap(), 0);
        assert!(nav_mesh.tile_at(0, 0, 0).is_none());
        assert!(nav_mesh.tile_at(1, 0, 0).is_some());
    }
}
