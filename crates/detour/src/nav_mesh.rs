//! Navigation mesh implementation for Detour
//!
//! The navigation mesh is a fixed-size table of tile slots. Each tile holds
//! its polygons, vertices and detail triangles; links between polygons, both
//! inside a tile and across tile borders, are rebuilt whenever a tile or one
//! of its neighbours changes.
//!
//! A [`PolyRef`] packs a slot salt, the slot index and the polygon index. The
//! salt is bumped every time a slot is freed so references into a removed
//! tile stop resolving.

use std::collections::BTreeMap;

use super::binary_format::load_tile_from_binary;
use super::detour_common::{
    dt_calc_slab_end_points, dt_get_slab_coord, dt_opposite_tile, dt_overlap_slabs, dt_point_in_polygon,
    dt_side_offset, dt_vcopy, dt_vdist_sqr, dt_vlerp,
};
use super::{NavMeshParams, PolyFlags, PolyRef, QueryFilter, Status, DT_EXT_LINK, DT_MAX_TILE_BITS, DT_MIN_SALT_BITS, DT_TILE_POLY_BITS, MAX_VERTS_PER_POLY};
use recast_common::{closest_height_point_triangle, dist_point_segment_sqr_2d, Error, Result};

/// Link side value of a link inside one tile
const DT_INTERNAL_SIDE: u8 = 0xff;

/// Link between two polygons
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    /// Reference to the connected polygon
    pub reference: PolyRef,
    /// Index of the next link of the same polygon
    pub next: Option<u32>,
    /// Edge of the owning polygon the link crosses
    pub edge: u8,
    /// Tile side of an external link, `0xff` for internal links
    pub side: u8,
    /// Start of the shared portal along the edge, 0..=255
    pub bmin: u8,
    /// End of the shared portal along the edge, 0..=255
    pub bmax: u8,
}

impl Link {
    /// Whether the link leaves the tile
    pub fn is_external(&self) -> bool {
        self.side != DT_INTERNAL_SIDE
    }
}

/// Polygon in the navigation mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Poly {
    /// First link index
    pub first_link: Option<u32>,
    /// Indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per edge: 0 for no neighbour, `index + 1` for a polygon of the same
    /// tile, or `DT_EXT_LINK | side` for a tile border edge
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Flags for the polygon
    pub flags: PolyFlags,
    /// Number of vertices in the polygon
    pub vert_count: u8,
    /// Area ID of the polygon
    pub area: u8,
}

impl Poly {
    /// The used vertex indices
    pub fn vert_indices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// Detail sub-mesh of one polygon
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolyDetail {
    /// First detail vertex; the polygon vertices are not repeated
    pub vert_base: u32,
    /// First detail triangle
    pub tri_base: u32,
    /// Number of detail vertices
    pub vert_count: u8,
    /// Number of detail triangles
    pub tri_count: u8,
}

/// Tile header information
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileHeader {
    /// Tile grid x
    pub x: i32,
    /// Tile grid z
    pub y: i32,
    /// Layer at this grid cell
    pub layer: i32,
    /// User defined data
    pub user_id: u32,
    /// Agent height the tile was built for
    pub walkable_height: f32,
    /// Agent radius the tile was built for
    pub walkable_radius: f32,
    /// Agent climb the tile was built for
    pub walkable_climb: f32,
    /// Bounds of the tile
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
}

/// Mesh tile in the navigation mesh
#[derive(Debug, Clone, Default)]
pub struct MeshTile {
    /// Salt of the slot holding the tile
    pub salt: u32,
    /// Tile header
    pub header: TileHeader,
    /// Polygons in the tile
    pub polys: Vec<Poly>,
    /// Vertices in the tile [x,y,z,...]
    pub verts: Vec<f32>,
    /// Links between polygons
    pub links: Vec<Link>,
    /// Detail sub-mesh per polygon
    pub detail_meshes: Vec<PolyDetail>,
    /// Detail vertices [x,y,z,...]
    pub detail_verts: Vec<f32>,
    /// Detail triangles, `[a, b, c, flags]` each
    pub detail_tris: Vec<u8>,
    /// The blob the tile was created from
    pub data: Vec<u8>,
}

impl MeshTile {
    /// Creates an empty tile
    pub fn new(header: TileHeader) -> Self {
        Self {
            header,
            ..Default::default()
        }
    }

    /// Vertex `i` as a slice
    #[inline]
    pub fn vert(&self, i: u16) -> &[f32] {
        let i = i as usize * 3;
        &self.verts[i..i + 3]
    }

    /// Vertices of a polygon gathered into a flat buffer
    pub fn poly_verts(&self, poly: &Poly) -> Vec<f32> {
        poly.vert_indices().iter().flat_map(|&v| self.vert(v).iter().copied()).collect()
    }

    /// Iterates over the links of a polygon
    pub fn poly_links<'a>(&'a self, poly: &Poly) -> impl Iterator<Item = &'a Link> + 'a {
        let mut next = poly.first_link;
        std::iter::from_fn(move || {
            let link = self.links.get(next? as usize)?;
            next = link.next;
            Some(link)
        })
    }

    /// Vertex of a detail triangle corner: polygon vertices first, then the
    /// detail vertices of that polygon.
    fn detail_vert(&self, poly: &Poly, detail: &PolyDetail, corner: u8) -> [f32; 3] {
        let nv = poly.vert_count;
        if corner < nv {
            dt_vcopy(self.vert(poly.verts[corner as usize]))
        } else {
            let i = (detail.vert_base as usize + (corner - nv) as usize) * 3;
            dt_vcopy(&self.detail_verts[i..i + 3])
        }
    }

    /// Height of the detail surface of polygon `poly_idx` at `pos`, when `pos`
    /// lies over the polygon.
    pub fn poly_height(&self, poly_idx: usize, pos: &[f32; 3]) -> Option<f32> {
        let poly = self.polys.get(poly_idx)?;
        let verts = self.poly_verts(poly);
        let nv = poly.vert_count as usize;
        if !dt_point_in_polygon(pos, &verts, nv) {
            return None;
        }

        match self.detail_meshes.get(poly_idx) {
            Some(detail) => {
                let start = detail.tri_base as usize * 4;
                let end = start + detail.tri_count as usize * 4;
                for t in self.detail_tris[start..end].chunks_exact(4) {
                    let a = self.detail_vert(poly, detail, t[0]);
                    let b = self.detail_vert(poly, detail, t[1]);
                    let c = self.detail_vert(poly, detail, t[2]);
                    if let Some(h) = closest_height_point_triangle(pos, &a, &b, &c) {
                        return Some(h);
                    }
                }
            }
            None => {
                for k in 2..nv {
                    let h = closest_height_point_triangle(pos, &verts[0..3], &verts[(k - 1) * 3..k * 3], &verts[k * 3..k * 3 + 3]);
                    if h.is_some() {
                        return h;
                    }
                }
            }
        }

        // On an edge, between detail triangles
        Some(self.closest_point_on_poly_boundary(poly, pos)[1])
    }

    /// Closest point on the outline of a polygon to `pos`
    pub fn closest_point_on_poly_boundary(&self, poly: &Poly, pos: &[f32; 3]) -> [f32; 3] {
        let nv = poly.vert_count as usize;
        let mut best = [0.0; 3];
        let mut best_d = f32::MAX;
        for j in 0..nv {
            let va = self.vert(poly.verts[j]);
            let vb = self.vert(poly.verts[(j + 1) % nv]);
            let (d, t) = dist_point_segment_sqr_2d(pos, va, vb);
            if d < best_d {
                best_d = d;
                best = dt_vlerp(va, vb, t);
            }
        }
        best
    }

    /// Bounds of a polygon, detail vertices included
    pub fn poly_bounds(&self, poly_idx: usize) -> ([f32; 3], [f32; 3]) {
        let mut bmin = [f32::MAX; 3];
        let mut bmax = [f32::MIN; 3];
        let mut grow = |v: &[f32]| {
            for k in 0..3 {
                bmin[k] = bmin[k].min(v[k]);
                bmax[k] = bmax[k].max(v[k]);
            }
        };
        let poly = &self.polys[poly_idx];
        for &v in poly.vert_indices() {
            grow(self.vert(v));
        }
        if let Some(detail) = self.detail_meshes.get(poly_idx) {
            let start = detail.vert_base as usize * 3;
            let end = start + detail.vert_count as usize * 3;
            for v in self.detail_verts[start..end].chunks_exact(3) {
                grow(v);
            }
        }
        (bmin, bmax)
    }
}

#[derive(Debug, Default)]
struct TileSlot {
    salt: u32,
    tile: Option<MeshTile>,
}

/// Navigation mesh structure
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    tile_bits: u32,
    poly_bits: u32,
    salt_bits: u32,
    slots: Vec<TileSlot>,
    /// Free slot indices, popped from the back
    free: Vec<usize>,
    /// (x, y, layer) to slot index
    pos_lookup: BTreeMap<(i32, i32, i32), usize>,
}

impl NavMesh {
    /// Creates a new navigation mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if params.origin.iter().any(|v| !v.is_finite()) {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.tile_width.is_nan() || params.tile_width <= 0.0 || params.tile_height.is_nan() || params.tile_height <= 0.0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.max_tiles <= 0 || params.max_polys_per_tile <= 0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let tile_bits = recast_common::ilog2(recast_common::next_pow2(params.max_tiles as u32));
        let poly_bits = recast_common::ilog2(recast_common::next_pow2(params.max_polys_per_tile as u32));
        if tile_bits > DT_MAX_TILE_BITS || tile_bits + poly_bits > DT_TILE_POLY_BITS {
            log::warn!(
                "navmesh reference budget exceeded: {tile_bits} tile bits + {poly_bits} poly bits, \
                 at most {DT_MAX_TILE_BITS} + {} allowed",
                DT_TILE_POLY_BITS - tile_bits.min(DT_MAX_TILE_BITS)
            );
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        let salt_bits = 32 - tile_bits - poly_bits;
        if salt_bits < DT_MIN_SALT_BITS {
            log::warn!(
                "navmesh reference budget exceeded: {tile_bits} tile bits + {poly_bits} poly bits leaves {salt_bits} salt bits"
            );
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }

        let max_tiles = params.max_tiles as usize;
        let slots = (0..max_tiles).map(|_| TileSlot { salt: 1, tile: None }).collect();
        let free = (0..max_tiles).rev().collect();

        log::debug!(
            "navmesh allocated: {max_tiles} tiles, {} polys per tile, {salt_bits} salt bits",
            params.max_polys_per_tile
        );

        Ok(Self {
            params,
            tile_bits,
            poly_bits,
            salt_bits,
            slots,
            free,
            pos_lookup: BTreeMap::new(),
        })
    }

    /// Navigation mesh parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> usize {
        self.slots.len()
    }

    /// Bits of a reference used by the tile index, the polygon index and the salt
    pub fn reference_bits(&self) -> (u32, u32, u32) {
        (self.tile_bits, self.poly_bits, self.salt_bits)
    }

    /// Number of tiles currently stored
    pub fn tile_count(&self) -> usize {
        self.pos_lookup.len()
    }

    /// Packs a polygon reference
    #[inline]
    pub fn encode_poly_ref(&self, salt: u32, tile_idx: u32, poly_idx: u32) -> PolyRef {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_mask = (1u32 << self.poly_bits) - 1;
        PolyRef::new(
            ((salt & salt_mask) << (self.poly_bits + self.tile_bits))
                | ((tile_idx & tile_mask) << self.poly_bits)
                | (poly_idx & poly_mask),
        )
    }

    /// Unpacks a polygon reference into (salt, tile index, polygon index)
    #[inline]
    pub fn decode_poly_ref(&self, reference: PolyRef) -> (u32, u32, u32) {
        let id = reference.id();
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_mask = (1u32 << self.poly_bits) - 1;
        (
            (id >> (self.poly_bits + self.tile_bits)) & salt_mask,
            (id >> self.poly_bits) & tile_mask,
            id & poly_mask,
        )
    }

    /// Tile grid cell containing a world position
    pub fn calc_tile_loc(&self, pos: &[f32; 3]) -> (i32, i32) {
        let tx = ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32;
        let ty = ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Adds a tile from its blob and links it to its neighbours.
    ///
    /// Fails when a tile already occupies the same (x, y, layer) or when all
    /// slots are in use. On failure the navmesh is unchanged.
    pub fn add_tile(&mut self, data: Vec<u8>) -> Result<PolyRef> {
        let tile = load_tile_from_binary(&data)?;
        let h = &tile.header;
        let key = (h.x, h.y, h.layer);
        if self.pos_lookup.contains_key(&key) {
            return Err(Error::Detour(Status::AlreadyExists.to_string()));
        }
        if tile.polys.len() > self.params.max_polys_per_tile as usize {
            log::warn!(
                "tile ({}, {}, {}) has {} polygons, limit is {}",
                h.x,
                h.y,
                h.layer,
                tile.polys.len(),
                self.params.max_polys_per_tile
            );
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        let idx = self.free.pop().ok_or(Error::Detour(Status::OutOfMemory.to_string()))?;
        Ok(self.insert_tile(idx, tile, data))
    }

    /// Adds a tile, first removing any tile at the same coordinate.
    ///
    /// The new blob is validated before the old tile is dropped, so a bad
    /// blob leaves the previous tile in place.
    pub fn replace_tile(&mut self, data: Vec<u8>) -> Result<(PolyRef, Option<Vec<u8>>)> {
        let tile = load_tile_from_binary(&data)?;
        if tile.polys.len() > self.params.max_polys_per_tile as usize {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        let h = &tile.header;
        let old = self.remove_tile_at(h.x, h.y, h.layer);
        let idx = self.free.pop().ok_or(Error::Detour(Status::OutOfMemory.to_string()))?;
        Ok((self.insert_tile(idx, tile, data), old))
    }

    fn insert_tile(&mut self, idx: usize, mut tile: MeshTile, data: Vec<u8>) -> PolyRef {
        let salt = self.slots[idx].salt;
        let h = &tile.header;
        let key = (h.x, h.y, h.layer);
        tile.salt = salt;
        tile.data = data;
        self.slots[idx].tile = Some(tile);
        self.pos_lookup.insert(key, idx);

        self.rebuild_links(idx);
        for nidx in self.neighbour_slots(key.0, key.1) {
            self.rebuild_links(nidx);
        }

        self.encode_poly_ref(salt, idx as u32, 0)
    }

    /// Removes the tile a tile reference points at, returning its blob
    pub fn remove_tile(&mut self, tile_ref: PolyRef) -> Result<Vec<u8>> {
        let (salt, idx, _) = self.decode_poly_ref(tile_ref);
        let idx = idx as usize;
        let slot = self.slots.get(idx).ok_or(Error::Detour(Status::InvalidParam.to_string()))?;
        if slot.salt != salt || slot.tile.is_none() {
            return Err(Error::Detour(Status::NotFound.to_string()));
        }
        Ok(self.free_slot(idx))
    }

    /// Removes the tile at a grid coordinate, returning its blob
    pub fn remove_tile_at(&mut self, x: i32, y: i32, layer: i32) -> Option<Vec<u8>> {
        let idx = *self.pos_lookup.get(&(x, y, layer))?;
        Some(self.free_slot(idx))
    }

    fn free_slot(&mut self, idx: usize) -> Vec<u8> {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let slot = &mut self.slots[idx];
        let tile = slot.tile.take().unwrap_or_default();
        slot.salt = (slot.salt + 1) & salt_mask;
        if slot.salt == 0 {
            slot.salt = 1;
        }
        self.free.push(idx);

        let h = &tile.header;
        self.pos_lookup.remove(&(h.x, h.y, h.layer));
        for nidx in self.neighbour_slots(h.x, h.y) {
            self.rebuild_links(nidx);
        }
        tile.data
    }

    /// Slots of all tiles in the four side neighbours of (x, y)
    fn neighbour_slots(&self, x: i32, y: i32) -> Vec<usize> {
        [0, 2, 4, 6]
            .into_iter()
            .flat_map(|side| {
                let (dx, dy) = dt_side_offset(side);
                self.slots_at(x + dx, y + dy)
            })
            .collect()
    }

    fn slots_at(&self, x: i32, y: i32) -> impl Iterator<Item = usize> + '_ {
        self.pos_lookup
            .range((x, y, i32::MIN)..=(x, y, i32::MAX))
            .map(|(_, &idx)| idx)
    }

    /// Tile at a grid coordinate
    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        let idx = *self.pos_lookup.get(&(x, y, layer))?;
        self.slots[idx].tile.as_ref()
    }

    /// Reference of the tile at a grid coordinate
    pub fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<PolyRef> {
        let idx = *self.pos_lookup.get(&(x, y, layer))?;
        Some(self.encode_poly_ref(self.slots[idx].salt, idx as u32, 0))
    }

    /// All layers at a grid cell
    pub fn tiles_at(&self, x: i32, y: i32) -> Vec<&MeshTile> {
        self.slots_at(x, y).filter_map(|idx| self.slots[idx].tile.as_ref()).collect()
    }

    /// Tile a tile or polygon reference points into
    pub fn tile_by_ref(&self, reference: PolyRef) -> Option<&MeshTile> {
        let (salt, idx, _) = self.decode_poly_ref(reference);
        let slot = self.slots.get(idx as usize)?;
        if slot.salt != salt {
            return None;
        }
        slot.tile.as_ref()
    }

    /// All stored tiles with their references, ordered by coordinate
    pub fn tiles(&self) -> impl Iterator<Item = (PolyRef, &MeshTile)> + '_ {
        self.pos_lookup.values().filter_map(move |&idx| {
            let slot = &self.slots[idx];
            let tile = slot.tile.as_ref()?;
            Some((self.encode_poly_ref(slot.salt, idx as u32, 0), tile))
        })
    }

    /// Base reference of the polygons of the tile in slot `idx`
    fn poly_ref_base(&self, idx: usize) -> PolyRef {
        self.encode_poly_ref(self.slots[idx].salt, idx as u32, 0)
    }

    /// Resolves a polygon reference
    pub fn get_tile_and_poly_by_ref(&self, reference: PolyRef) -> Result<(&MeshTile, &Poly)> {
        let (_, _, poly_idx) = self.decode_poly_ref(reference);
        let tile = self
            .tile_by_ref(reference)
            .ok_or(Error::Detour(Status::InvalidParam.to_string()))?;
        let poly = tile
            .polys
            .get(poly_idx as usize)
            .ok_or(Error::Detour(Status::InvalidParam.to_string()))?;
        Ok((tile, poly))
    }

    /// Whether a polygon reference resolves to a live polygon
    pub fn is_valid_poly_ref(&self, reference: PolyRef) -> bool {
        !reference.is_null() && self.get_tile_and_poly_by_ref(reference).is_ok()
    }

    /// Sets the flags of a polygon
    pub fn set_poly_flags(&mut self, reference: PolyRef, flags: PolyFlags) -> Result<()> {
        let (salt, idx, poly_idx) = self.decode_poly_ref(reference);
        let poly = self
            .slots
            .get_mut(idx as usize)
            .filter(|slot| slot.salt == salt)
            .and_then(|slot| slot.tile.as_mut())
            .and_then(|tile| tile.polys.get_mut(poly_idx as usize))
            .ok_or(Error::Detour(Status::InvalidParam.to_string()))?;
        poly.flags = flags;
        Ok(())
    }

    /// Flags of a polygon
    pub fn get_poly_flags(&self, reference: PolyRef) -> Result<PolyFlags> {
        Ok(self.get_tile_and_poly_by_ref(reference)?.1.flags)
    }

    /// Closest point on a polygon to `pos`, and whether `pos` lies over it
    pub fn closest_point_on_poly(&self, reference: PolyRef, pos: &[f32; 3]) -> Result<([f32; 3], bool)> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(reference)?;
        let (_, _, poly_idx) = self.decode_poly_ref(reference);
        if let Some(h) = tile.poly_height(poly_idx as usize, pos) {
            return Ok(([pos[0], h, pos[2]], true));
        }
        Ok((tile.closest_point_on_poly_boundary(poly, pos), false))
    }

    /// Polygons whose bounds overlap the box `center ± half_extents`
    pub fn query_polygons(&self, center: &[f32; 3], half_extents: &[f32; 3], filter: &QueryFilter) -> Vec<PolyRef> {
        let bmin = [center[0] - half_extents[0], center[1] - half_extents[1], center[2] - half_extents[2]];
        let bmax = [center[0] + half_extents[0], center[1] + half_extents[1], center[2] + half_extents[2]];
        let (minx, miny) = self.calc_tile_loc(&bmin);
        let (maxx, maxy) = self.calc_tile_loc(&bmax);

        let mut result = Vec::new();
        for y in miny..=maxy {
            for x in minx..=maxx {
                for idx in self.slots_at(x, y) {
                    let Some(tile) = self.slots[idx].tile.as_ref() else {
                        continue;
                    };
                    let base = self.poly_ref_base(idx);
                    for (i, poly) in tile.polys.iter().enumerate() {
                        if !filter.pass_filter(poly.flags) {
                            continue;
                        }
                        let (pmin, pmax) = tile.poly_bounds(i);
                        if recast_common::overlap_bounds(&bmin, &bmax, &pmin, &pmax) {
                            result.push(PolyRef::new(base.id() | i as u32));
                        }
                    }
                }
            }
        }
        result
    }

    /// Nearest polygon to `center` within `half_extents`, with the closest
    /// point on it. Vertical distance within the tile's climb height is free
    /// when the point lies over a polygon.
    pub fn find_nearest_poly(
        &self,
        center: &[f32; 3],
        half_extents: &[f32; 3],
        filter: &QueryFilter,
    ) -> Option<(PolyRef, [f32; 3])> {
        let mut nearest = None;
        let mut nearest_d = f32::MAX;
        for reference in self.query_polygons(center, half_extents, filter) {
            let Ok((closest, over_poly)) = self.closest_point_on_poly(reference, center) else {
                continue;
            };
            let d = if over_poly {
                let climb = self.tile_by_ref(reference).map_or(0.0, |t| t.header.walkable_climb);
                let dy = (center[1] - closest[1]).abs() - climb;
                if dy > 0.0 {
                    dy * dy
                } else {
                    0.0
                }
            } else {
                dt_vdist_sqr(center, &closest)
            };
            if d < nearest_d {
                nearest_d = d;
                nearest = Some((reference, closest));
            }
        }
        nearest
    }

    /// Portal between two adjacent polygons, as the (left, right) end points
    /// of the shared edge seen from `from`.
    pub fn get_portal_points(&self, from: PolyRef, to: PolyRef) -> Result<([f32; 3], [f32; 3])> {
        let (tile, poly) = self.get_tile_and_poly_by_ref(from)?;
        let link = tile
            .poly_links(poly)
            .find(|l| l.reference == to)
            .ok_or(Error::Detour(Status::InvalidParam.to_string()))?;

        let nv = poly.vert_count as usize;
        let e = link.edge as usize;
        let v0 = tile.vert(poly.verts[e]);
        let v1 = tile.vert(poly.verts[(e + 1) % nv]);

        if link.is_external() && (link.bmin != 0 || link.bmax != 255) {
            let s = 1.0 / 255.0;
            let tmin = link.bmin as f32 * s;
            let tmax = link.bmax as f32 * s;
            return Ok((
                dt_vlerp(v0, v1, tmin),
                dt_vlerp(v0, v1, tmax),
            ));
        }
        Ok((dt_vcopy(v0), dt_vcopy(v1)))
    }

    /// Midpoint of the portal between two adjacent polygons
    pub fn get_edge_mid_point(&self, from: PolyRef, to: PolyRef) -> Result<[f32; 3]> {
        let (l, r) = self.get_portal_points(from, to)?;
        Ok([(l[0] + r[0]) * 0.5, (l[1] + r[1]) * 0.5, (l[2] + r[2]) * 0.5])
    }

    /// Recomputes every link of the tile in slot `idx`
    fn rebuild_links(&mut self, idx: usize) {
        let Some(tile) = self.slots[idx].tile.as_ref() else {
            return;
        };
        let base = self.poly_ref_base(idx);
        let (x, y) = (tile.header.x, tile.header.y);

        // (poly, link) pairs in insertion order
        let mut links: Vec<(usize, Link)> = Vec::new();

        for (i, poly) in tile.polys.iter().enumerate() {
            for j in 0..poly.vert_count as usize {
                let nei = poly.neis[j];
                if nei == 0 || nei & DT_EXT_LINK != 0 {
                    continue;
                }
                links.push((
                    i,
                    Link {
                        reference: PolyRef::new(base.id() | (nei as u32 - 1)),
                        next: None,
                        edge: j as u8,
                        side: DT_INTERNAL_SIDE,
                        bmin: 0,
                        bmax: 0,
                    },
                ));
            }
        }

        for side in [0, 2, 4, 6] {
            let (dx, dy) = dt_side_offset(side);
            for nidx in self.slots_at(x + dx, y + dy) {
                if let Some(target) = self.slots[nidx].tile.as_ref() {
                    let target_base = self.poly_ref_base(nidx);
                    connect_ext_links(tile, target, target_base, side, &mut links);
                }
            }
        }

        let Some(tile) = self.slots[idx].tile.as_mut() else {
            return;
        };
        tile.links.clear();
        for poly in &mut tile.polys {
            poly.first_link = None;
        }
        for (i, mut link) in links {
            let poly = &mut tile.polys[i];
            link.next = poly.first_link;
            poly.first_link = Some(tile.links.len() as u32);
            tile.links.push(link);
        }
    }
}

/// Polygons of `target` with a portal on `side` overlapping the edge `va..vb`,
/// with the overlapping range along the edge.
fn find_connecting_polys(va: &[f32], vb: &[f32], target: &MeshTile, side: i32) -> Vec<(usize, f32, f32)> {
    let (amin, amax) = dt_calc_slab_end_points(va, vb, side);
    let apos = dt_get_slab_coord(va, side);
    let marker = DT_EXT_LINK | side as u16;

    let mut result = Vec::new();
    for (i, poly) in target.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            if poly.neis[j] != marker {
                continue;
            }
            let vc = target.vert(poly.verts[j]);
            let vd = target.vert(poly.verts[(j + 1) % nv]);
            let bpos = dt_get_slab_coord(vc, side);
            if (apos - bpos).abs() > 0.01 {
                continue;
            }
            let (bmin, bmax) = dt_calc_slab_end_points(vc, vd, side);
            if !dt_overlap_slabs(amin, amax, bmin, bmax, 0.01, target.header.walkable_climb) {
                continue;
            }
            result.push((i, amin[0].max(bmin[0]), amax[0].min(bmax[0])));
            break;
        }
    }
    result
}

/// Links the border edges of `tile` on `side` to the matching polygons of
/// `target`.
fn connect_ext_links(tile: &MeshTile, target: &MeshTile, target_base: PolyRef, side: i32, out: &mut Vec<(usize, Link)>) {
    let marker = DT_EXT_LINK | side as u16;
    let opposite = dt_opposite_tile(side);
    for (i, poly) in tile.polys.iter().enumerate() {
        let nv = poly.vert_count as usize;
        for j in 0..nv {
            if poly.neis[j] != marker {
                continue;
            }
            let va = tile.vert(poly.verts[j]);
            let vb = tile.vert(poly.verts[(j + 1) % nv]);
            // Parameterize along the edge axis
            let axis = if side == 0 || side == 4 { 2 } else { 0 };
            let span = vb[axis] - va[axis];

            for (k, umin, umax) in find_connecting_polys(va, vb, target, opposite) {
                let (mut tmin, mut tmax) = if span.abs() > f32::EPSILON {
                    ((umin - va[axis]) / span, (umax - va[axis]) / span)
                } else {
                    (0.0, 1.0)
                };
                if tmin > tmax {
                    std::mem::swap(&mut tmin, &mut tmax);
                }
                out.push((
                    i,
                    Link {
                        reference: PolyRef::new(target_base.id() | k as u32),
                        next: None,
                        edge: j as u8,
                        side: side as u8,
                        bmin: (tmin.clamp(0.0, 1.0) * 255.0).round() as u8,
                        bmax: (tmax.clamp(0.0, 1.0) * 255.0).round() as u8,
                    },
                ));
            }
        }
    }
}
