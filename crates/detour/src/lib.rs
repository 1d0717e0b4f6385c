//! Detour component for navigation mesh pathfinding
//!
//! Detour owns the runtime side of a tiled navigation mesh: the packed tile
//! format, the [`NavMesh`] container that links tiles into one polygon graph,
//! and [`NavMeshQuery`] for nearest-polygon lookups, corridor search and
//! straight path extraction.

mod binary_format;
mod detour_common;
mod nav_mesh;
mod nav_mesh_builder;
mod nav_mesh_query;
mod node_pool;
mod status;

#[cfg(test)]
mod test_mesh_helpers;

pub use binary_format::{load_tile_from_binary, save_tile_to_binary, DT_NAVMESH_MAGIC, DT_NAVMESH_VERSION};
pub use detour_common::{dt_opposite_tile, dt_vdist};
pub use nav_mesh::{Link, MeshTile, NavMesh, Poly, PolyDetail, TileHeader};
pub use nav_mesh_builder::{NavMeshBuilder, NavMeshCreateParams};
pub use nav_mesh_query::{NavMeshQuery, StraightPathPoint, DT_MAX_PATH_POLYS};
pub use status::Status;

use bitflags::bitflags;

/// Maximum number of vertices per navigation polygon
pub const MAX_VERTS_PER_POLY: usize = 6;

/// Neighbour marker of a polygon edge on the tile border, or'ed with the side
pub const DT_EXT_LINK: u16 = 0x8000;

/// Total bits available to the tile and polygon indices of a [`PolyRef`]
pub const DT_TILE_POLY_BITS: u32 = 22;

/// Most bits the tile index of a [`PolyRef`] may take
pub const DT_MAX_TILE_BITS: u32 = 14;

/// Minimum number of salt bits a [`PolyRef`] keeps to detect stale references
pub const DT_MIN_SALT_BITS: u32 = 10;

/// Polygon reference: salt, tile index and polygon index packed in 32 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PolyRef(u32);

impl PolyRef {
    /// Wraps a raw reference value
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw reference value
    pub const fn id(&self) -> u32 {
        self.0
    }

    /// Whether this is the null reference
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for PolyRef {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<PolyRef> for u32 {
    fn from(r: PolyRef) -> Self {
        r.0
    }
}

bitflags! {
    /// Polygon flags matched against [`QueryFilter`] include and exclude masks
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
    pub struct PolyFlags: u16 {
        /// Ground that can be walked on
        const WALK = 0x01;
        /// Water
        const SWIM = 0x02;
        /// Doors
        const DOOR = 0x04;
        /// Jump links
        const JUMP = 0x08;
        /// Polygons that are temporarily blocked
        const DISABLED = 0x10;
    }
}

bitflags! {
    /// Per-vertex flags of a straight path
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StraightPathFlags: u8 {
        /// The vertex is the start position
        const START = 0x01;
        /// The vertex is the end position
        const END = 0x02;
        /// The vertex is the start of an off-mesh connection
        const OFFMESH_CONNECTION = 0x04;
    }
}

/// Parameters a [`NavMesh`] is allocated with
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshParams {
    /// World position of the tile grid origin
    pub origin: [f32; 3],
    /// Tile extent along x
    pub tile_width: f32,
    /// Tile extent along z
    pub tile_height: f32,
    /// Number of tile slots
    pub max_tiles: i32,
    /// Maximum polygons per tile
    pub max_polys_per_tile: i32,
}

impl NavMeshParams {
    /// Sizes the tile and polygon tables for a `tiles_x * tiles_z` grid.
    ///
    /// Tile and polygon indices share [`DT_TILE_POLY_BITS`] bits, the tile
    /// index taking at most 14 of them.
    pub fn for_tile_grid(origin: [f32; 3], tile_width: f32, tile_height: f32, tiles_x: i32, tiles_z: i32) -> Self {
        let (tile_bits, poly_bits) = tile_poly_bits(tiles_x.max(1) as u32 * tiles_z.max(1) as u32);
        Self {
            origin,
            tile_width,
            tile_height,
            max_tiles: 1 << tile_bits,
            max_polys_per_tile: 1 << poly_bits,
        }
    }
}

/// Splits [`DT_TILE_POLY_BITS`] between tile and polygon indices for
/// `tile_count` tiles.
pub fn tile_poly_bits(tile_count: u32) -> (u32, u32) {
    let tile_bits = recast_common::ilog2(recast_common::next_pow2(tile_count.max(1))).min(DT_MAX_TILE_BITS);
    (tile_bits, DT_TILE_POLY_BITS - tile_bits)
}

/// Polygon filter and traversal costs used by queries
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryFilter {
    /// Polygons must have at least one of these flags
    pub include_flags: PolyFlags,
    /// Polygons must have none of these flags
    pub exclude_flags: PolyFlags,
    /// Cost multiplier per area id
    #[cfg_attr(feature = "serialization", serde(with = "area_cost_serde"))]
    pub area_cost: [f32; 64],
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self {
            include_flags: PolyFlags::all(),
            exclude_flags: PolyFlags::empty(),
            area_cost: [1.0; 64],
        }
    }
}

impl QueryFilter {
    /// Whether a polygon with `flags` may be visited
    #[inline]
    pub fn pass_filter(&self, flags: PolyFlags) -> bool {
        flags.intersects(self.include_flags) && !flags.intersects(self.exclude_flags)
    }

    /// Cost of moving from `pa` to `pb` across a polygon of area `area`
    #[inline]
    pub fn get_cost(&self, pa: &[f32; 3], pb: &[f32; 3], area: u8) -> f32 {
        dt_vdist(pa, pb) * self.area_cost[(area & 0x3f) as usize]
    }

    /// Sets the cost multiplier for `area`
    pub fn set_area_cost(&mut self, area: u8, cost: f32) {
        self.area_cost[(area & 0x3f) as usize] = cost;
    }
}

#[cfg(feature = "serialization")]
mod area_cost_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(costs: &[f32; 64], s: S) -> Result<S::Ok, S::Error> {
        costs.as_slice().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[f32; 64], D::Error> {
        let v = Vec::<f32>::deserialize(d)?;
        v.try_into()
            .map_err(|v: Vec<f32>| serde::de::Error::invalid_length(v.len(), &"64 area costs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_tile_poly_bits_budget() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..2000 {
            let tx = rng.gen_range(1..=128u32);
            let tz = rng.gen_range(1..=(16384 / tx).max(1));
            let (tile_bits, poly_bits) = tile_poly_bits(tx * tz);
            assert_eq!(tile_bits + poly_bits, DT_TILE_POLY_BITS);
            assert!(tile_bits <= 14);
            assert!(1u64 << tile_bits >= (tx * tz) as u64);
            assert!((1u64 << tile_bits) * (1u64 << poly_bits) <= 1u64 << DT_TILE_POLY_BITS);
        }
    }

    #[test]
    fn test_tile_poly_bits_edges() {
        assert_eq!(tile_poly_bits(0), (0, 22));
        assert_eq!(tile_poly_bits(1), (0, 22));
        assert_eq!(tile_poly_bits(3), (2, 20));
        assert_eq!(tile_poly_bits(16384), (14, 8));
        // Capped at 14 tile bits
        assert_eq!(tile_poly_bits(100_000), (14, 8));
    }

    #[test]
    fn test_params_for_tile_grid() {
        let params = NavMeshParams::for_tile_grid([0.0; 3], 10.0, 10.0, 5, 7);
        assert_eq!(params.max_tiles, 64);
        assert_eq!(params.max_polys_per_tile, 1 << 16);
    }

    #[test]
    fn test_query_filter() {
        let mut filter = QueryFilter::default();
        assert!(filter.pass_filter(PolyFlags::WALK));
        assert!(!filter.pass_filter(PolyFlags::empty()));

        filter.exclude_flags = PolyFlags::DISABLED;
        assert!(!filter.pass_filter(PolyFlags::WALK | PolyFlags::DISABLED));

        filter.set_area_cost(3, 2.5);
        let cost = filter.get_cost(&[0.0, 0.0, 0.0], &[2.0, 0.0, 0.0], 3);
        assert!((cost - 5.0).abs() < 1e-6);
    }
}
