//! Incremental tiled navmesh generation
//!
//! A [`NavMeshGenerator`] session collects placed triangle meshes, builds a
//! tiled navmesh over them and keeps it current: geometry edits mark the
//! tiles they cover dirty and only those are rebuilt. With the cached tile
//! strategy the session also keeps a tile cache, which lets obstacles cut
//! holes into the navmesh without re-voxelizing. Sessions save to and load
//! from a compact binary form.
//!
//! # Example
//!
//! ```rust,ignore
//! use navmesh_generator::{BuildParameters, InputRecord, NavMeshGenerator, TileStrategy};
//!
//! let mut generator = NavMeshGenerator::new(BuildParameters::default(), TileStrategy::Cached)?;
//! generator.add_geometry([InputRecord::new(mesh, Affine3A::IDENTITY, 1)]);
//! generator.build()?;
//!
//! let path = generator.find_path(start, end, Vec3::splat(2.0), &QueryFilter::default())?;
//! ```

pub mod builder;
pub mod config;
pub mod dirty;
pub mod generator;
pub mod input;
pub mod query;
pub mod serializer;

#[cfg(test)]
mod generator_tests;
#[cfg(test)]
mod test_geometry;

pub use builder::{CachedTileBuilder, DirectTileBuilder, TileBuilder, TileInput};
pub use config::{BuildParameters, VERTS_PER_POLY};
pub use dirty::DirtyTileSet;
pub use generator::{NavMeshGenerator, TileStrategy};
pub use input::{Aabb, GeometryBatch, InputRecord};
pub use query::{NavigationQuery, PathResult};
pub use serializer::{
    load, load_nav_mesh, load_tile_cache, save_nav_mesh, save_tile_cache, SavedNavMesh, NAVMESH_SET_MAGIC,
    NAVMESH_SET_VERSION, TILE_CACHE_SET_MAGIC, TILE_CACHE_SET_VERSION,
};
