//! Dynamic obstacle management and tile caching for navigation meshes
//!
//! A [`TileCache`] stores each tile as compressed heightfield layers, taken
//! after voxelization and erosion but before region partitioning. Adding or
//! removing an obstacle only reruns the steps from regions onwards for the
//! layers the obstacle overlaps, so obstacle churn never touches raw geometry.
//!
//! # Example
//!
//! ```rust,ignore
//! use detour_tilecache::{TileCache, WalkableFlags};
//! use glam::Vec3;
//!
//! let mut cache = TileCache::new(params, recast_config)?;
//! for layer in layers {
//!     cache.add_layer(&layer)?;
//! }
//!
//! let id = cache.add_cylinder_obstacle(Vec3::new(10.0, 0.0, 10.0), 1.0, 2.0)?;
//! while !cache.update(dt, &mut nav_mesh, &WalkableFlags)? {}
//!
//! cache.remove_obstacle(id)?;
//! while !cache.update(dt, &mut nav_mesh, &WalkableFlags)? {}
//! ```

pub mod tile_cache;
pub mod tile_cache_builder;
pub mod tile_cache_data;

#[cfg(test)]
mod test_layer_helpers;

pub use tile_cache::*;
pub use tile_cache_builder::*;
pub use tile_cache_data::*;
