//! Common utilities and data structures shared by the Recast, Detour and
//! tile cache crates

mod geometry;
mod math;
mod mesh;

pub use geometry::*;
pub use math::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Error types for the library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("navigation mesh generation failed: {0}")]
    NavMeshGeneration(String),

    #[error("pathfinding failed: {0}")]
    Pathfinding(String),

    #[error("recast error: {0}")]
    Recast(String),

    #[error("detour error: {0}")]
    Detour(String),

    #[error("tile cache error: {0}")]
    TileCache(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "std")]
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for navmesh operations
pub type Result<T> = std::result::Result<T, Error>;
