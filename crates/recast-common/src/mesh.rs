//! Triangle soup handling and OBJ loading

use crate::{Error, Result};
use glam::Vec3;

#[cfg(feature = "std")]
use std::path::Path;

/// An indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TriMesh {
    /// Flat `[x, y, z]` vertex buffer
    pub vertices: Vec<f32>,
    /// Vertex indices, 3 per triangle
    pub indices: Vec<i32>,
    /// The number of vertices in the mesh
    pub vert_count: usize,
    /// The number of triangles in the mesh
    pub tri_count: usize,
}

impl TriMesh {
    /// Creates a new empty triangle mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from raw buffers, checking that every index is in range.
    pub fn from_parts(vertices: Vec<f32>, indices: Vec<i32>) -> Result<Self> {
        if vertices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "vertex buffer length {} is not a multiple of 3",
                vertices.len()
            )));
        }
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "index buffer length {} is not a multiple of 3",
                indices.len()
            )));
        }
        let vert_count = vertices.len() / 3;
        if let Some(bad) = indices
            .iter()
            .find(|&&i| i < 0 || i as usize >= vert_count)
        {
            return Err(Error::InvalidMesh(format!(
                "index {bad} out of range for {vert_count} vertices"
            )));
        }
        Ok(Self {
            tri_count: indices.len() / 3,
            vert_count,
            vertices,
            indices,
        })
    }

    /// Loads a mesh from an OBJ file on disk
    #[cfg(feature = "std")]
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_obj_str(&content)
    }

    /// Parses OBJ content from a string
    ///
    /// Only `v` and `f` records are read. Faces with more than three corners
    /// are fan triangulated and negative (relative) indices are resolved.
    ///
    /// # Example
    ///
    /// ```
    /// use recast_common::TriMesh;
    ///
    /// let mesh = TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 3 2\n").unwrap();
    /// assert_eq!(mesh.vert_count, 3);
    /// assert_eq!(mesh.tri_count, 1);
    /// ```
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for (line_no, line) in content.lines().enumerate() {
            mesh.parse_obj_line(line)
                .map_err(|e| Error::InvalidMesh(format!("line {}: {e}", line_no + 1)))?;
        }
        Ok(mesh)
    }

    fn parse_obj_line(&mut self, line: &str) -> std::result::Result<(), String> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                for axis in ["x", "y", "z"] {
                    let value = tokens
                        .next()
                        .ok_or_else(|| format!("vertex is missing its {axis} coordinate"))?
                        .parse::<f32>()
                        .map_err(|_| format!("vertex {axis} coordinate is not a number"))?;
                    self.vertices.push(value);
                }
                self.vert_count += 1;
            }
            Some("f") => {
                let mut corners = Vec::with_capacity(4);
                for token in tokens {
                    let raw = token.split('/').next().unwrap_or_default();
                    let index = raw
                        .parse::<i32>()
                        .map_err(|_| format!("face index {raw:?} is not a number"))?;
                    // OBJ indices are 1-based, negative values count from the end
                    let resolved = if index < 0 {
                        self.vert_count as i32 + index
                    } else {
                        index - 1
                    };
                    corners.push(resolved);
                }
                if corners.len() < 3 {
                    return Err("face has fewer than 3 vertices".to_string());
                }
                for i in 1..corners.len() - 1 {
                    self.indices
                        .extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                    self.tri_count += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Appends the triangles of `other`, offsetting its indices.
    pub fn append(&mut self, other: &TriMesh) {
        let base = self.vert_count as i32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
        self.vert_count += other.vert_count;
        self.tri_count += other.tri_count;
    }

    /// Returns vertex `i` as a vector
    #[inline]
    pub fn vertex(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[i * 3..i * 3 + 3])
    }

    /// Calculates the axis-aligned bounding box of the mesh
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        if self.vert_count == 0 {
            return (Vec3::ZERO, Vec3::ZERO);
        }
        self.vertices.chunks_exact(3).fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(bmin, bmax), v| {
                let p = Vec3::from_slice(v);
                (bmin.min(p), bmax.max(p))
            },
        )
    }
}
