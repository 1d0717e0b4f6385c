//! Navigation mesh builder for creating properly formatted tile data
//!
//! Converts a Recast [`PolyMesh`] and its [`PolyMeshDetail`] into the tile
//! blob consumed by [`NavMesh::add_tile`](crate::NavMesh::add_tile).

use super::binary_format::save_tile_to_binary;
use super::{MeshTile, Poly, PolyDetail, PolyFlags, Status, TileHeader, DT_EXT_LINK, MAX_VERTS_PER_POLY};
use recast::{PolyMesh, PolyMeshDetail, RC_MESH_NULL_IDX, RC_PORTAL_FLAG};
use recast_common::{Error, Result};

/// Input for building one navigation mesh tile
#[derive(Debug, Clone, Default)]
pub struct NavMeshCreateParams {
    /// Polygon mesh vertices in voxel coordinates
    pub verts: Vec<u16>,
    /// Polygons, `2 * nvp` entries each
    pub polys: Vec<u16>,
    /// Flags per polygon
    pub poly_flags: Vec<PolyFlags>,
    /// Area per polygon
    pub poly_areas: Vec<u8>,
    /// Maximum vertices per polygon
    pub nvp: usize,
    /// Detail sub-meshes, `[vert base, vert count, tri base, tri count]` each
    pub detail_meshes: Vec<u32>,
    /// Detail vertices in world units
    pub detail_verts: Vec<f32>,
    /// Detail triangles
    pub detail_tris: Vec<u8>,
    /// Tile grid x
    pub tile_x: i32,
    /// Tile grid z
    pub tile_y: i32,
    /// Layer at the grid cell
    pub tile_layer: i32,
    /// User defined data
    pub user_id: u32,
    /// Tile bounds
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent climb in world units
    pub walkable_climb: f32,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
}

impl NavMeshCreateParams {
    /// Collects the meshes of one tile. Polygon flags are taken from
    /// `poly_mesh.flags`.
    pub fn from_meshes(poly_mesh: &PolyMesh, detail_mesh: &PolyMeshDetail) -> Self {
        Self {
            verts: poly_mesh.verts.clone(),
            polys: poly_mesh.polys.clone(),
            poly_flags: poly_mesh.flags.iter().map(|&f| PolyFlags::from_bits_truncate(f)).collect(),
            poly_areas: poly_mesh.areas.clone(),
            nvp: poly_mesh.nvp,
            detail_meshes: detail_mesh.meshes.clone(),
            detail_verts: detail_mesh.verts.clone(),
            detail_tris: detail_mesh.tris.clone(),
            bmin: poly_mesh.bmin.to_array(),
            bmax: poly_mesh.bmax.to_array(),
            cs: poly_mesh.cs,
            ch: poly_mesh.ch,
            ..Default::default()
        }
    }

    /// Sets the tile grid coordinate
    pub fn with_tile(mut self, x: i32, y: i32, layer: i32) -> Self {
        self.tile_x = x;
        self.tile_y = y;
        self.tile_layer = layer;
        self
    }

    /// Sets the agent dimensions in world units
    pub fn with_agent(mut self, height: f32, radius: f32, climb: f32) -> Self {
        self.walkable_height = height;
        self.walkable_radius = radius;
        self.walkable_climb = climb;
        self
    }

    fn poly_count(&self) -> usize {
        self.poly_areas.len()
    }
}

/// Builder for creating navigation mesh tiles from polygon mesh data
pub struct NavMeshBuilder;

impl NavMeshBuilder {
    /// Creates the tile blob for the provided parameters
    pub fn create_nav_mesh_data(params: &NavMeshCreateParams) -> Result<Vec<u8>> {
        let tile = Self::build_tile(params)?;
        save_tile_to_binary(&tile)
    }

    /// Creates a navigation mesh tile from NavMeshCreateParams
    pub fn build_tile(params: &NavMeshCreateParams) -> Result<MeshTile> {
        Self::validate_params(params)?;

        let mut tile = MeshTile::new(TileHeader {
            x: params.tile_x,
            y: params.tile_y,
            layer: params.tile_layer,
            user_id: params.user_id,
            walkable_height: params.walkable_height,
            walkable_radius: params.walkable_radius,
            walkable_climb: params.walkable_climb,
            bmin: params.bmin,
            bmax: params.bmax,
        });

        // Voxel to world coordinates
        tile.verts = params
            .verts
            .chunks_exact(3)
            .flat_map(|v| {
                [
                    params.bmin[0] + v[0] as f32 * params.cs,
                    params.bmin[1] + v[1] as f32 * params.ch,
                    params.bmin[2] + v[2] as f32 * params.cs,
                ]
            })
            .collect();

        tile.polys = Self::build_polygons(params)?;
        Self::build_detail(params, &mut tile)?;

        log::debug!(
            "tile ({}, {}, {}) packed: {} polys, {} verts, {} detail tris",
            params.tile_x,
            params.tile_y,
            params.tile_layer,
            tile.polys.len(),
            tile.verts.len() / 3,
            tile.detail_tris.len() / 4
        );
        Ok(tile)
    }

    /// Validates input parameters
    fn validate_params(params: &NavMeshCreateParams) -> Result<()> {
        let npolys = params.poly_count();
        if npolys == 0 || params.verts.len() < 9 || params.verts.len() % 3 != 0 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.nvp < 3 || params.nvp > MAX_VERTS_PER_POLY {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.polys.len() != npolys * params.nvp * 2 || params.poly_flags.len() != npolys {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if params.verts.len() / 3 > u16::MAX as usize {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if !params.detail_meshes.is_empty() && params.detail_meshes.len() != npolys * 4 {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        if !(params.cs > 0.0 && params.ch > 0.0) {
            return Err(Error::Detour(Status::InvalidParam.to_string()));
        }
        Ok(())
    }

    /// Builds polygon structures from raw data
    fn build_polygons(params: &NavMeshCreateParams) -> Result<Vec<Poly>> {
        let nvp = params.nvp;
        let nverts = params.verts.len() / 3;
        let mut polys = Vec::with_capacity(params.poly_count());

        for (i, p) in params.polys.chunks_exact(nvp * 2).enumerate() {
            let mut poly = Poly {
                flags: params.poly_flags[i],
                area: params.poly_areas[i],
                ..Default::default()
            };

            for j in 0..nvp {
                let v = p[j];
                if v == RC_MESH_NULL_IDX {
                    break;
                }
                if v as usize >= nverts {
                    return Err(Error::Detour(Status::InvalidParam.to_string()));
                }
                poly.verts[j] = v;
                poly.neis[j] = Self::convert_neighbour(p[nvp + j]);
                poly.vert_count += 1;
            }
            if poly.vert_count < 3 {
                return Err(Error::Detour(Status::InvalidParam.to_string()));
            }
            polys.push(poly);
        }
        Ok(polys)
    }

    /// Maps a Recast neighbour entry to the tile encoding
    fn convert_neighbour(nei: u16) -> u16 {
        if nei == RC_MESH_NULL_IDX {
            0
        } else if nei & RC_PORTAL_FLAG != 0 {
            // Recast border sides are x-, z+, x+, z-
            let side = match nei & 0xf {
                0 => 4,
                1 => 2,
                2 => 0,
                3 => 6,
                _ => return 0,
            };
            DT_EXT_LINK | side
        } else {
            nei + 1
        }
    }

    /// Copies the detail meshes, dropping the detail vertices that repeat the
    /// polygon vertices.
    fn build_detail(params: &NavMeshCreateParams, tile: &mut MeshTile) -> Result<()> {
        if params.detail_meshes.is_empty() {
            // Triangle fans of the polygons
            let mut tris = Vec::new();
            for poly in &tile.polys {
                let tri_base = tris.len() / 4;
                for k in 2..poly.vert_count {
                    tris.extend_from_slice(&[0, k - 1, k, 0]);
                }
                tile.detail_meshes.push(PolyDetail {
                    vert_base: 0,
                    tri_base: tri_base as u32,
                    vert_count: 0,
                    tri_count: (tris.len() / 4 - tri_base) as u8,
                });
            }
            tile.detail_tris = tris;
            return Ok(());
        }

        let ndverts = params.detail_verts.len() / 3;
        let ndtris = params.detail_tris.len() / 4;
        for (i, m) in params.detail_meshes.chunks_exact(4).enumerate() {
            let (vb, nv, tb, nt) = (m[0] as usize, m[1] as usize, m[2] as usize, m[3] as usize);
            let poly_nv = tile.polys[i].vert_count as usize;
            if vb + nv > ndverts || tb + nt > ndtris || nv < poly_nv || nt > u8::MAX as usize {
                return Err(Error::Detour(Status::InvalidParam.to_string()));
            }
            let extra = nv - poly_nv;
            if extra > u8::MAX as usize {
                return Err(Error::Detour(Status::InvalidParam.to_string()));
            }

            tile.detail_meshes.push(PolyDetail {
                vert_base: (tile.detail_verts.len() / 3) as u32,
                tri_base: tb as u32,
                vert_count: extra as u8,
                tri_count: nt as u8,
            });
            let start = (vb + poly_nv) * 3;
            tile.detail_verts
                .extend_from_slice(&params.detail_verts[start..start + extra * 3]);
        }
        tile.detail_tris = params.detail_tris.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_tile_from_binary;
    use glam::Vec3;

    /// Two unit quads side by side, the right one on the +x tile border
    fn two_quad_params() -> NavMeshCreateParams {
        let n = RC_MESH_NULL_IDX;
        let poly_mesh = PolyMesh {
            verts: vec![0, 0, 0, 0, 0, 4, 4, 0, 4, 4, 0, 0, 8, 0, 4, 8, 0, 0],
            polys: vec![
                0, 1, 2, 3, n, n, RC_PORTAL_FLAG, n, 1, n, n, n, //
                3, 2, 4, 5, n, n, 0, n, RC_PORTAL_FLAG | 2, n, n, n,
            ],
            regs: vec![1, 1],
            flags: vec![1, 1],
            areas: vec![63, 63],
            nvp: 6,
            bmin: Vec3::ZERO,
            bmax: Vec3::new(8.0, 1.0, 4.0),
            cs: 1.0,
            ch: 0.5,
            ..Default::default()
        };
        NavMeshCreateParams::from_meshes(&poly_mesh, &PolyMeshDetail::default())
            .with_tile(2, 3, 0)
            .with_agent(2.0, 0.6, 0.9)
    }

    #[test]
    fn test_build_tile_from_poly_mesh() {
        let tile = NavMeshBuilder::build_tile(&two_quad_params()).unwrap();
        assert_eq!(tile.header.x, 2);
        assert_eq!(tile.header.y, 3);
        assert_eq!(tile.polys.len(), 2);
        assert_eq!(tile.verts.len(), 18);
        assert_eq!(tile.polys[0].flags, PolyFlags::WALK);

        // Internal neighbour, border portals
        assert_eq!(tile.polys[0].neis[0], DT_EXT_LINK | 4);
        assert_eq!(tile.polys[0].neis[2], 2);
        assert_eq!(tile.polys[1].neis[0], 1);
        assert_eq!(tile.polys[1].neis[2], DT_EXT_LINK);

        // Fans without a detail mesh
        assert_eq!(tile.detail_meshes[1].tri_count, 2);
    }

    #[test]
    fn test_blob_loads_back() {
        let data = NavMeshBuilder::create_nav_mesh_data(&two_quad_params()).unwrap();
        let tile = load_tile_from_binary(&data).unwrap();
        assert_eq!(tile.polys.len(), 2);
        assert_eq!(tile.header.walkable_climb, 0.9);
    }

    #[test]
    fn test_detail_vertices_exclude_poly_vertices() {
        let mut params = two_quad_params();
        // Poly 0: its 4 corners plus one centre sample; poly 1: corners only
        let mut detail_verts = Vec::new();
        for v in [[0.0, 0.0, 0.0], [0.0, 0.0, 4.0], [4.0, 0.0, 4.0], [4.0, 0.0, 0.0], [2.0, 0.1, 2.0]] {
            detail_verts.extend_from_slice(&v);
        }
        for v in [[4.0, 0.0, 0.0], [4.0, 0.0, 4.0], [8.0, 0.0, 4.0], [8.0, 0.0, 0.0]] {
            detail_verts.extend_from_slice(&v);
        }
        params.detail_verts = detail_verts;
        params.detail_meshes = vec![0, 5, 0, 4, 5, 4, 4, 2];
        params.detail_tris = vec![
            0, 1, 4, 0, 1, 2, 4, 0, 2, 3, 4, 0, 3, 0, 4, 0, //
            0, 1, 2, 0, 0, 2, 3, 0,
        ];

        let tile = NavMeshBuilder::build_tile(&params).unwrap();
        assert_eq!(tile.detail_verts, vec![2.0, 0.1, 2.0]);
        assert_eq!(tile.detail_meshes[0].vert_count, 1);
        assert_eq!(tile.detail_meshes[1].vert_base, 1);
        assert_eq!(tile.detail_meshes[1].vert_count, 0);
        assert_eq!(tile.detail_meshes[1].tri_base, 4);

        let h = tile.poly_height(0, &[2.0, 5.0, 2.0]).unwrap();
        assert!((h - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_params() {
        let mut params = two_quad_params();
        params.nvp = 2;
        assert!(NavMeshBuilder::build_tile(&params).is_err());

        let mut params = two_quad_params();
        params.polys[0] = 100;
        assert!(NavMeshBuilder::build_tile(&params).is_err());

        assert!(NavMeshBuilder::build_tile(&NavMeshCreateParams::default()).is_err());
    }
}
