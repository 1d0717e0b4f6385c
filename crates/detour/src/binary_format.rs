//! Binary tile format
//!
//! A tile blob is a fixed header followed by the vertex, polygon and detail
//! mesh arrays, all little-endian. Links are not stored; the container
//! rebuilds them when the tile is added. Loading validates every count and
//! index against the buffer before anything is allocated.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use super::nav_mesh::{MeshTile, Poly, PolyDetail, TileHeader};
use super::{PolyFlags, Status, DT_EXT_LINK, MAX_VERTS_PER_POLY};
use recast_common::{Error, Result};

/// Magic number for navigation mesh tiles ('DNAV')
pub const DT_NAVMESH_MAGIC: u32 = u32::from_be_bytes(*b"DNAV");

/// Current navigation mesh tile version
pub const DT_NAVMESH_VERSION: u32 = 7;

const HEADER_SIZE: usize = 11 * 4 + 3 * 4 + 6 * 4;
const POLY_SIZE: usize = MAX_VERTS_PER_POLY * 2 * 2 + 2 + 1 + 1;
const DETAIL_MESH_SIZE: usize = 4 + 4 + 1 + 1 + 2;

/// Mesh header as laid out in the blob
#[derive(Debug, Clone)]
struct MeshHeader {
    magic: u32,
    version: u32,
    x: i32,
    y: i32,
    layer: i32,
    user_id: u32,
    poly_count: i32,
    vert_count: i32,
    detail_mesh_count: i32,
    detail_vert_count: i32,
    detail_tri_count: i32,
    walkable_height: f32,
    walkable_radius: f32,
    walkable_climb: f32,
    bmin: [f32; 3],
    bmax: [f32; 3],
}

impl MeshHeader {
    /// Reads a mesh header from a reader
    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            version: reader.read_u32::<LittleEndian>()?,
            x: reader.read_i32::<LittleEndian>()?,
            y: reader.read_i32::<LittleEndian>()?,
            layer: reader.read_i32::<LittleEndian>()?,
            user_id: reader.read_u32::<LittleEndian>()?,
            poly_count: reader.read_i32::<LittleEndian>()?,
            vert_count: reader.read_i32::<LittleEndian>()?,
            detail_mesh_count: reader.read_i32::<LittleEndian>()?,
            detail_vert_count: reader.read_i32::<LittleEndian>()?,
            detail_tri_count: reader.read_i32::<LittleEndian>()?,
            walkable_height: reader.read_f32::<LittleEndian>()?,
            walkable_radius: reader.read_f32::<LittleEndian>()?,
            walkable_climb: reader.read_f32::<LittleEndian>()?,
            bmin: read_vec3(reader)?,
            bmax: read_vec3(reader)?,
        })
    }

    /// Writes a mesh header to a writer
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_i32::<LittleEndian>(self.x)?;
        writer.write_i32::<LittleEndian>(self.y)?;
        writer.write_i32::<LittleEndian>(self.layer)?;
        writer.write_u32::<LittleEndian>(self.user_id)?;
        writer.write_i32::<LittleEndian>(self.poly_count)?;
        writer.write_i32::<LittleEndian>(self.vert_count)?;
        writer.write_i32::<LittleEndian>(self.detail_mesh_count)?;
        writer.write_i32::<LittleEndian>(self.detail_vert_count)?;
        writer.write_i32::<LittleEndian>(self.detail_tri_count)?;
        writer.write_f32::<LittleEndian>(self.walkable_height)?;
        writer.write_f32::<LittleEndian>(self.walkable_radius)?;
        writer.write_f32::<LittleEndian>(self.walkable_climb)?;
        write_vec3(writer, &self.bmin)?;
        write_vec3(writer, &self.bmax)?;
        Ok(())
    }

    /// Number of bytes the arrays after the header take
    fn body_size(&self) -> Option<usize> {
        let count = |c: i32| usize::try_from(c).ok();
        let verts = count(self.vert_count)?.checked_mul(12)?;
        let polys = count(self.poly_count)?.checked_mul(POLY_SIZE)?;
        let dmeshes = count(self.detail_mesh_count)?.checked_mul(DETAIL_MESH_SIZE)?;
        let dverts = count(self.detail_vert_count)?.checked_mul(12)?;
        let dtris = count(self.detail_tri_count)?.checked_mul(4)?;
        verts
            .checked_add(polys)?
            .checked_add(dmeshes)?
            .checked_add(dverts)?
            .checked_add(dtris)
    }
}

fn read_vec3<R: Read>(reader: &mut R) -> Result<[f32; 3]> {
    Ok([
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ])
}

fn write_vec3<W: Write>(writer: &mut W, v: &[f32; 3]) -> Result<()> {
    for &c in v {
        writer.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

fn corrupted(what: &str) -> Error {
    log::debug!("rejecting tile data: {what}");
    Error::Detour(Status::DataCorrupted.to_string())
}

/// Loads a navigation mesh tile from its binary form
pub fn load_tile_from_binary(data: &[u8]) -> Result<MeshTile> {
    if data.len() < HEADER_SIZE {
        return Err(corrupted("short header"));
    }
    let mut cursor = Cursor::new(data);
    let header = MeshHeader::read_from(&mut cursor)?;

    if header.magic != DT_NAVMESH_MAGIC {
        return Err(Error::Detour(Status::WrongMagic.to_string()));
    }
    if header.version != DT_NAVMESH_VERSION {
        return Err(Error::Detour(Status::WrongVersion.to_string()));
    }
    let body = header.body_size().ok_or_else(|| corrupted("negative or oversized count"))?;
    if data.len() - HEADER_SIZE != body {
        return Err(corrupted("size does not match counts"));
    }
    if header.detail_mesh_count != 0 && header.detail_mesh_count != header.poly_count {
        return Err(corrupted("detail mesh count"));
    }

    let vert_count = header.vert_count as usize;
    let poly_count = header.poly_count as usize;

    let mut verts = Vec::with_capacity(vert_count * 3);
    for _ in 0..vert_count * 3 {
        verts.push(cursor.read_f32::<LittleEndian>()?);
    }

    let mut polys = Vec::with_capacity(poly_count);
    for _ in 0..poly_count {
        let mut poly = Poly::default();
        for v in &mut poly.verts {
            *v = cursor.read_u16::<LittleEndian>()?;
        }
        for n in &mut poly.neis {
            *n = cursor.read_u16::<LittleEndian>()?;
        }
        poly.flags = PolyFlags::from_bits_retain(cursor.read_u16::<LittleEndian>()?);
        poly.vert_count = cursor.read_u8()?;
        poly.area = cursor.read_u8()?;

        let nv = poly.vert_count as usize;
        if !(3..=MAX_VERTS_PER_POLY).contains(&nv) {
            return Err(corrupted("polygon vertex count"));
        }
        if poly.verts[..nv].iter().any(|&v| v as usize >= vert_count) {
            return Err(corrupted("polygon vertex index"));
        }
        let bad_nei = poly.neis[..nv]
            .iter()
            .any(|&n| n & DT_EXT_LINK == 0 && n as usize > poly_count);
        if bad_nei {
            return Err(corrupted("polygon neighbour index"));
        }
        polys.push(poly);
    }

    let detail_vert_count = header.detail_vert_count as usize;
    let detail_tri_count = header.detail_tri_count as usize;
    let mut detail_meshes = Vec::with_capacity(header.detail_mesh_count as usize);
    for _ in 0..header.detail_mesh_count {
        let detail = PolyDetail {
            vert_base: cursor.read_u32::<LittleEndian>()?,
            tri_base: cursor.read_u32::<LittleEndian>()?,
            vert_count: cursor.read_u8()?,
            tri_count: cursor.read_u8()?,
        };
        // Padding
        cursor.read_u16::<LittleEndian>()?;

        if detail.vert_base as usize + detail.vert_count as usize > detail_vert_count
            || detail.tri_base as usize + detail.tri_count as usize > detail_tri_count
        {
            return Err(corrupted("detail mesh range"));
        }
        detail_meshes.push(detail);
    }

    let mut detail_verts = Vec::with_capacity(detail_vert_count * 3);
    for _ in 0..detail_vert_count * 3 {
        detail_verts.push(cursor.read_f32::<LittleEndian>()?);
    }
    let mut detail_tris = vec![0u8; detail_tri_count * 4];
    cursor.read_exact(&mut detail_tris)?;

    // Detail triangle corners index the polygon first, then its detail vertices
    for (poly, detail) in polys.iter().zip(&detail_meshes) {
        let limit = poly.vert_count as usize + detail.vert_count as usize;
        let start = detail.tri_base as usize * 4;
        let end = start + detail.tri_count as usize * 4;
        let bad = detail_tris[start..end]
            .chunks_exact(4)
            .any(|t| t[..3].iter().any(|&i| i as usize >= limit));
        if bad {
            return Err(corrupted("detail triangle index"));
        }
    }

    let mut tile = MeshTile::new(TileHeader {
        x: header.x,
        y: header.y,
        layer: header.layer,
        user_id: header.user_id,
        walkable_height: header.walkable_height,
        walkable_radius: header.walkable_radius,
        walkable_climb: header.walkable_climb,
        bmin: header.bmin,
        bmax: header.bmax,
    });
    tile.verts = verts;
    tile.polys = polys;
    tile.detail_meshes = detail_meshes;
    tile.detail_verts = detail_verts;
    tile.detail_tris = detail_tris;
    Ok(tile)
}

/// Saves a navigation mesh tile to its binary form
pub fn save_tile_to_binary(tile: &MeshTile) -> Result<Vec<u8>> {
    let count = |n: usize| i32::try_from(n).map_err(|_| Error::Detour(Status::InvalidParam.to_string()));
    let h = &tile.header;
    let header = MeshHeader {
        magic: DT_NAVMESH_MAGIC,
        version: DT_NAVMESH_VERSION,
        x: h.x,
        y: h.y,
        layer: h.layer,
        user_id: h.user_id,
        poly_count: count(tile.polys.len())?,
        vert_count: count(tile.verts.len() / 3)?,
        detail_mesh_count: count(tile.detail_meshes.len())?,
        detail_vert_count: count(tile.detail_verts.len() / 3)?,
        detail_tri_count: count(tile.detail_tris.len() / 4)?,
        walkable_height: h.walkable_height,
        walkable_radius: h.walkable_radius,
        walkable_climb: h.walkable_climb,
        bmin: h.bmin,
        bmax: h.bmax,
    };

    let mut buffer = Vec::with_capacity(HEADER_SIZE + header.body_size().unwrap_or(0));
    header.write_to(&mut buffer)?;

    for &v in &tile.verts {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    for poly in &tile.polys {
        for &v in &poly.verts {
            buffer.write_u16::<LittleEndian>(v)?;
        }
        for &n in &poly.neis {
            buffer.write_u16::<LittleEndian>(n)?;
        }
        buffer.write_u16::<LittleEndian>(poly.flags.bits())?;
        buffer.write_u8(poly.vert_count)?;
        buffer.write_u8(poly.area)?;
    }
    for detail in &tile.detail_meshes {
        buffer.write_u32::<LittleEndian>(detail.vert_base)?;
        buffer.write_u32::<LittleEndian>(detail.tri_base)?;
        buffer.write_u8(detail.vert_count)?;
        buffer.write_u8(detail.tri_count)?;
        buffer.write_u16::<LittleEndian>(0)?;
    }
    for &v in &tile.detail_verts {
        buffer.write_f32::<LittleEndian>(v)?;
    }
    buffer.write_all(&tile.detail_tris)?;

    Ok(buffer)
}
