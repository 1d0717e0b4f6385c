//! Navmesh and tile cache persistence
//!
//! Two little-endian formats share one layout: a magic, a version, the record
//! count and the parameters needed to allocate the containers, followed by
//! `(reference, size, bytes)` records.
//!
//! * `MSET` stores the tile blobs of a [`NavMesh`].
//! * `TSET` additionally stores the [`TileCacheParams`]. Its records hold
//!   compressed layers, which are polygonized again on load.
//!
//! Loading fails closed: a short buffer, a wrong magic or version, or a size
//! field that points past the end rejects the whole input.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use detour::{NavMesh, NavMeshParams, Status};
use detour_tilecache::{MeshProcess, TileCache, TileCacheParams};
use recast::RecastConfig;
use recast_common::{Error, Result};

/// Magic number of navmesh sets ('MSET')
pub const NAVMESH_SET_MAGIC: u32 = u32::from_be_bytes(*b"MSET");
pub const NAVMESH_SET_VERSION: u32 = 1;

/// Magic number of tile cache sets ('TSET')
pub const TILE_CACHE_SET_MAGIC: u32 = u32::from_be_bytes(*b"TSET");
pub const TILE_CACHE_SET_VERSION: u32 = 1;

/// A loaded navmesh, with its tile cache when one was saved
#[derive(Debug)]
pub enum SavedNavMesh {
    Plain(NavMesh),
    Cached(NavMesh, TileCache),
}

fn format_error(status: Status) -> Error {
    Error::Serialization(status.to_string())
}

fn write_nav_mesh_params<W: Write>(writer: &mut W, params: &NavMeshParams) -> Result<()> {
    for v in params.origin {
        writer.write_f32::<LittleEndian>(v)?;
    }
    writer.write_f32::<LittleEndian>(params.tile_width)?;
    writer.write_f32::<LittleEndian>(params.tile_height)?;
    writer.write_i32::<LittleEndian>(params.max_tiles)?;
    writer.write_i32::<LittleEndian>(params.max_polys_per_tile)?;
    Ok(())
}

fn read_nav_mesh_params<R: Read>(reader: &mut R) -> Result<NavMeshParams> {
    let mut origin = [0.0; 3];
    for v in &mut origin {
        *v = reader.read_f32::<LittleEndian>()?;
    }
    Ok(NavMeshParams {
        origin,
        tile_width: reader.read_f32::<LittleEndian>()?,
        tile_height: reader.read_f32::<LittleEndian>()?,
        max_tiles: reader.read_i32::<LittleEndian>()?,
        max_polys_per_tile: reader.read_i32::<LittleEndian>()?,
    })
}

fn write_record<W: Write>(writer: &mut W, reference: u32, data: &[u8]) -> Result<()> {
    let size = i32::try_from(data.len()).map_err(|_| format_error(Status::BufferTooSmall))?;
    writer.write_u32::<LittleEndian>(reference)?;
    writer.write_i32::<LittleEndian>(size)?;
    writer.write_all(data)?;
    Ok(())
}

/// Reads one `(reference, size, bytes)` record, checking the size against
/// what is left of the buffer
fn read_record(cursor: &mut Cursor<&[u8]>) -> Result<(u32, Vec<u8>)> {
    let reference = cursor.read_u32::<LittleEndian>()?;
    let size = cursor.read_i32::<LittleEndian>()?;
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if size <= 0 || size as u64 > remaining {
        log::debug!("record size {} with {} bytes left", size, remaining);
        return Err(format_error(Status::DataCorrupted));
    }
    let mut data = vec![0; size as usize];
    cursor.read_exact(&mut data)?;
    Ok((reference, data))
}

fn read_preamble(cursor: &mut Cursor<&[u8]>, magic: u32, version: u32) -> Result<usize> {
    if cursor.read_u32::<LittleEndian>()? != magic {
        return Err(format_error(Status::WrongMagic));
    }
    if cursor.read_u32::<LittleEndian>()? != version {
        return Err(format_error(Status::WrongVersion));
    }
    let count = cursor.read_i32::<LittleEndian>()?;
    usize::try_from(count).map_err(|_| format_error(Status::DataCorrupted))
}

fn check_fully_read(cursor: &Cursor<&[u8]>) -> Result<()> {
    if cursor.position() != cursor.get_ref().len() as u64 {
        return Err(format_error(Status::DataCorrupted));
    }
    Ok(())
}

/// Serializes every tile of `nav_mesh` as an `MSET`
pub fn save_nav_mesh(nav_mesh: &NavMesh) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(NAVMESH_SET_MAGIC)?;
    out.write_u32::<LittleEndian>(NAVMESH_SET_VERSION)?;
    out.write_i32::<LittleEndian>(nav_mesh.tile_count() as i32)?;
    write_nav_mesh_params(&mut out, nav_mesh.params())?;
    for (reference, tile) in nav_mesh.tiles() {
        write_record(&mut out, reference.id(), &tile.data)?;
    }
    Ok(out)
}

/// Rebuilds a navmesh from an `MSET`
pub fn load_nav_mesh(data: &[u8]) -> Result<NavMesh> {
    let mut cursor = Cursor::new(data);
    let count = read_preamble(&mut cursor, NAVMESH_SET_MAGIC, NAVMESH_SET_VERSION)?;
    let params = read_nav_mesh_params(&mut cursor)?;

    let mut nav_mesh = NavMesh::new(params)?;
    for _ in 0..count {
        let (_, tile) = read_record(&mut cursor)?;
        nav_mesh.add_tile(tile)?;
    }
    check_fully_read(&cursor)?;

    log::info!("loaded navmesh with {} tiles", nav_mesh.tile_count());
    Ok(nav_mesh)
}

/// Serializes the compressed layers of `cache` as a `TSET`. The navmesh
/// only contributes its parameters; its tiles are rebuilt from the layers on
/// load.
pub fn save_tile_cache(nav_mesh: &NavMesh, cache: &TileCache) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(TILE_CACHE_SET_MAGIC)?;
    out.write_u32::<LittleEndian>(TILE_CACHE_SET_VERSION)?;
    out.write_i32::<LittleEndian>(cache.tile_count() as i32)?;
    write_nav_mesh_params(&mut out, nav_mesh.params())?;
    cache.params().write_to(&mut out)?;
    for (reference, tile) in cache.tiles() {
        write_record(&mut out, reference.id(), &tile.data)?;
    }
    Ok(out)
}

/// Rebuilds a navmesh and its tile cache from a `TSET`.
///
/// `config` supplies the region, contour and detail settings used to
/// polygonize the layers. Every layer is polygonized as soon as it is added.
pub fn load_tile_cache(data: &[u8], config: RecastConfig, process: &dyn MeshProcess) -> Result<(NavMesh, TileCache)> {
    let mut cursor = Cursor::new(data);
    let count = read_preamble(&mut cursor, TILE_CACHE_SET_MAGIC, TILE_CACHE_SET_VERSION)?;
    let nav_params = read_nav_mesh_params(&mut cursor)?;
    let cache_params = TileCacheParams::read_from(&mut cursor)?;

    let mut nav_mesh = NavMesh::new(nav_params)?;
    let mut cache = TileCache::new(cache_params, config)?;
    for _ in 0..count {
        let (_, layer) = read_record(&mut cursor)?;
        let reference = cache.add_tile(layer)?;
        cache.build_layer(reference, &mut nav_mesh, process);
    }
    check_fully_read(&cursor)?;

    log::info!(
        "loaded tile cache with {} layers into {} tiles",
        cache.tile_count(),
        nav_mesh.tile_count()
    );
    Ok((nav_mesh, cache))
}

/// Loads either format, chosen by the magic
pub fn load(data: &[u8], config: RecastConfig, process: &dyn MeshProcess) -> Result<SavedNavMesh> {
    let magic = Cursor::new(data).read_u32::<LittleEndian>()?;
    match magic {
        NAVMESH_SET_MAGIC => load_nav_mesh(data).map(SavedNavMesh::Plain),
        TILE_CACHE_SET_MAGIC => {
            load_tile_cache(data, config, process).map(|(nav_mesh, cache)| SavedNavMesh::Cached(nav_mesh, cache))
        }
        _ => Err(format_error(Status::WrongMagic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{NavMeshGenerator, TileStrategy};
    use crate::test_geometry::{square_record, test_params};
    use detour_tilecache::WalkableFlags;
    use glam::Vec3;

    // magic, version, count and the navmesh parameters
    const MSET_PREAMBLE: usize = 12 + 28;
    const TSET_PREAMBLE: usize = MSET_PREAMBLE + 52;

    fn built(strategy: TileStrategy) -> NavMeshGenerator {
        let mut generator = NavMeshGenerator::new(test_params(), strategy).unwrap();
        generator.add_geometry([square_record(Vec3::ZERO, 12.0, 1)]);
        generator.build().unwrap();
        generator
    }

    fn tiles(nav_mesh: &NavMesh) -> Vec<((i32, i32, i32), Vec<u8>)> {
        nav_mesh
            .tiles()
            .map(|(_, t)| ((t.header.x, t.header.y, t.header.layer), t.data.clone()))
            .collect()
    }

    fn set_i32(bytes: &mut [u8], offset: usize, value: i32) {
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_nav_mesh_round_trip() {
        let generator = built(TileStrategy::Direct);
        let nav_mesh = generator.nav_mesh().unwrap();
        let bytes = save_nav_mesh(nav_mesh).unwrap();
        assert_eq!(&bytes[..4], &NAVMESH_SET_MAGIC.to_le_bytes());

        let loaded = load_nav_mesh(&bytes).unwrap();
        assert_eq!(loaded.params(), nav_mesh.params());
        assert_eq!(tiles(&loaded), tiles(nav_mesh));
    }

    #[test]
    fn test_tile_cache_round_trip() {
        let generator = built(TileStrategy::Cached);
        let nav_mesh = generator.nav_mesh().unwrap();
        let cache = generator.tile_cache().unwrap();
        let bytes = save_tile_cache(nav_mesh, cache).unwrap();

        let (loaded_mesh, loaded_cache) =
            load_tile_cache(&bytes, test_params().to_recast_config(), &WalkableFlags).unwrap();
        assert_eq!(loaded_cache.params(), cache.params());
        assert_eq!(loaded_cache.tile_count(), cache.tile_count());
        let layers = |c: &TileCache| -> Vec<_> { c.tiles().map(|(_, t)| (t.header.clone(), t.data.clone())).collect() };
        assert_eq!(layers(&loaded_cache), layers(cache));
        assert_eq!(loaded_mesh.params(), nav_mesh.params());
        assert_eq!(tiles(&loaded_mesh), tiles(nav_mesh));
    }

    #[test]
    fn test_load_dispatches_on_magic() {
        let config = test_params().to_recast_config();
        let plain = built(TileStrategy::Direct).to_bytes().unwrap();
        assert!(matches!(load(&plain, config.clone(), &WalkableFlags), Ok(SavedNavMesh::Plain(_))));
        let cached = built(TileStrategy::Cached).to_bytes().unwrap();
        assert!(matches!(load(&cached, config, &WalkableFlags), Ok(SavedNavMesh::Cached(..))));
    }

    #[test]
    fn test_empty_nav_mesh_round_trip() {
        let params = NavMeshParams::for_tile_grid([1.0, 2.0, 3.0], 8.0, 8.0, 4, 4);
        let nav_mesh = NavMesh::new(params.clone()).unwrap();
        let bytes = save_nav_mesh(&nav_mesh).unwrap();
        assert_eq!(bytes.len(), MSET_PREAMBLE);
        let loaded = load_nav_mesh(&bytes).unwrap();
        assert_eq!(loaded.params(), &params);
        assert_eq!(loaded.tile_count(), 0);
    }

    #[test]
    fn test_rejects_bad_preamble() {
        let bytes = built(TileStrategy::Direct).to_bytes().unwrap();
        let config = test_params().to_recast_config();

        assert!(load(&[], config.clone(), &WalkableFlags).is_err());
        assert!(load_nav_mesh(&bytes[..10]).is_err());

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] ^= 0xff;
        assert!(matches!(load(&wrong_magic, config.clone(), &WalkableFlags), Err(Error::Serialization(_))));

        let mut wrong_version = bytes.clone();
        set_i32(&mut wrong_version, 4, 2);
        assert!(matches!(load_nav_mesh(&wrong_version), Err(Error::Serialization(_))));

        let mut negative_count = bytes.clone();
        set_i32(&mut negative_count, 8, -1);
        assert!(load_nav_mesh(&negative_count).is_err());

        // An MSET is not a TSET
        assert!(load_tile_cache(&bytes, config, &WalkableFlags).is_err());
    }

    #[test]
    fn test_rejects_bad_records() {
        for (strategy, preamble) in [(TileStrategy::Direct, MSET_PREAMBLE), (TileStrategy::Cached, TSET_PREAMBLE)] {
            let bytes = built(strategy).to_bytes().unwrap();
            let config = test_params().to_recast_config();
            let size_at = preamble + 4;

            let truncated = &bytes[..bytes.len() - 1];
            assert!(load(truncated, config.clone(), &WalkableFlags).is_err());

            let mut trailing = bytes.clone();
            trailing.push(0);
            assert!(load(&trailing, config.clone(), &WalkableFlags).is_err());

            for size in [-1, 0, i32::MAX] {
                let mut bad = bytes.clone();
                set_i32(&mut bad, size_at, size);
                assert!(matches!(load(&bad, config.clone(), &WalkableFlags), Err(Error::Serialization(_))));
            }

            let mut extra_count = bytes.clone();
            let count = i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            set_i32(&mut extra_count, 8, count + 1);
            assert!(load(&extra_count, config, &WalkableFlags).is_err());
        }
    }

    #[test]
    fn test_rejects_oversized_nav_mesh_params() {
        let bytes = built(TileStrategy::Direct).to_bytes().unwrap();
        let max_tiles_at = 12 + 20;

        // 22 tile bits leave no room for polygons
        let mut no_poly_bits = bytes.clone();
        set_i32(&mut no_poly_bits, max_tiles_at, 1 << 22);
        set_i32(&mut no_poly_bits, max_tiles_at + 4, 1);
        assert!(matches!(load_nav_mesh(&no_poly_bits), Err(Error::Detour(_))));

        let mut huge = bytes.clone();
        set_i32(&mut huge, max_tiles_at, i32::MAX);
        assert!(load_nav_mesh(&huge).is_err());
    }

    #[test]
    fn test_rejects_oversized_cache_params() {
        let bytes = built(TileStrategy::Cached).to_bytes().unwrap();
        let config = test_params().to_recast_config();
        let max_tiles_at = MSET_PREAMBLE + 44;
        let max_obstacles_at = MSET_PREAMBLE + 48;

        for offset in [max_tiles_at, max_obstacles_at] {
            let mut bad = bytes.clone();
            set_i32(&mut bad, offset, i32::MAX);
            assert!(matches!(
                load(&bad, config.clone(), &WalkableFlags),
                Err(Error::TileCache(_))
            ));
        }

        let mut wide = bytes.clone();
        set_i32(&mut wide, MSET_PREAMBLE + 20, 1 << 20);
        assert!(load(&wide, config, &WalkableFlags).is_err());
    }

    #[test]
    fn test_rejects_corrupt_tile_data() {
        let mut bytes = built(TileStrategy::Direct).to_bytes().unwrap();
        // First byte of the first tile's magic
        bytes[MSET_PREAMBLE + 8] ^= 0xff;
        assert!(load_nav_mesh(&bytes).is_err());
    }
}
