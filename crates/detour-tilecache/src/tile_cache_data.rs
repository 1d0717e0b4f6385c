//! Tile cache data structures and serialization
//!
//! A cached layer is one [`HeightfieldLayer`] of a tile with its grid
//! coordinate. It is stored as a `DTLR` blob compressed whole by a
//! [`TileCacheCompressor`].

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use std::io::{Cursor, Read, Write};

use detour::Status;
use recast::HeightfieldLayer;
use recast_common::{Error, Result};

/// Magic number for tile cache layers ('DTLR')
pub const DT_TILECACHE_MAGIC: u32 = u32::from_be_bytes(*b"DTLR");

/// Version number for tile cache data format
pub const DT_TILECACHE_VERSION: u32 = 1;

/// Serialized size of [`TileCacheLayerHeader`]
pub const LAYER_HEADER_SIZE: usize = 5 * 4 + 6 * 4 + 8 * 2;

/// Largest decompressed layer accepted
const MAX_LAYER_BYTES: usize = 64 * 1024 * 1024;

/// Tile cache layer header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileCacheLayerHeader {
    /// Tile position X
    pub tx: i32,
    /// Tile position Y
    pub ty: i32,
    /// Layer index at the tile position
    pub tlayer: i32,
    /// Bounding box minimum; `bmin[1]` is the floor of `hmin`
    pub bmin: [f32; 3],
    /// Bounding box maximum
    pub bmax: [f32; 3],
    /// Height range of the layer in voxels
    pub hmin: u16,
    pub hmax: u16,
    /// Grid size in cells, border included
    pub width: u16,
    pub height: u16,
    /// Used area of the grid, inclusive
    pub minx: u16,
    pub maxx: u16,
    pub miny: u16,
    pub maxy: u16,
}

impl TileCacheLayerHeader {
    fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(DT_TILECACHE_MAGIC)?;
        writer.write_u32::<LittleEndian>(DT_TILECACHE_VERSION)?;
        writer.write_i32::<LittleEndian>(self.tx)?;
        writer.write_i32::<LittleEndian>(self.ty)?;
        writer.write_i32::<LittleEndian>(self.tlayer)?;
        for &v in self.bmin.iter().chain(self.bmax.iter()) {
            writer.write_f32::<LittleEndian>(v)?;
        }
        for v in [
            self.hmin, self.hmax, self.width, self.height, self.minx, self.maxx, self.miny, self.maxy,
        ] {
            writer.write_u16::<LittleEndian>(v)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != DT_TILECACHE_MAGIC {
            return Err(Error::TileCache(Status::WrongMagic.to_string()));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != DT_TILECACHE_VERSION {
            return Err(Error::TileCache(Status::WrongVersion.to_string()));
        }

        let mut header = Self {
            tx: reader.read_i32::<LittleEndian>()?,
            ty: reader.read_i32::<LittleEndian>()?,
            tlayer: reader.read_i32::<LittleEndian>()?,
            ..Default::default()
        };
        for v in header.bmin.iter_mut().chain(header.bmax.iter_mut()) {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        for v in [
            &mut header.hmin,
            &mut header.hmax,
            &mut header.width,
            &mut header.height,
            &mut header.minx,
            &mut header.maxx,
            &mut header.miny,
            &mut header.maxy,
        ] {
            *v = reader.read_u16::<LittleEndian>()?;
        }
        Ok(header)
    }

    /// Number of cells in the grid
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Uncompressed tile cache layer
#[derive(Debug, Clone, PartialEq)]
pub struct TileCacheLayer {
    /// Header of the layer
    pub header: TileCacheLayerHeader,
    /// Floor height per cell relative to `hmin`
    pub heights: Vec<u8>,
    /// Area id per cell
    pub areas: Vec<u8>,
    /// Connection bits per cell
    pub cons: Vec<u8>,
}

impl TileCacheLayer {
    /// Wraps a heightfield layer of tile (tx, ty)
    pub fn from_heightfield_layer(layer: &HeightfieldLayer, tx: i32, ty: i32, tlayer: i32) -> Result<Self> {
        let narrow = |v: i32, what: &str| {
            u16::try_from(v).map_err(|_| Error::TileCache(format!("layer {what} {v} does not fit the layer format")))
        };
        Ok(Self {
            header: TileCacheLayerHeader {
                tx,
                ty,
                tlayer,
                bmin: layer.bmin.to_array(),
                bmax: layer.bmax.to_array(),
                hmin: narrow(layer.hmin, "hmin")?,
                hmax: narrow(layer.hmax, "hmax")?,
                width: narrow(layer.width, "width")?,
                height: narrow(layer.height, "height")?,
                minx: narrow(layer.minx, "minx")?,
                maxx: narrow(layer.maxx, "maxx")?,
                miny: narrow(layer.minz, "miny")?,
                maxy: narrow(layer.maxz, "maxy")?,
            },
            heights: layer.heights.clone(),
            areas: layer.areas.clone(),
            cons: layer.cons.clone(),
        })
    }

    /// Expands the layer back into a heightfield layer
    pub fn to_heightfield_layer(&self, cs: f32, ch: f32) -> HeightfieldLayer {
        let h = &self.header;
        HeightfieldLayer {
            bmin: Vec3::from_array(h.bmin),
            bmax: Vec3::from_array(h.bmax),
            cs,
            ch,
            width: h.width as i32,
            height: h.height as i32,
            minx: h.minx as i32,
            maxx: h.maxx as i32,
            minz: h.miny as i32,
            maxz: h.maxy as i32,
            hmin: h.hmin as i32,
            hmax: h.hmax as i32,
            heights: self.heights.clone(),
            areas: self.areas.clone(),
            cons: self.cons.clone(),
        }
    }

    /// Serializes the layer, uncompressed
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(LAYER_HEADER_SIZE + self.heights.len() * 3);
        self.header.write_to(&mut bytes)?;
        bytes.write_all(&self.heights)?;
        bytes.write_all(&self.areas)?;
        bytes.write_all(&self.cons)?;
        Ok(bytes)
    }

    /// Parses an uncompressed layer. The buffer must hold exactly the header
    /// and three grids of `width * height` bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LAYER_HEADER_SIZE {
            return Err(Error::TileCache(Status::DataCorrupted.to_string()));
        }
        let mut cursor = Cursor::new(data);
        let header = TileCacheLayerHeader::read_from(&mut cursor)?;

        let cells = header.cell_count();
        if cells == 0 || data.len() != LAYER_HEADER_SIZE + cells * 3 {
            log::debug!(
                "layer ({}, {}, {}) is {} bytes, expected {}",
                header.tx,
                header.ty,
                header.tlayer,
                data.len(),
                LAYER_HEADER_SIZE + cells * 3
            );
            return Err(Error::TileCache(Status::DataCorrupted.to_string()));
        }
        if header.minx > header.maxx
            || header.miny > header.maxy
            || header.maxx >= header.width
            || header.maxy >= header.height
            || header.hmin > header.hmax
        {
            return Err(Error::TileCache(Status::DataCorrupted.to_string()));
        }

        let body = &data[LAYER_HEADER_SIZE..];
        Ok(Self {
            header,
            heights: body[..cells].to_vec(),
            areas: body[cells..cells * 2].to_vec(),
            cons: body[cells * 2..].to_vec(),
        })
    }
}

/// Compression used for stored layers
pub trait TileCacheCompressor: std::fmt::Debug {
    /// Compresses a serialized layer
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Restores a serialized layer
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// LZ4 block compression with the uncompressed size prepended
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl TileCacheCompressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let size = data
            .get(..4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .ok_or_else(|| Error::TileCache(Status::DataCorrupted.to_string()))?;
        if size > MAX_LAYER_BYTES {
            log::debug!("compressed layer claims {size} bytes");
            return Err(Error::TileCache(Status::DataCorrupted.to_string()));
        }
        lz4_flex::decompress_size_prepended(data).map_err(|e| {
            log::debug!("LZ4 decompression failed: {e}");
            Error::TileCache(Status::DataCorrupted.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_layer_helpers::flat_layer;

    #[test]
    fn test_layer_bytes_round_trip() {
        let layer = flat_layer(3, 4, 8);
        let bytes = layer.to_bytes().unwrap();
        assert_eq!(bytes.len(), LAYER_HEADER_SIZE + 64 * 3);
        assert_eq!(&bytes[..4], &DT_TILECACHE_MAGIC.to_le_bytes());
        assert_eq!(TileCacheLayer::from_bytes(&bytes).unwrap(), layer);
    }

    #[test]
    fn test_layer_rejects_bad_data() {
        let bytes = flat_layer(0, 0, 8).to_bytes().unwrap();
        assert!(TileCacheLayer::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(TileCacheLayer::from_bytes(&bytes[..10]).is_err());

        let mut bad = bytes.clone();
        bad[0] ^= 0xff;
        let err = TileCacheLayer::from_bytes(&bad).unwrap_err();
        assert!(err.to_string().contains("magic"));

        let mut bad = bytes.clone();
        bad[4] = 2;
        let err = TileCacheLayer::from_bytes(&bad).unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_lz4_round_trip_and_bad_input() {
        let compressor = Lz4Compressor;
        let bytes = flat_layer(1, 1, 16).to_bytes().unwrap();
        let packed = compressor.compress(&bytes).unwrap();
        assert!(packed.len() < bytes.len());
        assert_eq!(compressor.decompress(&packed).unwrap(), bytes);

        assert!(compressor.decompress(&[1, 2]).is_err());
        // Size prefix beyond the limit
        assert!(compressor.decompress(&[0xff, 0xff, 0xff, 0x7f, 0, 0]).is_err());
        assert!(compressor.decompress(&packed[..packed.len() / 2]).is_err());
    }

    #[test]
    fn test_heightfield_layer_conversion() {
        let layer = flat_layer(2, 5, 8);
        let hf = layer.to_heightfield_layer(0.5, 0.25);
        assert_eq!(hf.width, 8);
        assert_eq!(hf.cs, 0.5);
        let back = TileCacheLayer::from_heightfield_layer(&hf, 2, 5, 0).unwrap();
        assert_eq!(back, layer);
    }
}
