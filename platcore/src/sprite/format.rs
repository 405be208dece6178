//! On-disk layout of the sprite container.
//!
//! Everything is little-endian. A 128-byte file header is followed by one
//! record per frame; each frame has a 16-byte header and a run of chunks that
//! each start with a 4-byte size (header included) and a 2-byte type tag.

use super::SpriteError;

pub const FILE_HEADER_SIZE: usize = 128;
pub const FRAME_HEADER_SIZE: usize = 16;
pub const CHUNK_HEADER_SIZE: usize = 6;

pub const FILE_MAGIC: u16 = 0xA5E0;
pub const FRAME_MAGIC: u16 = 0xF1FA;

pub const CHUNK_LAYER: u16 = 0x2004;
pub const CHUNK_CELL: u16 = 0x2005;

/// Chunk types that carry nothing the runtime needs.
const IGNORED_CHUNKS: [u16; 12] = [
    0x0004, // old palette
    0x0011, // old palette
    0x2006, // cel extra
    0x2007, // color profile
    0x2008, // external files
    0x2016, // mask
    0x2017, // path
    0x2018, // tags
    0x2019, // palette
    0x2020, // user data
    0x2022, // slice
    0x2023, // tileset
];

const CELL_RAW: u16 = 0;
const CELL_LINKED: u16 = 1;
const CELL_COMPRESSED: u16 = 2;

/// Bounds-checked little-endian reader over a byte slice.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], SpriteError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(SpriteError::UnexpectedEof {
                offset: self.pos,
                needed: len,
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), SpriteError> {
        self.take(len).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, SpriteError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, SpriteError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16(&mut self) -> Result<i16, SpriteError> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, SpriteError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Length-prefixed string; invalid UTF-8 is replaced rather than rejected.
    pub fn string(&mut self) -> Result<String, SpriteError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Split off the next `len` bytes as an independent cursor.
    pub fn sub(&mut self, len: usize) -> Result<ByteCursor<'a>, SpriteError> {
        Ok(ByteCursor::new(self.take(len)?))
    }
}

/// Fields of the file header the decoder uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub frames: u16,
    pub width: u16,
    pub height: u16,
}

impl FileHeader {
    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, SpriteError> {
        let mut header = cursor.sub(FILE_HEADER_SIZE)?;
        let _file_size = header.u32()?;
        let magic = header.u16()?;
        if magic != FILE_MAGIC {
            return Err(SpriteError::BadMagic(magic));
        }
        let frames = header.u16()?;
        let width = header.u16()?;
        let height = header.u16()?;
        let depth = header.u16()?;
        if depth != 32 {
            return Err(SpriteError::UnsupportedColorDepth(depth));
        }
        let _flags = header.u32()?;
        let _speed = header.u16()?;
        header.skip(8)?;
        let _transparent_index = header.u8()?;
        header.skip(3)?;
        let _colors = header.u16()?;
        let pixel_width = header.u8()?;
        let pixel_height = header.u8()?;
        if !matches!((pixel_width, pixel_height), (0, 0) | (1, 1)) {
            return Err(SpriteError::UnsupportedPixelRatio {
                width: pixel_width,
                height: pixel_height,
            });
        }
        let grid_x = header.i16()?;
        let grid_y = header.i16()?;
        if grid_x != 0 || grid_y != 0 {
            return Err(SpriteError::UnsupportedGrid {
                x: grid_x,
                y: grid_y,
            });
        }
        // Grid size and the reserved tail are not used.
        Ok(Self {
            frames,
            width,
            height,
        })
    }
}

/// A frame header plus the raw bytes of its chunk run.
#[derive(Clone, Debug)]
pub struct FrameRecord<'a> {
    pub duration_ms: u16,
    pub chunk_count: u32,
    pub chunks: ByteCursor<'a>,
}

impl<'a> FrameRecord<'a> {
    pub fn read(cursor: &mut ByteCursor<'a>) -> Result<Self, SpriteError> {
        let start = cursor.position();
        let size = cursor.u32()? as usize;
        let magic = cursor.u16()?;
        if magic != FRAME_MAGIC {
            return Err(SpriteError::BadFrameMagic(magic));
        }
        let old_chunks = cursor.u16()?;
        let duration_ms = cursor.u16()?;
        cursor.skip(2)?;
        let new_chunks = cursor.u32()?;
        let chunk_count = if new_chunks == 0 {
            u32::from(old_chunks)
        } else {
            new_chunks
        };

        let body = size
            .checked_sub(FRAME_HEADER_SIZE)
            .ok_or(SpriteError::FrameSize { offset: start, size })?;
        Ok(Self {
            duration_ms,
            chunk_count,
            chunks: cursor.sub(body)?,
        })
    }
}

/// Cell payload variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CellKind<'a> {
    /// Uncompressed RGBA8 pixels.
    Raw {
        width: u16,
        height: u16,
        pixels: &'a [u8],
    },
    /// Reuses the cell on the same layer in an earlier frame.
    Linked { frame: u16 },
    /// zlib-compressed RGBA8 pixels.
    Compressed {
        width: u16,
        height: u16,
        data: &'a [u8],
    },
}

/// One decoded chunk the runtime cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunk<'a> {
    Layer {
        name: String,
    },
    Cell {
        layer: u16,
        x: i16,
        y: i16,
        opacity: u8,
        z: i16,
        kind: CellKind<'a>,
    },
}

impl<'a> Chunk<'a> {
    /// Read the next chunk. Returns `Ok(None)` for empty or ignorable chunks.
    pub fn read(cursor: &mut ByteCursor<'a>) -> Result<Option<Self>, SpriteError> {
        let offset = cursor.position();
        let size = cursor.u32()? as usize;
        let kind = cursor.u16()?;
        let payload_len = size
            .checked_sub(CHUNK_HEADER_SIZE)
            .ok_or(SpriteError::ChunkSize { offset, size })?;
        if payload_len > cursor.remaining() {
            return Err(SpriteError::ChunkSize { offset, size });
        }
        let mut payload = cursor.sub(payload_len)?;
        if payload_len == 0 {
            return Ok(None);
        }

        match kind {
            CHUNK_LAYER => Self::read_layer(&mut payload).map(Some),
            CHUNK_CELL => Self::read_cell(&mut payload).map(Some),
            other if IGNORED_CHUNKS.contains(&other) => {
                log::debug!("skipping chunk {other:#06x} at offset {offset}");
                Ok(None)
            }
            other => Err(SpriteError::UnknownChunk { kind: other, offset }),
        }
    }

    fn read_layer(payload: &mut ByteCursor<'a>) -> Result<Self, SpriteError> {
        let _flags = payload.u16()?;
        let _layer_type = payload.u16()?;
        let _child_level = payload.u16()?;
        payload.skip(4)?; // default width and height
        let _blend_mode = payload.u16()?;
        let _opacity = payload.u8()?;
        payload.skip(3)?;
        let name = payload.string()?;
        // Tilemap layers append a tileset index, which is left unread.
        Ok(Chunk::Layer { name })
    }

    fn read_cell(payload: &mut ByteCursor<'a>) -> Result<Self, SpriteError> {
        let layer = payload.u16()?;
        let x = payload.i16()?;
        let y = payload.i16()?;
        let opacity = payload.u8()?;
        let cell_type = payload.u16()?;
        let z = payload.i16()?;
        payload.skip(5)?;

        let kind = match cell_type {
            CELL_RAW => {
                let width = payload.u16()?;
                let height = payload.u16()?;
                let len = usize::from(width) * usize::from(height) * 4;
                let pixels = payload.take(len)?;
                CellKind::Raw {
                    width,
                    height,
                    pixels,
                }
            }
            CELL_LINKED => CellKind::Linked {
                frame: payload.u16()?,
            },
            CELL_COMPRESSED => {
                let width = payload.u16()?;
                let height = payload.u16()?;
                let data = payload.take(payload.remaining())?;
                CellKind::Compressed {
                    width,
                    height,
                    data,
                }
            }
            other => return Err(SpriteError::UnsupportedCell(other)),
        };

        Ok(Chunk::Cell {
            layer,
            x,
            y,
            opacity,
            z,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = ((payload.len() + CHUNK_HEADER_SIZE) as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn cursor_reports_eof() {
        let mut cursor = ByteCursor::new(&[1, 2, 3]);
        assert_eq!(cursor.u16(), Ok(0x0201));
        assert_eq!(
            cursor.u16(),
            Err(SpriteError::UnexpectedEof {
                offset: 2,
                needed: 2
            })
        );
    }

    #[test]
    fn header_only_chunk_is_skipped() {
        let bytes = chunk(0x7777, &[]);
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(Chunk::read(&mut cursor), Ok(None));
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn ignorable_chunk_is_skipped_and_unknown_rejected() {
        let bytes = chunk(0x2018, &[0; 10]);
        assert_eq!(Chunk::read(&mut ByteCursor::new(&bytes)), Ok(None));

        let bytes = chunk(0x7777, &[0; 4]);
        assert_eq!(
            Chunk::read(&mut ByteCursor::new(&bytes)),
            Err(SpriteError::UnknownChunk {
                kind: 0x7777,
                offset: 0
            })
        );
    }

    #[test]
    fn undersized_chunk_is_rejected() {
        let bytes = [4, 0, 0, 0, 0x04, 0x20];
        assert_eq!(
            Chunk::read(&mut ByteCursor::new(&bytes)),
            Err(SpriteError::ChunkSize { offset: 0, size: 4 })
        );
    }

    #[test]
    fn linked_cell_decodes() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u16.to_le_bytes()); // layer
        payload.extend_from_slice(&(-2i16).to_le_bytes());
        payload.extend_from_slice(&5i16.to_le_bytes());
        payload.push(200);
        payload.extend_from_slice(&1u16.to_le_bytes()); // linked
        payload.extend_from_slice(&0i16.to_le_bytes());
        payload.extend_from_slice(&[0; 5]);
        payload.extend_from_slice(&7u16.to_le_bytes());
        let bytes = chunk(CHUNK_CELL, &payload);

        let chunk = Chunk::read(&mut ByteCursor::new(&bytes)).unwrap();
        assert_eq!(
            chunk,
            Some(Chunk::Cell {
                layer: 3,
                x: -2,
                y: 5,
                opacity: 200,
                z: 0,
                kind: CellKind::Linked { frame: 7 },
            })
        );
    }
}
