//! Container → [`Sprite`] decoding.
//!
//! Decoding runs in three phases over chunks buffered once in memory:
//!
//! 1. scan every frame and chunk, assigning layer indices in order of first
//!    appearance across the whole file;
//! 2. with every layer name known, classify cells as visual, hitbox or
//!    origin and sum the pixel bytes the visual cells need;
//! 3. allocate the pixel arena once and fill it.

use std::ops::Range;

use crate::arena::PixelArena;
use crate::inflate::zlib_decompress;
use crate::math::{IVec2, Rect};

use super::format::{ByteCursor, CellKind, Chunk, FileHeader, FrameRecord};
use super::{Cell, Frame, Layer, LayerRole, Sprite, SpriteError};

struct ScannedFrame<'a> {
    duration_ms: u16,
    chunks: Vec<Chunk<'a>>,
}

/// Where a visual cell's pixels come from.
enum PixelSource<'a> {
    Raw(&'a [u8]),
    Compressed(&'a [u8]),
    Linked { frame: usize },
}

struct PlannedCell<'a> {
    layer: usize,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    z: i32,
    opacity: u8,
    source: PixelSource<'a>,
}

struct PlannedFrame<'a> {
    duration: f32,
    cells: Vec<PlannedCell<'a>>,
    hitbox: Option<Rect>,
    origin: Option<IVec2>,
}

/// Decode a complete sprite file.
pub fn decode_sprite(bytes: &[u8]) -> Result<Sprite, SpriteError> {
    let (header, layers, frames) = scan(bytes)?;
    let (planned, total_bytes) = classify(&layers, &frames)?;
    let (frames, pixels) = fill(planned, total_bytes)?;

    Ok(Sprite {
        width: u32::from(header.width),
        height: u32::from(header.height),
        layers,
        frames,
        pixels,
    })
}

fn scan(bytes: &[u8]) -> Result<(FileHeader, Vec<Layer>, Vec<ScannedFrame<'_>>), SpriteError> {
    let mut cursor = ByteCursor::new(bytes);
    let header = FileHeader::read(&mut cursor)?;

    let mut layers = Vec::new();
    let mut frames = Vec::with_capacity(usize::from(header.frames));
    for _ in 0..header.frames {
        let mut record = FrameRecord::read(&mut cursor)?;
        let mut chunks = Vec::with_capacity(record.chunk_count as usize);
        for _ in 0..record.chunk_count {
            match Chunk::read(&mut record.chunks)? {
                Some(Chunk::Layer { name }) => {
                    layers.push(Layer {
                        role: LayerRole::from_name(&name),
                        name: name.clone(),
                    });
                    chunks.push(Chunk::Layer { name });
                }
                Some(chunk) => chunks.push(chunk),
                None => {}
            }
        }
        frames.push(ScannedFrame {
            duration_ms: record.duration_ms,
            chunks,
        });
    }
    Ok((header, layers, frames))
}

/// Size of the stored cell on `layer` in an earlier `frame`, the target of a link.
fn source_size(
    frames: &[ScannedFrame<'_>],
    frame: usize,
    layer: usize,
    linked_from: usize,
) -> Result<(u16, u16), SpriteError> {
    let invalid = SpriteError::InvalidLinkedCell {
        frame: linked_from,
        layer,
    };
    if frame >= linked_from {
        return Err(invalid);
    }
    let chunks = frames.get(frame).map(|f| f.chunks.as_slice()).unwrap_or(&[]);
    chunks
        .iter()
        .find_map(|chunk| match chunk {
            Chunk::Cell {
                layer: l,
                kind: CellKind::Raw { width, height, .. } | CellKind::Compressed { width, height, .. },
                ..
            } if usize::from(*l) == layer => Some((*width, *height)),
            _ => None,
        })
        .ok_or(invalid)
}

fn classify<'a>(
    layers: &[Layer],
    frames: &[ScannedFrame<'a>],
) -> Result<(Vec<PlannedFrame<'a>>, usize), SpriteError> {
    let mut total_bytes = 0usize;
    let mut planned = Vec::with_capacity(frames.len());

    for (index, frame) in frames.iter().enumerate() {
        let mut out = PlannedFrame {
            duration: f32::from(frame.duration_ms) / 1000.0,
            cells: Vec::new(),
            hitbox: None,
            origin: None,
        };

        for chunk in &frame.chunks {
            let Chunk::Cell {
                layer,
                x,
                y,
                opacity,
                z,
                kind,
            } = chunk
            else {
                continue;
            };
            let layer = usize::from(*layer);
            let role = layers
                .get(layer)
                .map(|l| l.role)
                .ok_or(SpriteError::UnknownLayer {
                    frame: index,
                    layer,
                })?;

            let (width, height, source) = match kind {
                CellKind::Raw {
                    width,
                    height,
                    pixels,
                } => (*width, *height, PixelSource::Raw(*pixels)),
                CellKind::Compressed {
                    width,
                    height,
                    data,
                } => (*width, *height, PixelSource::Compressed(*data)),
                CellKind::Linked { frame } => {
                    let frame = usize::from(*frame);
                    let (width, height) = source_size(frames, frame, layer, index)?;
                    (width, height, PixelSource::Linked { frame })
                }
            };
            let (x, y) = (i32::from(*x), i32::from(*y));

            match role {
                LayerRole::Hitbox => {
                    if out.hitbox.is_some() {
                        return Err(SpriteError::DuplicateHitbox(index));
                    }
                    out.hitbox = Some(Rect::new(x, y, i32::from(width), i32::from(height)));
                }
                LayerRole::Origin => {
                    if out.origin.is_some() {
                        return Err(SpriteError::DuplicateOrigin(index));
                    }
                    out.origin = Some(IVec2::new(x, y));
                }
                LayerRole::Visual => {
                    if !matches!(source, PixelSource::Linked { .. }) {
                        total_bytes += usize::from(width) * usize::from(height) * 4;
                    }
                    out.cells.push(PlannedCell {
                        layer,
                        x,
                        y,
                        width: u32::from(width),
                        height: u32::from(height),
                        z: i32::from(*z),
                        opacity: *opacity,
                        source,
                    });
                }
            }
        }
        planned.push(out);
    }
    Ok((planned, total_bytes))
}

fn fill(
    planned: Vec<PlannedFrame<'_>>,
    total_bytes: usize,
) -> Result<(Vec<Frame>, PixelArena), SpriteError> {
    let mut pixels = PixelArena::with_capacity(total_bytes);
    let mut frames: Vec<Frame> = Vec::with_capacity(planned.len());

    for (index, frame) in planned.into_iter().enumerate() {
        let mut cells = Vec::with_capacity(frame.cells.len());
        for cell in frame.cells {
            let expected = cell.width as usize * cell.height as usize * 4;
            let range = match cell.source {
                PixelSource::Raw(raw) => {
                    let range = acquire(&mut pixels, expected)?;
                    pixels.slice_mut(range.clone()).copy_from_slice(&raw[..expected]);
                    range
                }
                PixelSource::Compressed(data) => {
                    let range = acquire(&mut pixels, expected)?;
                    let written = zlib_decompress(data, pixels.slice_mut(range.clone()))?;
                    if written != expected {
                        return Err(SpriteError::PixelSizeMismatch {
                            expected,
                            actual: written,
                        });
                    }
                    range
                }
                PixelSource::Linked { frame } => frames
                    .get(frame)
                    .and_then(|f| f.cells.iter().find(|c| c.layer == cell.layer))
                    .map(|c| c.pixels.clone())
                    .ok_or(SpriteError::InvalidLinkedCell {
                        frame: index,
                        layer: cell.layer,
                    })?,
            };
            cells.push(Cell {
                layer: cell.layer,
                x: cell.x,
                y: cell.y,
                width: cell.width,
                height: cell.height,
                z: cell.z,
                opacity: cell.opacity,
                pixels: range,
            });
        }
        frames.push(Frame {
            duration: frame.duration,
            cells,
            hitbox: frame.hitbox,
            origin: frame.origin,
        });
    }
    Ok((frames, pixels))
}

fn acquire(pixels: &mut PixelArena, len: usize) -> Result<Range<usize>, SpriteError> {
    let capacity = pixels.capacity();
    pixels.acquire(len).ok_or(SpriteError::PixelSizeMismatch {
        expected: len,
        actual: capacity - pixels.used(),
    })
}
