//! Decoded sprite assets.
//!
//! A [`Sprite`] is built once at load time from the binary container (see
//! [`decode_sprite`]) and is read-only afterwards. Visual cells keep their
//! RGBA8 pixels in one contiguous [`PixelArena`] that can be released after
//! the frames have been uploaded to the GPU.

mod decode;
pub mod format;
pub mod registry;

use std::ops::Range;

use thiserror::Error;

use crate::arena::PixelArena;
use crate::entity::Facing;
use crate::inflate::InflateError;
use crate::math::{IVec2, Rect};

pub use decode::decode_sprite;
pub use registry::{MobSprites, PlayerSprites, RegistryError, SpriteId, SpriteRegistry};

/// Layer name whose cells define a frame's hitbox.
pub const HITBOX_LAYER: &str = "Hitbox";
/// Layer name whose cells define a frame's origin.
pub const ORIGIN_LAYER: &str = "Origin";

/// Reasons a sprite file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpriteError {
    #[error("unexpected end of data at offset {offset} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("bad file magic {0:#06x}")]
    BadMagic(u16),
    #[error("bad frame magic {0:#06x}")]
    BadFrameMagic(u16),
    #[error("unsupported color depth {0}, only 32-bit RGBA is supported")]
    UnsupportedColorDepth(u16),
    #[error("unsupported grid origin ({x}, {y})")]
    UnsupportedGrid { x: i16, y: i16 },
    #[error("unsupported pixel ratio {width}:{height}")]
    UnsupportedPixelRatio { width: u8, height: u8 },
    #[error("frame at offset {offset} declares invalid size {size}")]
    FrameSize { offset: usize, size: usize },
    #[error("chunk at offset {offset} declares invalid size {size}")]
    ChunkSize { offset: usize, size: usize },
    #[error("unknown chunk type {kind:#06x} at offset {offset}")]
    UnknownChunk { kind: u16, offset: usize },
    #[error("unsupported cell type {0}")]
    UnsupportedCell(u16),
    #[error("cell in frame {frame} references unknown layer {layer}")]
    UnknownLayer { frame: usize, layer: usize },
    #[error("frame {0} has more than one hitbox cell")]
    DuplicateHitbox(usize),
    #[error("frame {0} has more than one origin cell")]
    DuplicateOrigin(usize),
    #[error("linked cell in frame {frame} on layer {layer} has no source cell")]
    InvalidLinkedCell { frame: usize, layer: usize },
    #[error("cell pixel data is {actual} bytes, expected {expected}")]
    PixelSizeMismatch { expected: usize, actual: usize },
    #[error("compressed cell: {0}")]
    Inflate(#[from] InflateError),
}

/// What a layer is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerRole {
    Visual,
    Hitbox,
    Origin,
}

impl LayerRole {
    pub fn from_name(name: &str) -> Self {
        match name {
            HITBOX_LAYER => LayerRole::Hitbox,
            ORIGIN_LAYER => LayerRole::Origin,
            _ => LayerRole::Visual,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub role: LayerRole,
}

/// A positioned image fragment within a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cell {
    pub layer: usize,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub z: i32,
    pub opacity: u8,
    /// Byte range of the RGBA8 pixels inside the sprite's arena.
    pub pixels: Range<usize>,
}

impl Cell {
    /// Draw order key: layer index plus intra-layer z, ties broken by z.
    pub fn z_key(&self) -> (i32, i32) {
        (self.layer as i32 + self.z, self.z)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Display time in seconds.
    pub duration: f32,
    pub cells: Vec<Cell>,
    /// Sprite-local, unflipped.
    pub hitbox: Option<Rect>,
    pub origin: Option<IVec2>,
}

/// One decoded sprite asset.
#[derive(Clone, Debug)]
pub struct Sprite {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub frames: Vec<Frame>,
    pub pixels: PixelArena,
}

impl Sprite {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// RGBA8 pixels of a visual cell.
    pub fn cell_pixels(&self, cell: &Cell) -> &[u8] {
        self.pixels.slice(cell.pixels.clone())
    }

    /// True if at least one frame defines a hitbox.
    pub fn has_hitbox(&self) -> bool {
        self.frames.iter().any(|frame| frame.hitbox.is_some())
    }

    /// Hitbox for `frame`, borrowed from the nearest earlier frame that has
    /// one, or failing that the nearest later one. Mirrored for `Facing::Left`.
    pub fn hitbox(&self, frame: usize, facing: Facing) -> Option<Rect> {
        let hitbox = self.walk_frames(frame, |f| f.hitbox)?;
        Some(match facing {
            Facing::Right => hitbox,
            Facing::Left => hitbox.flipped_x(self.width as i32),
        })
    }

    /// Origin for `frame`, found the same way as [`Sprite::hitbox`].
    /// Defaults to the top-left corner.
    pub fn origin(&self, frame: usize, facing: Facing) -> IVec2 {
        let origin = self.walk_frames(frame, |f| f.origin).unwrap_or(IVec2::ZERO);
        match facing {
            Facing::Right => origin,
            Facing::Left => IVec2::new(self.width as i32 - origin.x, origin.y),
        }
    }

    fn walk_frames<T>(&self, frame: usize, get: impl Fn(&Frame) -> Option<T>) -> Option<T> {
        let start = frame.min(self.frames.len().saturating_sub(1));
        self.frames[..self.frames.len().min(start + 1)]
            .iter()
            .rev()
            .find_map(&get)
            .or_else(|| self.frames.iter().skip(start + 1).find_map(&get))
    }

    /// Drop decoded pixels once they live on the GPU.
    pub fn release_pixels(&mut self) {
        self.pixels.release();
    }
}

/// Flatten one frame into a canvas-sized RGBA8 image, compositing cells in
/// z order with straight-alpha "over" blending.
pub fn composite_frame(sprite: &Sprite, frame: usize) -> Vec<u8> {
    let width = sprite.width as usize;
    let height = sprite.height as usize;
    let mut canvas = vec![0u8; width * height * 4];
    let Some(frame) = sprite.frames.get(frame) else {
        return canvas;
    };

    let mut cells: Vec<&Cell> = frame.cells.iter().collect();
    cells.sort_by_key(|cell| cell.z_key());

    for cell in cells {
        let pixels = sprite.cell_pixels(cell);
        if pixels.len() < cell.width as usize * cell.height as usize * 4 {
            continue;
        }
        for cy in 0..cell.height as i32 {
            let ty = cell.y + cy;
            if ty < 0 || ty >= height as i32 {
                continue;
            }
            for cx in 0..cell.width as i32 {
                let tx = cell.x + cx;
                if tx < 0 || tx >= width as i32 {
                    continue;
                }
                let src = (cy as usize * cell.width as usize + cx as usize) * 4;
                let dst = (ty as usize * width + tx as usize) * 4;
                blend_over(&mut canvas[dst..dst + 4], &pixels[src..src + 4], cell.opacity);
            }
        }
    }
    canvas
}

fn blend_over(dst: &mut [u8], src: &[u8], opacity: u8) {
    let src_a = u32::from(src[3]) * u32::from(opacity) / 255;
    if src_a == 0 {
        return;
    }
    if src_a == 255 {
        dst.copy_from_slice(src);
        return;
    }
    let dst_a = u32::from(dst[3]) * (255 - src_a) / 255;
    let out_a = src_a + dst_a;
    for i in 0..3 {
        let c = (u32::from(src[i]) * src_a + u32::from(dst[i]) * dst_a) / out_a;
        dst[i] = c as u8;
    }
    dst[3] = out_a as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite_with(frames: Vec<Frame>) -> Sprite {
        Sprite {
            width: 16,
            height: 16,
            layers: Vec::new(),
            frames,
            pixels: PixelArena::default(),
        }
    }

    fn frame(hitbox: Option<Rect>) -> Frame {
        Frame {
            duration: 0.1,
            cells: Vec::new(),
            hitbox,
            origin: None,
        }
    }

    #[test]
    fn hitbox_walks_back_then_forward() {
        let a = Rect::new(1, 1, 4, 4);
        let b = Rect::new(2, 2, 4, 4);
        let sprite = sprite_with(vec![frame(None), frame(Some(a)), frame(None), frame(Some(b))]);

        assert_eq!(sprite.hitbox(2, Facing::Right), Some(a));
        assert_eq!(sprite.hitbox(3, Facing::Right), Some(b));
        // Nothing before frame 0, so the lookup continues forward.
        assert_eq!(sprite.hitbox(0, Facing::Right), Some(a));
    }

    #[test]
    fn missing_hitbox_everywhere_is_none() {
        let sprite = sprite_with(vec![frame(None), frame(None)]);
        assert!(!sprite.has_hitbox());
        assert_eq!(sprite.hitbox(1, Facing::Right), None);
    }

    #[test]
    fn left_facing_mirrors_hitbox_and_origin() {
        let mut f = frame(Some(Rect::new(2, 0, 4, 8)));
        f.origin = Some(IVec2::new(5, 15));
        let sprite = sprite_with(vec![f]);

        let flipped = sprite.hitbox(0, Facing::Left).unwrap();
        assert_eq!((flipped.min_x, flipped.max_x), (10, 14));
        assert_eq!(sprite.origin(0, Facing::Left), IVec2::new(11, 15));
        assert_eq!(sprite.origin(0, Facing::Right), IVec2::new(5, 15));
    }

    #[test]
    fn composite_orders_cells_by_z_key() {
        let mut pixels = PixelArena::with_capacity(8);
        let red = pixels.acquire(4).unwrap();
        pixels.slice_mut(red.clone()).copy_from_slice(&[255, 0, 0, 255]);
        let blue = pixels.acquire(4).unwrap();
        pixels.slice_mut(blue.clone()).copy_from_slice(&[0, 0, 255, 255]);

        let cell = |layer, pixels| Cell {
            layer,
            x: 0,
            y: 0,
            width: 1,
            height: 1,
            z: 0,
            opacity: 255,
            pixels,
        };
        let sprite = Sprite {
            width: 1,
            height: 1,
            layers: Vec::new(),
            // Listed top layer first; compositing must still draw it last.
            frames: vec![Frame {
                duration: 0.1,
                cells: vec![cell(1, red), cell(0, blue)],
                hitbox: None,
                origin: None,
            }],
            pixels,
        };
        assert_eq!(composite_frame(&sprite, 0), vec![255, 0, 0, 255]);
    }

    #[test]
    fn half_opacity_blends_over_background() {
        let mut dst = [0, 0, 0, 255];
        blend_over(&mut dst, &[255, 255, 255, 255], 128);
        assert_eq!(dst[3], 255);
        assert_eq!(dst[0], 128);
    }
}
