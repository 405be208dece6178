//! CPU-side instance data for one presented frame.
//!
//! Everything here is plain data so it can be built and checked without a
//! GPU. The backend copies the two instance arrays into the frame slot's
//! staging buffer and replays the draw batches.

use bytemuck::{Pod, Zeroable};

use crate::entity::{Entity, Facing};
use crate::level::{Level, TileGrid};
use crate::math::{Camera2D, Rect};
use crate::sprite::{SpriteId, SpriteRegistry};

/// One tile layer: atlas source rect and screen rect, both `[x, y, w, h]`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    pub src: [f32; 4],
    pub dst: [f32; 4],
}

/// One sprite draw: screen rect, texture array layer and horizontal flip.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct EntityInstance {
    pub dst: [f32; 4],
    pub frame: u32,
    pub flip: u32,
    pub _pad: [u32; 2],
}

/// A run of entity instances sharing one sprite texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawBatch {
    pub sprite: SpriteId,
    pub first_instance: u32,
    pub instance_count: u32,
}

/// Tile instances for every non-empty tile visible through `camera`.
///
/// Stacked layers of a tile produce one instance each, bottom layer first.
pub fn build_tile_instances(tiles: &TileGrid, camera: &Camera2D, out: &mut Vec<TileInstance>) {
    let size = tiles.tile_size();
    let view = Rect::new(
        camera.position.x as i32,
        camera.position.y as i32,
        camera.view_size.x.ceil() as i32,
        camera.view_size.y.ceil() as i32,
    );
    let extent = size as f32;

    for (world, tile) in tiles.iter() {
        if !Rect::new(world.x, world.y, size, size).intersects(&view) {
            continue;
        }
        let x = world.x as f32 - camera.position.x;
        let y = world.y as f32 - camera.position.y;
        for src in tile.layers() {
            out.push(TileInstance {
                src: [src.x as f32, src.y as f32, extent, extent],
                dst: [x, y, extent, extent],
            });
        }
    }
}

/// Entity instances for the player followed by every active mob.
///
/// Mobs are stably sorted by sprite so each sprite texture is bound once.
/// Entities whose sprite is missing from the registry are skipped.
pub fn build_entity_instances(
    level: &Level,
    registry: &SpriteRegistry,
    camera: &Camera2D,
    instances: &mut Vec<EntityInstance>,
    batches: &mut Vec<DrawBatch>,
) {
    let mut mobs: Vec<&Entity> = level.mobs.iter().filter(|mob| mob.is_active()).collect();
    mobs.sort_by_key(|mob| mob.anim.sprite);

    for entity in std::iter::once(&level.player).chain(mobs) {
        let Some(sprite) = registry.get(entity.anim.sprite) else {
            continue;
        };
        let rect = entity.draw_rect(sprite);
        let frame = entity.anim.frame.min(sprite.frame_count().saturating_sub(1));
        instances.push(EntityInstance {
            dst: [
                rect.min_x as f32 - camera.position.x,
                rect.min_y as f32 - camera.position.y,
                rect.width() as f32,
                rect.height() as f32,
            ],
            frame: frame as u32,
            flip: u32::from(entity.facing == Facing::Left),
            _pad: [0; 2],
        });

        let index = (instances.len() - 1) as u32;
        match batches.last_mut() {
            Some(batch) if batch.sprite == entity.anim.sprite => batch.instance_count += 1,
            _ => batches.push(DrawBatch {
                sprite: entity.anim.sprite,
                first_instance: index,
                instance_count: 1,
            }),
        }
    }
}

/// Reusable per-frame instance storage.
#[derive(Debug, Default)]
pub struct FrameInstances {
    pub tiles: Vec<TileInstance>,
    pub entities: Vec<EntityInstance>,
    pub batches: Vec<DrawBatch>,
}

impl FrameInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.tiles.clear();
        self.entities.clear();
        self.batches.clear();
    }

    /// Rebuild from the current state of `level`.
    pub fn build(&mut self, level: &Level, registry: &SpriteRegistry, camera: &Camera2D) {
        self.clear();
        build_tile_instances(&level.tiles, camera, &mut self.tiles);
        build_entity_instances(level, registry, camera, &mut self.entities, &mut self.batches);
    }
}
