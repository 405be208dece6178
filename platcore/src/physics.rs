//! Tile-grid movement and collision resolution.
//!
//! Entities move in whole pixels with a sub-pixel remainder carried between
//! ticks. Collision is resolved in two stages: a cheap probe for hitbox edges
//! that already sit exactly on a tile boundary, then an iterative push-out
//! for tiles newly entered by the move.

use thiserror::Error;

use crate::entity::{BehaviorState, Entity};
use crate::level::TileGrid;
use crate::math::{IVec2, Rect, Vec2};
use crate::sprite::{Sprite, SpriteId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("sprite {sprite:?} has no hitbox for frame {frame}")]
    MissingHitbox { sprite: SpriteId, frame: usize },
}

/// Per-state movement constants fed to [`resolve`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveParams {
    /// Change in velocity per second.
    pub acceleration: Vec2,
    /// Horizontal slow-down per second, applied in [`BehaviorState::Free`].
    pub friction: f32,
    /// Horizontal speed limit in pixels per tick.
    pub max_speed: f32,
}

/// Outcome of one resolver step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// State the caller should store on the entity.
    pub state: BehaviorState,
    pub touching_floor: bool,
    pub horizontal_collision: bool,
    pub vertical_collision: bool,
}

/// Move `entity` by its velocity for one tick and push it out of any
/// collidable tiles it entered.
///
/// Only airborne-capable states are rewritten: `Free` and `Jumping` may become
/// `Falling`, and `Falling` and `Jumping` become `Free` on landing.
/// `Attacking` and `Hurt` always come back unchanged.
pub fn resolve(
    entity: &mut Entity,
    sprite: &Sprite,
    params: &MoveParams,
    tiles: &TileGrid,
    dt: f32,
) -> Result<Resolution, ResolveError> {
    let prev = entity
        .world_hitbox(sprite)
        .ok_or(ResolveError::MissingHitbox {
            sprite: entity.anim.sprite,
            frame: entity.anim.frame,
        })?;

    let mut out = Resolution {
        state: entity.state,
        touching_floor: false,
        horizontal_collision: false,
        vertical_collision: false,
    };

    integrate_velocity(entity, params, dt);
    probe_aligned_edges(entity, &prev, tiles, &mut out);

    entity.remainder += entity.velocity;
    let step = entity.remainder.round();
    entity.remainder -= step;
    let delta = IVec2::new(step.x as i32, step.y as i32);
    entity.position += delta;

    let hitbox = prev.translated(delta.x, delta.y);
    sweep(entity, &prev, hitbox, tiles, &mut out);

    let airborne_capable = matches!(out.state, BehaviorState::Free | BehaviorState::Jumping);
    if airborne_capable && !out.touching_floor && entity.velocity.y > 0.0 {
        out.state = BehaviorState::Falling;
    }
    Ok(out)
}

fn integrate_velocity(entity: &mut Entity, params: &MoveParams, dt: f32) {
    entity.velocity += params.acceleration * dt;
    if entity.state == BehaviorState::Free {
        let slowed = (entity.velocity.x.abs() - params.friction * dt).max(0.0);
        entity.velocity.x = slowed.copysign(entity.velocity.x);
    }
    entity.velocity.x = entity.velocity.x.clamp(-params.max_speed, params.max_speed);
}

/// Inclusive range of tile indices covered by the half-open span `min..max`.
fn tile_span(min: i32, max: i32, size: i32) -> std::ops::RangeInclusive<i32> {
    min.div_euclid(size)..=(max - 1).div_euclid(size)
}

fn probe_aligned_edges(entity: &mut Entity, prev: &Rect, tiles: &TileGrid, out: &mut Resolution) {
    let size = tiles.tile_size();
    let vx = entity.velocity.x;
    let vy = entity.velocity.y;

    let column = if vx > 0.0 && prev.max_x.rem_euclid(size) == 0 {
        Some(prev.max_x.div_euclid(size))
    } else if vx < 0.0 && prev.min_x.rem_euclid(size) == 0 {
        Some(prev.min_x.div_euclid(size) - 1)
    } else {
        None
    };
    if let Some(tx) = column {
        if tile_span(prev.min_y, prev.max_y, size).any(|ty| tiles.is_collidable(tx, ty)) {
            entity.velocity.x = 0.0;
            out.horizontal_collision = true;
        }
    }

    let row = if vy > 0.0 && prev.max_y.rem_euclid(size) == 0 {
        Some(prev.max_y.div_euclid(size))
    } else if vy < 0.0 && prev.min_y.rem_euclid(size) == 0 {
        Some(prev.min_y.div_euclid(size) - 1)
    } else {
        None
    };
    if let Some(ty) = row {
        if tile_span(prev.min_x, prev.max_x, size).any(|tx| tiles.is_collidable(tx, ty)) {
            entity.velocity.y = 0.0;
            out.vertical_collision = true;
            if vy > 0.0 {
                land(out);
            }
        }
    }
}

/// Shift `rect` one pixel at a time by `step` until it clears `tile`.
fn walk_back(rect: &Rect, tile: &Rect, step: IVec2, limit: i32) -> IVec2 {
    let mut shift = IVec2::ZERO;
    for _ in 0..limit {
        if !rect.translated(shift.x, shift.y).intersects(tile) {
            break;
        }
        shift += step;
    }
    shift
}

fn direction(moved: i32, velocity: f32) -> i32 {
    if moved != 0 {
        moved.signum()
    } else if velocity > 0.0 {
        1
    } else if velocity < 0.0 {
        -1
    } else {
        0
    }
}

fn sweep(entity: &mut Entity, prev: &Rect, mut hitbox: Rect, tiles: &TileGrid, out: &mut Resolution) {
    let size = tiles.tile_size();
    let dir_x = direction(hitbox.min_x - prev.min_x, entity.velocity.x);
    let dir_y = direction(hitbox.min_y - prev.min_y, entity.velocity.y);
    let limit_x = hitbox.width() + size;
    let limit_y = hitbox.height() + size;

    let mut resolved_x = false;
    let mut resolved_y = false;

    let rows = tile_span(hitbox.min_y, hitbox.max_y, size);
    let columns = tile_span(hitbox.min_x, hitbox.max_x, size);
    for ty in rows {
        for tx in columns.clone() {
            if resolved_x && resolved_y {
                return;
            }
            if !tiles.is_collidable(tx, ty) {
                continue;
            }
            let tile = Rect::new(tx * size, ty * size, size, size);
            if !hitbox.intersects(&tile) || prev.intersects(&tile) {
                continue;
            }

            let mut hit_axis = false;
            if !resolved_x && dir_x != 0 && hitbox.with_y_of(prev).intersects(&tile) {
                let shift = walk_back(&hitbox.with_y_of(prev), &tile, IVec2::new(-dir_x, 0), limit_x);
                push_x(entity, &mut hitbox, shift.x, out);
                resolved_x = true;
                hit_axis = true;
            }
            if !resolved_y && dir_y != 0 && hitbox.with_x_of(prev).intersects(&tile) {
                let shift = walk_back(&hitbox.with_x_of(prev), &tile, IVec2::new(0, -dir_y), limit_y);
                push_y(entity, &mut hitbox, shift.y, dir_y, out);
                resolved_y = true;
                hit_axis = true;
            }

            // Entered exactly through a corner: neither axis alone overlaps.
            if !hit_axis && hitbox.intersects(&tile) {
                if !resolved_y && dir_y != 0 {
                    let shift = walk_back(&hitbox, &tile, IVec2::new(0, -dir_y), limit_y);
                    push_y(entity, &mut hitbox, shift.y, dir_y, out);
                    resolved_y = true;
                } else if !resolved_x && dir_x != 0 {
                    let shift = walk_back(&hitbox, &tile, IVec2::new(-dir_x, 0), limit_x);
                    push_x(entity, &mut hitbox, shift.x, out);
                    resolved_x = true;
                }
            }
        }
    }
}

fn push_x(entity: &mut Entity, hitbox: &mut Rect, shift: i32, out: &mut Resolution) {
    entity.position.x += shift;
    *hitbox = hitbox.translated(shift, 0);
    entity.velocity.x = 0.0;
    entity.remainder.x = 0.0;
    out.horizontal_collision = true;
}

fn push_y(entity: &mut Entity, hitbox: &mut Rect, shift: i32, dir_y: i32, out: &mut Resolution) {
    entity.position.y += shift;
    *hitbox = hitbox.translated(0, shift);
    entity.velocity.y = 0.0;
    entity.remainder.y = 0.0;
    out.vertical_collision = true;
    if dir_y > 0 {
        land(out);
    }
}

/// Airborne states become `Free` on touching the floor; others keep their state.
fn land(out: &mut Resolution) {
    out.touching_floor = true;
    if matches!(out.state, BehaviorState::Falling | BehaviorState::Jumping) {
        out.state = BehaviorState::Free;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PixelArena;
    use crate::entity::EntityKind;
    use crate::sprite::Frame;

    fn boxed_sprite(width: i32, height: i32) -> Sprite {
        Sprite {
            width: width as u32,
            height: height as u32,
            layers: Vec::new(),
            frames: vec![Frame {
                duration: 0.1,
                cells: Vec::new(),
                hitbox: Some(Rect::new(0, 0, width, height)),
                origin: None,
            }],
            pixels: PixelArena::default(),
        }
    }

    fn grid(width: usize, height: usize, solid: &[(i32, i32)]) -> TileGrid {
        let mut tiles = TileGrid::new(width, height, 16);
        for &(tx, ty) in solid {
            if let Some(tile) = tiles.get_mut(tx, ty) {
                tile.push_layer(IVec2::ZERO, true);
            }
        }
        tiles
    }

    fn entity_at(x: i32, y: i32, velocity: Vec2) -> Entity {
        let mut entity = Entity::new(EntityKind::Player, IVec2::new(x, y), SpriteId(0));
        entity.velocity = velocity;
        entity
    }

    const STILL: MoveParams = MoveParams {
        acceleration: Vec2 { x: 0.0, y: 0.0 },
        friction: 0.0,
        max_speed: 100.0,
    };

    #[test]
    fn free_fall_lands_on_aligned_floor() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(3, 3, &[(0, 2)]);
        let mut entity = entity_at(0, 16, Vec2::new(0.0, 2.0));
        assert_eq!(entity.state, BehaviorState::Falling);

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert_eq!(res.state, BehaviorState::Free);
        assert!(res.touching_floor);
        assert!(res.vertical_collision);
        assert_eq!(entity.velocity.y, 0.0);
        assert_eq!(entity.position, IVec2::new(0, 16));
    }

    #[test]
    fn penetration_is_pushed_flush_against_wall() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(4, 2, &[(2, 0)]);
        let mut entity = entity_at(21, 0, Vec2::new(6.0, 0.0));

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.horizontal_collision);
        assert_eq!(entity.position.x, 24);
        assert_eq!(entity.world_hitbox(&sprite).unwrap().max_x, 32);
        assert_eq!(entity.velocity.x, 0.0);
    }

    #[test]
    fn fast_fall_lands_on_top_of_tile() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(2, 4, &[(0, 2)]);
        let mut entity = entity_at(0, 20, Vec2::new(0.0, 9.0));

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert_eq!(res.state, BehaviorState::Free);
        assert!(res.touching_floor);
        assert_eq!(entity.position.y, 24);
    }

    #[test]
    fn corner_entry_resolves_vertically() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(3, 3, &[(1, 1)]);
        let mut entity = entity_at(6, 6, Vec2::new(4.0, 4.0));

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.touching_floor);
        assert!(!res.horizontal_collision);
        assert_eq!(entity.position, IVec2::new(10, 8));
        assert_eq!(entity.velocity, Vec2::new(4.0, 0.0));
    }

    #[test]
    fn ceiling_probe_stops_upward_motion() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(2, 3, &[(0, 0)]);
        let mut entity = entity_at(0, 16, Vec2::new(0.0, -3.0));
        entity.state = BehaviorState::Jumping;

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.vertical_collision);
        assert!(!res.touching_floor);
        assert_eq!(res.state, BehaviorState::Jumping);
        assert_eq!(entity.position.y, 16);
    }

    #[test]
    fn grounded_attack_keeps_its_state() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(3, 3, &[(0, 2)]);
        let mut entity = entity_at(0, 16, Vec2::ZERO);
        entity.state = BehaviorState::Attacking;
        let gravity = MoveParams {
            acceleration: Vec2::new(0.0, 18.0),
            ..STILL
        };

        let res = resolve(&mut entity, &sprite, &gravity, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.touching_floor);
        assert_eq!(res.state, BehaviorState::Attacking);
    }

    #[test]
    fn sub_pixel_velocity_accumulates() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(8, 8, &[]);
        let mut entity = entity_at(0, 0, Vec2::new(0.25, 0.0));
        entity.state = BehaviorState::Jumping;

        let mut xs = Vec::new();
        for _ in 0..4 {
            resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
            xs.push(entity.position.x);
        }
        assert_eq!(xs, vec![0, 1, 1, 1]);
    }

    #[test]
    fn friction_never_reverses_direction() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(8, 8, &[]);
        let mut entity = entity_at(16, 0, Vec2::new(0.5, 0.0));
        entity.state = BehaviorState::Free;
        let params = MoveParams {
            friction: 60.0,
            max_speed: 4.0,
            ..STILL
        };

        resolve(&mut entity, &sprite, &params, &tiles, 1.0 / 60.0).unwrap();
        assert_eq!(entity.velocity.x, 0.0);

        entity.velocity.x = -10.0;
        entity.state = BehaviorState::Jumping;
        resolve(&mut entity, &sprite, &params, &tiles, 1.0 / 60.0).unwrap();
        assert_eq!(entity.velocity.x, -4.0);
    }

    #[test]
    fn moving_outside_the_grid_is_not_a_collision() {
        let sprite = boxed_sprite(8, 8);
        let tiles = grid(2, 2, &[(0, 0), (1, 1)]);
        let mut entity = entity_at(-40, -40, Vec2::new(-5.0, 5.0));

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(!res.horizontal_collision && !res.vertical_collision);
        assert_eq!(res.state, BehaviorState::Falling);
        assert_eq!(entity.position, IVec2::new(-45, -35));
    }

    #[test]
    fn missing_hitbox_is_an_error() {
        let mut sprite = boxed_sprite(8, 8);
        sprite.frames[0].hitbox = None;
        let tiles = grid(2, 2, &[]);
        let mut entity = entity_at(0, 0, Vec2::ZERO);

        assert_eq!(
            resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0),
            Err(ResolveError::MissingHitbox {
                sprite: SpriteId(0),
                frame: 0
            })
        );
    }

    #[test]
    fn flush_wall_stops_rightward_move() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(4, 1, &[(2, 0)]);
        let mut entity = entity_at(16, 0, Vec2::new(3.0, 0.0));
        assert_eq!(entity.world_hitbox(&sprite).unwrap().max_x % 16, 0);

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.horizontal_collision);
        assert_eq!(entity.velocity.x, 0.0);
        assert_eq!(entity.position, IVec2::new(16, 0));
    }

    #[test]
    fn flush_wall_stops_leftward_move() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(4, 1, &[(0, 0)]);
        let mut entity = entity_at(16, 0, Vec2::new(-3.0, 0.0));

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert!(res.horizontal_collision);
        assert_eq!(entity.velocity.x, 0.0);
        assert_eq!(entity.position, IVec2::new(16, 0));
    }

    #[test]
    fn attacking_state_survives_airborne_step() {
        let sprite = boxed_sprite(16, 16);
        let tiles = grid(3, 3, &[]);
        let mut entity = entity_at(0, 0, Vec2::new(0.0, 2.0));
        entity.state = BehaviorState::Attacking;

        let res = resolve(&mut entity, &sprite, &STILL, &tiles, 1.0 / 60.0).unwrap();
        assert_eq!(res.state, BehaviorState::Attacking);
    }
}
