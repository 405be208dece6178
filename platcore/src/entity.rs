//! Dynamic game objects: the player and hostile mobs.

use crate::animation::Anim;
use crate::math::{IVec2, Rect, Vec2};
use crate::sprite::{Sprite, SpriteId};

/// Horizontal facing direction. Sprites are authored facing right.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Facing {
    Left = -1,
    #[default]
    Right = 1,
}

impl Facing {
    /// Facing that matches a horizontal velocity, keeping `self` when still.
    pub fn from_velocity(self, vx: f32) -> Self {
        if vx < 0.0 {
            Facing::Left
        } else if vx > 0.0 {
            Facing::Right
        } else {
            self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Mob,
}

/// Behavior state shared by every entity type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BehaviorState {
    Inactive,
    Dying,
    Attacking,
    Falling,
    Jumping,
    /// Grounded or default state.
    #[default]
    Free,
    Hurt,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    pub state: BehaviorState,
    /// World position of the sprite origin, in pixels.
    pub position: IVec2,
    /// Sub-pixel movement not yet applied to `position`.
    pub remainder: Vec2,
    /// Pixels per tick.
    pub velocity: Vec2,
    pub facing: Facing,
    pub on_floor: bool,
    pub anim: Anim,
    pub spawn: IVec2,
}

impl Entity {
    pub fn new(kind: EntityKind, spawn: IVec2, sprite: SpriteId) -> Self {
        Self {
            kind,
            state: BehaviorState::Falling,
            position: spawn,
            remainder: Vec2::ZERO,
            velocity: Vec2::ZERO,
            facing: Facing::Right,
            on_floor: false,
            anim: Anim::new(sprite),
            spawn,
        }
    }

    /// Return to the spawn point with fresh state, keeping the sprite.
    pub fn reset(&mut self, sprite: SpriteId) {
        *self = Self::new(self.kind, self.spawn, sprite);
    }

    pub fn is_active(&self) -> bool {
        self.state != BehaviorState::Inactive
    }

    /// Top-left corner of the sprite canvas in world space.
    pub fn canvas_origin(&self, sprite: &Sprite) -> IVec2 {
        self.position - sprite.origin(self.anim.frame, self.facing)
    }

    /// Hitbox for the current frame in world space.
    pub fn world_hitbox(&self, sprite: &Sprite) -> Option<Rect> {
        let local = sprite.hitbox(self.anim.frame, self.facing)?;
        let corner = self.canvas_origin(sprite);
        Some(local.translated(corner.x, corner.y))
    }

    /// Where the whole sprite canvas lands in world space.
    pub fn draw_rect(&self, sprite: &Sprite) -> Rect {
        let corner = self.canvas_origin(sprite);
        Rect::new(corner.x, corner.y, sprite.width as i32, sprite.height as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PixelArena;
    use crate::sprite::Frame;

    #[test]
    fn world_hitbox_accounts_for_origin_and_facing() {
        let sprite = Sprite {
            width: 16,
            height: 16,
            layers: Vec::new(),
            frames: vec![Frame {
                duration: 0.1,
                cells: Vec::new(),
                hitbox: Some(Rect::new(2, 4, 6, 12)),
                origin: Some(IVec2::new(8, 16)),
            }],
            pixels: PixelArena::default(),
        };
        let mut entity = Entity::new(EntityKind::Player, IVec2::new(100, 50), SpriteId(0));

        assert_eq!(entity.world_hitbox(&sprite), Some(Rect::new(94, 38, 6, 12)));
        assert_eq!(entity.draw_rect(&sprite), Rect::new(92, 34, 16, 16));

        entity.facing = Facing::Left;
        // Hitbox mirrors to x 8..14; origin to x 8.
        assert_eq!(entity.world_hitbox(&sprite), Some(Rect::new(100, 38, 6, 12)));
    }

    #[test]
    fn facing_follows_velocity() {
        assert_eq!(Facing::Right.from_velocity(-0.5), Facing::Left);
        assert_eq!(Facing::Left.from_velocity(0.0), Facing::Left);
        assert_eq!(Facing::Left.from_velocity(2.0), Facing::Right);
    }
}
