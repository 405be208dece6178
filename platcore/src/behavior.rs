//! Per-entity-type state machines.
//!
//! Each function runs before the resolver on every tick. It applies input
//! driven transitions, selects the sprite for the resulting state and returns
//! the movement parameters and looping flag for this tick.

use crate::config::{MoverTuning, Tuning};
use crate::entity::{BehaviorState, Entity};
use crate::math::Vec2;
use crate::physics::MoveParams;
use crate::sprite::{MobSprites, PlayerSprites};

/// Player controls sampled for one tick. `*_pressed` / `*_released` fields
/// are edges and are cleared after the first tick that sees them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Controls {
    pub left: bool,
    pub right: bool,
    pub jump_pressed: bool,
    pub jump_released: bool,
    pub attack_pressed: bool,
    pub pause_pressed: bool,
    pub step_pressed: bool,
    pub reset_pressed: bool,
}

impl Controls {
    /// -1, 0 or 1 depending on the held direction keys.
    pub fn direction(&self) -> f32 {
        match (self.left, self.right) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }

    /// Take held keys from `sampled` and keep any edges not yet consumed.
    pub fn absorb(&mut self, sampled: Controls) {
        self.left = sampled.left;
        self.right = sampled.right;
        self.jump_pressed |= sampled.jump_pressed;
        self.jump_released |= sampled.jump_released;
        self.attack_pressed |= sampled.attack_pressed;
        self.pause_pressed |= sampled.pause_pressed;
        self.step_pressed |= sampled.step_pressed;
        self.reset_pressed |= sampled.reset_pressed;
    }

    pub fn clear_edges(&mut self) {
        self.jump_pressed = false;
        self.jump_released = false;
        self.attack_pressed = false;
        self.pause_pressed = false;
        self.step_pressed = false;
        self.reset_pressed = false;
    }
}

/// What the simulation feeds to the resolver and animation for one entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub params: MoveParams,
    pub looping: bool,
}

/// Below this horizontal speed an entity counts as standing still.
const IDLE_SPEED: f32 = 0.05;

fn params(mover: &MoverTuning, tuning: &Tuning, horizontal: f32) -> MoveParams {
    MoveParams {
        acceleration: Vec2::new(horizontal * mover.run_acceleration, tuning.gravity),
        friction: mover.friction,
        max_speed: mover.max_speed,
    }
}

fn clamp_fall(entity: &mut Entity, tuning: &Tuning) {
    entity.velocity.y = entity.velocity.y.min(tuning.max_fall_speed);
}

pub fn update_player(
    player: &mut Entity,
    controls: &Controls,
    sprites: &PlayerSprites,
    tuning: &Tuning,
) -> Step {
    match player.state {
        BehaviorState::Free if player.on_floor && controls.attack_pressed => {
            player.state = BehaviorState::Attacking;
            player.velocity.x = 0.0;
        }
        BehaviorState::Free if player.on_floor && controls.jump_pressed => {
            player.state = BehaviorState::Jumping;
            player.velocity.y = -tuning.jump_speed;
            player.on_floor = false;
        }
        BehaviorState::Jumping if controls.jump_released && player.velocity.y < 0.0 => {
            player.state = BehaviorState::Falling;
            player.velocity.y *= 0.5;
        }
        BehaviorState::Attacking if player.anim.ended => {
            player.state = BehaviorState::Free;
        }
        _ => {}
    }
    clamp_fall(player, tuning);

    let direction = if player.state == BehaviorState::Attacking {
        0.0
    } else {
        controls.direction()
    };
    player.facing = player.facing.from_velocity(direction);

    let (sprite, looping) = match player.state {
        BehaviorState::Attacking => (sprites.attack, false),
        BehaviorState::Jumping => (sprites.jump, false),
        BehaviorState::Falling => (sprites.fall, true),
        _ if direction != 0.0 || player.velocity.x.abs() > IDLE_SPEED => (sprites.run, true),
        _ => (sprites.idle, true),
    };
    player.anim.set_sprite(sprite);

    Step {
        params: params(&tuning.player, tuning, direction),
        looping,
    }
}

/// Returns `None` for inactive mobs, which are skipped entirely.
pub fn update_mob(
    mob: &mut Entity,
    player: &Entity,
    sprites: &MobSprites,
    tuning: &Tuning,
) -> Option<Step> {
    match mob.state {
        BehaviorState::Inactive => return None,
        BehaviorState::Hurt | BehaviorState::Dying => {
            if mob.anim.ended {
                mob.state = BehaviorState::Inactive;
                return None;
            }
            mob.anim.set_sprite(sprites.hit);
            mob.velocity.x = 0.0;
            clamp_fall(mob, tuning);
            return Some(Step {
                params: params(&tuning.mob, tuning, 0.0),
                looping: false,
            });
        }
        _ => {}
    }
    clamp_fall(mob, tuning);

    let dx = (player.position.x - mob.position.x) as f32;
    let chasing = mob.on_floor
        && player.on_floor
        && player.is_active()
        && dx.abs() <= tuning.chase_distance
        && dx.abs() > tuning.chase_dead_zone;
    let direction = if chasing { dx.signum() } else { 0.0 };
    mob.facing = mob.facing.from_velocity(direction);

    let sprite = if mob.velocity.x.abs() > IDLE_SPEED {
        sprites.run
    } else {
        sprites.idle
    };
    mob.anim.set_sprite(sprite);

    Some(Step {
        params: params(&tuning.mob, tuning, direction),
        looping: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, Facing};
    use crate::math::IVec2;
    use crate::sprite::SpriteId;

    const PLAYER: PlayerSprites = PlayerSprites {
        idle: SpriteId(0),
        run: SpriteId(1),
        jump: SpriteId(2),
        fall: SpriteId(3),
        attack: SpriteId(4),
    };
    const MOB: MobSprites = MobSprites {
        idle: SpriteId(5),
        run: SpriteId(6),
        hit: SpriteId(7),
    };

    fn grounded(kind: EntityKind, x: i32) -> Entity {
        let mut entity = Entity::new(kind, IVec2::new(x, 0), SpriteId(0));
        entity.state = BehaviorState::Free;
        entity.on_floor = true;
        entity
    }

    #[test]
    fn jump_then_release_halves_upward_speed() {
        let tuning = Tuning::default();
        let mut player = grounded(EntityKind::Player, 0);
        let controls = Controls {
            jump_pressed: true,
            ..Controls::default()
        };

        let step = update_player(&mut player, &controls, &PLAYER, &tuning);
        assert_eq!(player.state, BehaviorState::Jumping);
        assert_eq!(player.velocity.y, -tuning.jump_speed);
        assert_eq!(player.anim.sprite, PLAYER.jump);
        assert!(!step.looping);

        let release = Controls {
            jump_released: true,
            ..Controls::default()
        };
        update_player(&mut player, &release, &PLAYER, &tuning);
        assert_eq!(player.state, BehaviorState::Falling);
        assert_eq!(player.velocity.y, -tuning.jump_speed * 0.5);
        assert_eq!(player.anim.sprite, PLAYER.fall);
    }

    #[test]
    fn attack_ends_with_its_animation() {
        let tuning = Tuning::default();
        let mut player = grounded(EntityKind::Player, 0);
        let attack = Controls {
            attack_pressed: true,
            right: true,
            ..Controls::default()
        };

        let step = update_player(&mut player, &attack, &PLAYER, &tuning);
        assert_eq!(player.state, BehaviorState::Attacking);
        assert_eq!(step.params.acceleration.x, 0.0);
        assert_eq!(player.anim.sprite, PLAYER.attack);

        update_player(&mut player, &Controls::default(), &PLAYER, &tuning);
        assert_eq!(player.state, BehaviorState::Attacking);

        player.anim.ended = true;
        update_player(&mut player, &Controls::default(), &PLAYER, &tuning);
        assert_eq!(player.state, BehaviorState::Free);
        assert_eq!(player.anim.sprite, PLAYER.idle);
    }

    #[test]
    fn running_faces_input_direction() {
        let tuning = Tuning::default();
        let mut player = grounded(EntityKind::Player, 0);
        let left = Controls {
            left: true,
            ..Controls::default()
        };
        let step = update_player(&mut player, &left, &PLAYER, &tuning);
        assert_eq!(player.facing, Facing::Left);
        assert_eq!(player.anim.sprite, PLAYER.run);
        assert_eq!(step.params.acceleration.x, -tuning.player.run_acceleration);
        assert_eq!(step.params.acceleration.y, tuning.gravity);
    }

    #[test]
    fn mob_chases_grounded_player_in_range() {
        let tuning = Tuning::default();
        let player = grounded(EntityKind::Player, 50);
        let mut mob = grounded(EntityKind::Mob, 100);

        let step = update_mob(&mut mob, &player, &MOB, &tuning).unwrap();
        assert!(step.params.acceleration.x < 0.0);
        assert_eq!(mob.facing, Facing::Left);

        // Inside the dead zone the mob only decelerates.
        let near = grounded(EntityKind::Player, 98);
        let step = update_mob(&mut mob, &near, &MOB, &tuning).unwrap();
        assert_eq!(step.params.acceleration.x, 0.0);

        // Out of range.
        let far = grounded(EntityKind::Player, 300);
        let step = update_mob(&mut mob, &far, &MOB, &tuning).unwrap();
        assert_eq!(step.params.acceleration.x, 0.0);
    }

    #[test]
    fn airborne_player_is_not_chased() {
        let tuning = Tuning::default();
        let mut player = grounded(EntityKind::Player, 50);
        player.on_floor = false;
        let mut mob = grounded(EntityKind::Mob, 100);
        let step = update_mob(&mut mob, &player, &MOB, &tuning).unwrap();
        assert_eq!(step.params.acceleration.x, 0.0);
    }

    #[test]
    fn hurt_mob_goes_inactive_after_hit_animation() {
        let tuning = Tuning::default();
        let player = grounded(EntityKind::Player, 0);
        let mut mob = grounded(EntityKind::Mob, 20);
        mob.state = BehaviorState::Hurt;

        let step = update_mob(&mut mob, &player, &MOB, &tuning).unwrap();
        assert!(!step.looping);
        assert_eq!(mob.anim.sprite, MOB.hit);

        mob.anim.ended = true;
        assert!(update_mob(&mut mob, &player, &MOB, &tuning).is_none());
        assert_eq!(mob.state, BehaviorState::Inactive);
        assert!(update_mob(&mut mob, &player, &MOB, &tuning).is_none());
    }
}
