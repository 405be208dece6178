//! Per-tick orchestration of the game world.
//!
//! One tick runs behavior, then collision, then animation for the player and
//! every active mob of the current level, followed by attack hits and the
//! out-of-bounds reset check.

use thiserror::Error;

use crate::behavior::{update_mob, update_player, Controls, Step};
use crate::config::Tuning;
use crate::entity::{BehaviorState, Entity};
use crate::level::{Level, TileGrid};
use crate::physics::{resolve, ResolveError};
use crate::sprite::{MobSprites, PlayerSprites, Sprite, SpriteId, SpriteRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("no levels to play")]
    NoLevels,
    #[error("sprite {0:?} is not in the registry")]
    UnknownSprite(SpriteId),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    Paused,
    Reset,
}

/// All levels plus the state needed to step the current one.
#[derive(Debug)]
pub struct Simulation {
    levels: Vec<Level>,
    current: usize,
    player_sprites: PlayerSprites,
    mob_sprites: MobSprites,
    tuning: Tuning,
    paused: bool,
    ticks: u64,
}

impl Simulation {
    pub fn new(
        levels: Vec<Level>,
        player_sprites: PlayerSprites,
        mob_sprites: MobSprites,
        tuning: Tuning,
    ) -> Result<Self, SimulationError> {
        if levels.is_empty() {
            return Err(SimulationError::NoLevels);
        }
        let mut sim = Self {
            levels,
            current: 0,
            player_sprites,
            mob_sprites,
            tuning,
            paused: false,
            ticks: 0,
        };
        sim.reset();
        Ok(sim)
    }

    pub fn level(&self) -> &Level {
        &self.levels[self.current]
    }

    pub fn current_level(&self) -> usize {
        self.current
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Ticks simulated since the last reset.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Make another level current. Returns `false` for an unknown index.
    pub fn switch_level(&mut self, index: usize) -> bool {
        if index >= self.levels.len() {
            return false;
        }
        self.current = index;
        log::info!("switched to level '{}'", self.levels[index].name);
        true
    }

    /// Restart the whole game from the first level.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            level.reset(self.player_sprites.idle, self.mob_sprites.idle);
        }
        self.current = 0;
        self.paused = false;
        self.ticks = 0;
    }

    /// Advance the current level by one fixed step of `dt` seconds.
    pub fn tick(
        &mut self,
        registry: &SpriteRegistry,
        controls: &Controls,
        dt: f32,
    ) -> Result<TickOutcome, SimulationError> {
        if controls.reset_pressed {
            log::info!("reset requested");
            self.reset();
            return Ok(TickOutcome::Reset);
        }
        if controls.pause_pressed {
            self.paused = !self.paused;
            log::info!("simulation {}", if self.paused { "paused" } else { "resumed" });
        }
        if self.paused && !controls.step_pressed {
            return Ok(TickOutcome::Paused);
        }

        let level = &mut self.levels[self.current];

        let step = update_player(&mut level.player, controls, &self.player_sprites, &self.tuning);
        advance(&mut level.player, step, registry, &level.tiles, dt)?;
        if level.player.position.y > level.height_px {
            log::info!("player fell out of '{}', resetting", level.name);
            self.reset();
            return Ok(TickOutcome::Reset);
        }

        let player = &level.player;
        for mob in &mut level.mobs {
            if let Some(step) = update_mob(mob, player, &self.mob_sprites, &self.tuning) {
                advance(mob, step, registry, &level.tiles, dt)?;
            }
        }

        if player.state == BehaviorState::Attacking {
            let attack = sprite(registry, player)?;
            if let Some(reach) = player.world_hitbox(attack) {
                for mob in &mut level.mobs {
                    let vulnerable = matches!(
                        mob.state,
                        BehaviorState::Free | BehaviorState::Falling | BehaviorState::Jumping
                    );
                    if !vulnerable {
                        continue;
                    }
                    let body = mob.world_hitbox(sprite(registry, mob)?);
                    if body.is_some_and(|body| body.intersects(&reach)) {
                        log::debug!("mob at {:?} hit", mob.position);
                        mob.state = BehaviorState::Hurt;
                        mob.velocity.x = 0.0;
                    }
                }
            }
        }

        self.ticks += 1;
        Ok(TickOutcome::Advanced)
    }
}

fn sprite<'r>(registry: &'r SpriteRegistry, entity: &Entity) -> Result<&'r Sprite, SimulationError> {
    registry
        .get(entity.anim.sprite)
        .ok_or(SimulationError::UnknownSprite(entity.anim.sprite))
}

/// Resolver then animation for one entity.
fn advance(
    entity: &mut Entity,
    step: Step,
    registry: &SpriteRegistry,
    tiles: &TileGrid,
    dt: f32,
) -> Result<(), SimulationError> {
    let sprite = sprite(registry, entity)?;
    let resolution = resolve(entity, sprite, &step.params, tiles, dt)?;
    entity.state = resolution.state;
    entity.on_floor = resolution.touching_floor;
    entity.anim.advance(sprite, dt, step.looping);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PixelArena;
    use crate::entity::EntityKind;
    use crate::math::{IVec2, Rect};
    use crate::sprite::Frame;

    const DT: f32 = 1.0 / 60.0;

    fn block(width: i32, height: i32, frames: usize) -> Sprite {
        let frame = Frame {
            duration: 0.05,
            cells: Vec::new(),
            hitbox: Some(Rect::new(0, 0, width, height)),
            origin: None,
        };
        Sprite {
            width: width as u32,
            height: height as u32,
            layers: Vec::new(),
            frames: vec![frame; frames],
            pixels: PixelArena::default(),
        }
    }

    /// Player sprites 0..5, mob sprites 5..8; the attack sprite is wide.
    fn registry() -> (SpriteRegistry, PlayerSprites, MobSprites) {
        let mut registry = SpriteRegistry::new();
        let mut ids = Vec::new();
        for name in ["idle", "run", "jump", "fall"] {
            ids.push(registry.insert(format!("player_{name}"), block(16, 16, 2)));
        }
        ids.push(registry.insert("player_attack", block(40, 16, 2)));
        for name in ["idle", "run", "hit"] {
            ids.push(registry.insert(format!("mob_{name}"), block(16, 16, 2)));
        }
        let player = PlayerSprites {
            idle: ids[0],
            run: ids[1],
            jump: ids[2],
            fall: ids[3],
            attack: ids[4],
        };
        let mob = MobSprites {
            idle: ids[5],
            run: ids[6],
            hit: ids[7],
        };
        (registry, player, mob)
    }

    /// 8x4 tiles with a solid floor on the bottom row.
    fn level(player: SpriteId, mob: SpriteId, mob_x: i32) -> Level {
        let mut tiles = TileGrid::new(8, 4, 16);
        for tx in 0..8 {
            if let Some(tile) = tiles.get_mut(tx, 3) {
                tile.push_layer(IVec2::ZERO, true);
            }
        }
        Level {
            name: "test".into(),
            player: Entity::new(EntityKind::Player, IVec2::new(16, 32), player),
            mobs: vec![Entity::new(EntityKind::Mob, IVec2::new(mob_x, 32), mob)],
            tiles,
            width_px: 128,
            height_px: 64,
            tileset: None,
        }
    }

    #[test]
    fn player_settles_on_floor() {
        let (registry, player, mob) = registry();
        let mut sim =
            Simulation::new(vec![level(player.idle, mob.idle, 96)], player, mob, Tuning::default())
                .unwrap();

        for _ in 0..5 {
            assert_eq!(
                sim.tick(&registry, &Controls::default(), DT).unwrap(),
                TickOutcome::Advanced
            );
        }
        let p = &sim.level().player;
        assert_eq!(p.state, BehaviorState::Free);
        assert!(p.on_floor);
        assert_eq!(p.position, IVec2::new(16, 32));
        assert_eq!(sim.ticks(), 5);
    }

    #[test]
    fn attack_hurts_overlapping_mob_until_inactive() {
        let (registry, player, mob) = registry();
        let mut sim =
            Simulation::new(vec![level(player.idle, mob.idle, 40)], player, mob, Tuning::default())
                .unwrap();
        sim.tick(&registry, &Controls::default(), DT).unwrap();

        let attack = Controls {
            attack_pressed: true,
            ..Controls::default()
        };
        sim.tick(&registry, &attack, DT).unwrap();
        assert_eq!(sim.level().player.state, BehaviorState::Attacking);
        assert_eq!(sim.level().mobs[0].state, BehaviorState::Hurt);

        for _ in 0..30 {
            sim.tick(&registry, &Controls::default(), DT).unwrap();
        }
        assert_eq!(sim.level().mobs[0].state, BehaviorState::Inactive);
        assert_eq!(sim.level().player.state, BehaviorState::Free);
    }

    #[test]
    fn falling_out_of_level_resets() {
        let (registry, player, mob) = registry();
        let mut sim =
            Simulation::new(vec![level(player.idle, mob.idle, 96)], player, mob, Tuning::default())
                .unwrap();
        sim.levels[0].player.position = IVec2::new(16, 70);

        assert_eq!(
            sim.tick(&registry, &Controls::default(), DT).unwrap(),
            TickOutcome::Reset
        );
        assert_eq!(sim.level().player.position, IVec2::new(16, 32));
        assert_eq!(sim.ticks(), 0);
    }

    #[test]
    fn pause_and_step() {
        let (registry, player, mob) = registry();
        let mut sim =
            Simulation::new(vec![level(player.idle, mob.idle, 96)], player, mob, Tuning::default())
                .unwrap();

        let pause = Controls {
            pause_pressed: true,
            ..Controls::default()
        };
        assert_eq!(sim.tick(&registry, &pause, DT).unwrap(), TickOutcome::Paused);
        assert!(sim.is_paused());
        assert_eq!(
            sim.tick(&registry, &Controls::default(), DT).unwrap(),
            TickOutcome::Paused
        );

        let step = Controls {
            step_pressed: true,
            ..Controls::default()
        };
        assert_eq!(sim.tick(&registry, &step, DT).unwrap(), TickOutcome::Advanced);
        assert_eq!(sim.ticks(), 1);
        assert!(sim.is_paused());
    }

    #[test]
    fn switching_levels_is_an_index_change() {
        let (_, player, mob) = registry();
        let mut sim = Simulation::new(
            vec![level(player.idle, mob.idle, 96), level(player.idle, mob.idle, 64)],
            player,
            mob,
            Tuning::default(),
        )
        .unwrap();
        assert!(sim.switch_level(1));
        assert_eq!(sim.current_level(), 1);
        assert_eq!(sim.level().mobs[0].position.x, 64);
        assert!(!sim.switch_level(2));
        sim.reset();
        assert_eq!(sim.current_level(), 0);
    }

    #[test]
    fn empty_level_list_is_rejected() {
        let (_, player, mob) = registry();
        assert_eq!(
            Simulation::new(Vec::new(), player, mob, Tuning::default()).unwrap_err(),
            SimulationError::NoLevels
        );
    }
}
