//! The platformer itself: loads assets, drives the simulation at the fixed
//! tick rate and hands each frame's instances to the renderer.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use winit::keyboard::KeyCode;

use crate::behavior::Controls;
use crate::engine::{EngineContext, Game};
use crate::input::InputMap;
use crate::level::load_levels_file;
use crate::math::{Camera2D, Vec2};
use crate::render::FrameInstances;
use crate::simulation::{Simulation, TickOutcome};
use crate::sprite::{MobSprites, PlayerSprites, SpriteRegistry};

/// Digit keys jump straight to a level, in order.
const LEVEL_KEYS: [KeyCode; 9] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Digit5,
    KeyCode::Digit6,
    KeyCode::Digit7,
    KeyCode::Digit8,
    KeyCode::Digit9,
];

struct World {
    registry: SpriteRegistry,
    simulation: Simulation,
}

pub struct PlatformerGame {
    input_map: InputMap,
    /// Held keys plus edges not yet seen by a tick.
    controls: Controls,
    world: Option<World>,
    camera: Camera2D,
    instances: FrameInstances,
}

impl Default for PlatformerGame {
    fn default() -> Self {
        Self::new()
    }
}

impl PlatformerGame {
    pub fn new() -> Self {
        Self {
            input_map: InputMap::platformer(),
            controls: Controls::default(),
            world: None,
            camera: Camera2D::new(0.0, 0.0),
            instances: FrameInstances::new(),
        }
    }

    #[must_use]
    pub fn with_input_map(mut self, input_map: InputMap) -> Self {
        self.input_map = input_map;
        self
    }

    fn world(&mut self) -> Result<&mut World> {
        self.world
            .as_mut()
            .ok_or_else(|| anyhow!("game used before init"))
    }
}

impl Game for PlatformerGame {
    fn init(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        let config = ctx.config().clone();

        let mut registry = SpriteRegistry::load_dir(&config.sprite_dir)?;
        let player = PlayerSprites::resolve(&registry)?;
        let mob = MobSprites::resolve(&registry)?;

        let levels = load_levels_file(&config.level_path, player.idle, mob.idle)?;
        let tileset: Option<PathBuf> = levels
            .iter()
            .find_map(|level| level.tileset.as_deref())
            .map(|rel| match config.level_path.parent() {
                Some(dir) => dir.join(rel),
                None => PathBuf::from(rel),
            });

        ctx.renderer().upload_static(&registry, tileset.as_deref())?;
        registry.release_pixels();

        let simulation = Simulation::new(levels, player, mob, config.tuning)?;
        log::info!(
            "loaded {} sprites and {} levels",
            registry.len(),
            simulation.level_count()
        );
        self.world = Some(World {
            registry,
            simulation,
        });
        Ok(())
    }

    fn update(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        let sampled = self.input_map.controls(ctx.input());
        self.controls.absorb(sampled);
        let level_key = LEVEL_KEYS
            .iter()
            .position(|&key| ctx.input().is_key_pressed(key));

        let dt = ctx.fixed_delta_time().as_secs_f32();
        let mut controls = self.controls;
        let world = self.world()?;

        if let Some(index) = level_key {
            if !world.simulation.switch_level(index) {
                log::debug!("no level {}", index + 1);
            }
        }

        while ctx.should_run_fixed_update() {
            let outcome = world.simulation.tick(&world.registry, &controls, dt)?;
            if outcome == TickOutcome::Reset {
                log::debug!("game reset");
            }
            controls.clear_edges();
        }
        self.controls = controls;
        Ok(())
    }

    fn draw(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        let (width, height) = ctx.renderer().view_size();
        let world = self
            .world
            .as_ref()
            .ok_or_else(|| anyhow!("game used before init"))?;

        let level = world.simulation.level();
        self.camera.view_size = Vec2::new(width, height);
        self.camera
            .follow(level.player.position, level.width_px, level.height_px);
        self.instances.build(level, &world.registry, &self.camera);

        ctx.renderer().render(&self.instances)
    }
}
