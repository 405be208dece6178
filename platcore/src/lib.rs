//! Platcore - runtime core of a 2D tile platformer.
//!
//! Sprites come from a chunked binary container with zlib-compressed cells,
//! levels from LDtk JSON. Entities move through the tile grid with a
//! sub-pixel, axis-separated resolver, and frames are presented through a
//! ring of staged wgpu buffers.

pub mod animation;
pub mod arena;
pub mod behavior;
pub mod config;
pub mod engine;
pub mod entity;
pub mod game;
pub mod grid;
pub mod inflate;
pub mod input;
pub mod level;
pub mod math;
pub mod physics;
pub mod render;
pub mod simulation;
pub mod sprite;
pub mod timestep;

pub use crate::config::{EngineConfig, Tuning};
pub use crate::engine::{Engine, EngineContext, Game};
pub use crate::game::PlatformerGame;
pub use crate::input::{Action, InputMap, InputState};
pub use crate::math::{Camera2D, IVec2, Rect, Vec2};
pub use crate::render::Renderer;
pub use crate::simulation::{Simulation, TickOutcome};
pub use crate::sprite::{decode_sprite, Sprite, SpriteId, SpriteRegistry};
pub use winit::keyboard::KeyCode;
