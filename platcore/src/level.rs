//! Tile grids, levels and LDtk project loading.
//!
//! Only the subset of the LDtk JSON format the game needs is read: tileset
//! definitions with their `Collide` enum tags, and per level the `Player`,
//! `Enemies` and `Tiles` layers.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::entity::{Entity, EntityKind};
use crate::grid::{Grid, GridCoord};
use crate::math::IVec2;
use crate::sprite::SpriteId;

/// Maximum number of stacked atlas tiles drawn in one grid cell.
pub const MAX_TILE_LAYERS: usize = 4;

/// Enum tag marking tileset tiles as solid.
pub const COLLIDE_TAG: &str = "Collide";

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid level JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("project contains no levels")]
    NoLevels,
    #[error("level '{0}' has no player spawn")]
    MissingPlayer(String),
    #[error("level '{0}' has no Tiles layer")]
    MissingTiles(String),
    #[error("level '{level}' references unknown tileset {uid}")]
    UnknownTileset { level: String, uid: i64 },
    #[error("level '{level}' has invalid grid size {size}")]
    InvalidGridSize { level: String, size: i32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TileKind {
    #[default]
    Empty,
    Decorative,
    Collidable,
}

/// One grid cell: its collision class plus up to [`MAX_TILE_LAYERS`] atlas
/// source positions, bottom layer first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tile {
    pub kind: TileKind,
    sources: [IVec2; MAX_TILE_LAYERS],
    count: u8,
}

impl Tile {
    /// Stack another atlas tile on this cell. Returns `false` when full.
    pub fn push_layer(&mut self, src: IVec2, collidable: bool) -> bool {
        let index = usize::from(self.count);
        if index >= MAX_TILE_LAYERS {
            return false;
        }
        self.sources[index] = src;
        self.count += 1;
        self.kind = match (self.kind, collidable) {
            (_, true) | (TileKind::Collidable, _) => TileKind::Collidable,
            _ => TileKind::Decorative,
        };
        true
    }

    /// Atlas pixel positions of each stacked layer.
    pub fn layers(&self) -> &[IVec2] {
        &self.sources[..usize::from(self.count)]
    }

    pub fn is_collidable(&self) -> bool {
        self.kind == TileKind::Collidable
    }
}

/// Level tiles in row-major order.
#[derive(Clone, Debug)]
pub struct TileGrid {
    grid: Grid<Tile>,
}

impl TileGrid {
    pub fn new(width: usize, height: usize, tile_size: i32) -> Self {
        Self {
            grid: Grid::new(width, height, tile_size, Tile::default()),
        }
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn tile_size(&self) -> i32 {
        self.grid.cell_size()
    }

    pub fn get(&self, tx: i32, ty: i32) -> Option<&Tile> {
        self.grid.get(GridCoord::new(tx, ty))
    }

    pub fn get_mut(&mut self, tx: i32, ty: i32) -> Option<&mut Tile> {
        self.grid.get_mut(GridCoord::new(tx, ty))
    }

    /// Out-of-range cells are never collidable.
    pub fn is_collidable(&self, tx: i32, ty: i32) -> bool {
        self.get(tx, ty).is_some_and(Tile::is_collidable)
    }

    /// Cell containing a world pixel.
    pub fn tile_at(&self, world: IVec2) -> GridCoord {
        self.grid.world_to_grid(world)
    }

    /// Non-empty tiles with their world positions, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (IVec2, &Tile)> {
        let grid = &self.grid;
        grid.iter()
            .filter(|(_, tile)| tile.kind != TileKind::Empty)
            .map(move |(coord, tile)| (grid.grid_to_world(coord), tile))
    }
}

/// One playable level.
#[derive(Clone, Debug)]
pub struct Level {
    pub name: String,
    pub player: Entity,
    pub mobs: Vec<Entity>,
    pub tiles: TileGrid,
    pub width_px: i32,
    pub height_px: i32,
    /// Tileset image path relative to the project file.
    pub tileset: Option<String>,
}

impl Level {
    /// Put every entity back at its spawn point.
    pub fn reset(&mut self, player_sprite: SpriteId, mob_sprite: SpriteId) {
        self.player.reset(player_sprite);
        for mob in &mut self.mobs {
            mob.reset(mob_sprite);
        }
    }
}

#[derive(Deserialize)]
struct Project {
    defs: Defs,
    levels: Vec<LevelDef>,
}

#[derive(Deserialize)]
struct Defs {
    #[serde(default)]
    tilesets: Vec<TilesetDef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TilesetDef {
    uid: i64,
    #[serde(default)]
    rel_path: Option<String>,
    #[serde(default)]
    enum_tags: Vec<EnumTag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnumTag {
    enum_value_id: String,
    tile_ids: Vec<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LevelDef {
    identifier: String,
    px_wid: i32,
    px_hei: i32,
    #[serde(default)]
    layer_instances: Option<Vec<LayerInstance>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayerInstance {
    #[serde(rename = "__identifier")]
    identifier: String,
    #[serde(rename = "__gridSize")]
    grid_size: i32,
    #[serde(rename = "__cWid")]
    c_wid: usize,
    #[serde(rename = "__cHei")]
    c_hei: usize,
    #[serde(rename = "__tilesetDefUid", default)]
    tileset_def_uid: Option<i64>,
    #[serde(default)]
    entity_instances: Vec<EntityInstance>,
    #[serde(default)]
    grid_tiles: Vec<TileInstance>,
    #[serde(default)]
    auto_layer_tiles: Vec<TileInstance>,
}

#[derive(Deserialize)]
struct EntityInstance {
    px: [i32; 2],
}

#[derive(Deserialize)]
struct TileInstance {
    px: [i32; 2],
    src: [i32; 2],
    t: i64,
}

/// Read and parse an LDtk project file.
pub fn load_levels_file(
    path: impl AsRef<Path>,
    player_sprite: SpriteId,
    mob_sprite: SpriteId,
) -> Result<Vec<Level>, LevelError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| LevelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_levels(&json, player_sprite, mob_sprite)
}

/// Parse every level of an LDtk project.
pub fn load_levels(
    json: &str,
    player_sprite: SpriteId,
    mob_sprite: SpriteId,
) -> Result<Vec<Level>, LevelError> {
    let project: Project = serde_json::from_str(json)?;
    if project.levels.is_empty() {
        return Err(LevelError::NoLevels);
    }

    let levels = project
        .levels
        .iter()
        .map(|def| build_level(&project.defs, def, player_sprite, mob_sprite))
        .collect::<Result<Vec<_>, _>>()?;
    log::info!("loaded {} levels", levels.len());
    Ok(levels)
}

fn build_level(
    defs: &Defs,
    def: &LevelDef,
    player_sprite: SpriteId,
    mob_sprite: SpriteId,
) -> Result<Level, LevelError> {
    let layers = def.layer_instances.as_deref().unwrap_or(&[]);
    let find = |name: &str| layers.iter().find(|layer| layer.identifier == name);

    let spawn = find("Player")
        .and_then(|layer| layer.entity_instances.first())
        .map(|e| IVec2::new(e.px[0], e.px[1]))
        .ok_or_else(|| LevelError::MissingPlayer(def.identifier.clone()))?;
    let player = Entity::new(EntityKind::Player, spawn, player_sprite);

    let mobs = find("Enemies")
        .map(|layer| {
            layer
                .entity_instances
                .iter()
                .map(|e| Entity::new(EntityKind::Mob, IVec2::new(e.px[0], e.px[1]), mob_sprite))
                .collect()
        })
        .unwrap_or_default();

    let tile_layer = find("Tiles").ok_or_else(|| LevelError::MissingTiles(def.identifier.clone()))?;
    let tileset = match tile_layer.tileset_def_uid {
        Some(uid) => Some(
            defs.tilesets
                .iter()
                .find(|t| t.uid == uid)
                .ok_or_else(|| LevelError::UnknownTileset {
                    level: def.identifier.clone(),
                    uid,
                })?,
        ),
        None => None,
    };
    let collide_ids: &[i64] = tileset
        .and_then(|t| t.enum_tags.iter().find(|tag| tag.enum_value_id == COLLIDE_TAG))
        .map(|tag| tag.tile_ids.as_slice())
        .unwrap_or(&[]);

    if tile_layer.grid_size <= 0 {
        return Err(LevelError::InvalidGridSize {
            level: def.identifier.clone(),
            size: tile_layer.grid_size,
        });
    }
    let mut tiles = TileGrid::new(tile_layer.c_wid, tile_layer.c_hei, tile_layer.grid_size);
    let mut overflow = 0usize;
    for record in tile_layer.auto_layer_tiles.iter().chain(&tile_layer.grid_tiles) {
        let cell = tiles.tile_at(IVec2::new(record.px[0], record.px[1]));
        let Some(tile) = tiles.get_mut(cell.x, cell.y) else {
            continue;
        };
        let src = IVec2::new(record.src[0], record.src[1]);
        if !tile.push_layer(src, collide_ids.contains(&record.t)) {
            overflow += 1;
        }
    }
    if overflow > 0 {
        log::warn!(
            "level '{}': {} tiles exceed {} layers per cell and were dropped",
            def.identifier,
            overflow,
            MAX_TILE_LAYERS
        );
    }

    Ok(Level {
        name: def.identifier.clone(),
        player,
        mobs,
        tiles,
        width_px: def.px_wid,
        height_px: def.px_hei,
        tileset: tileset.and_then(|t| t.rel_path.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECT: &str = r#"{
        "defs": {
            "tilesets": [{
                "uid": 7,
                "relPath": "tiles.png",
                "tileGridSize": 16,
                "enumTags": [
                    { "enumValueId": "Collide", "tileIds": [1] },
                    { "enumValueId": "Water", "tileIds": [2] }
                ]
            }]
        },
        "levels": [{
            "identifier": "Level_0",
            "pxWid": 48,
            "pxHei": 32,
            "layerInstances": [
                {
                    "__identifier": "Player", "__gridSize": 16, "__cWid": 3, "__cHei": 2,
                    "entityInstances": [{ "px": [8, 16] }]
                },
                {
                    "__identifier": "Enemies", "__gridSize": 16, "__cWid": 3, "__cHei": 2,
                    "entityInstances": [{ "px": [40, 16] }, { "px": [24, 16] }]
                },
                {
                    "__identifier": "Tiles", "__gridSize": 16, "__cWid": 3, "__cHei": 2,
                    "__tilesetDefUid": 7,
                    "gridTiles": [
                        { "px": [0, 16], "src": [16, 0], "t": 1 },
                        { "px": [16, 16], "src": [32, 0], "t": 2 },
                        { "px": [16, 16], "src": [16, 0], "t": 1 }
                    ],
                    "autoLayerTiles": [
                        { "px": [32, 0], "src": [0, 0], "t": 0 }
                    ]
                }
            ]
        }]
    }"#;

    fn levels() -> Vec<Level> {
        load_levels(PROJECT, SpriteId(0), SpriteId(1)).unwrap()
    }

    #[test]
    fn loads_entities_and_tiles() {
        let levels = levels();
        assert_eq!(levels.len(), 1);
        let level = &levels[0];
        assert_eq!((level.width_px, level.height_px), (48, 32));
        assert_eq!(level.player.position, IVec2::new(8, 16));
        assert_eq!(level.player.anim.sprite, SpriteId(0));
        assert_eq!(level.mobs.len(), 2);
        assert_eq!(level.mobs[0].kind, EntityKind::Mob);
        assert_eq!(level.tileset.as_deref(), Some("tiles.png"));

        let tiles = &level.tiles;
        assert_eq!((tiles.width(), tiles.height(), tiles.tile_size()), (3, 2, 16));
        assert!(tiles.is_collidable(0, 1));
        // A decorative tile topped by a collidable one is collidable.
        assert!(tiles.is_collidable(1, 1));
        assert_eq!(tiles.get(1, 1).unwrap().layers().len(), 2);
        assert_eq!(tiles.get(2, 0).unwrap().kind, TileKind::Decorative);
        assert_eq!(tiles.get(0, 0).unwrap().kind, TileKind::Empty);
        assert_eq!(tiles.iter().count(), 3);
    }

    #[test]
    fn out_of_bounds_is_not_collidable() {
        let level = &levels()[0];
        assert!(!level.tiles.is_collidable(3, 1));
        assert!(!level.tiles.is_collidable(0, 2));
        assert!(!level.tiles.is_collidable(-1, 1));
        assert!(!level.tiles.is_collidable(i32::MAX, i32::MIN));
    }

    #[test]
    fn tile_layers_are_capped() {
        let mut tile = Tile::default();
        for i in 0..MAX_TILE_LAYERS as i32 {
            assert!(tile.push_layer(IVec2::new(i, 0), false));
        }
        assert!(!tile.push_layer(IVec2::ZERO, true));
        assert_eq!(tile.layers().len(), MAX_TILE_LAYERS);
        assert_eq!(tile.kind, TileKind::Decorative);
    }

    #[test]
    fn missing_player_is_an_error() {
        let json = PROJECT.replace("\"Player\"", "\"Nobody\"");
        assert!(matches!(
            load_levels(&json, SpriteId(0), SpriteId(1)),
            Err(LevelError::MissingPlayer(name)) if name == "Level_0"
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            load_levels("{", SpriteId(0), SpriteId(1)),
            Err(LevelError::Parse(_))
        ));
    }

    #[test]
    fn non_positive_grid_size_is_rejected() {
        for size in ["0", "-16"] {
            let json = PROJECT.replace(
                "\"Tiles\", \"__gridSize\": 16",
                &format!("\"Tiles\", \"__gridSize\": {size}"),
            );
            assert!(matches!(
                load_levels(&json, SpriteId(0), SpriteId(1)),
                Err(LevelError::InvalidGridSize { level, .. }) if level == "Level_0"
            ));
        }
    }
}
