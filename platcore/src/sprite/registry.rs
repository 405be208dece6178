use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{decode_sprite, Sprite, SpriteError};

/// Dense handle to a sprite in a [`SpriteRegistry`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpriteId(pub u32);

impl SpriteId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("sprite '{0}' is not loaded")]
    MissingSprite(String),
    #[error("sprite '{0}' has no hitbox in any frame")]
    MissingHitbox(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        source: SpriteError,
    },
}

/// All sprites loaded for a session, addressed by name or by [`SpriteId`].
///
/// Built once during asset loading and passed by reference afterwards.
#[derive(Debug, Default)]
pub struct SpriteRegistry {
    sprites: Vec<Sprite>,
    names: Vec<String>,
    ids: HashMap<String, SpriteId>,
}

impl SpriteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.aseprite` / `.ase` file in `dir`, keyed by file stem.
    ///
    /// Files are loaded in name order so ids are stable between runs.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let io_err = |source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_sprite = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("aseprite") || ext.eq_ignore_ascii_case("ase"));
            if is_sprite && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            registry.load_file(&path)?;
        }
        log::info!(
            "loaded {} sprites ({} pixel bytes) from {}",
            registry.len(),
            registry.pixel_bytes(),
            dir.display()
        );
        Ok(registry)
    }

    /// Load one sprite file and register it under its file stem.
    pub fn load_file(&mut self, path: &Path) -> Result<SpriteId, RegistryError> {
        let bytes = std::fs::read(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let sprite = decode_sprite(&bytes).map_err(|source| RegistryError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::debug!(
            "sprite '{}': {}x{}, {} frames",
            name,
            sprite.width,
            sprite.height,
            sprite.frame_count()
        );
        Ok(self.insert(name, sprite))
    }

    /// Register a sprite, replacing any previous sprite with the same name.
    pub fn insert(&mut self, name: impl Into<String>, sprite: Sprite) -> SpriteId {
        let name = name.into();
        if let Some(id) = self.ids.get(&name) {
            self.sprites[id.index()] = sprite;
            return *id;
        }
        let id = SpriteId(self.sprites.len() as u32);
        self.sprites.push(sprite);
        self.names.push(name.clone());
        self.ids.insert(name, id);
        id
    }

    pub fn id(&self, name: &str) -> Result<SpriteId, RegistryError> {
        self.ids
            .get(name)
            .copied()
            .ok_or_else(|| RegistryError::MissingSprite(name.to_string()))
    }

    /// Look up a sprite that is about to be used for collision.
    pub fn collider(&self, name: &str) -> Result<SpriteId, RegistryError> {
        let id = self.id(name)?;
        if !self.sprites[id.index()].has_hitbox() {
            return Err(RegistryError::MissingHitbox(name.to_string()));
        }
        Ok(id)
    }

    pub fn get(&self, id: SpriteId) -> Option<&Sprite> {
        self.sprites.get(id.index())
    }

    pub fn name(&self, id: SpriteId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpriteId, &Sprite)> {
        self.sprites
            .iter()
            .enumerate()
            .map(|(index, sprite)| (SpriteId(index as u32), sprite))
    }

    /// Decoded pixel bytes still held on the CPU.
    pub fn pixel_bytes(&self) -> usize {
        self.sprites.iter().map(|s| s.pixels.capacity()).sum()
    }

    /// Free every sprite's CPU pixels after GPU upload.
    pub fn release_pixels(&mut self) {
        for sprite in &mut self.sprites {
            sprite.release_pixels();
        }
    }
}

/// Sprites the player switches between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerSprites {
    pub idle: SpriteId,
    pub run: SpriteId,
    pub jump: SpriteId,
    pub fall: SpriteId,
    pub attack: SpriteId,
}

impl PlayerSprites {
    pub fn resolve(registry: &SpriteRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            idle: registry.collider("player_idle")?,
            run: registry.collider("player_run")?,
            jump: registry.collider("player_jump")?,
            fall: registry.collider("player_fall")?,
            attack: registry.collider("player_attack")?,
        })
    }
}

/// Sprites used by hostile mobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MobSprites {
    pub idle: SpriteId,
    pub run: SpriteId,
    pub hit: SpriteId,
}

impl MobSprites {
    pub fn resolve(registry: &SpriteRegistry) -> Result<Self, RegistryError> {
        Ok(Self {
            idle: registry.collider("mob_idle")?,
            run: registry.collider("mob_run")?,
            hit: registry.collider("mob_hit")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sprite::decode::tests::SpriteFile;

    fn with_hitbox() -> Vec<u8> {
        SpriteFile::new(8, 8)
            .frame(100)
            .layer("Hitbox")
            .raw_cell(0, 0, 0, 4, 4, &[0; 64])
            .build()
    }

    fn without_hitbox() -> Vec<u8> {
        SpriteFile::new(8, 8)
            .frame(100)
            .layer("Body")
            .raw_cell(0, 0, 0, 1, 1, &[9; 4])
            .build()
    }

    #[test]
    fn load_dir_keys_by_stem_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_sprite.aseprite"), with_hitbox()).unwrap();
        std::fs::write(dir.path().join("a_sprite.ase"), without_hitbox()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a sprite").unwrap();

        let registry = SpriteRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id("a_sprite").unwrap(), SpriteId(0));
        assert_eq!(registry.id("b_sprite").unwrap(), SpriteId(1));
        assert_eq!(registry.name(SpriteId(1)), Some("b_sprite"));
        assert_eq!(registry.pixel_bytes(), 4);
    }

    #[test]
    fn corrupt_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.aseprite");
        std::fs::write(&path, [0u8; 10]).unwrap();

        match SpriteRegistry::load_dir(dir.path()) {
            Err(RegistryError::Decode { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn collider_requires_a_hitbox() {
        let mut registry = SpriteRegistry::new();
        registry.insert("ghost", crate::sprite::decode_sprite(&without_hitbox()).unwrap());
        assert!(matches!(
            registry.collider("ghost"),
            Err(RegistryError::MissingHitbox(_))
        ));
        assert!(matches!(
            registry.id("nobody"),
            Err(RegistryError::MissingSprite(_))
        ));
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut registry = SpriteRegistry::new();
        let a = registry.insert("s", crate::sprite::decode_sprite(&without_hitbox()).unwrap());
        let b = registry.insert("s", crate::sprite::decode_sprite(&with_hitbox()).unwrap());
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(a).unwrap().has_hitbox());
    }
}
