use anyhow::Result;
use platcore::{Engine, EngineConfig, PlatformerGame};

/// Optional overrides; every field falls back to its default.
const CONFIG_PATH: &str = "platformer.json";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = EngineConfig::load_or_default(&path)?;
    log::info!(
        "starting '{}' with sprites from {}",
        config.title,
        config.sprite_dir.display()
    );

    Engine::new()
        .with_config(config)
        .run(PlatformerGame::new())
}
