//! Remembers which discovery configs we published, so that entities
//! which disappear between runs (an alarm deleted in the Rémi app, for
//! example) can be removed from Home Assistant.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct PublishedEntity {
    pub unique_id: String,
    pub integration: String,
}

pub fn persistence_path() -> anyhow::Result<PathBuf> {
    let path = dirs_next::config_dir()
        .ok_or_else(|| anyhow!("No config dir found"))?
        .join("remi2mqtt");
    Ok(path.join("hass-entities.json"))
}

pub fn load_published_entities(path: &Path) -> anyhow::Result<HashSet<PublishedEntity>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(HashSet::new());
    }
    let entities: HashSet<PublishedEntity> = serde_json::from_str(&data)?;
    Ok(entities)
}

pub fn save_published_entities(
    path: &Path,
    entities: &HashSet<PublishedEntity>,
) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let mut sorted: Vec<&PublishedEntity> = entities.iter().collect();
    sorted.sort();
    let data = serde_json::to_string_pretty(&sorted)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Entities that were published previously but not this time around
pub fn stale_entities(
    previous: &HashSet<PublishedEntity>,
    current: &HashSet<PublishedEntity>,
) -> Vec<PublishedEntity> {
    let mut stale: Vec<PublishedEntity> = previous.difference(current).cloned().collect();
    stale.sort();
    stale
}
