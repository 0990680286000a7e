use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::layout::LayoutConfig;
use crate::schema::{EditorConfig, LegacyDocument, RevisionDocument};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str::<T>(&contents)?)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    info!("wrote {}", path.display());
    Ok(())
}

/// Loads a scenario file. Accepts a full construction config, a bare revision document,
/// or a bare legacy document; `character` overrides whatever the file names.
pub fn load_config(path: &Path, character: Option<&str>) -> Result<EditorConfig> {
    let value: serde_json::Value = read_json(path)?;
    let mut config = if value.get("scenarioData").is_some() || value.get("character").is_some() {
        serde_json::from_value::<EditorConfig>(value)?
    } else if value.get("questions").is_some() {
        let legacy: LegacyDocument = serde_json::from_value(value)?;
        EditorConfig {
            questions: Some(legacy.questions),
            ..Default::default()
        }
    } else {
        EditorConfig {
            scenario_data: Some(serde_json::from_value::<RevisionDocument>(value)?),
            ..Default::default()
        }
    };
    if let Some(character) = character {
        config.character = character.to_string();
    }
    info!("loaded scenario config from {}", path.display());
    Ok(config)
}

pub fn save_revision(path: &Path, doc: &RevisionDocument) -> Result<()> {
    write_json(path, doc)
}

pub fn save_legacy(path: &Path, doc: &LegacyDocument) -> Result<()> {
    write_json(path, doc)
}

/// No settings file means defaults.
pub fn load_layout_config(path: Option<&Path>) -> Result<LayoutConfig> {
    match path {
        Some(path) => read_json(path),
        None => Ok(LayoutConfig::default()),
    }
}
