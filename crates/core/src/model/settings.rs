use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::{StateStorage, load_json, save_json};

fn default_true() -> bool {
    true
}

/// Player and navigation preferences, persisted as a flat key/value map.
///
/// Unrecognized keys are preserved through load/save so older and newer
/// clients can share one settings blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Use the integrated player instead of linking out.
    #[serde(default = "default_true")]
    pub player: bool,
    /// Autoplay the integrated player on click.
    #[serde(default = "default_true")]
    pub autoplay: bool,
    /// Fullscreen the integrated player.
    #[serde(default = "default_true")]
    pub use_fullscreen: bool,
    /// Use the integrated player on mobile layouts.
    #[serde(default)]
    pub player_mobile: bool,
    /// Active series key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// Active profile index within the series.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            player: true,
            autoplay: true,
            use_fullscreen: true,
            player_mobile: false,
            series: None,
            profile: None,
            extra: BTreeMap::new(),
        }
    }
}

/// Persisted settings with default-filling on load.
///
/// Keys absent from storage are populated with their defaults and written
/// back once; values already present are never overwritten. There is no
/// versioning beyond this.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    settings: Settings,
}

impl SettingsStore {
    pub const STORAGE_KEY: &'static str = "settings";

    const BOOL_KEYS: [&'static str; 4] = ["player", "autoplay", "use_fullscreen", "player_mobile"];

    pub fn load(storage: &mut dyn StateStorage) -> Self {
        let raw: Option<serde_json::Map<String, serde_json::Value>> =
            load_json(storage, Self::STORAGE_KEY);
        let (settings, fill_needed) = match raw {
            None => (Settings::default(), true),
            Some(map) => {
                let missing = Self::BOOL_KEYS.iter().any(|key| !map.contains_key(*key));
                match serde_json::from_value(serde_json::Value::Object(map)) {
                    Ok(settings) => (settings, missing),
                    Err(err) => {
                        log::warn!("unreadable settings, falling back to defaults: {err}");
                        (Settings::default(), true)
                    }
                }
            }
        };
        let store = Self { settings };
        if fill_needed {
            store.save(storage);
        }
        store
    }

    pub fn save(&self, storage: &mut dyn StateStorage) -> bool {
        save_json(storage, Self::STORAGE_KEY, &self.settings)
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
