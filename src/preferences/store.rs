//! Key→value stores backing the preference table.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::PreferenceKey;

/// External lookup of user-configured values by key.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Flat TOML table of level preferences.
///
/// ```toml
/// level_driving = "highest"
/// level_night_still = 0
/// ```
///
/// Values may be level names or ordinals. A missing file is an empty store.
#[derive(Debug, Clone)]
pub struct TomlPreferenceStore {
    path: PathBuf,
    values: HashMap<String, String>,
}

impl TomlPreferenceStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log_debug!("No preference file at {}, using defaults", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                values: HashMap::new(),
            });
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
        let mut store = Self::parse(&content)
            .with_context(|| format!("Failed to parse preferences from {}", path.display()))?;
        store.path = path.to_path_buf();
        Ok(store)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let mut values = HashMap::new();

        for (key, value) in table {
            if PreferenceKey::from_key(&key).is_none() {
                log_warning!("Unknown preference key '{}' ignored", key);
                continue;
            }
            let raw = match value {
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::String(s) => s,
                other => {
                    log_warning!("Preference '{}' has unsupported value {}", key, other);
                    continue;
                }
            };
            values.insert(key, raw);
        }

        Ok(Self {
            path: PathBuf::new(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use crate::brightness::BrightnessLevel;
    use crate::preferences::{DayPeriod, LevelSource, resolve_level};
    use tempfile::tempdir;

    #[test]
    fn test_parse_names_and_ordinals() {
        crate::logger::Log::set_enabled(false);
        let store = TomlPreferenceStore::parse(
            "level_driving = \"medium\"\nlevel_night_still = 3\nlevel_flying = 4\nlevel_walking = 1.5\n",
        )
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("level_driving").as_deref(), Some("medium"));
        assert_eq!(store.get("level_night_still").as_deref(), Some("3"));
        assert_eq!(store.get("level_flying"), None);
        assert_eq!(store.get("level_walking"), None);

        let resolved = resolve_level(&store, ActivityType::Still, DayPeriod::Night);
        assert_eq!(resolved.level, BrightnessLevel::MediumHigh);
        assert_eq!(resolved.source, LevelSource::Configured);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempdir().unwrap();
        let store = TomlPreferenceStore::load(&dir.path().join("levels.toml")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("levels.toml");
        fs::write(&path, "level_running = \"lowest\"\n").unwrap();

        let store = TomlPreferenceStore::load(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert_eq!(
            resolve_level(&store, ActivityType::Running, DayPeriod::Day).level,
            BrightnessLevel::Lowest
        );
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("levels.toml");
        fs::write(&path, "level_running = [").unwrap();
        assert!(TomlPreferenceStore::load(&path).is_err());
    }
}
