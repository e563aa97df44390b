//! Settings persisted as a JSON file next to the scenario or save.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use yard_core::{SettingsError, SettingsStore, YardId, YardSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsEntry {
    pub yard: YardId,
    pub settings: YardSettings,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SettingsFile {
    entries: Vec<SettingsEntry>,
}

#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn unavailable(&self, err: &std::io::Error) -> SettingsError {
        SettingsError::Unavailable(format!("{}: {err}", self.path.display()))
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.unavailable(&err)),
        };
        let file: SettingsFile =
            serde_json::from_str(&text).map_err(|e| SettingsError::Malformed(e.to_string()))?;
        Ok(Some(
            file.entries
                .into_iter()
                .map(|e| (e.yard, e.settings))
                .collect(),
        ))
    }

    fn save(&self, entries: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError> {
        let file = SettingsFile {
            entries: entries
                .iter()
                .map(|(yard, settings)| SettingsEntry {
                    yard: *yard,
                    settings: settings.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| SettingsError::Malformed(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| self.unavailable(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use yard_core::test_fixtures::settings_map;
    use yard_core::{NullBroadcast, SettingsRepository};

    #[test]
    fn test_missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSettingsStore::new(dir.path().join("settings.json"));
        let settings = YardSettings {
            beam_count: 2,
            advanced_locking: true,
            ..YardSettings::default()
        };
        store.save(&settings_map(YardId(7), settings.clone())).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.get(&YardId(7)), Some(&settings));
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonSettingsStore::new(&path);
        assert!(matches!(store.load(), Err(SettingsError::Malformed(_))));
    }

    #[test]
    fn test_repository_falls_back_to_defaults_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[]").unwrap();
        let repo = SettingsRepository::open(
            Box::new(JsonSettingsStore::new(&path)),
            Arc::new(NullBroadcast),
        );
        assert_eq!(repo.get(YardId(1)), YardSettings::default());
    }

    #[test]
    fn test_repository_writes_through_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let repo = SettingsRepository::open(
            Box::new(JsonSettingsStore::new(&path)),
            Arc::new(NullBroadcast),
        );
        repo.update(YardId(3), |s| s.beam_count = 1);

        let reopened = JsonSettingsStore::new(&path).load().unwrap().unwrap();
        assert_eq!(reopened.get(&YardId(3)).map(|s| s.beam_count), Some(1));
    }
}
