use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::allocator::MAX_BEAMS_PER_TOOL;
use crate::host::Broadcast;
use crate::YardId;

pub const MIN_MULTIPLIER: f32 = 0.01;
pub const MAX_MULTIPLIER: f32 = 2.0;

/// Ordering applied to virtual (projected) targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildPattern {
    /// Nearest to the projector block first.
    #[default]
    FromProjector,
    /// Nearest to the projection's center first.
    FromCenter,
    /// Nearest to the tools first, so the corners fill in before the middle.
    FromCorners,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YardSettings {
    pub beam_count: u8,
    pub guide_enabled: bool,
    pub weld_multiplier: f32,
    pub grind_multiplier: f32,
    pub advanced_locking: bool,
    pub build_pattern: BuildPattern,
}

impl Default for YardSettings {
    fn default() -> Self {
        Self {
            beam_count: 3,
            guide_enabled: true,
            weld_multiplier: 0.1,
            grind_multiplier: 0.1,
            advanced_locking: false,
            build_pattern: BuildPattern::FromProjector,
        }
    }
}

impl YardSettings {
    /// Copy with every field forced into its valid range.
    #[must_use]
    pub fn clamped(&self) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let max_beams = MAX_BEAMS_PER_TOOL as u8;
        Self {
            beam_count: self.beam_count.clamp(1, max_beams),
            weld_multiplier: clamp_multiplier(self.weld_multiplier),
            grind_multiplier: clamp_multiplier(self.grind_multiplier),
            ..self.clone()
        }
    }

    pub fn beams(&self) -> usize {
        usize::from(self.beam_count).min(MAX_BEAMS_PER_TOOL)
    }
}

fn clamp_multiplier(value: f32) -> f32 {
    if value.is_nan() {
        return MIN_MULTIPLIER;
    }
    value.clamp(MIN_MULTIPLIER, MAX_MULTIPLIER)
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings store unavailable: {0}")]
    Unavailable(String),
    #[error("settings data malformed: {0}")]
    Malformed(String),
}

/// Persistence backend for the whole yard→settings map.
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError>;
    fn save(&self, entries: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError>;
}

/// Store that keeps the last saved map in memory.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    saved: Mutex<Option<BTreeMap<YardId, YardSettings>>>,
    saves: Mutex<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: BTreeMap<YardId, YardSettings>) -> Self {
        Self {
            saved: Mutex::new(Some(entries)),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn saved(&self) -> Option<BTreeMap<YardId, YardSettings>> {
        self.saved.lock().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError> {
        Ok(self.saved.lock().clone())
    }

    fn save(&self, entries: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError> {
        *self.saved.lock() = Some(entries.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}

impl<T: SettingsStore + ?Sized> SettingsStore for Arc<T> {
    fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError> {
        (**self).load()
    }

    fn save(&self, entries: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError> {
        (**self).save(entries)
    }
}

/// Per-yard settings shared between the session, the UI and the network
/// layer. Reads create defaults lazily; writes clamp, persist and broadcast.
pub struct SettingsRepository {
    store: Box<dyn SettingsStore>,
    entries: RwLock<BTreeMap<YardId, YardSettings>>,
    /// Held across snapshot and save, so the last save holds the newest map.
    saving: Mutex<()>,
    broadcast: Arc<dyn Broadcast>,
}

impl std::fmt::Debug for SettingsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsRepository")
            .field("entries", &*self.entries.read())
            .finish_non_exhaustive()
    }
}

impl SettingsRepository {
    /// Load persisted settings. A failing or malformed store falls back to an
    /// empty map; the failure is logged and never blocks the session.
    pub fn open(store: Box<dyn SettingsStore>, broadcast: Arc<dyn Broadcast>) -> Self {
        let entries = match store.load() {
            Ok(Some(entries)) => {
                tracing::info!(yards = entries.len(), "loaded yard settings");
                entries
                    .into_iter()
                    .map(|(id, s)| (id, s.clamped()))
                    .collect()
            }
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(%err, "yard settings unavailable, using defaults");
                BTreeMap::new()
            }
        };
        Self {
            store,
            entries: RwLock::new(entries),
            saving: Mutex::new(()),
            broadcast,
        }
    }

    pub fn get(&self, yard: YardId) -> YardSettings {
        if let Some(settings) = self.entries.read().get(&yard) {
            return settings.clone();
        }
        self.entries.write().entry(yard).or_default().clone()
    }

    /// Returns the stored (clamped) value.
    pub fn set(&self, yard: YardId, settings: &YardSettings) -> YardSettings {
        let clamped = settings.clamped();
        self.entries.write().insert(yard, clamped.clone());
        self.persist();
        self.broadcast.settings_changed(yard, &clamped);
        clamped
    }

    pub fn update(&self, yard: YardId, f: impl FnOnce(&mut YardSettings)) -> YardSettings {
        let mut settings = self.get(yard);
        f(&mut settings);
        self.set(yard, &settings)
    }

    /// Drop a yard's entry. Nothing is broadcast.
    pub fn remove(&self, yard: YardId) {
        if self.entries.write().remove(&yard).is_none() {
            return;
        }
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Concurrent writers save one at a time, each from a snapshot taken
    /// after the previous save finished.
    fn persist(&self) {
        let _saving = self.saving.lock();
        let entries = self.entries.read().clone();
        match self.store.save(&entries) {
            Ok(()) => tracing::debug!(yards = entries.len(), "yard settings saved"),
            Err(err) => tracing::error!(%err, "failed to save yard settings"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullBroadcast;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError> {
            Err(SettingsError::Malformed("truncated".to_string()))
        }

        fn save(&self, _: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError> {
            Err(SettingsError::Unavailable("read-only".to_string()))
        }
    }

    #[test]
    fn clamps_out_of_range_values() {
        let raw = YardSettings {
            beam_count: 9,
            weld_multiplier: 5.0,
            grind_multiplier: 0.0,
            ..YardSettings::default()
        };
        let clamped = raw.clamped();
        assert_eq!(clamped.beam_count, 3);
        assert!((clamped.weld_multiplier - MAX_MULTIPLIER).abs() < f32::EPSILON);
        assert!((clamped.grind_multiplier - MIN_MULTIPLIER).abs() < f32::EPSILON);

        let zero_beams = YardSettings {
            beam_count: 0,
            ..YardSettings::default()
        };
        assert_eq!(zero_beams.clamped().beam_count, 1);
    }

    #[test]
    fn broken_store_falls_back_to_defaults() {
        let repo = SettingsRepository::open(Box::new(BrokenStore), Arc::new(NullBroadcast));
        assert_eq!(repo.get(YardId(4)), YardSettings::default());
        let stored = repo.set(
            YardId(4),
            &YardSettings {
                beam_count: 2,
                ..YardSettings::default()
            },
        );
        // Save failure is logged, the in-memory value still changes.
        assert_eq!(stored.beam_count, 2);
        assert_eq!(repo.get(YardId(4)).beam_count, 2);
    }

    /// Sleeps through its first save.
    #[derive(Default)]
    struct SlowStore {
        inner: MemorySettingsStore,
        stalled: AtomicBool,
    }

    impl SettingsStore for SlowStore {
        fn load(&self) -> Result<Option<BTreeMap<YardId, YardSettings>>, SettingsError> {
            self.inner.load()
        }

        fn save(&self, entries: &BTreeMap<YardId, YardSettings>) -> Result<(), SettingsError> {
            if !self.stalled.swap(true, Ordering::AcqRel) {
                std::thread::sleep(Duration::from_millis(200));
            }
            self.inner.save(entries)
        }
    }

    #[test]
    fn concurrent_sets_persist_the_newest_map() {
        let store = Arc::new(SlowStore::default());
        let repo = SettingsRepository::open(Box::new(Arc::clone(&store)), Arc::new(NullBroadcast));
        let two_beams = YardSettings {
            beam_count: 2,
            ..YardSettings::default()
        };

        std::thread::scope(|scope| {
            scope.spawn(|| repo.set(YardId(1), &two_beams));
            std::thread::sleep(Duration::from_millis(50));
            repo.set(YardId(2), &two_beams);
        });

        let saved = store.inner.saved().unwrap();
        assert_eq!(saved.keys().copied().collect::<Vec<_>>(), vec![YardId(1), YardId(2)]);
        assert_eq!(store.inner.save_count(), 2);
    }

    #[test]
    fn get_creates_defaults_lazily() {
        let repo = SettingsRepository::open(
            Box::new(MemorySettingsStore::new()),
            Arc::new(NullBroadcast),
        );
        assert!(repo.is_empty());
        let _ = repo.get(YardId(1));
        assert_eq!(repo.len(), 1);
    }
}
