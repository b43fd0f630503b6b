//! Session-scoped performance settings with durable persistence.

use anthill_types::{
    settings::{PerformanceSettings, SettingsPatch},
    AnthillError, Result,
};
use futures::{stream::BoxStream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

pub mod storage;

pub use storage::{DeferredKeyValueStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};

/// Owns the live [`PerformanceSettings`] of one session.
///
/// Every update is persisted under a fixed key and re-applied to consumers
/// subscribed through [`SettingsStore::subscribe`] or [`SettingsStore::changes`].
pub struct SettingsStore {
    key: String,
    backend: Box<dyn KeyValueStore>,
    current: PerformanceSettings,
    applied: watch::Sender<PerformanceSettings>,
}

impl SettingsStore {
    /// Store holding compiled-in defaults; nothing is read yet.
    pub fn new(key: impl Into<String>, backend: impl KeyValueStore + 'static) -> Self {
        let current = PerformanceSettings::default();
        let (applied, _) = watch::channel(current.clone());
        Self {
            key: key.into(),
            backend: Box::new(backend),
            current,
            applied,
        }
    }

    /// Loads persisted settings and applies them.
    pub fn open(key: impl Into<String>, backend: impl KeyValueStore + 'static) -> Self {
        let mut store = Self::new(key, backend);
        store.load();
        store.apply();
        store
    }

    /// Whether `save` can run on a frame path without waiting on disk.
    pub fn is_non_blocking(&self) -> bool {
        self.backend.is_non_blocking()
    }

    pub fn current(&self) -> &PerformanceSettings {
        &self.current
    }

    /// Rebuilds the configuration from defaults plus whatever well-typed keys
    /// are persisted. Never fails; problems are logged.
    pub fn load(&mut self) -> &PerformanceSettings {
        let mut settings = PerformanceSettings::default();
        match self.backend.get(&self.key) {
            Ok(Some(raw)) => match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(persisted) => {
                    let rejected = settings.merge_persisted(&persisted);
                    if !rejected.is_empty() {
                        warn!(
                            "Ignoring invalid persisted settings keys {:?}; defaults kept",
                            rejected
                        );
                    }
                    info!("Loaded settings from '{}'", self.key);
                }
                Err(err) => warn!("Persisted settings are malformed, using defaults: {err}"),
            },
            Ok(None) => debug!("No persisted settings under '{}'", self.key),
            Err(err) => warn!("Unable to read persisted settings: {err}"),
        }
        self.current = settings;
        &self.current
    }

    /// Writes the full configuration to the backend.
    pub fn save(&self) -> Result<()> {
        let doc = serde_json::to_string(&self.current)
            .map_err(|err| AnthillError::PersistenceWrite(format!("serialize settings: {err}")))?;
        self.backend.set(&self.key, &doc)?;
        debug!("Saved settings under '{}'", self.key);
        Ok(())
    }

    /// Publishes the configuration to consumers. Idempotent: subscribers are
    /// only woken when the published value actually differs.
    pub fn apply(&self) {
        let current = &self.current;
        let changed = self.applied.send_if_modified(|live| {
            if *live != *current {
                *live = current.clone();
                true
            } else {
                false
            }
        });
        if changed {
            debug!("Applied performance settings: {:?}", current);
        }
    }

    /// Merges `patch`, then persists and applies. Returns whether any field
    /// changed. Persistence failures are logged; the in-memory value wins.
    pub fn update(&mut self, patch: &SettingsPatch) -> Result<bool> {
        patch.validate()?;
        let changed = self.current.merge(patch);
        self.commit();
        Ok(changed)
    }

    /// Restores compiled-in defaults, undoing any governor mitigations.
    pub fn reset(&mut self) {
        self.current = PerformanceSettings::default();
        info!("Performance settings reset to defaults");
        self.commit();
    }

    pub fn subscribe(&self) -> watch::Receiver<PerformanceSettings> {
        self.applied.subscribe()
    }

    /// Stream of applied configurations, starting with the current one.
    pub fn changes(&self) -> BoxStream<'static, PerformanceSettings> {
        WatchStream::new(self.applied.subscribe()).boxed()
    }

    fn commit(&self) {
        if let Err(err) = self.save() {
            warn!("Settings not persisted, continuing with in-memory values: {err}");
        }
        self.apply();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anthill_types::settings::{Quality, RecoveryMethod};

    const KEY: &str = "antSimulationSettings";

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(AnthillError::Ops("storage disabled".into()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(AnthillError::PersistenceWrite("quota exceeded".into()))
        }
    }

    #[test]
    fn load_without_persisted_data_uses_defaults() {
        let store = SettingsStore::open(KEY, MemoryKeyValueStore::new());
        assert_eq!(store.current(), &PerformanceSettings::default());
    }

    #[test]
    fn load_merges_partial_data_over_defaults() {
        let backend = MemoryKeyValueStore::new();
        backend
            .set(KEY, r#"{"maxAnts": 60, "recoveryMethod": "warpDrive", "quality": "medium"}"#)
            .unwrap();
        let store = SettingsStore::open(KEY, backend);
        let settings = store.current();
        assert_eq!(settings.max_ants, 60);
        assert_eq!(settings.quality, Quality::Medium);
        assert_eq!(settings.recovery_method, RecoveryMethod::ReduceAnts);
        assert_eq!(settings.fps_threshold, 15.0);
    }

    #[test]
    fn load_survives_malformed_and_unreadable_data() {
        let backend = MemoryKeyValueStore::new();
        backend.set(KEY, "{not json").unwrap();
        let store = SettingsStore::open(KEY, backend);
        assert_eq!(store.current(), &PerformanceSettings::default());

        let store = SettingsStore::open(KEY, BrokenStore);
        assert_eq!(store.current(), &PerformanceSettings::default());
    }

    #[test]
    fn update_persists_full_record() {
        let backend = MemoryKeyValueStore::new();
        let mut store = SettingsStore::open(KEY, backend.clone());
        let changed = store
            .update(&SettingsPatch {
                recovery_method: Some(RecoveryMethod::SkipFrames),
                max_ants: Some(40),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(changed);

        let persisted: PerformanceSettings =
            serde_json::from_str(&backend.get(KEY).unwrap().unwrap()).unwrap();
        assert_eq!(persisted, *store.current());

        let reopened = SettingsStore::open(KEY, backend);
        assert_eq!(reopened.current().recovery_method, RecoveryMethod::SkipFrames);
        assert_eq!(reopened.current().max_ants, 40);
    }

    #[test]
    fn update_rejects_invalid_patch_without_mutation() {
        let mut store = SettingsStore::open(KEY, MemoryKeyValueStore::new());
        let err = store
            .update(&SettingsPatch {
                fps_threshold: Some(0.0),
                max_ants: Some(1),
                ..SettingsPatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, AnthillError::Configuration(_)));
        assert_eq!(store.current(), &PerformanceSettings::default());
    }

    #[test]
    fn write_failure_keeps_in_memory_value() {
        let mut store = SettingsStore::open(KEY, BrokenStore);
        assert!(store.save().is_err());
        store
            .update(&SettingsPatch {
                auto_recovery: Some(false),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(!store.current().auto_recovery);
    }

    #[test]
    fn apply_notifies_only_on_change() {
        let mut store = SettingsStore::open(KEY, MemoryKeyValueStore::new());
        let mut rx = store.subscribe();
        store.apply();
        store.apply();
        assert!(!rx.has_changed().unwrap());

        store
            .update(&SettingsPatch {
                draw_distance: Some(400.0),
                ..SettingsPatch::default()
            })
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().draw_distance, 400.0);
    }

    #[test]
    fn reset_restores_defaults() {
        let backend = MemoryKeyValueStore::new();
        let mut store = SettingsStore::open(KEY, backend.clone());
        store
            .update(&SettingsPatch {
                quality: Some(Quality::High),
                ..SettingsPatch::default()
            })
            .unwrap();
        store.reset();
        assert_eq!(store.current(), &PerformanceSettings::default());
        let reopened = SettingsStore::open(KEY, backend);
        assert_eq!(reopened.current().quality, Quality::Low);
    }

    #[tokio::test]
    async fn changes_stream_starts_with_current_value() {
        let store = SettingsStore::open(KEY, MemoryKeyValueStore::new());
        let mut changes = store.changes();
        let first = changes.next().await.unwrap();
        assert_eq!(first, PerformanceSettings::default());
    }
}
