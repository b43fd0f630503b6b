//! Durable key-value backends for the settings record.

use std::{
    collections::HashMap,
    fs, io,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anthill_types::{AnthillError, Result};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

/// Browser-style scoped storage: string values under string keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Whether `set` returns without waiting on I/O.
    fn is_non_blocking(&self) -> bool {
        false
    }
}

/// Process-local store, mostly for tests and headless runs.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AnthillError::Ops("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AnthillError::PersistenceWrite("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn is_non_blocking(&self) -> bool {
        true
    }
}

/// One `<key>.json` file per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(AnthillError::Configuration(format!(
                "storage key '{key}' must be alphanumeric"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(AnthillError::Ops(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, value))
            .map_err(|err| {
                AnthillError::PersistenceWrite(format!("{}: {err}", path.display()))
            })
    }
}

/// Write-behind wrapper: `set` updates an in-memory cache and queues the
/// write for a background task, so callers on the tick path never block on
/// disk. Dropping the store lets the writer drain its queue and exit.
pub struct DeferredKeyValueStore {
    cache: Mutex<HashMap<String, String>>,
    inner: Arc<dyn KeyValueStore>,
    tx: mpsc::UnboundedSender<(String, String)>,
}

impl DeferredKeyValueStore {
    /// Must be called from within a tokio runtime.
    pub fn spawn(inner: Arc<dyn KeyValueStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, String)>();
        let writer = inner.clone();
        let handle = tokio::spawn(async move {
            while let Some((key, value)) = rx.recv().await {
                let backend = writer.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || backend.set(&key, &value)).await;
                match outcome {
                    Ok(Ok(())) => debug!("Deferred settings write flushed"),
                    Ok(Err(err)) => warn!("Deferred settings write failed: {err}"),
                    Err(err) => warn!("Deferred settings writer panicked: {err}"),
                }
            }
        });
        (
            Self {
                cache: Mutex::new(HashMap::new()),
                inner,
                tx,
            },
            handle,
        )
    }
}

impl KeyValueStore for DeferredKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let cached = self
            .cache
            .lock()
            .map_err(|_| AnthillError::Ops("deferred cache poisoned".into()))?
            .get(key)
            .cloned();
        match cached {
            Some(value) => Ok(Some(value)),
            None => self.inner.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.cache
            .lock()
            .map_err(|_| AnthillError::PersistenceWrite("deferred cache poisoned".into()))?
            .insert(key.to_string(), value.to_string());
        self.tx
            .send((key.to_string(), value.to_string()))
            .map_err(|_| AnthillError::PersistenceWrite("deferred writer stopped".into()))
    }

    fn is_non_blocking(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trips_and_reports_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path().join("state"));
        assert_eq!(store.get("antSimulationSettings").unwrap(), None);
        store.set("antSimulationSettings", "{\"maxAnts\":5}").unwrap();
        assert_eq!(
            store.get("antSimulationSettings").unwrap().as_deref(),
            Some("{\"maxAnts\":5}")
        );
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyValueStore::new(dir.path());
        assert!(store.set("../escape", "x").is_err());
        assert!(store.get("a/b").is_err());
    }

    #[test]
    fn file_store_write_failure_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let store = FileKeyValueStore::new(&blocker);
        let err = store.set("key", "value").unwrap_err();
        assert!(matches!(err, AnthillError::PersistenceWrite(_)));
    }

    #[tokio::test]
    async fn deferred_store_serves_cache_and_flushes_on_drop() {
        let backing = MemoryKeyValueStore::new();
        let (store, writer) = DeferredKeyValueStore::spawn(Arc::new(backing.clone()));

        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

        drop(store);
        writer.await.unwrap();
        assert_eq!(backing.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn only_disk_store_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileKeyValueStore::new(dir.path());
        assert!(!file.is_non_blocking());
        assert!(MemoryKeyValueStore::new().is_non_blocking());

        let (deferred, writer) = DeferredKeyValueStore::spawn(Arc::new(file));
        assert!(deferred.is_non_blocking());
        drop(deferred);
        writer.await.unwrap();
    }
}
