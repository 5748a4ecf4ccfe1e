//! File-backed store backend.
//!
//! Each namespace is one JSON object (`<name>.json`) under the provider
//! directory. Writes go to a temp file in the same directory followed by
//! a rename, so readers never observe a half-written namespace.
//!
//! `apply` updates the in-memory map synchronously (subsequent reads on
//! any thread see the new values) and hands the disk write to a
//! background thread; `commit` performs the disk write inline and
//! reports whether it succeeded.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;

use tracing::{debug, error, warn};

use crate::errors::{Result, VaultError};

use super::{validate_namespace_name, KeyValueStore, StoreBatch, StoreProvider};

struct FileStoreInner {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
    /// Bumped on every mutation; used to drop stale async writes.
    generation: AtomicU64,
    /// Guards disk I/O and records the newest generation on disk.
    persisted: Mutex<u64>,
}

impl FileStoreInner {
    /// Serialize the current map and write it atomically, unless a newer
    /// generation already reached the disk.
    fn write_snapshot(&self, generation: u64) -> Result<()> {
        let mut persisted = self.persisted.lock().expect("io lock poisoned");
        if *persisted >= generation {
            return Ok(());
        }

        let snapshot = self.map.read().expect("store lock poisoned").clone();
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| VaultError::Serialization(format!("namespace map: {e}")))?;

        // Atomic write: temp file in the same directory, then rename.
        let parent = self.path.parent().unwrap_or(Path::new("."));
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
        ));
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.path)?;

        *persisted = generation;
        Ok(())
    }

    /// Mutate the in-memory view and return the new generation number.
    fn apply_to_map(&self, batch: &StoreBatch) -> u64 {
        let mut map = self.map.write().expect("store lock poisoned");
        if batch.is_clear_all() {
            map.clear();
        }
        for key in batch.removes() {
            map.remove(key);
        }
        for (key, value) in batch.puts() {
            map.insert(key.clone(), value.clone());
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// One file-backed namespace.
pub(crate) struct FileStore {
    inner: Arc<FileStoreInner>,
}

impl FileStore {
    fn open(path: PathBuf) -> Self {
        let map = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    // A corrupt namespace file starts over empty; the
                    // vault's integrity model is per-value.
                    warn!(path = %path.display(), error = %e, "namespace file unreadable, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            inner: Arc::new(FileStoreInner {
                path,
                map: RwLock::new(map),
                generation: AtomicU64::new(0),
                persisted: Mutex::new(0),
            }),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner
            .map
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.inner
            .map
            .read()
            .expect("store lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    fn apply(&self, batch: StoreBatch) {
        let generation = self.inner.apply_to_map(&batch);
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            if let Err(e) = inner.write_snapshot(generation) {
                error!(path = %inner.path.display(), error = %e, "async store write failed");
            }
        });
    }

    fn commit(&self, batch: StoreBatch) -> bool {
        let generation = self.inner.apply_to_map(&batch);
        match self.inner.write_snapshot(generation) {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.inner.path.display(), error = %e, "store commit failed");
                false
            }
        }
    }
}

/// Provider mapping namespace names onto JSON files in one directory.
pub struct FileStoreProvider {
    dir: PathBuf,
    namespaces: Mutex<HashMap<String, Arc<FileStore>>>,
}

impl FileStoreProvider {
    /// Create a provider rooted at `dir`, creating the directory if
    /// needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            namespaces: Mutex::new(HashMap::new()),
        })
    }
}

impl StoreProvider for FileStoreProvider {
    fn open(&self, name: &str) -> Result<Arc<dyn KeyValueStore>> {
        validate_namespace_name(name)?;
        let mut namespaces = self.namespaces.lock().expect("provider lock poisoned");
        let store = namespaces.entry(name.to_string()).or_insert_with(|| {
            let path = self.dir.join(format!("{name}.json"));
            debug!(namespace = name, path = %path.display(), "opening namespace");
            Arc::new(FileStore::open(path))
        });
        Ok(Arc::clone(store) as Arc<dyn KeyValueStore>)
    }
}
