//! Best-effort key-value blob storage behind the [`SnapshotStore`] seam so
//! the session manager never touches a concrete store directly.

use fs2::FileExt;
use napi::bindgen_prelude::Result as NapiResult;
use napi_derive::napi;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use unicode_normalization::UnicodeNormalization;

use crate::CoreResult;

const RECORD_DIR: &str = "records";
const LOCK_FILE: &str = ".snapshot.lock";

/// One logical record per key, JSON payloads, last writer wins. No
/// durability guarantees beyond atomic replacement.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, key: &str) -> CoreResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> CoreResult<()>;
    fn remove(&self, key: &str) -> CoreResult<bool>;
}

pub struct FileSnapshotStore {
    record_dir: PathBuf,
    lock_path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root_dir: &str) -> CoreResult<Self> {
        let root = normalize_root_path(root_dir)?;
        let record_dir = root.join(RECORD_DIR);
        fs::create_dir_all(&record_dir).map_err(to_store_error)?;

        Ok(Self {
            lock_path: root.join(LOCK_FILE),
            record_dir,
        })
    }

    pub fn keys(&self) -> CoreResult<Vec<String>> {
        let _lock = lock_file(&self.lock_path, false)?;
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.record_dir).map_err(to_store_error)? {
            let entry = entry.map_err(to_store_error)?;
            if entry.file_type().map_err(to_store_error)?.is_file() {
                keys.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let key = sanitize_key(key)?;
        let path = self.record_dir.join(key);
        if !path.exists() {
            return Ok(None);
        }

        let _lock = lock_file(&self.lock_path, false)?;
        let value = fs::read_to_string(&path).map_err(to_store_error)?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let key = sanitize_key(key)?;
        let _lock = lock_file(&self.lock_path, true)?;

        let mut temp = NamedTempFile::new_in(&self.record_dir).map_err(to_store_error)?;
        temp.write_all(value.as_bytes()).map_err(to_store_error)?;
        temp.flush().map_err(to_store_error)?;

        let final_path = self.record_dir.join(key);
        temp.persist(&final_path).map_err(|err| err.error.to_string())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<bool> {
        let key = sanitize_key(key)?;
        let path = self.record_dir.join(key);
        let _lock = lock_file(&self.lock_path, true)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.to_string()),
        }
    }
}

/// In-memory store used by tests and ephemeral sessions. Clones share the
/// same backing map.
#[derive(Clone, Default)]
pub struct MemorySnapshotStore {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        let key = sanitize_key(key)?;
        let records = self
            .records
            .lock()
            .map_err(|_| "Store lock poisoned".to_string())?;
        Ok(records.get(&key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        let key = sanitize_key(key)?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| "Store lock poisoned".to_string())?;
        records.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> CoreResult<bool> {
        let key = sanitize_key(key)?;
        let mut records = self
            .records
            .lock()
            .map_err(|_| "Store lock poisoned".to_string())?;
        Ok(records.remove(&key).is_some())
    }
}

#[napi(js_name = "SnapshotStore")]
pub struct SnapshotStoreHandle {
    inner: Arc<FileSnapshotStore>,
}

#[napi]
impl SnapshotStoreHandle {
    #[napi(constructor)]
    pub fn new(root_dir: String) -> NapiResult<Self> {
        let store = FileSnapshotStore::new(&root_dir).map_err(to_napi_error)?;
        Ok(Self {
            inner: Arc::new(store),
        })
    }

    #[napi]
    pub fn get(&self, key: String) -> NapiResult<Option<String>> {
        self.inner.get(&key).map_err(to_napi_error)
    }

    #[napi]
    pub fn set(&self, key: String, value: String) -> NapiResult<()> {
        self.inner.set(&key, &value).map_err(to_napi_error)
    }

    #[napi]
    pub fn remove(&self, key: String) -> NapiResult<bool> {
        self.inner.remove(&key).map_err(to_napi_error)
    }

    #[napi]
    pub fn keys(&self) -> NapiResult<Vec<String>> {
        self.inner.keys().map_err(to_napi_error)
    }
}

fn normalize_root_path(input: &str) -> CoreResult<PathBuf> {
    let normalized = input.nfc().collect::<String>();
    let path = PathBuf::from(normalized);
    let absolute = if path.is_absolute() {
        path
    } else {
        let current = std::env::current_dir().map_err(to_store_error)?;
        current.join(path)
    };

    Ok(apply_long_path_prefix(absolute))
}

#[cfg(windows)]
fn apply_long_path_prefix(path: PathBuf) -> PathBuf {
    let path_str = path.to_string_lossy();
    if path_str.starts_with(r"\\?\") {
        return path;
    }
    if path_str.len() > 240 {
        return PathBuf::from(format!(r"\\?\{}", path_str));
    }
    path
}

#[cfg(not(windows))]
fn apply_long_path_prefix(path: PathBuf) -> PathBuf {
    path
}

fn sanitize_key(key: &str) -> CoreResult<String> {
    if key.is_empty() {
        return Err("Snapshot key cannot be empty".to_string());
    }
    if key.contains('/') || key.contains('\\') {
        return Err("Snapshot key cannot contain path separators".to_string());
    }
    if key.contains("..") {
        return Err("Snapshot key cannot contain parent traversal".to_string());
    }
    Ok(key.to_string())
}

fn lock_file(lock_path: &Path, write: bool) -> CoreResult<File> {
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(to_store_error)?;

    if write {
        file.lock_exclusive().map_err(to_store_error)?;
    } else {
        file.lock_shared().map_err(to_store_error)?;
    }

    Ok(file)
}

fn to_store_error(error: std::io::Error) -> String {
    error.to_string()
}

fn to_napi_error(error: String) -> napi::Error {
    napi::Error::from_reason(error)
}
