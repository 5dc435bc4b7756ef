//! Persistent cache storage on the local filesystem.
//!
//! Each store is a single JSON file under the storage root:
//!
//! ```text
//! <root>/<encoded-name>.json
//! { "version": 1, "name": "astral-draft-v1", "entries": [ { "key": ..., "response": ... } ] }
//! ```
//!
//! A store is loaded when first opened and kept in memory afterwards. Every
//! `put`/`delete` rewrites the file atomically (tmp + rename) while holding
//! the store's write lock, so concurrent writes to the same key are
//! last-write-wins and the file never holds a torn write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use super::{CacheStorage, CacheStore};
use crate::types::{RequestKey, Response};
use crate::{AstralError, Result};

/// Maximum supported store file format version.
const MAX_SUPPORTED_VERSION: u32 = 1;

const STORE_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    name: String,
    #[serde(default)]
    entries: Vec<StoreEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreEntry {
    key: RequestKey,
    response: Response,
}

/// Parse a store file, rejecting unsupported versions.
fn parse_store_file(json: &str) -> Result<StoreFile> {
    let file: StoreFile = serde_json::from_str(json)?;
    if file.version > MAX_SUPPORTED_VERSION {
        return Err(AstralError::Storage(format!(
            "unsupported store version {} (max supported: {MAX_SUPPORTED_VERSION})",
            file.version
        )));
    }
    Ok(file)
}

/// Encode a store name into a file stem.
///
/// ASCII alphanumerics, `-`, `_` and `.` pass through; everything else
/// becomes `%XX` per UTF-8 byte, so distinct names never share a file.
fn encode_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            // A leading dot would make the file hidden.
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Inverse of [`encode_name`]. `None` for stems it could not have produced.
fn decode_name(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    let name = String::from_utf8(out).ok()?;
    (!name.is_empty() && encode_name(&name) == stem).then_some(name)
}

/// Write `file` to `path` via a tmp file + rename.
fn write_atomic(path: &Path, file: &StoreFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AstralError::Storage(format!(
                "failed to create storage dir {}: {e}",
                parent.display()
            ))
        })?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string(file)?;
    std::fs::write(&tmp_path, &json).map_err(|e| {
        AstralError::Storage(format!(
            "failed to write store file {}: {e}",
            tmp_path.display()
        ))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        AstralError::Storage(format!(
            "failed to rename store file {} → {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;
    Ok(())
}

/// Load store entries from disk.
///
/// Missing file → `Ok(None)`. Corrupt or unsupported file → empty store
/// with a warning, since a cache that cannot be read is just a cold cache.
fn load_entries(path: &Path) -> Result<Option<HashMap<RequestKey, Response>>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    match parse_store_file(&content) {
        Ok(file) => Ok(Some(
            file.entries
                .into_iter()
                .map(|entry| (entry.key, entry.response))
                .collect(),
        )),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache store, starting empty");
            Ok(Some(HashMap::new()))
        }
    }
}

/// A store backed by one JSON file.
pub struct DiskStore {
    name: String,
    path: PathBuf,
    entries: AsyncMutex<HashMap<RequestKey, Response>>,
    /// Set once the store has been deleted from its storage. Writes after
    /// that stay in memory so a stale handle cannot resurrect the file.
    detached: AtomicBool,
}

impl DiskStore {
    fn open(name: &str, path: PathBuf) -> Result<Self> {
        let (entries, existed) = match load_entries(&path)? {
            Some(entries) => (entries, true),
            None => (HashMap::new(), false),
        };
        let store = Self {
            name: name.to_string(),
            path,
            entries: AsyncMutex::new(entries),
            detached: AtomicBool::new(false),
        };
        if !existed {
            write_atomic(&store.path, &store.snapshot(&HashMap::new()))?;
            debug!(store = %store.name, path = %store.path.display(), "created cache store");
        }
        Ok(store)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self, entries: &HashMap<RequestKey, Response>) -> StoreFile {
        let mut entries: Vec<StoreEntry> = entries
            .iter()
            .map(|(key, response)| StoreEntry {
                key: key.clone(),
                response: response.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.url().cmp(b.key.url()));
        StoreFile {
            version: MAX_SUPPORTED_VERSION,
            name: self.name.clone(),
            entries,
        }
    }

    fn persist(&self, entries: &HashMap<RequestKey, Response>) -> Result<()> {
        if self.detached.load(Ordering::Acquire) {
            return Ok(());
        }
        write_atomic(&self.path, &self.snapshot(entries))
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &RequestKey) -> Result<Option<Response>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: RequestKey, response: Response) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.clone(), response);
        if let Err(e) = self.persist(&entries) {
            // Keep memory and disk in agreement.
            match previous {
                Some(previous) => entries.insert(key, previous),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        let Some(previous) = entries.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&entries) {
            entries.insert(key.clone(), previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<RequestKey>> {
        let entries = self.entries.lock().await;
        let mut keys: Vec<RequestKey> = entries.keys().cloned().collect();
        keys.sort_by(|a, b| a.url().cmp(b.url()));
        Ok(keys)
    }
}

/// Filesystem-backed [`CacheStorage`] rooted at a directory.
///
/// ```rust
/// # use astral_cache::cache::DiskStorage;
/// let storage = DiskStorage::new("/tmp/astral-cache");
/// assert!(storage.root().ends_with("astral-cache"));
/// ```
pub struct DiskStorage {
    root: PathBuf,
    open: Mutex<HashMap<String, Arc<DiskStore>>>,
}

impl DiskStorage {
    /// Storage rooted at `root`. Nothing touches the filesystem until a
    /// store is opened.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Storage at the default location: `<cache dir>/astral`.
    pub fn default_location() -> Self {
        Self::new(default_root())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{STORE_EXTENSION}", encode_name(name)))
    }

    fn open_handles(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<DiskStore>>>> {
        self.open
            .lock()
            .map_err(|_| AstralError::Storage("store table lock poisoned".to_string()))
    }
}

/// Default storage root: `~/.cache/astral`.
pub fn default_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("astral")
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        if name.is_empty() {
            return Err(AstralError::InvalidInput(
                "cache store name must not be empty".to_string(),
            ));
        }
        let mut handles = self.open_handles()?;
        if let Some(store) = handles.get(name) {
            return Ok(store.clone());
        }
        let store = Arc::new(DiskStore::open(name, self.store_path(name))?);
        handles.insert(name.to_string(), store.clone());
        Ok(store)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        if self.open_handles()?.contains_key(name) {
            return Ok(true);
        }
        Ok(self.store_path(name).exists())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let handle = self.open_handles()?.remove(name);
        // Hold the entries lock so an in-flight write cannot rename its
        // tmp file over the path after it is removed.
        let _entries = match &handle {
            Some(store) => {
                let entries = store.entries.lock().await;
                store.detached.store(true, Ordering::Release);
                Some(entries)
            }
            None => None,
        };
        let path = self.store_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(handle.is_some()),
            Err(e) => Err(AstralError::Storage(format!(
                "failed to remove store file {}: {e}",
                path.display()
            ))),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in dir {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(STORE_EXTENSION) {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read cache store");
                    continue;
                }
            };
            match parse_store_file(&content) {
                Ok(file) => names.push(file.name),
                Err(e) => {
                    // Still listed by its file name, so it can be purged.
                    let decoded = path
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .and_then(decode_name);
                    match decoded {
                        Some(name) => {
                            warn!(path = %path.display(), error = %e, "corrupt cache store");
                            names.push(name);
                        }
                        None => {
                            warn!(path = %path.display(), error = %e, "skipping unrecognised file")
                        }
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
