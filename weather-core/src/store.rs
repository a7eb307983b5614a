//! Key-value collaborators: a cache with expiry and a plain option store.
//!
//! The core only talks to the [`CacheStore`] and [`OptionStore`] traits. The
//! in-memory and file-backed implementations below exist for the CLI host and
//! for tests; a hosting environment can plug in its own.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};
use tempfile::NamedTempFile;

use crate::error::WidgetError;

type Result<T> = std::result::Result<T, WidgetError>;

/// Cache with per-entry expiry. Single-key operations must be atomic.
pub trait CacheStore: Send + Sync {
    /// Returns the value if present and not expired.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` for `ttl`. A zero `ttl` never expires.
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Removes `key`; a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Removes every key starting with `prefix`, returning how many were removed.
    fn delete_by_prefix(&self, prefix: &str) -> Result<usize>;
}

/// Persistent string options (credential ciphertext, refresh city, job registration).
pub trait OptionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            chrono::Duration::from_std(ttl).ok().and_then(|ttl| Utc::now().checked_add_signed(ttl))
        };
        Self { value, expires_at }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn get_live(entries: &mut HashMap<String, CacheEntry>, key: &str) -> Option<String> {
    let now = Utc::now();
    match entries.get(key) {
        Some(entry) if entry.is_expired(now) => {
            entries.remove(key);
            None
        }
        Some(entry) => Some(entry.value.clone()),
        None => None,
    }
}

fn remove_prefixed(entries: &mut HashMap<String, CacheEntry>, prefix: &str) -> usize {
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(prefix));
    before - entries.len()
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(get_live(&mut self.entries.lock(), key))
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.lock().insert(key.to_string(), CacheEntry::new(value, ttl));
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(remove_prefixed(&mut self.entries.lock(), prefix))
    }
}

/// Cache persisted as a JSON file, rewritten on every mutation.
///
/// Every operation holds an exclusive lock on a sibling `.lock` file, so
/// several processes can share one cache file.
#[derive(Debug)]
pub struct FileCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn load(&self) -> Result<HashMap<String, CacheEntry>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            WidgetError::Store(format!("failed to read cache file {}: {e}", self.path.display()))
        })?;
        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // A corrupt cache file is dropped rather than failing every render.
                tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable cache file");
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        write_file(&self.path, &serde_json::to_string(entries).map_err(|e| {
            WidgetError::Store(format!("failed to serialize cache: {e}"))
        })?)
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut entries = self.load()?;
        let before = entries.len();
        let value = get_live(&mut entries, key);
        if entries.len() != before {
            self.save(&entries)?;
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut entries = self.load()?;
        entries.insert(key.to_string(), CacheEntry::new(value, ttl));
        self.save(&entries)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }

    fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut entries = self.load()?;
        let removed = remove_prefixed(&mut entries, prefix);
        if removed > 0 {
            self.save(&entries)?;
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
pub struct MemoryOptions {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryOptions {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Options persisted as a flat TOML table.
///
/// Writes go through the same sibling `.lock` file as [`FileCache`]; reads
/// rely on the file being replaced by rename and never see a partial write.
#[derive(Debug)]
pub struct FileOptions {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            WidgetError::Store(format!("failed to read options file {}: {e}", self.path.display()))
        })?;
        toml::from_str(&contents).map_err(|e| {
            WidgetError::Store(format!("failed to parse options file {}: {e}", self.path.display()))
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let contents = toml::to_string_pretty(values)
            .map_err(|e| WidgetError::Store(format!("failed to serialize options: {e}")))?;
        write_file(&self.path, &contents)
    }
}

impl OptionStore for FileOptions {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut values = self.load()?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let _file_lock = lock_file(&self.path)?;
        let mut values = self.load()?;
        if values.remove(key).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}

/// Take an exclusive advisory lock beside `path`, released when the returned
/// handle is dropped.
fn lock_file(path: &Path) -> Result<File> {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    let lock_path = PathBuf::from(name);
    create_parent(&lock_path)?;

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| WidgetError::Store(format!("failed to open {}: {e}", lock_path.display())))?;
    FileExt::lock_exclusive(&file)
        .map_err(|e| WidgetError::Store(format!("failed to lock {}: {e}", lock_path.display())))?;
    Ok(file)
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).map_err(|e| {
            WidgetError::Store(format!("failed to create directory {}: {e}", parent.display()))
        }),
        _ => Ok(()),
    }
}

/// Replace `path` by writing a temp file in the same directory and renaming it over.
fn write_file(path: &Path, contents: &str) -> Result<()> {
    create_parent(path)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let failed =
        |e: std::io::Error| WidgetError::Store(format!("failed to write {}: {e}", path.display()));

    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(contents.as_bytes()).map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;
    tmp.persist(path).map_err(|e| failed(e.error))?;
    Ok(())
}
