// Two-tier cache store: an in-memory map in front of one JSON file per key.
// Handles TTL freshness, validator retention, and corrupt-record cleanup.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::cache::keys;
use crate::config::CacheConfig;
use crate::error::Result;

/// A stored record: the payload, its write time, and an optional validator
/// returned by the remote API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached payload.
    pub data: serde_json::Value,
    /// Epoch milliseconds at write time.
    pub timestamp: i64,
    /// Opaque validator (ETag) for conditional requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl CacheEntry {
    fn new(data: serde_json::Value, etag: Option<String>) -> Self {
        Self {
            data,
            timestamp: Utc::now().timestamp_millis(),
            etag,
        }
    }

    /// An entry is fresh while its age stays within the TTL.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        let age = Utc::now().timestamp_millis().saturating_sub(self.timestamp);
        age <= i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Entry counts per tier, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
}

/// Two-tier key-value store with a single TTL applied to every key.
///
/// The memory tier answers repeat reads within one process; the durable
/// tier survives restarts. Durable-tier failures are logged and treated as
/// misses, never surfaced to the caller.
pub struct CacheStore {
    memory: Mutex<HashMap<String, CacheEntry>>,
    dir: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            dir: config.dir,
            ttl: config.ttl,
        }
    }

    /// Directory holding the durable tier.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get a fresh value, or None if the key is absent or stale.
    ///
    /// A stale memory entry stays put (its validator remains usable for a
    /// conditional refresh); a stale or corrupt durable record is deleted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.memory_entry(key) {
            if entry.is_fresh(self.ttl) {
                return decode(key, entry.data);
            }
        }
        let entry = self.read_disk(key)?;
        if entry.is_fresh(self.ttl) {
            self.lock_memory().insert(key.to_string(), entry.clone());
            decode(key, entry.data)
        } else {
            self.remove_disk(key);
            None
        }
    }

    /// Get the stored value regardless of freshness, without touching
    /// either tier. Used to resolve "not modified" revalidations.
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.memory_entry(key) {
            return decode(key, entry.data);
        }
        let entry = self.read_disk(key)?;
        decode(key, entry.data)
    }

    /// Store a value with the current timestamp and an optional validator.
    ///
    /// The memory tier write always succeeds; the durable tier write is
    /// best-effort and a failure there is logged, not propagated.
    pub fn set<T: Serialize>(&self, key: &str, data: &T, etag: Option<String>) {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "failed to serialize cache entry");
                return;
            }
        };
        let entry = CacheEntry::new(value, etag);
        self.lock_memory().insert(key.to_string(), entry.clone());
        if let Err(err) = self.write_disk(key, &entry) {
            warn!(key, error = %err, "failed to persist cache entry");
        }
    }

    /// Current validator for a key, regardless of freshness.
    pub fn etag(&self, key: &str) -> Option<String> {
        if let Some(etag) = self.memory_entry(key).and_then(|entry| entry.etag) {
            return Some(etag);
        }
        self.read_disk(key)?.etag
    }

    /// Remove one key from both tiers.
    pub fn remove(&self, key: &str) {
        self.lock_memory().remove(key);
        self.remove_disk(key);
    }

    /// Remove every entry from both tiers and reinitialize the durable
    /// tier's backing directory.
    pub fn clear(&self) {
        self.lock_memory().clear();
        if self.dir.exists() {
            if let Err(err) = fs::remove_dir_all(&self.dir) {
                warn!(error = %err, "failed to clear cache directory");
                return;
            }
        }
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(error = %err, "failed to recreate cache directory");
        }
    }

    /// Live entry counts for both tiers.
    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.lock_memory().len();
        let disk_entries = fs::read_dir(&self.dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        CacheStats {
            memory_entries,
            disk_entries,
        }
    }

    fn lock_memory(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn memory_entry(&self, key: &str) -> Option<CacheEntry> {
        self.lock_memory().get(key).cloned()
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(keys::file_name(key))
    }

    /// Read the durable record for a key. A record that fails to parse is
    /// deleted so it cannot wedge future reads.
    fn read_disk(&self, key: &str) -> Option<CacheEntry> {
        let path = self.file_path(key);
        if !path.exists() {
            return None;
        }
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(key, error = %err, "failed to read cache file");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(key, error = %err, "corrupt cache file, deleting");
                self.remove_disk(key);
                None
            }
        }
    }

    fn write_disk(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(key);
        let json = serde_json::to_string_pretty(entry)?;

        // Write atomically via temp file
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    fn remove_disk(&self, key: &str) {
        let path = self.file_path(key);
        if path.exists() {
            if let Err(err) = fs::remove_file(&path) {
                warn!(key, error = %err, "failed to delete cache file");
            }
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, data: serde_json::Value) -> Option<T> {
    match serde_json::from_value(data) {
        Ok(data) => Some(data),
        Err(err) => {
            warn!(key, error = %err, "cached payload does not match requested type");
            None
        }
    }
}

#[cfg(test)]
impl CacheStore {
    /// Shift an entry's write time into the past, in both tiers.
    pub(crate) fn backdate(&self, key: &str, age: Duration) {
        let age_ms = age.as_millis() as i64;
        if let Some(entry) = self.lock_memory().get_mut(key) {
            entry.timestamp -= age_ms;
        }
        if let Some(mut entry) = self.read_disk(key) {
            entry.timestamp -= age_ms;
            self.write_disk(key, &entry).expect("rewrite backdated entry");
        }
    }
}
