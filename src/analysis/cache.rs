// Extraction cache
//
// Raw per-file extraction output keyed by (content fingerprint, plugin,
// operation). A changed file has a new fingerprint and therefore a new key,
// so nothing is ever invalidated explicitly. Unreadable or mismatched entries
// are treated as misses.

use super::parallel::FileErrorKind;
use crate::error::{Error, Result};
use crate::parser::FileScan;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Discovery operation an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Endpoints,
    Models,
    Services,
    Signals,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Endpoints,
        Operation::Models,
        Operation::Services,
        Operation::Signals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Endpoints => "endpoints",
            Operation::Models => "models",
            Operation::Services => "services",
            Operation::Signals => "signals",
        }
    }

    /// Keep only the part of a file scan this operation owns
    ///
    /// Endpoint discovery also keeps the routing signals (security rules,
    /// mounts, imports, protected handlers) it needs to finish its results.
    pub fn project(&self, scan: FileScan) -> FileScan {
        match self {
            Operation::Endpoints => FileScan {
                endpoints: scan.endpoints,
                signals: scan.signals.into_iter().filter(|s| s.is_routing()).collect(),
                ..FileScan::default()
            },
            Operation::Models => FileScan {
                models: scan.models,
                ..FileScan::default()
            },
            Operation::Services => FileScan {
                services: scan.services,
                ..FileScan::default()
            },
            Operation::Signals => FileScan {
                signals: scan.signals.into_iter().filter(|s| !s.is_routing()).collect(),
                ..FileScan::default()
            },
        }
    }
}

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub fingerprint: String,
    pub plugin: String,
    pub operation: Operation,
}

impl CacheKey {
    pub fn new(fingerprint: impl Into<String>, plugin: impl Into<String>, operation: Operation) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            plugin: plugin.into(),
            operation,
        }
    }

    /// Location of this key below a cache root
    fn relative_path(&self) -> PathBuf {
        let shard = self.fingerprint.get(..2).unwrap_or("xx");
        PathBuf::from(&self.plugin)
            .join(self.operation.as_str())
            .join(shard)
            .join(format!("{}.json", self.fingerprint))
    }
}

/// Stored extraction outcome
///
/// Failures are stored too so unchanged broken files are not re-read on
/// every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CacheEntry {
    Extracted { scan: FileScan },
    Failed { kind: FileErrorKind, message: String },
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Entries that existed but could not be used
    pub corrupt: u64,
}

impl CacheStats {
    /// Counters accumulated since an earlier snapshot
    pub fn since(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            writes: self.writes.saturating_sub(earlier.writes),
            corrupt: self.corrupt.saturating_sub(earlier.corrupt),
        }
    }

    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    corrupt: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn corrupt(&self) {
        self.corrupt.fetch_add(1, Ordering::Relaxed);
        self.miss();
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            corrupt: self.corrupt.load(Ordering::Relaxed),
        }
    }
}

/// Store for per-file extraction results
///
/// Implementations must tolerate concurrent `get`/`put` from worker threads.
/// Every key is written by the worker that owns the file, so writes for
/// different keys never need coordinating.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry>;

    fn put(&self, key: &CacheKey, entry: &CacheEntry);

    fn stats(&self) -> CacheStats;

    /// Drop the least recently used entries beyond `max_entries`, returning how many went
    fn prune(&self, _max_entries: usize) -> usize {
        0
    }
}

/// Content fingerprint of a file
///
/// The repository-relative path is part of the digest because extraction
/// output records source locations.
pub fn fingerprint(relative: &Path, bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(relative.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// On-disk record; the key is stored alongside the entry and checked on read
#[derive(Serialize, Deserialize)]
struct Record {
    key: CacheKey,
    entry: CacheEntry,
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One JSON file per key below a versioned directory
pub struct DiskCache {
    root: PathBuf,
    counters: Counters,
}

impl DiskCache {
    /// Open (and create) a cache below `directory`
    ///
    /// Entries live in a subdirectory named after the crate version, so a
    /// format change never reads stale records. Deleting the directory is
    /// always safe.
    pub fn open(directory: &Path) -> Result<Self> {
        let root = directory.join(format!("v{}", env!("CARGO_PKG_VERSION")));
        fs::create_dir_all(&root).map_err(|e| {
            Error::cache(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path_for(key);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: Record = serde_json::from_slice(&contents)?;
        if &record.key != key {
            return Err(Error::cache("key mismatch"));
        }
        // Hits count as recent use for pruning
        if let Err(e) = touch(&path) {
            debug!("Cannot refresh {}: {}", path.display(), e);
        }
        Ok(Some(record.entry))
    }

    fn write(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let path = self.path_for(key);
        let dir = path
            .parent()
            .ok_or_else(|| Error::cache("cache path has no parent"))?;
        fs::create_dir_all(dir)?;

        let record = Record {
            key: key.clone(),
            entry: entry.clone(),
        };
        let json = serde_json::to_vec(&record)?;

        let temp = dir.join(format!(
            ".{}.{}.{}.tmp",
            key.fingerprint,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, json)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Stored entry files with their modification times
    fn entries(&self) -> Vec<(SystemTime, PathBuf)> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().map(|x| x == "json").unwrap_or(false))
            .map(|e| {
                let modified = e
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, e.into_path())
            })
            .collect()
    }
}

fn touch(path: &Path) -> std::io::Result<()> {
    fs::OpenOptions::new()
        .append(true)
        .open(path)?
        .set_modified(SystemTime::now())
}

impl ResultCache for DiskCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.read(key) {
            Ok(Some(entry)) => {
                self.counters.hit();
                Some(entry)
            }
            Ok(None) => {
                self.counters.miss();
                None
            }
            Err(e) => {
                debug!(
                    "Ignoring unreadable cache entry {}: {}",
                    self.path_for(key).display(),
                    e
                );
                self.counters.corrupt();
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        match self.write(key, entry) {
            Ok(()) => self.counters.write(),
            Err(e) => warn!("Failed to write cache entry {}: {}", key.fingerprint, e),
        }
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn prune(&self, max_entries: usize) -> usize {
        let mut entries = self.entries();
        if entries.len() <= max_entries {
            return 0;
        }
        entries.sort();
        let excess = entries.len() - max_entries;
        let removed = entries
            .iter()
            .take(excess)
            .filter(|(_, path)| fs::remove_file(path).is_ok())
            .count();
        debug!("Pruned {} cache entries", removed);
        removed
    }
}

/// In-process cache; useful for tests and for repeated runs in one process
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, (u64, CacheEntry)>>,
    sequence: AtomicU64,
    counters: Counters,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let found = self.entries.write().get_mut(key).map(|(seq, entry)| {
            *seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            entry.clone()
        });
        match &found {
            Some(_) => self.counters.hit(),
            None => self.counters.miss(),
        }
        found
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(key.clone(), (seq, entry.clone()));
        self.counters.write();
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn prune(&self, max_entries: usize) -> usize {
        let mut entries = self.entries.write();
        if entries.len() <= max_entries {
            return 0;
        }
        let mut order: Vec<(u64, CacheKey)> =
            entries.iter().map(|(k, (seq, _))| (*seq, k.clone())).collect();
        order.sort_by_key(|(seq, _)| *seq);
        let excess = entries.len() - max_entries;
        for (_, key) in order.into_iter().take(excess) {
            entries.remove(&key);
        }
        excess
    }
}

/// Cache that stores nothing
#[derive(Debug, Default)]
pub struct NullCache;

impl ResultCache for NullCache {
    fn get(&self, _key: &CacheKey) -> Option<CacheEntry> {
        None
    }

    fn put(&self, _key: &CacheKey, _entry: &CacheEntry) {}

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Model, SourceLocation};
    use tempfile::TempDir;

    fn sample_entry() -> CacheEntry {
        let mut scan = FileScan::default();
        scan.models.push(Model::new("User", SourceLocation::new("user.py", 3)));
        CacheEntry::Extracted { scan }
    }

    #[test]
    fn test_fingerprint_depends_on_content_and_path() {
        let a = fingerprint(Path::new("a.py"), b"x = 1");
        assert_eq!(a, fingerprint(Path::new("a.py"), b"x = 1"));
        assert_ne!(a, fingerprint(Path::new("a.py"), b"x = 2"));
        assert_ne!(a, fingerprint(Path::new("b.py"), b"x = 1"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_disk_cache_round_trip_and_stats() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let key = CacheKey::new(fingerprint(Path::new("user.py"), b"class User"), "django", Operation::Models);

        assert!(cache.get(&key).is_none());
        cache.put(&key, &sample_entry());
        assert_eq!(cache.get(&key), Some(sample_entry()));

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.writes, 1);

        // A second handle on the same directory sees the entry
        let reopened = DiskCache::open(dir.path()).unwrap();
        assert!(reopened.get(&key).is_some());
    }

    #[test]
    fn test_keys_are_separated_by_operation_and_plugin() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let fp = fingerprint(Path::new("x.js"), b"1");
        cache.put(&CacheKey::new(&fp, "express", Operation::Models), &sample_entry());

        assert!(cache.get(&CacheKey::new(&fp, "express", Operation::Services)).is_none());
        assert!(cache.get(&CacheKey::new(&fp, "generic", Operation::Models)).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let key = CacheKey::new("abcdef", "spring", Operation::Endpoints);

        let path = cache.path_for(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();

        assert!(cache.get(&key).is_none());
        assert_eq!(cache.stats().corrupt, 1);
        assert_eq!(cache.stats().misses, 1);

        // Overwriting repairs it
        cache.put(&key, &sample_entry());
        assert!(cache.get(&key).is_some());
    }

    #[test]
    fn test_failed_entries_are_cached() {
        let cache = MemoryCache::new();
        let key = CacheKey::new("ff00", "flask", Operation::Services);
        let failed = CacheEntry::Failed {
            kind: FileErrorKind::Binary,
            message: "NUL byte at offset 3".to_string(),
        };
        cache.put(&key, &failed);
        assert_eq!(cache.get(&key), Some(failed));
    }

    #[test]
    fn test_disk_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        for i in 0..5 {
            let key = CacheKey::new(format!("{:02}aa", i), "generic", Operation::Models);
            cache.put(&key, &sample_entry());
        }
        assert_eq!(cache.prune(10), 0);
        assert_eq!(cache.prune(3), 2);
        assert_eq!(cache.entries().len(), 3);
    }

    #[test]
    fn test_disk_prune_spares_recent_hits() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::open(dir.path()).unwrap();
        let keys: Vec<CacheKey> = (0..3)
            .map(|i| CacheKey::new(format!("{:02}bb", i), "flask", Operation::Models))
            .collect();
        let epoch = SystemTime::UNIX_EPOCH;
        for (i, key) in keys.iter().enumerate() {
            cache.put(key, &sample_entry());
            let written = epoch + std::time::Duration::from_secs(1_000 * (i as u64 + 1));
            fs::OpenOptions::new()
                .append(true)
                .open(cache.path_for(key))
                .unwrap()
                .set_modified(written)
                .unwrap();
        }

        // Oldest written, but used by this run
        assert!(cache.get(&keys[0]).is_some());
        assert_eq!(cache.prune(2), 1);
        assert!(cache.get(&keys[0]).is_some());
        assert!(cache.get(&keys[1]).is_none());
        assert!(cache.get(&keys[2]).is_some());
    }

    #[test]
    fn test_memory_prune_spares_recent_hits() {
        let cache = MemoryCache::new();
        let keys: Vec<CacheKey> = (0..3)
            .map(|i| CacheKey::new(format!("k{}", i), "rails", Operation::Models))
            .collect();
        for key in &keys {
            cache.put(key, &sample_entry());
        }
        assert!(cache.get(&keys[0]).is_some());
        assert_eq!(cache.prune(2), 1);
        assert!(cache.get(&keys[0]).is_some());
        assert!(cache.get(&keys[1]).is_none());
    }

    #[test]
    fn test_memory_prune_drops_oldest() {
        let cache = MemoryCache::new();
        let keys: Vec<CacheKey> = (0..4)
            .map(|i| CacheKey::new(format!("k{}", i), "rails", Operation::Models))
            .collect();
        for key in &keys {
            cache.put(key, &sample_entry());
        }
        assert_eq!(cache.prune(2), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert!(cache.get(&keys[3]).is_some());
    }

    #[test]
    fn test_stats_since() {
        let earlier = CacheStats { hits: 2, misses: 5, writes: 5, corrupt: 0 };
        let now = CacheStats { hits: 9, misses: 5, writes: 5, corrupt: 1 };
        let delta = now.since(&earlier);
        assert_eq!(delta.hits, 7);
        assert_eq!(delta.misses, 0);
        assert_eq!(delta.corrupt, 1);
        assert_eq!(delta.lookups(), 7);
    }

    #[test]
    fn test_project_splits_signals() {
        use crate::parser::{MountTarget, Signal};
        let loc = SourceLocation::new("app.js", 1);
        let scan = FileScan {
            signals: vec![
                Signal::RouteMount {
                    prefix: "/api".to_string(),
                    target: MountTarget::Binding("router".to_string()),
                    requires_auth: false,
                    location: loc.clone(),
                },
                Signal::Publish {
                    topic: "orders".to_string(),
                    component: "App".to_string(),
                    location: loc,
                },
            ],
            ..FileScan::default()
        };
        assert_eq!(Operation::Endpoints.project(scan.clone()).signals.len(), 1);
        let signals = Operation::Signals.project(scan.clone()).signals;
        assert!(matches!(signals[0], Signal::Publish { .. }));
        assert!(Operation::Models.project(scan).is_empty());
    }
}
