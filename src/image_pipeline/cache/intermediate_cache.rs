use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::image_pipeline::cache::disk;
use crate::image_pipeline::cache::types::{CacheConfig, CacheError, CacheRecord, ImageIdentity, StageResult};

struct ResidentEntry {
    result: Arc<StageResult>,
    bytes: usize,
    last_used: u64,
    touched_at: Instant,
}

struct DiskEntry {
    record: CacheRecord,
    last_used: u64,
}

/// Book-keeping shared by every identity. Held only briefly; blob I/O runs
/// under the identity's own lock instead.
#[derive(Default)]
struct Catalog {
    resident: HashMap<ImageIdentity, ResidentEntry>,
    disk: HashMap<ImageIdentity, DiskEntry>,
    resident_bytes: usize,
    disk_bytes: u64,
    clock: u64,
}

impl Catalog {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn insert_disk(&mut self, record: CacheRecord) {
        let last_used = self.tick();
        self.disk_bytes += record.byte_size;
        if let Some(old) = self.disk.insert(record.identity.clone(), DiskEntry { record, last_used }) {
            self.disk_bytes = self.disk_bytes.saturating_sub(old.record.byte_size);
        }
    }

    fn drop_resident(&mut self, identity: &ImageIdentity) -> bool {
        match self.resident.remove(identity) {
            Some(entry) => {
                self.resident_bytes = self.resident_bytes.saturating_sub(entry.bytes);
                true
            }
            None => false,
        }
    }

    /// Keeps `result` in memory, dropping least recently used copies until it
    /// fits the budget. Results larger than the whole budget stay on disk only.
    fn insert_resident(&mut self, identity: &ImageIdentity, result: Arc<StageResult>, budget: usize) {
        self.drop_resident(identity);
        let bytes = result.byte_size();
        if bytes > budget {
            debug!("{} ({} bytes) exceeds the memory budget", identity, bytes);
            return;
        }
        while self.resident_bytes + bytes > budget {
            let Some(victim) = self
                .resident
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!("Dropping in-memory copy of {}", victim);
            self.drop_resident(&victim);
        }
        let last_used = self.tick();
        self.resident_bytes += bytes;
        self.resident.insert(
            identity.clone(),
            ResidentEntry {
                result,
                bytes,
                last_used,
                touched_at: Instant::now(),
            },
        );
    }

    fn touch(&mut self, identity: &ImageIdentity) -> Option<Arc<StageResult>> {
        let now = self.tick();
        if let Some(entry) = self.disk.get_mut(identity) {
            entry.last_used = now;
        }
        let entry = self.resident.get_mut(identity)?;
        entry.last_used = now;
        entry.touched_at = Instant::now();
        Some(Arc::clone(&entry.result))
    }

    fn forget(&mut self, identity: &ImageIdentity) {
        self.drop_resident(identity);
        if let Some(old) = self.disk.remove(identity) {
            self.disk_bytes = self.disk_bytes.saturating_sub(old.record.byte_size);
        }
    }
}

/// Memory and disk store of checkpoint buffers, keyed by image identity.
///
/// Safe to share between threads. Operations on one identity are serialised,
/// so concurrent runs never decompress the same record twice; different
/// identities proceed in parallel.
pub struct IntermediateCache {
    config: CacheConfig,
    catalog: Mutex<Catalog>,
    locks: Mutex<HashMap<ImageIdentity, Arc<Mutex<()>>>>,
}

impl IntermediateCache {
    /// Opens the cache at `config.root`, creating it if needed and indexing
    /// the records already on disk.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        fs::create_dir_all(&config.root)?;
        let mut records = disk::scan(&config.root)?;
        records.sort_by_key(|r| r.timestamp);

        let mut catalog = Catalog::default();
        for record in records {
            catalog.insert_disk(record);
        }
        info!(
            "Opened cache at {} with {} record(s), {} bytes",
            config.root.display(),
            catalog.disk.len(),
            catalog.disk_bytes
        );

        Ok(Self {
            config,
            catalog: Mutex::new(catalog),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn identity_lock(&self, identity: &ImageIdentity) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(identity.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drops the lock entry of `identity` once `lock` and the map are its
    /// only owners.
    fn release_lock(&self, identity: &ImageIdentity, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(identity);
        }
    }

    /// Whether a record exists for `identity`, in memory or on disk.
    pub fn has_data(&self, identity: &ImageIdentity) -> bool {
        let catalog = self.catalog.lock();
        catalog.resident.contains_key(identity) || catalog.disk.contains_key(identity)
    }

    /// Whether the record of `identity` is held in memory.
    pub fn is_resident(&self, identity: &ImageIdentity) -> bool {
        self.catalog.lock().resident.contains_key(identity)
    }

    /// Writes `result` to disk, replacing any earlier record of `identity`,
    /// and keeps it in memory.
    #[instrument(skip_all, fields(identity = %identity, stage = %result.stage))]
    pub fn set_data(&self, identity: &ImageIdentity, result: StageResult) -> Result<(), CacheError> {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock();

        self.catalog.lock().forget(identity);
        let record = disk::write(&self.config.root, identity, &result)?;
        {
            let mut catalog = self.catalog.lock();
            catalog.insert_disk(record);
            catalog.insert_resident(identity, Arc::new(result), self.config.memory_budget);
        }
        self.enforce_disk_budget(identity);
        Ok(())
    }

    /// Returns the record of `identity`: the in-memory copy when resident,
    /// else the disk record loaded synchronously. `Ok(None)` only when
    /// [`has_data`](Self::has_data) is false.
    ///
    /// A record that fails to load is removed before the error is returned.
    pub fn cached_data(&self, identity: &ImageIdentity) -> Result<Option<Arc<StageResult>>, CacheError> {
        let lock = self.identity_lock(identity);
        let loaded = {
            let _guard = lock.lock();
            self.load(identity)
        };
        if !matches!(loaded, Ok(Some(_))) {
            self.release_lock(identity, lock);
        }
        loaded
    }

    fn load(&self, identity: &ImageIdentity) -> Result<Option<Arc<StageResult>>, CacheError> {
        let record = {
            let mut catalog = self.catalog.lock();
            if let Some(result) = catalog.touch(identity) {
                debug!("Memory hit for {}", identity);
                return Ok(Some(result));
            }
            match catalog.disk.get(identity) {
                Some(entry) => entry.record.clone(),
                None => return Ok(None),
            }
        };

        let started = Instant::now();
        match disk::read(&self.config.root, &record) {
            Ok(result) => {
                debug!("Loaded {} from disk in {:?}", identity, started.elapsed());
                let result = Arc::new(result);
                self.catalog.lock().insert_resident(
                    identity,
                    Arc::clone(&result),
                    self.config.memory_budget,
                );
                Ok(Some(result))
            }
            Err(e) => {
                warn!("Dropping unreadable cache record for {}: {}", identity, e);
                self.catalog.lock().forget(identity);
                if let Err(remove_err) = disk::remove(&self.config.root, identity) {
                    warn!("Failed to remove cache files of {}: {}", identity, remove_err);
                }
                Err(e)
            }
        }
    }

    /// Removes the in-memory copy and the disk record of `identity`.
    pub fn evict_data(&self, identity: &ImageIdentity) -> Result<(), CacheError> {
        let lock = self.identity_lock(identity);
        let removed = {
            let _guard = lock.lock();
            self.catalog.lock().forget(identity);
            disk::remove(&self.config.root, identity)
        };
        self.release_lock(identity, lock);
        removed?;
        debug!("Evicted {}", identity);
        Ok(())
    }

    /// Drops every in-memory copy. Disk records are kept.
    pub fn on_memory_pressure(&self) -> usize {
        let mut catalog = self.catalog.lock();
        let dropped = catalog.resident.len();
        catalog.resident.clear();
        catalog.resident_bytes = 0;
        info!("Memory pressure: dropped {} in-memory cache copies", dropped);
        dropped
    }

    /// Drops in-memory copies unused for at least `max_idle`.
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let mut catalog = self.catalog.lock();
        let idle: Vec<ImageIdentity> = catalog
            .resident
            .iter()
            .filter(|(_, e)| e.touched_at.elapsed() >= max_idle)
            .map(|(id, _)| id.clone())
            .collect();
        for identity in &idle {
            catalog.drop_resident(identity);
        }
        if !idle.is_empty() {
            debug!("Dropped {} idle in-memory cache copies", idle.len());
        }
        idle.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.catalog.lock().resident_bytes
    }

    pub fn disk_usage(&self) -> u64 {
        self.catalog.lock().disk_bytes
    }

    /// Removes least recently used disk records until the disk budget holds.
    /// `keep` and identities busy on another thread are skipped.
    fn enforce_disk_budget(&self, keep: &ImageIdentity) {
        let mut victims: Vec<(u64, ImageIdentity)> = {
            let catalog = self.catalog.lock();
            if catalog.disk_bytes <= self.config.disk_budget {
                return;
            }
            catalog
                .disk
                .iter()
                .filter(|(id, _)| *id != keep)
                .map(|(id, e)| (e.last_used, id.clone()))
                .collect()
        };
        victims.sort();

        for (_, victim) in victims {
            if self.catalog.lock().disk_bytes <= self.config.disk_budget {
                break;
            }
            let lock = self.identity_lock(&victim);
            if let Some(_guard) = lock.try_lock() {
                self.catalog.lock().forget(&victim);
                match disk::remove(&self.config.root, &victim) {
                    Ok(()) => info!("Disk budget exceeded, evicted {}", victim),
                    Err(e) => warn!("Failed to evict {} from disk: {}", victim, e),
                }
            }
            self.release_lock(&victim, lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_pipeline::cache::types::BufferFormat;
    use crate::image_pipeline::state::Stage;

    fn result(seed: f32, pixels: usize) -> StageResult {
        StageResult {
            stage: Stage::ColorConvert,
            format: BufferFormat::PlanarF32,
            width: pixels,
            height: 1,
            quarter_turns: 0,
            data: (0..3 * pixels).map(|i| seed + i as f32 * 0.001).collect(),
        }
    }

    fn open(root: &std::path::Path, memory: usize, disk: u64) -> IntermediateCache {
        IntermediateCache::open(
            CacheConfig::builder()
                .root(root)
                .memory_budget(memory)
                .disk_budget(disk)
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn set_then_get_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        let id = ImageIdentity::new("a");
        let stored = result(0.5, 64);
        cache.set_data(&id, stored.clone()).unwrap();

        assert!(cache.has_data(&id));
        assert!(cache.is_resident(&id));
        assert_eq!(*cache.cached_data(&id).unwrap().unwrap(), stored);

        cache.on_memory_pressure();
        assert!(!cache.is_resident(&id));
        assert!(cache.has_data(&id));
        let loaded = cache.cached_data(&id).unwrap().unwrap();
        let bits = |r: &StageResult| r.data.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&loaded), bits(&stored));
        assert!(cache.is_resident(&id));
    }

    #[test]
    fn evicted_identity_has_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        let id = ImageIdentity::new("gone");
        cache.set_data(&id, result(1.0, 8)).unwrap();
        cache.evict_data(&id).unwrap();
        assert!(!cache.has_data(&id));
        assert!(cache.cached_data(&id).unwrap().is_none());
        assert_eq!(cache.disk_usage(), 0);
        assert!(!dir.path().join("gone").exists());
    }

    #[test]
    fn identity_locks_are_released() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        for i in 0..16 {
            let id = ImageIdentity::new(format!("img-{i}"));
            assert!(cache.cached_data(&id).unwrap().is_none());
            cache.set_data(&id, result(i as f32, 4)).unwrap();
            cache.evict_data(&id).unwrap();
        }
        assert!(cache.locks.lock().is_empty());

        let kept = ImageIdentity::new("kept");
        cache.set_data(&kept, result(0.0, 4)).unwrap();
        assert!(cache.cached_data(&kept).unwrap().is_some());
        assert_eq!(cache.locks.lock().len(), 1);
    }

    #[test]
    fn memory_budget_drops_least_recent_copy() {
        let dir = tempfile::tempdir().unwrap();
        // Each result is 3 * 10 * 4 = 120 bytes.
        let cache = open(dir.path(), 250, 1 << 30);
        let (a, b, c) = (ImageIdentity::new("a"), ImageIdentity::new("b"), ImageIdentity::new("c"));
        cache.set_data(&a, result(0.0, 10)).unwrap();
        cache.set_data(&b, result(1.0, 10)).unwrap();
        cache.cached_data(&a).unwrap();
        cache.set_data(&c, result(2.0, 10)).unwrap();

        assert!(cache.is_resident(&a));
        assert!(!cache.is_resident(&b));
        assert!(cache.is_resident(&c));
        assert!(cache.has_data(&b));
        assert_eq!(cache.memory_usage(), 240);
    }

    #[test]
    fn disk_budget_evicts_least_recent_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        let a = ImageIdentity::new("a");
        cache.set_data(&a, result(0.0, 256)).unwrap();
        let one = cache.disk_usage();
        drop(cache);

        let cache = open(dir.path(), 1 << 20, one + one / 2);
        assert!(cache.has_data(&a));
        assert!(!cache.is_resident(&a));
        let b = ImageIdentity::new("b");
        cache.set_data(&b, result(0.0, 256)).unwrap();
        assert!(!cache.has_data(&a));
        assert!(cache.has_data(&b));
        assert!(cache.disk_usage() <= one + one / 2);
        assert!(!cache.locks.lock().contains_key(&a));
    }

    #[test]
    fn idle_copies_are_purged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        let id = ImageIdentity::new("idle");
        cache.set_data(&id, result(0.0, 4)).unwrap();
        assert_eq!(cache.purge_idle(Duration::from_secs(3600)), 0);
        assert_eq!(cache.purge_idle(Duration::ZERO), 1);
        assert!(!cache.is_resident(&id));
        assert!(cache.cached_data(&id).unwrap().is_some());
    }

    #[test]
    fn corrupt_record_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 1 << 20, 1 << 30);
        let id = ImageIdentity::new("bad");
        cache.set_data(&id, result(0.0, 4)).unwrap();
        cache.on_memory_pressure();
        fs::write(dir.path().join("bad").join("00040000.lz4"), [4, 0, 0, 0, 0xff]).unwrap();

        assert!(cache.cached_data(&id).is_err());
        assert!(!cache.has_data(&id));
        assert!(cache.cached_data(&id).unwrap().is_none());
    }
}
