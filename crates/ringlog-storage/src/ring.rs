//! Persistent ring buffer
//!
//! Coordinates a [`FileRegion`] holding fixed-size items and a
//! [`KeyValueStore`] holding the ring pointers. The persisted pointers are
//! the ground truth; the copy inside the lock is only a cache and is
//! reloaded at the start of every operation.
//!
//! # Write Path
//! 1. Lock, reload head/tail
//! 2. Reject requests larger than the usable capacity (before any I/O)
//! 3. Write at `head`, splitting at the end of the region
//! 4. Advance `head`; if the ring overflowed, advance `tail` past the
//!    overwritten items
//! 5. Flush data (if durable), then persist pointers
//!
//! # Read Path
//! 1. Lock, reload head/tail
//! 2. Clamp the request to the occupancy
//! 3. Read at `tail`, splitting at the end of the region
//! 4. Advance `tail`, persist pointers
//!
//! # Recovery
//! A data region that cannot be opened is treated as corruption: pointers
//! are reset to empty and the region is recreated. Writes retry once after
//! the reset; reads return nothing. A read that hits end of file before any
//! unread item is the same kind of corruption. A read that fails with an
//! I/O error returns nothing and leaves the ring as it was.
//!
//! Data is written before pointers are published. A power cut between the
//! two leaves written items unpublished, and they are simply not there
//! after restart.

use crate::metadata::{KeyValueStore, MetaAdapter, RingMeta};
use crate::region::{FileRegion, ItemIo, RegionFile, RegionMode};
use parking_lot::Mutex;
use ringlog_common::{Error, Namespace, Result, RingConfig, SyncMode};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, warn};

/// Ring operation statistics
#[derive(Debug, Default)]
pub struct RingStats {
    pub writes: AtomicU64,
    pub reads: AtomicU64,
    pub items_written: AtomicU64,
    pub items_read: AtomicU64,
    pub items_overwritten: AtomicU64,
    pub capacity_rejections: AtomicU64,
    pub recoveries: AtomicU64,
}

/// Persistent fixed-record ring buffer
///
/// All operations on one ring are serialized by a single blocking lock;
/// share it between threads with `Arc`. Rings with different namespaces
/// are independent.
#[derive(Debug)]
pub struct RingBuffer<K> {
    /// Pointer persistence
    meta: MetaAdapter<K>,
    /// Data file
    region: FileRegion,
    /// Data durability
    sync_mode: SyncMode,
    /// Descriptor lock guarding the cached pointers
    state: Mutex<RingMeta>,
    /// Statistics
    stats: RingStats,
}

impl<K: KeyValueStore> RingBuffer<K> {
    /// Initialize a ring, adopting persisted state when the geometry matches
    pub fn init(
        root: impl AsRef<Path>,
        namespace: Namespace,
        item_size: u32,
        item_num: u32,
        store: K,
    ) -> Result<Self> {
        let config = RingConfig::new(root.as_ref(), namespace, item_size, item_num);
        Self::open(&config, store)
    }

    /// Initialize a ring from its configuration
    ///
    /// Persisted metadata is kept if its item size and count match the
    /// configuration; otherwise (or if absent or unreadable) the ring is
    /// reset to empty. A ring at head == tail == 0 gets a fresh, empty data
    /// file.
    pub fn open(config: &RingConfig, store: K) -> Result<Self> {
        config.validate().map_err(|e| match e {
            Error::Configuration(msg) => Error::InvalidArgument(msg),
            other => other,
        })?;

        if !config.root.is_dir() {
            error!("Root path not found: {:?}", config.root);
            return Err(Error::RootNotFound {
                path: config.root.display().to_string(),
            });
        }

        let namespace = config.namespace.clone();
        let meta = MetaAdapter::new(store, namespace.clone());
        let region = FileRegion::new(&config.root, &namespace, config.item_size);

        let state = match meta.load_all() {
            Ok(loaded)
                if loaded.item_size == config.item_size
                    && loaded.item_num == config.item_num
                    && loaded.is_valid() =>
            {
                info!(
                    "Loaded ring meta for {}: head={} tail={} size={} num={}",
                    namespace, loaded.head, loaded.tail, loaded.item_size, loaded.item_num
                );
                loaded
            }
            Ok(loaded)
                if loaded.item_size == config.item_size && loaded.item_num == config.item_num =>
            {
                warn!(
                    "Ring {} has invalid pointers (head={}, tail={}), resetting",
                    namespace, loaded.head, loaded.tail
                );
                meta.reset(config.item_size, config.item_num)?
            }
            Ok(loaded) => {
                warn!(
                    "Ring {} layout changed (size {} -> {}, num {} -> {}), resetting",
                    namespace, loaded.item_size, config.item_size, loaded.item_num, config.item_num
                );
                meta.reset(config.item_size, config.item_num)?
            }
            Err(e) => {
                info!("No usable ring meta for {} ({}), initializing", namespace, e);
                meta.reset(config.item_size, config.item_num)?
            }
        };

        if state.head == 0 && state.tail == 0 {
            info!("Ring {} is empty, resetting data file {:?}", namespace, region.path());
            region.reset().map_err(|e| Error::StorageUnavailable {
                path: region.path().display().to_string(),
                reason: e.to_string(),
            })?;
        } else {
            info!(
                "Ring {} already initialized (head={}, tail={})",
                namespace, state.head, state.tail
            );
        }

        Ok(Self {
            meta,
            region,
            sync_mode: config.sync_mode,
            state: Mutex::new(state),
            stats: RingStats::default(),
        })
    }

    /// Namespace of this ring
    pub const fn namespace(&self) -> &Namespace {
        self.meta.namespace()
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        self.region.path()
    }

    /// Size of one item in bytes
    pub const fn item_size(&self) -> u32 {
        self.region.item_size()
    }

    /// Maximum number of unread items before the oldest are overwritten
    pub fn capacity(&self) -> u32 {
        self.state.lock().usable_capacity()
    }

    /// Underlying metadata store
    pub const fn store(&self) -> &K {
        self.meta.store()
    }

    /// Operation statistics
    pub const fn stats(&self) -> &RingStats {
        &self.stats
    }

    /// Check whether there is nothing to read
    pub fn is_empty(&self) -> Result<bool> {
        let mut state = self.state.lock();
        self.reload(&mut state)?;
        Ok(state.is_empty())
    }

    /// Number of unread items
    pub fn len(&self) -> Result<u32> {
        let mut state = self.state.lock();
        self.reload(&mut state)?;
        Ok(state.occupancy())
    }

    /// Current persisted pointers and geometry
    pub fn snapshot(&self) -> Result<RingMeta> {
        let mut state = self.state.lock();
        self.reload(&mut state)?;
        Ok(*state)
    }

    /// Discard all items and recreate the data file
    pub fn clear(&self) -> Result<()> {
        let mut state = self.state.lock();
        self.reset_locked(&mut state)?;
        info!("Cleared ring {}", self.namespace());
        Ok(())
    }

    /// Append items, overwriting the oldest unread items if needed
    ///
    /// `items` holds whole items back to back. At most the usable capacity
    /// can be written in one call. Returns the number of items written,
    /// which is less than requested only if the data file accepted a short
    /// write.
    pub fn write(&self, items: &[u8]) -> Result<usize> {
        let count = self.item_count(items.len())?;

        let mut state = self.state.lock();
        self.reload(&mut state)?;

        let capacity = state.usable_capacity();
        let count = match u32::try_from(count) {
            Ok(count) if count <= capacity => count,
            _ => {
                self.stats.capacity_rejections.fetch_add(1, Ordering::Relaxed);
                return Err(Error::CapacityExceeded {
                    requested: count,
                    capacity: capacity as usize,
                });
            }
        };
        if count == 0 {
            return Ok(0);
        }

        let mut file = self.open_for_write(&mut state)?;

        let used = state.occupancy();
        let written = self.write_segments(&mut file, &state, items, count);
        if written > 0 && self.sync_mode.is_durable() {
            if let Err(e) = file.sync() {
                warn!("Failed to flush ring {}: {}", self.namespace(), e);
            }
        }
        drop(file);

        let overwritten = apply_write(&mut state, used, written);
        if overwritten > 0 {
            warn!(
                namespace = %self.namespace(),
                overwritten,
                "Ring overflow, overwrote {} old items",
                overwritten
            );
            self.stats
                .items_overwritten
                .fetch_add(u64::from(overwritten), Ordering::Relaxed);
        }

        self.meta.save(&state)?;

        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        self.stats
            .items_written
            .fetch_add(u64::from(written), Ordering::Relaxed);
        debug!(
            "Wrote {}/{} items to {}: head={} tail={}",
            written,
            count,
            self.namespace(),
            state.head,
            state.tail
        );

        Ok(written as usize)
    }

    /// Read and consume the oldest unread items
    ///
    /// Reads at most `out.len() / item_size` items, never more than are
    /// unread. Returns 0 for an empty ring. If the data file is missing or
    /// holds none of the unread items the ring resets itself and 0 is
    /// returned. A failed read returns 0 and consumes nothing.
    pub fn read(&self, out: &mut [u8]) -> Result<usize> {
        let requested = self.item_count(out.len())?;

        let mut state = self.state.lock();
        self.reload(&mut state)?;

        if state.is_empty() || requested == 0 {
            return Ok(0);
        }

        let mut file = match self.region.open(RegionMode::Read) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Failed to open {:?} for read ({}), resetting ring {}",
                    self.region.path(),
                    e,
                    self.namespace()
                );
                self.recover(&mut state);
                return Ok(0);
            }
        };

        // Never hand out slots beyond what was logically written
        let count = u32::try_from(requested)
            .unwrap_or(u32::MAX)
            .min(state.occupancy());
        let read = match self.read_segments(&mut file, &state, out, count) {
            Ok(read) => read,
            Err(e) => {
                warn!("Data read failed on ring {}: {}", self.namespace(), e);
                return Ok(0);
            }
        };
        drop(file);

        if read == 0 {
            // Unread items the file does not hold: pointers and data disagree
            warn!(
                "Ring {} holds {} unread items but its data file returned none, resetting",
                self.namespace(),
                count
            );
            self.recover(&mut state);
            return Ok(0);
        }

        state.tail = advance(state.tail, read, state.item_num);
        self.meta.save(&state)?;

        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .items_read
            .fetch_add(u64::from(read), Ordering::Relaxed);
        debug!(
            "Read {}/{} items from {}: head={} tail={}",
            read,
            count,
            self.namespace(),
            state.head,
            state.tail
        );

        Ok(read as usize)
    }

    /// Convert a buffer length to an item count
    fn item_count(&self, len: usize) -> Result<usize> {
        let item_size = self.item_size() as usize;
        if len % item_size != 0 {
            return Err(Error::invalid_argument(format!(
                "buffer of {len} bytes is not a whole number of {item_size}-byte items"
            )));
        }
        Ok(len / item_size)
    }

    /// Refresh cached pointers from the metadata store
    ///
    /// Out-of-range pointers are corruption and reset the ring. Only
    /// metadata failures are returned; a data file that cannot be recreated
    /// is left for the next write to recover.
    fn reload(&self, state: &mut RingMeta) -> Result<()> {
        self.meta.load_pointers(state)?;
        if !state.is_valid() {
            warn!(
                "Ring {} has invalid pointers (head={}, tail={}, num={}), resetting",
                self.namespace(),
                state.head,
                state.tail,
                state.item_num
            );
            self.stats.recoveries.fetch_add(1, Ordering::Relaxed);
            self.reset_pointers(state)?;
            if let Err(e) = self.region.reset() {
                warn!(
                    "Failed to recreate data file {:?}: {}",
                    self.region.path(),
                    e
                );
            }
        }
        Ok(())
    }

    /// Reset pointers and data file
    ///
    /// Both steps always run; the first failure is returned. `state` is
    /// reset even if persisting fails.
    fn reset_locked(&self, state: &mut RingMeta) -> Result<()> {
        let saved = self.reset_pointers(state);
        let truncated = self.region.reset();
        saved.and(truncated)
    }

    fn reset_pointers(&self, state: &mut RingMeta) -> Result<()> {
        *state = RingMeta::empty(state.item_size, state.item_num);
        self.meta.save(state)
    }

    /// Reset after detecting corruption, logging rather than returning errors
    fn recover(&self, state: &mut RingMeta) {
        self.stats.recoveries.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.reset_locked(state) {
            error!("Failed to reset ring {}: {}", self.namespace(), e);
        }
    }

    /// Open the data file for writing, resetting the ring and retrying once
    fn open_for_write(&self, state: &mut RingMeta) -> Result<RegionFile> {
        match self.region.open(RegionMode::Write) {
            Ok(file) => return Ok(file),
            Err(e) => warn!(
                "Failed to open {:?} for write ({}), resetting ring {}",
                self.region.path(),
                e,
                self.namespace()
            ),
        }

        self.recover(state);

        self.region.open(RegionMode::Write).map_err(|e| {
            error!(
                "Failed to recreate data file {:?}: {}",
                self.region.path(),
                e
            );
            Error::StorageUnavailable {
                path: self.region.path().display().to_string(),
                reason: e.to_string(),
            }
        })
    }

    /// Write `count` items at `head`, wrapping to slot 0 if needed
    ///
    /// The second segment is only attempted if the first completed, so the
    /// written span is always contiguous from `head`.
    fn write_segments(
        &self,
        file: &mut impl ItemIo,
        state: &RingMeta,
        items: &[u8],
        count: u32,
    ) -> u32 {
        let item_size = state.item_size as usize;
        let first = count.min(state.room_to_end());
        let split = first as usize * item_size;

        let mut written = self.transfer(file.write_items(state.head, &items[..split]), "write");
        if written == first && count > first {
            written += self.transfer(
                file.write_items(0, &items[split..count as usize * item_size]),
                "write",
            );
        }
        written
    }

    /// Read `count` items at `tail`, wrapping to slot 0 if needed
    ///
    /// Fails only if the first segment fails. A failed second segment
    /// still returns what the first one read.
    fn read_segments(
        &self,
        file: &mut impl ItemIo,
        state: &RingMeta,
        out: &mut [u8],
        count: u32,
    ) -> Result<u32> {
        let item_size = state.item_size as usize;
        let first = count.min(state.unread_to_end());
        let split = first as usize * item_size;

        let mut read = item_total(file.read_items(state.tail, &mut out[..split])?);
        if read == first && count > first {
            read += self.transfer(
                file.read_items(0, &mut out[split..count as usize * item_size]),
                "read",
            );
        }
        Ok(read)
    }

    /// Treat a failed transfer as a zero-length one
    fn transfer(&self, result: Result<usize>, op: &str) -> u32 {
        match result {
            Ok(n) => item_total(n),
            Err(e) => {
                warn!("Data {} failed on ring {}: {}", op, self.namespace(), e);
                0
            }
        }
    }
}

/// Item count of a transfer
fn item_total(n: usize) -> u32 {
    // Bounded by the slice, which is bounded by item_num
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Advance `pos` by `by` slots on a ring of `modulus` slots
#[allow(clippy::cast_possible_truncation)]
const fn advance(pos: u32, by: u32, modulus: u32) -> u32 {
    // Result is below modulus, so it fits back into u32
    ((pos as u64 + by as u64) % modulus as u64) as u32
}

/// Apply a completed write of `written` items to the pointers
///
/// `used` is the occupancy before the write. Returns how many unread items
/// were overwritten.
fn apply_write(state: &mut RingMeta, used: u32, written: u32) -> u32 {
    state.head = advance(state.head, written, state.item_num);

    let capacity = u64::from(state.usable_capacity());
    let total = u64::from(used) + u64::from(written);
    if total <= capacity {
        return 0;
    }

    // total - capacity <= written, so it fits in u32
    let overwritten = u32::try_from(total - capacity).unwrap_or(written);
    state.tail = advance(state.tail, overwritten, state.item_num);
    overwritten
}
