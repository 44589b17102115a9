//! Ring pointers and their persistence

use super::{KeyValueStore, KvHandle, OpenMode};
use ringlog_common::{Error, Namespace, Result};
use tracing::debug;

/// Key of the next write slot
pub const KEY_HEAD: &str = "head";
/// Key of the next read slot
pub const KEY_TAIL: &str = "tail";
/// Key of the item size in bytes
pub const KEY_ITEM_SIZE: &str = "size";
/// Key of the slot count
pub const KEY_ITEM_NUM: &str = "num";

/// Persisted state of one ring
///
/// One slot is always left unused so that `head == tail` means empty and
/// never full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingMeta {
    /// Next slot to be written
    pub head: u32,
    /// Next slot to be read
    pub tail: u32,
    /// Size of one item in bytes
    pub item_size: u32,
    /// Number of slots
    pub item_num: u32,
}

impl RingMeta {
    /// Empty ring with the given geometry
    #[must_use]
    pub const fn empty(item_size: u32, item_num: u32) -> Self {
        Self {
            head: 0,
            tail: 0,
            item_size,
            item_num,
        }
    }

    /// Number of unread items
    #[must_use]
    pub const fn occupancy(&self) -> u32 {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.item_num - self.tail + self.head
        }
    }

    /// Maximum number of items held before overwrite begins
    #[must_use]
    pub const fn usable_capacity(&self) -> u32 {
        self.item_num.saturating_sub(1)
    }

    /// Whether there is nothing to read
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Slots from `head` to the physical end of the region
    #[must_use]
    pub const fn room_to_end(&self) -> u32 {
        self.item_num - self.head
    }

    /// Slots from `tail` to the physical end of the region
    #[must_use]
    pub const fn unread_to_end(&self) -> u32 {
        self.item_num - self.tail
    }

    /// Whether geometry and pointers are usable
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.item_size > 0
            && self.item_num >= 2
            && self.head < self.item_num
            && self.tail < self.item_num
    }
}

/// Loads and saves [`RingMeta`] under one namespace of a key-value store
#[derive(Debug)]
pub struct MetaAdapter<K> {
    store: K,
    namespace: Namespace,
}

impl<K: KeyValueStore> MetaAdapter<K> {
    /// Create an adapter for `namespace`
    pub const fn new(store: K, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Namespace this adapter persists to
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Underlying store
    pub const fn store(&self) -> &K {
        &self.store
    }

    /// Load the full record
    ///
    /// Fails if the namespace is absent or any of the four fields is missing.
    pub fn load_all(&self) -> Result<RingMeta> {
        let handle = self
            .store
            .open(&self.namespace, OpenMode::ReadOnly)
            .map_err(|e| self.store_error(e))?;
        let get = |key: &str| self.required(&handle, key);

        Ok(RingMeta {
            head: get(KEY_HEAD)?,
            tail: get(KEY_TAIL)?,
            item_size: get(KEY_ITEM_SIZE)?,
            item_num: get(KEY_ITEM_NUM)?,
        })
    }

    /// Reload head and tail into `meta`, keeping its geometry
    pub fn load_pointers(&self, meta: &mut RingMeta) -> Result<()> {
        let handle = self
            .store
            .open(&self.namespace, OpenMode::ReadOnly)
            .map_err(|e| self.store_error(e))?;
        let get = |key: &str| self.required(&handle, key);

        meta.head = get(KEY_HEAD)?;
        meta.tail = get(KEY_TAIL)?;
        Ok(())
    }

    /// Persist the full record
    pub fn save(&self, meta: &RingMeta) -> Result<()> {
        let mut handle = self
            .store
            .open(&self.namespace, OpenMode::ReadWrite)
            .map_err(|e| self.store_error(e))?;
        handle.set_u32(KEY_HEAD, meta.head)?;
        handle.set_u32(KEY_TAIL, meta.tail)?;
        handle.set_u32(KEY_ITEM_SIZE, meta.item_size)?;
        handle.set_u32(KEY_ITEM_NUM, meta.item_num)?;
        handle.commit().map_err(|e| self.store_error(e))?;

        debug!(
            "Saved ring meta for {}: head={} tail={}",
            self.namespace, meta.head, meta.tail
        );
        Ok(())
    }

    fn required(&self, handle: &K::Handle, key: &str) -> Result<u32> {
        handle.get_u32(key).ok_or_else(|| {
            Error::metadata(format!(
                "namespace {} is missing key {key:?}",
                self.namespace
            ))
        })
    }

    /// Report any backend failure as a metadata error
    fn store_error(&self, err: Error) -> Error {
        match err {
            Error::Metadata(_) => err,
            other => Error::metadata(format!("namespace {}: {other}", self.namespace)),
        }
    }

    /// Reset to an empty ring with the given geometry and persist it
    pub fn reset(&self, item_size: u32, item_num: u32) -> Result<RingMeta> {
        let meta = RingMeta::empty(item_size, item_num);
        self.save(&meta)?;
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FileKvStore, MemoryKvStore};

    fn meta(head: u32, tail: u32, item_num: u32) -> RingMeta {
        RingMeta {
            head,
            tail,
            item_size: 8,
            item_num,
        }
    }

    #[test]
    fn test_occupancy() {
        assert_eq!(meta(0, 0, 4).occupancy(), 0);
        assert_eq!(meta(3, 0, 4).occupancy(), 3);
        assert_eq!(meta(0, 1, 4).occupancy(), 3);
        assert_eq!(meta(1, 3, 4).occupancy(), 2);
        assert_eq!(meta(2, 2, 4).occupancy(), 0);
    }

    #[test]
    fn test_geometry_helpers() {
        let m = meta(3, 1, 4);
        assert_eq!(m.usable_capacity(), 3);
        assert_eq!(m.room_to_end(), 1);
        assert_eq!(m.unread_to_end(), 3);
        assert!(m.is_valid());
        assert!(!m.is_empty());

        assert!(!meta(4, 0, 4).is_valid());
        assert!(!meta(0, 0, 1).is_valid());
        assert!(!RingMeta::empty(0, 4).is_valid());
    }

    #[test]
    fn test_adapter_save_and_load() {
        let store = MemoryKvStore::new();
        let ns = Namespace::new("sensor").unwrap();
        let adapter = MetaAdapter::new(store.clone(), ns.clone());

        assert!(adapter.load_all().is_err());

        adapter.save(&meta(2, 1, 4)).unwrap();
        assert_eq!(adapter.load_all().unwrap(), meta(2, 1, 4));
        assert_eq!(store.get(&ns, KEY_ITEM_NUM), Some(4));

        let mut cached = meta(0, 0, 4);
        store.insert(&ns, KEY_HEAD, 3);
        adapter.load_pointers(&mut cached).unwrap();
        assert_eq!(cached, meta(3, 1, 4));

        assert_eq!(adapter.reset(8, 4).unwrap(), meta(0, 0, 4));
        assert_eq!(adapter.load_all().unwrap(), meta(0, 0, 4));
    }

    #[test]
    fn test_adapter_corrupt_file_is_metadata_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path());
        let ns = Namespace::new("sensor").unwrap();
        let adapter = MetaAdapter::new(store.clone(), ns.clone());
        adapter.save(&meta(1, 0, 4)).unwrap();

        std::fs::write(store.namespace_path(&ns), b"not a record").unwrap();

        assert!(adapter.load_all().unwrap_err().is_metadata_error());
        let mut cached = meta(0, 0, 4);
        assert!(adapter.load_pointers(&mut cached).unwrap_err().is_metadata_error());

        // Saving replaces the damaged record
        adapter.save(&meta(2, 1, 4)).unwrap();
        assert_eq!(adapter.load_all().unwrap(), meta(2, 1, 4));
    }

    #[test]
    fn test_adapter_missing_key() {
        let store = MemoryKvStore::new();
        let ns = Namespace::new("sensor").unwrap();
        store.insert(&ns, KEY_HEAD, 0);

        let adapter = MetaAdapter::new(store, ns);
        let err = adapter.load_all().unwrap_err();
        assert!(err.to_string().contains("tail"));
    }
}
