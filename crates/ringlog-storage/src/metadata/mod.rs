//! Ring metadata storage
//!
//! The ring keeps its pointers in a small-scalar key-value store, one
//! namespace per ring:
//!
//! ```text
//! ┌──────────────────────────────┐
//! │  namespace "sensor"          │
//! │   head  u32  next write slot │
//! │   tail  u32  next read slot  │
//! │   size  u32  item size       │
//! │   num   u32  slot count      │
//! └──────────────────────────────┘
//! ```
//!
//! # Contract
//! - `open(namespace, ReadOnly)` fails if the namespace was never committed.
//!   Init uses that failure as the "absent" signal.
//! - `set_u32` only stages a value; nothing is visible to other handles
//!   until `commit` succeeds.
//! - Dropping a handle closes it. Uncommitted values are discarded.
//!
//! # Backends
//! - [`FileKvStore`]: one checksummed file per namespace, replaced
//!   atomically on commit
//! - [`MemoryKvStore`]: in-process store with fault injection for tests

mod file;
mod memory;
mod ring_meta;

pub use file::{FileKvHandle, FileKvStore};
pub use memory::{MemoryKvHandle, MemoryKvStore};
pub use ring_meta::{KEY_HEAD, KEY_ITEM_NUM, KEY_ITEM_SIZE, KEY_TAIL, MetaAdapter, RingMeta};

use ringlog_common::{Error, Namespace, Result};

/// Maximum key length in bytes (same limit as namespaces)
pub const MAX_KEY_LEN: usize = ringlog_common::NAMESPACE_MAX_LEN;

/// Access mode for a key-value namespace
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read existing values; fails if the namespace does not exist
    ReadOnly,
    /// Read and stage values; creates the namespace on first commit
    ReadWrite,
}

/// Open handle on one namespace of a key-value store
pub trait KvHandle {
    /// Get a value, `None` if the key is absent
    fn get_u32(&self, key: &str) -> Option<u32>;

    /// Stage a value for the next commit
    fn set_u32(&mut self, key: &str, value: u32) -> Result<()>;

    /// Make all staged values durable and visible
    fn commit(&mut self) -> Result<()>;
}

/// Persistent store of small unsigned scalars grouped by namespace
pub trait KeyValueStore: Send + Sync {
    /// Handle type returned by [`KeyValueStore::open`]
    type Handle: KvHandle;

    /// Open a namespace
    fn open(&self, namespace: &Namespace, mode: OpenMode) -> Result<Self::Handle>;
}

/// Check a key against the store's key-name limit
pub(crate) fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(Error::invalid_argument(format!(
            "metadata key {key:?} must be 1..={MAX_KEY_LEN} bytes"
        )));
    }
    Ok(())
}

/// Reject writes through a read-only handle
pub(crate) fn check_writable(mode: OpenMode, namespace: &Namespace) -> Result<()> {
    if mode == OpenMode::ReadOnly {
        return Err(Error::metadata(format!(
            "namespace {namespace} is open read-only"
        )));
    }
    Ok(())
}
