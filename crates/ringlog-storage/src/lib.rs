//! ringlog storage engine - persistent fixed-record ring buffer
//!
//! This crate implements the storage side of ringlog:
//! - Ring pointer persistence in a key-value store (file-backed or in-memory)
//! - Data region files of fixed-size slots
//! - The ring coordinator (overwrite-oldest writes, wrap-aware reads,
//!   self-healing recovery)
//! - Typed records on top of raw byte items

pub mod metadata;
pub mod record;
pub mod region;
pub mod ring;

// Re-exports
pub use metadata::{
    FileKvHandle, FileKvStore, KeyValueStore, KvHandle, MemoryKvHandle, MemoryKvStore,
    MetaAdapter, OpenMode, RingMeta,
};
pub use record::{FixedRecord, RecordRing, SampleRecord};
pub use region::{FileRegion, ItemIo, RegionFile, RegionMode, slot_offset};
pub use ring::{RingBuffer, RingStats};
