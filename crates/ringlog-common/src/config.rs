//! Configuration types for ringlog
//!
//! This module defines the configuration of a single ring buffer. Binaries
//! embed it in their own file formats.

use crate::error::{Error, Result};
use crate::types::Namespace;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest ring that can hold anything (one slot is always kept free)
pub const MIN_ITEM_NUM: u32 = 2;

/// Configuration for one ring buffer
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Storage root directory (must already exist)
    pub root: PathBuf,
    /// Metadata namespace, also the data file stem
    pub namespace: Namespace,
    /// Size of one item in bytes
    pub item_size: u32,
    /// Number of slots (usable capacity is one less)
    pub item_num: u32,
    /// Durability of data writes
    pub sync_mode: SyncMode,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./ringlog-data"),
            namespace: Namespace::default(),
            item_size: 8,
            item_num: 500,
            sync_mode: SyncMode::default(),
        }
    }
}

impl RingConfig {
    /// Create a config for the given geometry with default durability
    pub fn new(
        root: impl Into<PathBuf>,
        namespace: Namespace,
        item_size: u32,
        item_num: u32,
    ) -> Self {
        Self {
            root: root.into(),
            namespace,
            item_size,
            item_num,
            sync_mode: SyncMode::default(),
        }
    }

    /// Check the ring geometry
    ///
    /// The namespace is validated by its type; this checks the numeric
    /// fields and that the whole region is addressable both as a file
    /// offset and as an in-memory buffer length.
    pub fn validate(&self) -> Result<()> {
        if self.item_size == 0 {
            return Err(Error::configuration("item_size must be greater than 0"));
        }
        if self.item_num < MIN_ITEM_NUM {
            return Err(Error::configuration(format!(
                "item_num must be at least {MIN_ITEM_NUM}, got {}",
                self.item_num
            )));
        }

        let region_bytes = self.region_bytes();
        if usize::try_from(region_bytes).is_err() {
            return Err(Error::configuration(format!(
                "region of {region_bytes} bytes is not addressable on this platform"
            )));
        }

        Ok(())
    }

    /// Full size of the data region in bytes
    #[must_use]
    pub fn region_bytes(&self) -> u64 {
        // u32 * u32 always fits in u64
        u64::from(self.item_size) * u64::from(self.item_num)
    }
}

/// Data write durability mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Flush data before publishing pointers, fsync metadata on commit
    #[default]
    Always,
    /// Leave flushing to the OS (fastest, wider crash window)
    Never,
}

impl SyncMode {
    /// Whether writes should be flushed to stable storage
    #[must_use]
    pub const fn is_durable(self) -> bool {
        matches!(self, Self::Always)
    }
}
