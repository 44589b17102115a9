//! Error types for ringlog
//!
//! This module defines the error taxonomy shared by the ring coordinator,
//! its storage adapters and the tools built on top of them.

use crate::types::NamespaceError;
use thiserror::Error;

/// Common result type for ringlog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for ringlog
#[derive(Debug, Error)]
pub enum Error {
    // Ring errors
    #[error("storage root not found: {path}")]
    RootNotFound { path: String },

    #[error("metadata store error: {0}")]
    Metadata(String),

    #[error("write of {requested} items exceeds usable capacity {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },

    #[error("data region unavailable: {path}: {reason}")]
    StorageUnavailable { path: String, reason: String },

    // Argument errors
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid namespace: {0}")]
    InvalidNamespace(#[from] NamespaceError),

    // Backend errors
    #[error("disk I/O error: {0}")]
    DiskIo(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a metadata store error
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if the request was rejected for exceeding ring capacity
    #[must_use]
    pub const fn is_capacity_error(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Check if this error came from the metadata store
    #[must_use]
    pub const fn is_metadata_error(&self) -> bool {
        matches!(self, Self::Metadata(_))
    }

    /// Check if retrying the same call may succeed
    ///
    /// Metadata and region failures are usually transient on flash media;
    /// argument and capacity errors never are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Metadata(_) | Self::StorageUnavailable { .. } | Self::DiskIo(_)
        )
    }
}
