//! ringlog Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration types and
//! validated identifiers used by the ringlog storage engine and tools.

pub mod config;
pub mod error;
pub mod types;

pub use config::{RingConfig, SyncMode};
pub use error::{Error, Result};
pub use types::*;
