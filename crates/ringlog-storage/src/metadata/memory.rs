//! In-memory key-value store
//!
//! Shares state between clones, so a test can keep one clone to inspect or
//! sabotage the store while a ring owns another.

use super::{KeyValueStore, KvHandle, OpenMode, check_key, check_writable};
use parking_lot::Mutex;
use ringlog_common::{Error, Namespace, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type Entries = HashMap<String, u32>;

#[derive(Debug, Default)]
struct Inner {
    namespaces: Mutex<HashMap<String, Entries>>,
    fail_open: AtomicBool,
    fail_commit: AtomicBool,
    commits: AtomicU64,
}

/// Volatile key-value store
#[derive(Clone, Debug, Default)]
pub struct MemoryKvStore {
    inner: Arc<Inner>,
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `open` fail
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `commit` fail
    pub fn set_fail_commit(&self, fail: bool) {
        self.inner.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Set a committed value directly
    pub fn insert(&self, namespace: &Namespace, key: &str, value: u32) {
        self.inner
            .namespaces
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Read a committed value directly
    pub fn get(&self, namespace: &Namespace, key: &str) -> Option<u32> {
        self.inner
            .namespaces
            .lock()
            .get(namespace.as_str())
            .and_then(|entries| entries.get(key).copied())
    }

    /// Drop a namespace and all its values
    pub fn remove_namespace(&self, namespace: &Namespace) {
        self.inner.namespaces.lock().remove(namespace.as_str());
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }
}

impl KeyValueStore for MemoryKvStore {
    type Handle = MemoryKvHandle;

    fn open(&self, namespace: &Namespace, mode: OpenMode) -> Result<MemoryKvHandle> {
        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(Error::metadata(format!(
                "failed to open namespace {namespace}"
            )));
        }

        let existing = self.inner.namespaces.lock().get(namespace.as_str()).cloned();
        let entries = match (existing, mode) {
            (Some(entries), _) => entries,
            (None, OpenMode::ReadWrite) => Entries::new(),
            (None, OpenMode::ReadOnly) => {
                return Err(Error::metadata(format!(
                    "namespace {namespace} not found"
                )));
            }
        };

        Ok(MemoryKvHandle {
            inner: Arc::clone(&self.inner),
            namespace: namespace.clone(),
            mode,
            entries,
        })
    }
}

/// Open namespace of a [`MemoryKvStore`]
#[derive(Debug)]
pub struct MemoryKvHandle {
    inner: Arc<Inner>,
    namespace: Namespace,
    mode: OpenMode,
    entries: Entries,
}

impl KvHandle for MemoryKvHandle {
    fn get_u32(&self, key: &str) -> Option<u32> {
        self.entries.get(key).copied()
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<()> {
        check_writable(self.mode, &self.namespace)?;
        check_key(key)?;
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        check_writable(self.mode, &self.namespace)?;
        if self.inner.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::metadata(format!(
                "failed to commit namespace {}",
                self.namespace
            )));
        }

        self.inner
            .namespaces
            .lock()
            .insert(self.namespace.to_string(), self.entries.clone());
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let store = MemoryKvStore::new();
        let observer = store.clone();
        let ns = Namespace::new("sensor").unwrap();

        let mut handle = store.open(&ns, OpenMode::ReadWrite).unwrap();
        handle.set_u32("head", 4).unwrap();
        assert_eq!(observer.get(&ns, "head"), None);

        handle.commit().unwrap();
        assert_eq!(observer.get(&ns, "head"), Some(4));
        assert_eq!(observer.commit_count(), 1);
    }

    #[test]
    fn test_fault_injection() {
        let store = MemoryKvStore::new();
        let ns = Namespace::new("sensor").unwrap();
        store.insert(&ns, "head", 1);

        store.set_fail_open(true);
        assert!(store.open(&ns, OpenMode::ReadOnly).unwrap_err().is_metadata_error());
        store.set_fail_open(false);

        let mut handle = store.open(&ns, OpenMode::ReadWrite).unwrap();
        handle.set_u32("head", 2).unwrap();
        store.set_fail_commit(true);
        assert!(handle.commit().unwrap_err().is_metadata_error());
        assert_eq!(store.get(&ns, "head"), Some(1));
    }

    #[test]
    fn test_read_only_missing_namespace() {
        let store = MemoryKvStore::new();
        let ns = Namespace::new("absent").unwrap();
        assert!(store.open(&ns, OpenMode::ReadOnly).is_err());

        store.insert(&ns, "head", 0);
        assert!(store.open(&ns, OpenMode::ReadOnly).is_ok());

        store.remove_namespace(&ns);
        assert!(store.open(&ns, OpenMode::ReadOnly).is_err());
    }
}
