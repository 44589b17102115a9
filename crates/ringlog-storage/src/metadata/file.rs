//! File-backed key-value store
//!
//! Each namespace lives in its own file, `<dir>/<namespace>.meta`, holding
//! the full set of values for that namespace.
//!
//! Record format:
//! ```text
//! +--------+---------+-------+-----------------------------------+--------+
//! | Magic  | Version | Count | Entries                           | CRC32C |
//! | 4B     | 2B      | 2B    | (key len 1B, key, value u32 LE)*  | 4B     |
//! +--------+---------+-------+-----------------------------------+--------+
//! ```
//!
//! Commit writes the record to `<namespace>.meta.tmp` and renames it over
//! the live file, so a torn commit leaves the previous generation intact.

use super::{KeyValueStore, KvHandle, OpenMode, check_key, check_writable};
use bytes::{Buf, BufMut, BytesMut};
use ringlog_common::{Error, Namespace, Result};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Metadata file magic number
const META_MAGIC: [u8; 4] = *b"RLKV";

/// Current metadata file format version
const META_VERSION: u16 = 1;

/// Header size (magic + version + count)
const HEADER_SIZE: usize = 8;

/// Trailer size (CRC32C)
const TRAILER_SIZE: usize = 4;

/// Key-value store keeping one file per namespace
#[derive(Clone, Debug)]
pub struct FileKvStore {
    dir: PathBuf,
    sync_on_commit: bool,
}

impl FileKvStore {
    /// Create a store rooted at `dir`; commits are fsynced
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sync_on_commit: true,
        }
    }

    /// Enable or disable fsync on commit
    #[must_use]
    pub const fn with_sync(mut self, sync_on_commit: bool) -> Self {
        self.sync_on_commit = sync_on_commit;
        self
    }

    /// Path of the file backing `namespace`
    pub fn namespace_path(&self, namespace: &Namespace) -> PathBuf {
        self.dir.join(format!("{namespace}.meta"))
    }

    fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, u32>>> {
        match fs::read(path) {
            Ok(data) => decode_entries(&data).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::metadata(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

impl KeyValueStore for FileKvStore {
    type Handle = FileKvHandle;

    fn open(&self, namespace: &Namespace, mode: OpenMode) -> Result<FileKvHandle> {
        let path = self.namespace_path(namespace);

        let entries = match mode {
            OpenMode::ReadOnly => Self::read_entries(&path)?.ok_or_else(|| {
                Error::metadata(format!("namespace {namespace} not found"))
            })?,
            OpenMode::ReadWrite => {
                fs::create_dir_all(&self.dir).map_err(|e| {
                    Error::metadata(format!(
                        "failed to create metadata dir {}: {}",
                        self.dir.display(),
                        e
                    ))
                })?;

                match Self::read_entries(&path) {
                    Ok(entries) => entries.unwrap_or_default(),
                    // A damaged record is about to be replaced by the caller
                    Err(Error::Corruption(msg)) => {
                        warn!("Discarding corrupt metadata for {}: {}", namespace, msg);
                        BTreeMap::new()
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        Ok(FileKvHandle {
            path,
            namespace: namespace.clone(),
            mode,
            entries,
            dirty: false,
            sync_on_commit: self.sync_on_commit,
        })
    }
}

/// Open namespace of a [`FileKvStore`]
#[derive(Debug)]
pub struct FileKvHandle {
    path: PathBuf,
    namespace: Namespace,
    mode: OpenMode,
    entries: BTreeMap<String, u32>,
    dirty: bool,
    sync_on_commit: bool,
}

impl FileKvHandle {
    fn write_file(&self, data: &[u8]) -> std::io::Result<()> {
        let mut tmp_path = self.path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(data)?;
        if self.sync_on_commit {
            file.sync_all()?;
        }
        drop(file);

        fs::rename(&tmp_path, &self.path)?;

        if self.sync_on_commit {
            // Persist the rename itself
            if let Some(parent) = self.path.parent() {
                if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                    warn!("Failed to sync metadata dir {:?}: {}", parent, e);
                }
            }
        }
        Ok(())
    }
}

impl KvHandle for FileKvHandle {
    fn get_u32(&self, key: &str) -> Option<u32> {
        self.entries.get(key).copied()
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<()> {
        check_writable(self.mode, &self.namespace)?;
        check_key(key)?;

        if self.entries.insert(key.to_string(), value) != Some(value) {
            self.dirty = true;
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        check_writable(self.mode, &self.namespace)?;

        // First commit of a namespace always creates its file
        if !self.dirty && self.path.exists() {
            return Ok(());
        }

        let data = encode_entries(&self.entries);
        self.write_file(&data).map_err(|e| {
            Error::metadata(format!("failed to commit {}: {}", self.path.display(), e))
        })?;

        self.dirty = false;
        debug!("Committed {} metadata entries to {:?}", self.entries.len(), self.path);
        Ok(())
    }
}

/// Serialize a namespace's entries
fn encode_entries(entries: &BTreeMap<String, u32>) -> Vec<u8> {
    let body: usize = entries.keys().map(|k| 1 + k.len() + 4).sum();
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body + TRAILER_SIZE);

    buf.put_slice(&META_MAGIC);
    buf.put_u16_le(META_VERSION);
    // Keys are bounded by MAX_KEY_LEN and only set through check_key
    #[allow(clippy::cast_possible_truncation)]
    {
        buf.put_u16_le(entries.len() as u16);
        for (key, value) in entries {
            buf.put_u8(key.len() as u8);
            buf.put_slice(key.as_bytes());
            buf.put_u32_le(*value);
        }
    }

    // CRC over everything except the CRC itself
    let crc = crc32c::crc32c(&buf);
    buf.put_u32_le(crc);

    buf.to_vec()
}

/// Parse a namespace's entries, verifying magic, version and checksum
fn decode_entries(data: &[u8]) -> Result<BTreeMap<String, u32>> {
    if data.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(Error::corruption("metadata record too small"));
    }

    let (payload, trailer) = data.split_at(data.len() - TRAILER_SIZE);
    let stored_crc = (&trailer[..]).get_u32_le();
    let computed_crc = crc32c::crc32c(payload);
    if computed_crc != stored_crc {
        return Err(Error::corruption(format!(
            "metadata CRC mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        )));
    }

    let mut buf = payload;
    if buf[..4] != META_MAGIC {
        return Err(Error::corruption("invalid metadata magic"));
    }
    buf.advance(4);

    let version = buf.get_u16_le();
    if version != META_VERSION {
        return Err(Error::corruption(format!(
            "unsupported metadata version {version}"
        )));
    }

    let count = buf.get_u16_le();
    let mut entries = BTreeMap::new();
    for _ in 0..count {
        if buf.remaining() < 1 {
            return Err(Error::corruption("metadata entry truncated"));
        }
        let key_len = usize::from(buf.get_u8());
        if buf.remaining() < key_len + 4 {
            return Err(Error::corruption("metadata entry truncated"));
        }
        let key = std::str::from_utf8(&buf[..key_len])
            .map_err(|_| Error::corruption("metadata key is not UTF-8"))?
            .to_string();
        buf.advance(key_len);
        let value = buf.get_u32_le();
        entries.insert(key, value);
    }

    if buf.has_remaining() {
        return Err(Error::corruption(format!(
            "{} trailing bytes after metadata entries",
            buf.remaining()
        )));
    }

    Ok(entries)
}
