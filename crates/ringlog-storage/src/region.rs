//! Data region file I/O
//!
//! A region is a flat file of fixed-size slots: slot `i` lives at byte
//! offset `i * item_size`. Transfers are counted in whole items and may be
//! short, like `fread`/`fwrite`: a short count is not an error, callers
//! advance their pointers by what was actually moved.

use ringlog_common::{Error, Namespace, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension of data region files
pub const REGION_EXTENSION: &str = "bin";

/// How a region file is opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionMode {
    /// Read an existing file
    Read,
    /// Read and write an existing file; never creates it
    Write,
    /// Create the file or empty an existing one
    Truncate,
}

/// Location and geometry of one ring's data file
#[derive(Clone, Debug)]
pub struct FileRegion {
    path: PathBuf,
    item_size: u32,
}

impl FileRegion {
    /// Region for `namespace` under `root` (`<root>/<namespace>.bin`)
    pub fn new(root: impl AsRef<Path>, namespace: &Namespace, item_size: u32) -> Self {
        Self {
            path: root
                .as_ref()
                .join(format!("{namespace}.{REGION_EXTENSION}")),
            item_size,
        }
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of one item in bytes
    pub const fn item_size(&self) -> u32 {
        self.item_size
    }

    /// Current length of the data file in bytes
    pub fn len_bytes(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Open the data file
    pub fn open(&self, mode: RegionMode) -> Result<RegionFile> {
        let mut options = OpenOptions::new();
        match mode {
            RegionMode::Read => {
                options.read(true);
            }
            RegionMode::Write => {
                options.read(true).write(true);
            }
            RegionMode::Truncate => {
                options.write(true).create(true).truncate(true);
            }
        }

        let file = options.open(&self.path)?;
        Ok(RegionFile {
            file,
            path: self.path.clone(),
            item_size: self.item_size,
        })
    }

    /// Recreate the data file empty
    pub fn reset(&self) -> Result<()> {
        self.open(RegionMode::Truncate)?;
        debug!("Reset data region {:?}", self.path);
        Ok(())
    }
}

/// Byte offset of `slot` in a region of `item_size`-byte slots
#[must_use]
pub const fn slot_offset(slot: u32, item_size: u32) -> u64 {
    slot as u64 * item_size as u64
}

/// Whole-item transfers at slot positions
///
/// Transfers may be short, like `fread`/`fwrite`. Callers advance by the
/// returned count.
pub trait ItemIo {
    /// Read whole items starting at `slot` into `buf`
    ///
    /// Stops early at end of file. Returns the number of complete items
    /// read; a trailing partial item is ignored.
    fn read_items(&mut self, slot: u32, buf: &mut [u8]) -> Result<usize>;

    /// Write whole items from `data` starting at `slot`
    ///
    /// Returns the number of complete items written.
    fn write_items(&mut self, slot: u32, data: &[u8]) -> Result<usize>;
}

/// Open data file; closed on drop
#[derive(Debug)]
pub struct RegionFile {
    file: File,
    path: PathBuf,
    item_size: u32,
}

impl RegionFile {
    /// Flush written data to stable storage
    pub fn sync(&self) -> Result<()> {
        self.file.sync_data().map_err(|e| {
            Error::storage(format!("sync_data failed on {}: {}", self.path.display(), e))
        })
    }

    fn seek_to(&mut self, slot: u32) -> Result<()> {
        let offset = slot_offset(slot, self.item_size);
        self.file.seek(SeekFrom::Start(offset)).map_err(|e| {
            Error::storage(format!(
                "seek to {} failed on {}: {}",
                offset,
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

impl ItemIo for RegionFile {
    fn read_items(&mut self, slot: u32, buf: &mut [u8]) -> Result<usize> {
        self.seek_to(slot)?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if filled > 0 => {
                    warn!("Short read on {:?} after {} bytes: {}", self.path, filled, e);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(filled / self.item_size as usize)
    }

    /// Writing past the end of the file extends it.
    fn write_items(&mut self, slot: u32, data: &[u8]) -> Result<usize> {
        if data.len() % self.item_size as usize != 0 {
            return Err(Error::invalid_argument(format!(
                "{} bytes is not a whole number of {}-byte items",
                data.len(),
                self.item_size
            )));
        }

        self.seek_to(slot)?;

        let mut written = 0;
        while written < data.len() {
            match self.file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if written > 0 => {
                    warn!("Short write on {:?} after {} bytes: {}", self.path, written, e);
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(written / self.item_size as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn region(root: &Path) -> FileRegion {
        FileRegion::new(root, &Namespace::new("sensor").unwrap(), 4)
    }

    #[test]
    fn test_path_convention() {
        let r = FileRegion::new("/ringbuf", &Namespace::new("sensor").unwrap(), 8);
        assert_eq!(r.path(), Path::new("/ringbuf/sensor.bin"));
    }

    #[test]
    fn test_write_then_read_items() {
        let dir = tempdir().unwrap();
        let r = region(dir.path());
        r.reset().unwrap();

        let mut file = r.open(RegionMode::Write).unwrap();
        assert_eq!(file.write_items(2, b"aaaabbbb").unwrap(), 2);
        drop(file);
        assert_eq!(r.len_bytes().unwrap(), 16);

        let mut file = r.open(RegionMode::Read).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(file.read_items(2, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"aaaabbbb");

        // Slots before the first write read back as a zero-filled hole
        assert_eq!(file.read_items(0, &mut buf).unwrap(), 2);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn test_short_read_at_end_of_file() {
        let dir = tempdir().unwrap();
        let r = region(dir.path());
        r.reset().unwrap();

        let mut file = r.open(RegionMode::Write).unwrap();
        file.write_items(0, b"aaaabbbbcc").unwrap_err();
        file.write_items(0, b"aaaabbbb").unwrap();
        drop(file);

        let mut file = r.open(RegionMode::Read).unwrap();
        let mut buf = [0u8; 12];
        assert_eq!(file.read_items(1, &mut buf).unwrap(), 1);
        assert_eq!(&buf[..4], b"bbbb");
        assert_eq!(file.read_items(5, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_write_mode_does_not_create() {
        let dir = tempdir().unwrap();
        let r = region(dir.path());

        assert!(!r.path().exists());
        assert!(r.open(RegionMode::Write).is_err());
        assert!(r.open(RegionMode::Read).is_err());
        assert!(!r.path().exists());

        r.reset().unwrap();
        assert!(r.path().is_file());
        assert_eq!(r.len_bytes().unwrap(), 0);
    }

    #[test]
    fn test_slot_offset_does_not_overflow() {
        assert_eq!(slot_offset(3, 8), 24);
        assert_eq!(
            slot_offset(u32::MAX - 1, u32::MAX),
            u64::from(u32::MAX - 1) * u64::from(u32::MAX)
        );
    }

    #[test]
    fn test_reset_truncates() {
        let dir = tempdir().unwrap();
        let r = region(dir.path());
        r.reset().unwrap();

        let mut file = r.open(RegionMode::Write).unwrap();
        file.write_items(0, b"aaaa").unwrap();
        file.sync().unwrap();
        drop(file);

        r.reset().unwrap();
        assert_eq!(r.len_bytes().unwrap(), 0);
    }
}
