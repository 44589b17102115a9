//! Typed records
//!
//! A [`RecordRing`] stores values of one [`FixedRecord`] type in a
//! [`RingBuffer`] whose item size equals the record's encoded size.

use crate::metadata::KeyValueStore;
use crate::ring::RingBuffer;
use bytes::{Buf, BufMut, BytesMut};
use ringlog_common::{Error, Result, RingConfig};
use std::fmt;
use std::marker::PhantomData;

/// A value with a fixed-size binary encoding
pub trait FixedRecord: Sized {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Append exactly `SIZE` bytes to `buf`
    fn encode(&self, buf: &mut BytesMut);

    /// Decode one record, advancing `buf` by `SIZE` bytes
    fn decode(buf: &mut &[u8]) -> Result<Self>;
}

/// Record used by the simulator and tests: little-endian id and value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SampleRecord {
    pub id: i32,
    pub value: i32,
}

impl SampleRecord {
    /// Create a record
    #[must_use]
    pub const fn new(id: i32, value: i32) -> Self {
        Self { id, value }
    }
}

impl fmt::Display for SampleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{id: {}, value: {}}}", self.id, self.value)
    }
}

impl FixedRecord for SampleRecord {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.id);
        buf.put_i32_le(self.value);
    }

    fn decode(buf: &mut &[u8]) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(Error::corruption(format!(
                "sample record needs {} bytes, got {}",
                Self::SIZE,
                buf.remaining()
            )));
        }

        let id = buf.get_i32_le();
        let value = buf.get_i32_le();
        Ok(Self { id, value })
    }
}

/// Ring of typed records
pub struct RecordRing<T, K> {
    ring: RingBuffer<K>,
    _record: PhantomData<fn() -> T>,
}

impl<T: FixedRecord, K: KeyValueStore> RecordRing<T, K> {
    /// Wrap an existing ring; its item size must match `T::SIZE`
    pub fn new(ring: RingBuffer<K>) -> Result<Self> {
        let item_size = ring.item_size() as usize;
        if item_size != T::SIZE {
            return Err(Error::invalid_argument(format!(
                "ring item size {item_size} does not match record size {}",
                T::SIZE
            )));
        }

        Ok(Self {
            ring,
            _record: PhantomData,
        })
    }

    /// Open a ring for `T` from its configuration
    pub fn open(config: &RingConfig, store: K) -> Result<Self> {
        if config.item_size as usize != T::SIZE {
            return Err(Error::invalid_argument(format!(
                "configured item size {} does not match record size {}",
                config.item_size,
                T::SIZE
            )));
        }
        Self::new(RingBuffer::open(config, store)?)
    }

    /// Underlying byte ring
    pub const fn ring(&self) -> &RingBuffer<K> {
        &self.ring
    }

    /// Append records, overwriting the oldest if needed
    pub fn push(&self, records: &[T]) -> Result<usize> {
        let mut buf = BytesMut::with_capacity(records.len() * T::SIZE);
        for record in records {
            record.encode(&mut buf);
        }
        if buf.len() != records.len() * T::SIZE {
            return Err(Error::invalid_argument(format!(
                "records encoded to {} bytes, expected {}",
                buf.len(),
                records.len() * T::SIZE
            )));
        }

        self.ring.write(&buf)
    }

    /// Remove and return up to `max` of the oldest records
    pub fn pop(&self, max: usize) -> Result<Vec<T>> {
        // Never more than the ring can hold
        let max = max.min(self.ring.capacity() as usize);
        let mut buf = vec![0u8; max * T::SIZE];
        let read = self.ring.read(&mut buf)?;

        let mut data = &buf[..read * T::SIZE];
        let mut records = Vec::with_capacity(read);
        while data.has_remaining() {
            records.push(T::decode(&mut data)?);
        }
        Ok(records)
    }

    /// Check whether there is nothing to pop
    pub fn is_empty(&self) -> Result<bool> {
        self.ring.is_empty()
    }

    /// Number of unread records
    pub fn len(&self) -> Result<u32> {
        self.ring.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemoryKvStore;
    use ringlog_common::Namespace;
    use tempfile::tempdir;

    fn records(range: std::ops::Range<i32>) -> Vec<SampleRecord> {
        range.map(|i| SampleRecord::new(i, i * 10)).collect()
    }

    #[test]
    fn test_sample_record_encoding() {
        let mut buf = BytesMut::new();
        SampleRecord::new(1, -2).encode(&mut buf);
        assert_eq!(&buf[..], &[1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF]);

        let mut data = &buf[..];
        assert_eq!(
            SampleRecord::decode(&mut data).unwrap(),
            SampleRecord::new(1, -2)
        );
        assert!(data.is_empty());

        let mut short: &[u8] = &[1, 2, 3];
        assert!(matches!(
            SampleRecord::decode(&mut short),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_push_pop() {
        let dir = tempdir().unwrap();
        let config = RingConfig::new(dir.path(), Namespace::new("sensor").unwrap(), 8, 4);
        let ring: RecordRing<SampleRecord, _> =
            RecordRing::open(&config, MemoryKvStore::new()).unwrap();

        assert_eq!(ring.push(&records(0..3)).unwrap(), 3);
        assert_eq!(ring.push(&records(3..4)).unwrap(), 1);
        assert_eq!(ring.len().unwrap(), 3);

        assert_eq!(ring.pop(2).unwrap(), records(1..3));
        assert_eq!(ring.pop(100).unwrap(), records(3..4));
        assert!(ring.pop(1).unwrap().is_empty());
        assert!(ring.is_empty().unwrap());
    }

    #[test]
    fn test_item_size_mismatch() {
        let dir = tempdir().unwrap();
        let config = RingConfig::new(dir.path(), Namespace::new("sensor").unwrap(), 16, 4);

        let err = RecordRing::<SampleRecord, _>::open(&config, MemoryKvStore::new())
            .err()
            .unwrap();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let bytes = RingBuffer::open(&config, MemoryKvStore::new()).unwrap();
        assert!(RecordRing::<SampleRecord, _>::new(bytes).is_err());
    }
}
