//! Writer/reader simulation
//!
//! Runs a writer thread and a reader thread against one shared ring of
//! [`SampleRecord`]s, each at its own pace. With a slow reader the ring
//! overflows and the oldest records are overwritten.

use anyhow::{Context, Result, anyhow};
use ringlog_common::RingConfig;
use ringlog_storage::{KeyValueStore, RecordRing, SampleRecord};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub items: u32,
    pub write_interval: Duration,
    pub read_interval: Duration,
    pub batch: usize,
}

/// Outcome of a simulation run
#[derive(Debug, Default)]
pub struct SimulationReport {
    pub written: u64,
    pub read: u64,
    pub overwritten: u64,
}

type SampleRing<K> = RecordRing<SampleRecord, K>;

/// Run the simulation until every record is written and the ring is drained
pub fn run<K: KeyValueStore + 'static>(
    config: &RingConfig,
    store: K,
    options: &SimulateOptions,
) -> Result<SimulationReport> {
    let count = i32::try_from(options.items).context("Too many items to simulate")?;
    let ring: Arc<SampleRing<K>> = Arc::new(RecordRing::open(config, store)?);
    let done = Arc::new(AtomicBool::new(false));

    info!(
        "Simulating {} records on {} (capacity {})",
        count,
        ring.ring().namespace(),
        ring.ring().capacity()
    );

    let writer = {
        let ring = Arc::clone(&ring);
        let done = Arc::clone(&done);
        let interval = options.write_interval;
        thread::Builder::new()
            .name("ringlog-writer".to_string())
            .spawn(move || {
                let result = write_records(&ring, count, interval);
                done.store(true, Ordering::SeqCst);
                result
            })?
    };

    let reader = {
        let ring = Arc::clone(&ring);
        let done = Arc::clone(&done);
        let interval = options.read_interval;
        let batch = options.batch.max(1);
        thread::Builder::new()
            .name("ringlog-reader".to_string())
            .spawn(move || read_records(&ring, &done, batch, interval))?
    };

    let written = writer
        .join()
        .map_err(|_| anyhow!("Writer thread panicked"))??;
    let read = reader
        .join()
        .map_err(|_| anyhow!("Reader thread panicked"))??;

    Ok(SimulationReport {
        written,
        read,
        overwritten: ring
            .ring()
            .stats()
            .items_overwritten
            .load(Ordering::Relaxed),
    })
}

fn write_records<K: KeyValueStore>(
    ring: &SampleRing<K>,
    count: i32,
    interval: Duration,
) -> ringlog_common::Result<u64> {
    let mut written = 0;
    for id in 0..count {
        let record = SampleRecord::new(id, id.wrapping_mul(10));
        written += ring.push(&[record])? as u64;
        debug!("Wrote {}", record);
        thread::sleep(interval);
    }
    Ok(written)
}

fn read_records<K: KeyValueStore>(
    ring: &SampleRing<K>,
    done: &AtomicBool,
    batch: usize,
    interval: Duration,
) -> ringlog_common::Result<u64> {
    let mut read = 0;
    loop {
        // Checked before popping: an empty pop after the writer finished means drained
        let finished = done.load(Ordering::SeqCst);
        let records = ring.pop(batch)?;
        for record in &records {
            println!("read {record}");
        }
        read += records.len() as u64;

        if finished && records.is_empty() {
            return Ok(read);
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringlog_common::{Namespace, SyncMode};
    use ringlog_storage::MemoryKvStore;
    use tempfile::tempdir;

    fn config(root: &std::path::Path, item_num: u32) -> RingConfig {
        RingConfig {
            sync_mode: SyncMode::Never,
            ..RingConfig::new(root, Namespace::new("sim").unwrap(), 8, item_num)
        }
    }

    #[test]
    fn test_fast_reader_sees_everything() {
        let dir = tempdir().unwrap();
        let options = SimulateOptions {
            items: 25,
            write_interval: Duration::from_millis(1),
            read_interval: Duration::ZERO,
            batch: 4,
        };

        let report = run(&config(dir.path(), 64), MemoryKvStore::new(), &options).unwrap();
        assert_eq!(report.written, 25);
        assert_eq!(report.read, 25);
        assert_eq!(report.overwritten, 0);
    }

    #[test]
    fn test_slow_reader_accounts_for_overwrites() {
        let dir = tempdir().unwrap();
        let options = SimulateOptions {
            items: 40,
            write_interval: Duration::ZERO,
            read_interval: Duration::from_millis(5),
            batch: 1,
        };

        let report = run(&config(dir.path(), 4), MemoryKvStore::new(), &options).unwrap();
        assert_eq!(report.written, 40);
        assert_eq!(report.read + report.overwritten, 40);
    }

    #[test]
    fn test_wrong_item_size_rejected() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path(), 4);
        config.item_size = 4;

        let options = SimulateOptions {
            items: 1,
            write_interval: Duration::ZERO,
            read_interval: Duration::ZERO,
            batch: 1,
        };
        assert!(run(&config, MemoryKvStore::new(), &options).is_err());
    }
}
