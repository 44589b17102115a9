//! ringlog CLI - persistent ring buffer tool
//!
//! Inspects and drives one ring under a local storage root.

mod config;
mod simulate;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use config::{Config, Overrides};
use ringlog_storage::{FileKvStore, RingBuffer};
use serde::Serialize;
use simulate::SimulateOptions;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ringlog-cli")]
#[command(about = "Persistent fixed-record ring buffer tool")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "ringlog.toml")]
    config: PathBuf,

    /// Storage root directory
    #[arg(long, env = "RINGLOG_ROOT")]
    root: Option<PathBuf>,

    /// Ring namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Item size in bytes
    #[arg(long)]
    item_size: Option<u32>,

    /// Number of slots (capacity is one less)
    #[arg(long)]
    item_num: Option<u32>,

    /// Metadata directory
    #[arg(long)]
    meta_dir: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the ring, or adopt an existing one with the same geometry
    Init,
    /// Show ring pointers and occupancy
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
    /// Append items given as hex strings
    Push {
        /// One hex string per item, each exactly item-size bytes
        #[arg(required = true)]
        items: Vec<String>,
    },
    /// Read and remove the oldest items
    Pop {
        /// Maximum number of items to read
        #[arg(short, long, default_value_t = 1)]
        count: usize,
    },
    /// Discard all items
    Clear,
    /// Run a writer and a reader thread against the ring (item size 8)
    Simulate {
        /// Number of records to write
        #[arg(long, default_value_t = 20)]
        items: u32,
        /// Delay between writes
        #[arg(long, default_value_t = 100)]
        write_interval_ms: u64,
        /// Delay between reads
        #[arg(long, default_value_t = 250)]
        read_interval_ms: u64,
        /// Records per read
        #[arg(long, default_value_t = 3)]
        batch: usize,
    },
}

#[derive(Debug, Serialize)]
struct Status {
    namespace: String,
    path: PathBuf,
    item_size: u32,
    item_num: u32,
    head: u32,
    tail: u32,
    len: u32,
    capacity: u32,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load config file, CLI takes precedence
    let config = Config::load(&args.config)?.apply(Overrides {
        root: args.root,
        namespace: args.namespace,
        item_size: args.item_size,
        item_num: args.item_num,
        meta_dir: args.meta_dir,
        log_level: args.log_level,
    })?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store = FileKvStore::new(config.meta_dir()).with_sync(config.ring.sync_mode.is_durable());

    match args.command {
        Commands::Init => {
            std::fs::create_dir_all(&config.ring.root).with_context(|| {
                format!("Failed to create root {}", config.ring.root.display())
            })?;
            let ring = open_ring(&config, store)?;
            println!("Ring:      {}", ring.namespace());
            println!("Data file: {}", ring.path().display());
            println!("Item size: {} bytes", ring.item_size());
            println!("Capacity:  {} items", ring.capacity());
            println!("Unread:    {} items", ring.len()?);
        }
        Commands::Status { json } => {
            let ring = open_ring(&config, store)?;
            let status = status(&ring)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Ring {}", status.namespace);
                println!("==========");
                println!("Data file: {}", status.path.display());
                println!("Geometry:  {} x {} bytes", status.item_num, status.item_size);
                println!("Head:      {}", status.head);
                println!("Tail:      {}", status.tail);
                println!("Unread:    {}/{}", status.len, status.capacity);
            }
        }
        Commands::Push { items } => {
            let ring = open_ring(&config, store)?;
            let data = parse_items(&items, ring.item_size())?;
            let written = ring.write(&data)?;
            println!("Wrote {written} of {} items", items.len());
        }
        Commands::Pop { count } => {
            let ring = open_ring(&config, store)?;
            let item_size = ring.item_size() as usize;
            let mut buf = vec![0u8; count.min(ring.capacity() as usize) * item_size];
            let read = ring.read(&mut buf)?;
            for item in buf[..read * item_size].chunks(item_size) {
                println!("{}", hex::encode(item));
            }
            info!("Read {} items", read);
        }
        Commands::Clear => {
            let ring = open_ring(&config, store)?;
            ring.clear()?;
            println!("Cleared ring {}", ring.namespace());
        }
        Commands::Simulate {
            items,
            write_interval_ms,
            read_interval_ms,
            batch,
        } => {
            let options = SimulateOptions {
                items,
                write_interval: Duration::from_millis(write_interval_ms),
                read_interval: Duration::from_millis(read_interval_ms),
                batch,
            };
            let report = simulate::run(&config.ring, store, &options)?;
            println!(
                "Wrote {}, read {}, overwritten {}",
                report.written, report.read, report.overwritten
            );
        }
    }

    Ok(())
}

fn open_ring(config: &Config, store: FileKvStore) -> Result<RingBuffer<FileKvStore>> {
    RingBuffer::open(&config.ring, store)
        .with_context(|| format!("Failed to open ring {}", config.ring.namespace))
}

fn status(ring: &RingBuffer<FileKvStore>) -> Result<Status> {
    let meta = ring.snapshot()?;
    Ok(Status {
        namespace: ring.namespace().to_string(),
        path: ring.path().to_path_buf(),
        item_size: meta.item_size,
        item_num: meta.item_num,
        head: meta.head,
        tail: meta.tail,
        len: meta.occupancy(),
        capacity: meta.usable_capacity(),
    })
}

/// Decode hex items into one buffer of whole items
fn parse_items(items: &[String], item_size: u32) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(items.len() * item_size as usize);
    for item in items {
        let hex_str = item.strip_prefix("0x").unwrap_or(item);
        let bytes = hex::decode(hex_str).with_context(|| format!("Invalid hex item: {item}"))?;
        if bytes.len() != item_size as usize {
            bail!(
                "Item {item} is {} bytes, expected {item_size}",
                bytes.len()
            );
        }
        data.extend_from_slice(&bytes);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringlog_common::{Namespace, RingConfig};
    use tempfile::tempdir;

    #[test]
    fn test_parse_items() {
        let items = vec!["0100000002000000".to_string(), "0xffffffff00000000".to_string()];
        let data = parse_items(&items, 8).unwrap();
        assert_eq!(data.len(), 16);
        assert_eq!(&data[..8], &[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(&data[8..12], &[0xff; 4]);

        assert!(parse_items(&["0102".to_string()], 8).is_err());
        assert!(parse_items(&["zz".to_string()], 1).is_err());
    }

    #[test]
    fn test_status() {
        let dir = tempdir().unwrap();
        let config = Config {
            ring: RingConfig::new(dir.path(), Namespace::new("cli").unwrap(), 4, 4),
            ..Default::default()
        };

        let ring = open_ring(&config, FileKvStore::new(config.meta_dir())).unwrap();
        ring.write(&parse_items(&["00000001".to_string(), "00000002".to_string()], 4).unwrap())
            .unwrap();

        let status = status(&ring).unwrap();
        assert_eq!(status.head, 2);
        assert_eq!(status.tail, 0);
        assert_eq!(status.len, 2);
        assert_eq!(status.capacity, 3);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["namespace"], "cli");
        assert_eq!(json["len"], 2);
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "ringlog-cli",
            "--root",
            "/tmp/r",
            "-n",
            "adc",
            "pop",
            "--count",
            "5",
        ])
        .unwrap();
        assert_eq!(args.namespace.as_deref(), Some("adc"));
        assert!(matches!(args.command, Commands::Pop { count: 5 }));

        assert!(Args::try_parse_from(["ringlog-cli", "push"]).is_err());
    }
}
