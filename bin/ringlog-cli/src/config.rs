//! Configuration file handling
//!
//! ```toml
//! [ring]
//! root = "/var/lib/ringlog"
//! namespace = "sensor"
//! item_size = 8
//! item_num = 500
//! sync_mode = "always"
//!
//! [metadata]
//! dir = "/var/lib/ringlog/meta"
//!
//! [logging]
//! level = "info"
//! ```

use anyhow::{Context, Result};
use ringlog_common::{Namespace, RingConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct MetadataConfig {
    /// Directory of metadata files, `<root>/meta` if unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Values given on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub root: Option<PathBuf>,
    pub namespace: Option<String>,
    pub item_size: Option<u32>,
    pub item_num: Option<u32>,
    pub meta_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl Config {
    /// Load the config file, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Merge command line values (CLI takes precedence)
    pub fn apply(mut self, overrides: Overrides) -> Result<Self> {
        if let Some(root) = overrides.root {
            self.ring.root = root;
        }
        if let Some(namespace) = overrides.namespace {
            self.ring.namespace = Namespace::new(namespace).context("Invalid namespace")?;
        }
        if let Some(item_size) = overrides.item_size {
            self.ring.item_size = item_size;
        }
        if let Some(item_num) = overrides.item_num {
            self.ring.item_num = item_num;
        }
        if let Some(dir) = overrides.meta_dir {
            self.metadata.dir = Some(dir);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        Ok(self)
    }

    /// Directory holding the metadata files
    pub fn meta_dir(&self) -> PathBuf {
        self.metadata
            .dir
            .clone()
            .unwrap_or_else(|| self.ring.root.join("meta"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringlog_common::SyncMode;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.ring.item_size, 8);
        assert_eq!(config.ring.item_num, 500);
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.meta_dir(), PathBuf::from("./ringlog-data/meta"));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ringlog.toml");
        std::fs::write(
            &path,
            r#"
[ring]
root = "/data/rings"
namespace = "adc"
item_size = 16
sync_mode = "never"

[metadata]
dir = "/data/meta"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ring.root, PathBuf::from("/data/rings"));
        assert_eq!(config.ring.namespace.as_str(), "adc");
        assert_eq!(config.ring.item_size, 16);
        assert_eq!(config.ring.item_num, 500);
        assert_eq!(config.ring.sync_mode, SyncMode::Never);
        assert_eq!(config.meta_dir(), PathBuf::from("/data/meta"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ringlog.toml");

        std::fs::write(&path, "[ring]\nitem_size = \"big\"\n").unwrap();
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "[ring]\nnamespace = \"much-too-long-name\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = Config::default()
            .apply(Overrides {
                root: Some(PathBuf::from("/tmp/rings")),
                namespace: Some("imu".to_string()),
                item_num: Some(64),
                log_level: Some("trace".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.ring.root, PathBuf::from("/tmp/rings"));
        assert_eq!(config.ring.namespace.as_str(), "imu");
        assert_eq!(config.ring.item_size, 8);
        assert_eq!(config.ring.item_num, 64);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.meta_dir(), PathBuf::from("/tmp/rings/meta"));

        let err = Config::default().apply(Overrides {
            namespace: Some("bad name".to_string()),
            ..Default::default()
        });
        assert!(err.is_err());
    }
}
