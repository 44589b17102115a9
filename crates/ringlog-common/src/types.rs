//! Core type definitions for ringlog

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum namespace length in bytes.
///
/// Matches the key-name limit of small flash key-value stores (16 bytes
/// including the terminator), so a namespace can be used verbatim as a
/// metadata key there and as a file stem on the data side.
pub const NAMESPACE_MAX_LEN: usize = 15;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "ringlog";

/// Name of one logical ring buffer
///
/// Used both as the metadata namespace and as the stem of the data file
/// (`<root>/<namespace>.bin`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct Namespace(String);

impl Namespace {
    /// Create a new namespace (validates length and character set)
    pub fn new(name: impl Into<String>) -> Result<Self, NamespaceError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the namespace as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), NamespaceError> {
        if name.is_empty() {
            return Err(NamespaceError::Empty);
        }
        if name.len() > NAMESPACE_MAX_LEN {
            return Err(NamespaceError::TooLong {
                len: name.len(),
                max: NAMESPACE_MAX_LEN,
            });
        }

        // Only characters that are safe as a file stem on any filesystem
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && c != '_' && c != '-' {
                return Err(NamespaceError::InvalidChar(c));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({:?})", self.0)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Namespace {
    type Error = NamespaceError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Errors that can occur when creating a namespace
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamespaceError {
    #[error("namespace must not be empty")]
    Empty,
    #[error("namespace is {len} bytes, at most {max} allowed")]
    TooLong { len: usize, max: usize },
    #[error("namespace contains invalid character: {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_namespaces() {
        assert!(Namespace::new("sensor").is_ok());
        assert!(Namespace::new("imu_0").is_ok());
        assert!(Namespace::new("gps-fix").is_ok());
        assert!(Namespace::new("a").is_ok());
        assert!(Namespace::new("x".repeat(NAMESPACE_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_invalid_namespaces() {
        assert_eq!(Namespace::new(""), Err(NamespaceError::Empty));
        assert_eq!(
            Namespace::new("x".repeat(NAMESPACE_MAX_LEN + 1)),
            Err(NamespaceError::TooLong { len: 16, max: 15 })
        );
        assert_eq!(
            Namespace::new("../etc"),
            Err(NamespaceError::InvalidChar('.'))
        );
        assert_eq!(
            Namespace::new("a b"),
            Err(NamespaceError::InvalidChar(' '))
        );
    }

    #[test]
    fn test_default_namespace_is_valid() {
        let ns = Namespace::default();
        assert_eq!(Namespace::new(ns.as_str()), Ok(ns));
    }

    #[test]
    fn test_namespace_display() {
        let ns = Namespace::new("sensor").unwrap();
        assert_eq!(ns.to_string(), "sensor");
        assert_eq!(format!("{ns:?}"), "Namespace(\"sensor\")");
    }

    #[test]
    fn test_namespace_serde_validates() {
        let ns: Namespace = serde_json::from_str("\"telemetry\"").unwrap();
        assert_eq!(ns.as_str(), "telemetry");

        let bad: Result<Namespace, _> = serde_json::from_str("\"no/slash\"");
        assert!(bad.is_err());
    }
}
