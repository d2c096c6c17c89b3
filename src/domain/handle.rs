//! Opaque references to blobs held by a resource store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to an archive blob in a [`ResourceStore`](crate::adapters::ResourceStore)
///
/// A handle is owned by exactly one record field. Replacing it must delete
/// the previous handle from the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    /// Backend-specific blob key
    key: String,

    /// SHA-256 of the imported bytes (hex)
    checksum: String,

    /// Size of the blob in bytes
    size_bytes: u64,

    /// When the blob was imported
    imported_at: DateTime<Utc>,
}

impl ResourceHandle {
    /// Create a handle for a freshly imported blob
    pub fn new(key: impl Into<String>, checksum: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            key: key.into(),
            checksum: checksum.into(),
            size_bytes,
            imported_at: Utc::now(),
        }
    }

    /// Backend-specific blob key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// SHA-256 of the blob contents
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Size of the blob in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// When the blob was imported
    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}
