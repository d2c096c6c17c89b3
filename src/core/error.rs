//! Error taxonomy for the storage engine.
//!
//! Every failure aborts the current operation. The orchestrating stores wrap
//! the underlying error in [`StorageError::Package`] so callers can log the
//! operation name and package id alongside the cause.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::PackageId;

/// Result alias used throughout the engine
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Archive is corrupt or unreadable: {path}")]
    ArchiveCorrupt {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive entry escapes target directory: {entry}")]
    PathTraversal { entry: String },

    #[error("Failed to {op}: {path}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Resource store {op} failed{}: {reason}", for_handle(.handle))]
    ResourceStore {
        op: &'static str,
        handle: Option<String>,
        reason: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("{operation} failed for package {id}")]
    Package {
        id: PackageId,
        operation: &'static str,
        #[source]
        source: Box<StorageError>,
    },

    #[error("{operation} failed for library {library_id}")]
    Library {
        library_id: u64,
        operation: &'static str,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Build an I/O error with the failing operation and path
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Build a resource-store error
    pub fn store(op: &'static str, handle: Option<&str>, reason: impl ToString) -> Self {
        StorageError::ResourceStore {
            op,
            handle: handle.map(str::to_string),
            reason: reason.to_string(),
        }
    }

    /// Attach the package id and operation name
    pub fn for_package(self, id: PackageId, operation: &'static str) -> Self {
        StorageError::Package {
            id,
            operation,
            source: Box::new(self),
        }
    }

    /// Attach the library id and operation name
    pub fn for_library(self, library_id: u64, operation: &'static str) -> Self {
        StorageError::Library {
            library_id,
            operation,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any package or library context
    pub fn root(&self) -> &StorageError {
        match self {
            StorageError::Package { source, .. } | StorageError::Library { source, .. } => {
                source.root()
            }
            other => other,
        }
    }
}

fn for_handle(handle: &Option<String>) -> String {
    handle
        .as_ref()
        .map(|h| format!(" for {}", h))
        .unwrap_or_default()
}

/// Extension for attaching package context to results
pub trait PackageContext<T> {
    fn package_context(self, id: PackageId, operation: &'static str) -> StorageResult<T>;
}

impl<T> PackageContext<T> for StorageResult<T> {
    fn package_context(self, id: PackageId, operation: &'static str) -> StorageResult<T> {
        self.map_err(|e| e.for_package(id, operation))
    }
}
