//! Domain types for the package storage engine.
//!
//! This module contains the core data structures:
//! - PackageId: Identifier of a content package
//! - ResourceHandle: Reference to an archived blob
//! - PackageRecord / LibraryRecord: Owners of archive handles
//! - PackageDescriptor: Parsed descriptor of an uploaded package

pub mod handle;
pub mod package;

// Re-export commonly used types
pub use handle::ResourceHandle;
pub use package::{
    LibraryRecord, PackageDescriptor, PackageId, PackageRecord, CONTENT_DIR, CONTENT_FILE,
    DESCRIPTOR_FILE,
};
