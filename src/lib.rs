//! packvault - Package storage engine for interactive content
//!
//! Stores content packages and library packages as zip archives in a
//! pluggable resource store, and materializes them into working directories
//! on demand for editing.
//!
//! # Architecture
//!
//! - A package is unpacked at most once per [`EditSession`]
//! - Edits happen in place inside `<temp_root>/<id>`
//! - Saving re-archives the directory, imports the new archive and only then
//!   deletes the previous one
//!
//! # Modules
//!
//! - `adapters`: Resource store backends (local blobs, in-memory)
//! - `core`: Archive codec, working directories, package and library stores
//! - `domain`: Data structures (PackageId, ResourceHandle, records)
//! - `storage`: The full file storage surface (per-file ops, exports, assets)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Archive a directory
//! packvault pack ./my-package ./my-package.zip
//!
//! # Package a library upload
//! packvault package-library ./uploads/Foo-1.2 --library-id 12 --name Foo --major 1 --minor 2
//!
//! # Check that every storage root is writable
//! packvault doctor
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod storage;

// Re-export main types at crate root for convenience
pub use adapters::{LocalResourceStore, MemoryResourceStore, ResourceStore};
pub use config::StorageConfig;
pub use core::{
    ContentPackageStore, EditSession, LibraryPackageStore, StorageError, StorageResult,
    WorkingDirectoryManager,
};
pub use domain::{LibraryRecord, PackageDescriptor, PackageId, PackageRecord, ResourceHandle};
pub use storage::{FileSource, FileStorageAdapter};
