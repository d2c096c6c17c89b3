//! Edit sessions and per-package leases.
//!
//! An [`EditSession`] is created by the caller for one edit/render/save
//! operation and passed to every store call. It records which packages were
//! already unpacked in this operation and holds the lease on each of them.
//! Dropping the session releases every lease it still holds.

use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;
use uuid::Uuid;

use crate::domain::PackageId;

use super::error::{StorageError, StorageResult};

/// Exclusive advisory lock on one package id
///
/// Held from the first unpack until repack (or delete) in a session.
#[derive(Debug)]
pub struct PackageLease {
    id: PackageId,
    path: PathBuf,
    file: Option<File>,
}

impl PackageLease {
    /// Block until the lease for `id` is acquired.
    ///
    /// With `enabled == false` no lock is taken and the lease is a marker.
    pub fn acquire(id: PackageId, lock_path: &Path, enabled: bool) -> StorageResult<Self> {
        if !enabled {
            return Ok(Self::unlocked(id, lock_path));
        }

        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| StorageError::io("lock package", lock_path, e))?;

        debug!(%id, "Acquired package lease");
        Ok(Self {
            id,
            path: lock_path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Acquire the lease only if nobody else holds it
    pub fn try_acquire(id: PackageId, lock_path: &Path, enabled: bool) -> StorageResult<Option<Self>> {
        if !enabled {
            return Ok(Some(Self::unlocked(id, lock_path)));
        }

        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                id,
                path: lock_path.to_path_buf(),
                file: Some(file),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(StorageError::io("lock package", lock_path, e)),
        }
    }

    fn unlocked(id: PackageId, lock_path: &Path) -> Self {
        Self {
            id,
            path: lock_path.to_path_buf(),
            file: None,
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PackageLease {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                debug!(id = %self.id, "Failed to unlock package lease: {}", e);
            }
            debug!(id = %self.id, "Released package lease");
        }
    }
}

fn open_lock_file(lock_path: &Path) -> StorageResult<File> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::io("create lock directory", parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(lock_path)
        .map_err(|e| StorageError::io("open lock file", lock_path, e))
}

/// State of one edit/render/save operation
#[derive(Debug)]
pub struct EditSession {
    id: Uuid,
    dumped: HashSet<PackageId>,
    leases: HashMap<PackageId, PackageLease>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            dumped: HashSet::new(),
            leases: HashMap::new(),
        }
    }

    /// Session identifier (for logs)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the package was already unpacked in this session
    pub fn is_dumped(&self, id: PackageId) -> bool {
        self.dumped.contains(&id)
    }

    /// Whether this session holds the lease on a package
    pub fn holds_lease(&self, id: PackageId) -> bool {
        self.leases.contains_key(&id)
    }

    pub(crate) fn mark_dumped(&mut self, id: PackageId) {
        self.dumped.insert(id);
    }

    pub(crate) fn insert_lease(&mut self, lease: PackageLease) {
        self.leases.insert(lease.id(), lease);
    }

    /// Forget a package: clears the dumped flag and releases its lease
    pub(crate) fn finish(&mut self, id: PackageId) {
        self.dumped.remove(&id);
        self.leases.remove(&id);
    }
}
