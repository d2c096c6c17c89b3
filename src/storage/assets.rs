//! Cached asset bundles.
//!
//! Script and style assets for a piece of content are concatenated into one
//! file per kind, stored under a cache key. A miss always means "recompute";
//! there is no eviction or size limit.
//!
//! # Storage Layout
//!
//! ```text
//! <cache_dir>/
//! ├── <key>.js
//! └── <key>.css
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::{StorageError, StorageResult};

/// Kind of a delivered asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Script,
    Style,
}

impl AssetKind {
    fn extension(self) -> &'static str {
        match self {
            AssetKind::Script => "js",
            AssetKind::Style => "css",
        }
    }
}

/// A resolved asset file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    pub path: PathBuf,
    pub kind: AssetKind,
}

impl AssetFile {
    pub fn script(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: AssetKind::Script,
        }
    }

    pub fn style(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: AssetKind::Style,
        }
    }
}

/// Bundles stored under one cache key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAssets {
    pub key: String,
    pub scripts: Option<PathBuf>,
    pub styles: Option<PathBuf>,
}

impl CachedAssets {
    /// The bundles as asset files, replacing the originals they were built from
    pub fn files(&self) -> Vec<AssetFile> {
        let mut files = Vec::new();
        if let Some(path) = &self.scripts {
            files.push(AssetFile::script(path));
        }
        if let Some(path) = &self.styles {
            files.push(AssetFile::style(path));
        }
        files
    }
}

/// Filesystem cache of concatenated asset bundles
#[derive(Debug, Clone)]
pub struct AssetCache {
    dir: PathBuf,
}

impl AssetCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Concatenate `files` per kind and store the bundles under `key`.
    ///
    /// Both bundles are staged before either is committed. A kind with no
    /// sources has its old bundle removed. On failure the key is left with
    /// no bundles at all.
    pub fn store(&self, files: &[AssetFile], key: &str) -> StorageResult<CachedAssets> {
        validate_key(key)?;
        fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::io("create asset cache", &self.dir, e))?;

        match self.stage_and_commit(files, key) {
            Ok(cached) => {
                debug!(key, files = files.len(), "Cached asset bundles");
                Ok(cached)
            }
            Err(e) => {
                if let Err(cleanup) = self.invalidate(&[key]) {
                    warn!(key, "Failed to clear asset bundles after error: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    /// Look up the bundles for `key`; `None` on a miss
    pub fn get(&self, key: &str) -> StorageResult<Option<CachedAssets>> {
        validate_key(key)?;

        let scripts = Some(self.bundle_path(key, AssetKind::Script)).filter(|p| p.is_file());
        let styles = Some(self.bundle_path(key, AssetKind::Style)).filter(|p| p.is_file());

        if scripts.is_none() && styles.is_none() {
            return Ok(None);
        }
        Ok(Some(CachedAssets {
            key: key.to_string(),
            scripts,
            styles,
        }))
    }

    /// Drop the bundles for every key; absent keys are ignored
    pub fn invalidate<S: AsRef<str>>(&self, keys: &[S]) -> StorageResult<()> {
        for key in keys {
            let key = key.as_ref();
            validate_key(key)?;
            for kind in [AssetKind::Script, AssetKind::Style] {
                remove_bundle(&self.bundle_path(key, kind))?;
            }
        }
        Ok(())
    }

    fn bundle_path(&self, key: &str, kind: AssetKind) -> PathBuf {
        self.dir.join(format!("{}.{}", key, kind.extension()))
    }

    fn stage_and_commit(&self, files: &[AssetFile], key: &str) -> StorageResult<CachedAssets> {
        let scripts = self.stage_bundle(files, key, AssetKind::Script)?;
        let styles = self.stage_bundle(files, key, AssetKind::Style)?;

        Ok(CachedAssets {
            key: key.to_string(),
            scripts: self.commit(scripts, key, AssetKind::Script)?,
            styles: self.commit(styles, key, AssetKind::Style)?,
        })
    }

    /// Concatenate every source of `kind` into an uncommitted temp file
    fn stage_bundle(
        &self,
        files: &[AssetFile],
        key: &str,
        kind: AssetKind,
    ) -> StorageResult<Option<NamedTempFile>> {
        let sources: Vec<&AssetFile> = files.iter().filter(|f| f.kind == kind).collect();
        if sources.is_empty() {
            return Ok(None);
        }

        let target = self.bundle_path(key, kind);
        let staged = tempfile::Builder::new()
            .prefix(".bundle-")
            .tempfile_in(&self.dir)
            .map_err(|e| StorageError::io("create cached asset", &target, e))?;

        {
            let mut writer = BufWriter::new(staged.as_file());
            for source in sources {
                let file = File::open(&source.path)
                    .map_err(|e| StorageError::io("read asset", &source.path, e))?;
                io::copy(&mut BufReader::new(file), &mut writer)
                    .and_then(|_| writer.write_all(b"\n"))
                    .map_err(|e| StorageError::io("write cached asset", &target, e))?;
            }
            writer
                .flush()
                .map_err(|e| StorageError::io("write cached asset", &target, e))?;
        }

        Ok(Some(staged))
    }

    /// Move a staged bundle into place, or drop the old one if nothing was staged
    fn commit(
        &self,
        staged: Option<NamedTempFile>,
        key: &str,
        kind: AssetKind,
    ) -> StorageResult<Option<PathBuf>> {
        let target = self.bundle_path(key, kind);
        match staged {
            Some(staged) => {
                staged
                    .persist(&target)
                    .map_err(|e| StorageError::io("store cached asset", &target, e.error))?;
                Ok(Some(target))
            }
            None => {
                remove_bundle(&target)?;
                Ok(None)
            }
        }
    }
}

fn remove_bundle(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io("remove cached asset", path, e)),
    }
}

/// Cache keys become file names: ASCII letters, digits, `-` and `_` only
fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= 128
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(format!("cache key {:?}", key)))
    }
}
