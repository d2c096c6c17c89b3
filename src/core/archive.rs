//! Zip archive codec for package directories.
//!
//! `pack` captures every regular file under a directory; directories are
//! implicit from file paths. `unpack` refuses any entry whose destination
//! would fall outside the target directory.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::error::{StorageError, StorageResult};

/// Compression applied to archive entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Deflate every entry (default)
    #[default]
    Deflated,

    /// Store entries uncompressed
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflated => CompressionMethod::Deflated,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

/// Summary of a pack or unpack run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of file entries written
    pub entries: usize,

    /// Total uncompressed bytes
    pub total_bytes: u64,
}

/// Pack every regular file under `source_dir` into a zip at `archive_path`.
///
/// Entry names are relative to `source_dir` and always use `/`. The walk is
/// sorted by file name so a given snapshot always yields the same order.
pub fn pack(
    source_dir: &Path,
    archive_path: &Path,
    compression: Compression,
) -> StorageResult<ArchiveSummary> {
    if !source_dir.is_dir() {
        return Err(StorageError::NotFound(format!(
            "source directory {}",
            source_dir.display()
        )));
    }
    if archive_path.starts_with(source_dir) {
        return Err(StorageError::InvalidName(format!(
            "archive {} would be packed into itself",
            archive_path.display()
        )));
    }

    if let Some(parent) = archive_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| StorageError::io("create staging directory", parent, e))?;
    }

    let file = File::create(archive_path)
        .map_err(|e| StorageError::io("create archive", archive_path, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(compression.method())
        .unix_permissions(0o644);

    let mut summary = ArchiveSummary::default();

    for entry in WalkDir::new(source_dir)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source_dir.to_path_buf());
            StorageError::io("walk source directory", path, e.into())
        })?;

        // Directories are implied by file paths; links are never followed
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .map_err(|_| StorageError::InvalidName(entry.path().display().to_string()))?;
        let name = entry_name(relative)?;

        writer
            .start_file(name, options)
            .map_err(|e| write_error(archive_path, e))?;

        let mut source = File::open(entry.path())
            .map_err(|e| StorageError::io("read file", entry.path(), e))?;
        let copied = io::copy(&mut source, &mut writer)
            .map_err(|e| StorageError::io("write archive entry", archive_path, e))?;

        summary.entries += 1;
        summary.total_bytes += copied;
    }

    let mut inner = writer.finish().map_err(|e| write_error(archive_path, e))?;
    inner
        .flush()
        .map_err(|e| StorageError::io("flush archive", archive_path, e))?;

    Ok(summary)
}

/// Unpack the zip at `archive_path` into `dest_dir`, creating it if needed.
///
/// On failure `dest_dir` may be left partially populated.
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> StorageResult<ArchiveSummary> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| StorageError::io("create extraction directory", dest_dir, e))?;
    let root = dest_dir
        .canonicalize()
        .map_err(|e| StorageError::io("resolve extraction directory", dest_dir, e))?;

    let file =
        File::open(archive_path).map_err(|e| StorageError::io("open archive", archive_path, e))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(archive_path, e))?;

    let mut summary = ArchiveSummary::default();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| corrupt(archive_path, e))?;

        let relative = safe_relative_path(entry.name())?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = root.join(&relative);
        ensure_within(&root, &target, entry.name())?;

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .map_err(|e| StorageError::io("create directory", &target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StorageError::io("create directory", parent, e))?;
        }

        let mut out =
            File::create(&target).map_err(|e| StorageError::io("create file", &target, e))?;
        let written = io::copy(&mut entry, &mut out)
            .map_err(|e| StorageError::io("extract entry", &target, e))?;

        summary.entries += 1;
        summary.total_bytes += written;
    }

    Ok(summary)
}

/// Validate a `/`-separated relative name and convert it to a path.
///
/// Rejects absolute names, `..` segments and platform prefixes. Empty and
/// `.` segments are dropped, so `"./a//b"` maps to `a/b`.
pub fn safe_relative_path(name: &str) -> StorageResult<PathBuf> {
    let traversal = || StorageError::PathTraversal {
        entry: name.to_string(),
    };

    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(traversal());
    }

    let mut path = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            _ => {
                let mut components = Path::new(segment).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(part)), None) => path.push(part),
                    _ => return Err(traversal()),
                }
            }
        }
    }

    Ok(path)
}

/// Convert a relative filesystem path into a `/`-separated entry name
fn entry_name(relative: &Path) -> StorageResult<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    StorageError::InvalidName(format!(
                        "non UTF-8 file name: {}",
                        relative.display()
                    ))
                })?;
                parts.push(part);
            }
            _ => {
                return Err(StorageError::PathTraversal {
                    entry: relative.display().to_string(),
                })
            }
        }
    }
    Ok(parts.join("/"))
}

/// Check that `target` resolves inside `root`.
///
/// The deepest existing ancestor is canonicalized so a symlinked directory
/// inside the tree cannot redirect writes elsewhere.
pub(crate) fn ensure_within(root: &Path, target: &Path, entry: &str) -> StorageResult<()> {
    let traversal = || StorageError::PathTraversal {
        entry: entry.to_string(),
    };

    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.file_type().is_symlink() {
            return Err(traversal());
        }
    }

    let existing = target
        .ancestors()
        .find(|p| p.exists())
        .ok_or_else(traversal)?;
    let resolved = existing
        .canonicalize()
        .map_err(|e| StorageError::io("resolve entry path", existing, e))?;

    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(traversal())
    }
}

fn corrupt(path: &Path, source: zip::result::ZipError) -> StorageError {
    match source {
        zip::result::ZipError::Io(e) if e.kind() != io::ErrorKind::UnexpectedEof => {
            StorageError::io("read archive", path, e)
        }
        other => StorageError::ArchiveCorrupt {
            path: path.to_path_buf(),
            source: other,
        },
    }
}

fn write_error(path: &Path, source: zip::result::ZipError) -> StorageError {
    match source {
        zip::result::ZipError::Io(e) => StorageError::io("write archive", path, e),
        other => StorageError::io(
            "write archive",
            path,
            io::Error::new(io::ErrorKind::Other, other),
        ),
    }
}
