//! File Storage Adapter Integration Tests
//!
//! Tests for per-file operations, exports, upload paths, the asset cache and
//! the write-access check.

use std::path::Path;

use packvault::config::{StorageConfig, StoreBackend};
use packvault::storage::{AssetFile, FileSource};
use packvault::{EditSession, FileStorageAdapter, PackageId, StorageError};
use tempfile::TempDir;

fn storage(temp: &TempDir) -> FileStorageAdapter {
    FileStorageAdapter::open(StorageConfig::with_home(temp.path())).unwrap()
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_content_file_lifecycle() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let id = PackageId::new(1);

    assert!(!storage.has_content_file(id, "images/a.png").await.unwrap());

    let saved = storage
        .save_file(FileSource::Package(id), "images/a.png", b"png")
        .await
        .unwrap();
    assert_eq!(saved, storage.content().working_directory(id).join("images/a.png"));
    assert!(storage.has_content_file(id, "images/a.png").await.unwrap());

    storage.remove_content_file(id, "images/a.png").await.unwrap();
    assert!(!storage.has_content_file(id, "images/a.png").await.unwrap());

    // Removing again is a no-op
    storage.remove_content_file(id, "images/a.png").await.unwrap();
}

#[tokio::test]
async fn test_file_names_cannot_escape() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let id = PackageId::new(1);

    let err = storage
        .save_file(FileSource::Package(id), "../2/evil.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PathTraversal { .. }));

    let err = storage.get_content("/etc/passwd").await.unwrap_err();
    assert!(matches!(err, StorageError::PathTraversal { .. }));

    let err = storage.has_export("nested/name.h5p").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidName(_)));
}

#[tokio::test]
async fn test_clone_content_file_between_sources() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let (from, to) = (PackageId::new(1), PackageId::new(2));

    storage
        .save_file(FileSource::Editor, "audio/clip.mp3", b"editor")
        .await
        .unwrap();
    storage
        .save_file(FileSource::Package(from), "images/a.png", b"package")
        .await
        .unwrap();

    storage
        .clone_content_file("audio/clip.mp3", FileSource::Editor, to)
        .await
        .unwrap();
    storage
        .clone_content_file("images/a.png", FileSource::Package(from), to)
        .await
        .unwrap();

    let target = storage.content().working_directory(to);
    assert_eq!(std::fs::read(target.join("audio/clip.mp3")).unwrap(), b"editor");
    assert_eq!(std::fs::read(target.join("images/a.png")).unwrap(), b"package");

    let err = storage
        .clone_content_file("missing.png", FileSource::Package(from), to)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_exports() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let source = temp.path().join("build/quiz-1.h5p");
    write(&source, "zipbytes");

    assert!(!storage.has_export("quiz-1.h5p").await.unwrap());
    let saved = storage.save_export(&source, "quiz-1.h5p").await.unwrap();
    assert_eq!(saved, storage.config().exports_dir.join("quiz-1.h5p"));
    assert!(storage.has_export("quiz-1.h5p").await.unwrap());

    storage.delete_export("quiz-1.h5p").await.unwrap();
    assert!(!storage.has_export("quiz-1.h5p").await.unwrap());
    storage.delete_export("quiz-1.h5p").await.unwrap();
}

#[tokio::test]
async fn test_export_and_clone_content() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let id = PackageId::new(3);

    let mut session = EditSession::new();
    let workdir = storage
        .content()
        .ensure_working_directory(&mut session, id, None)
        .await
        .unwrap();
    write(&workdir.join("content.json"), "{}");
    let handle = storage
        .content()
        .persist_working_directory(&mut session, id, None)
        .await
        .unwrap()
        .unwrap();

    let cloned = storage.clone_content(&handle).await.unwrap();
    storage
        .delete_content(&mut session, id, Some(&handle))
        .await
        .unwrap();

    let out = temp.path().join("exported");
    storage.export_content(&cloned, &out).await.unwrap();
    assert_eq!(std::fs::read_to_string(out.join("content.json")).unwrap(), "{}");
}

#[tokio::test]
async fn test_tmp_paths_are_unique() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);

    let first = storage.tmp_path().await.unwrap();
    let second = storage.tmp_path().await.unwrap();

    assert_ne!(first, second);
    assert!(first.parent().unwrap().is_dir());
    assert!(!first.exists());
    assert!(first.starts_with(&storage.config().temp_root));
}

#[tokio::test]
async fn test_get_content_reads_below_temp_root() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let id = PackageId::new(4);

    storage
        .save_file(FileSource::Package(id), "content.json", br#"{"a":1}"#)
        .await
        .unwrap();

    assert_eq!(storage.get_content("4/content.json").await.unwrap(), r#"{"a":1}"#);
    assert!(matches!(
        storage.get_content("4/missing.json").await.unwrap_err(),
        StorageError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_move_content_directory() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let upload = temp.path().join("upload");
    write(&upload.join("h5p.json"), r#"{"title":"Quiz","mainLibrary":"H5P.Quiz"}"#);
    write(&upload.join("content/content.json"), r#"{"questions":[]}"#);
    write(&upload.join("content/images/a.png"), "a");

    let descriptor = storage
        .move_content_directory(&upload, PackageId::new(5))
        .await
        .unwrap();

    assert_eq!(descriptor.title(), Some("Quiz"));
    assert_eq!(descriptor.main_library(), Some("H5P.Quiz"));
    assert_eq!(descriptor.parameters["questions"], serde_json::json!([]));

    let workdir = storage.content().working_directory(PackageId::new(5));
    assert!(workdir.join("images/a.png").exists());
    assert!(!workdir.join("content.json").exists());
}

#[tokio::test]
async fn test_asset_cache() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let script = temp.path().join("lib/a.js");
    let style = temp.path().join("lib/a.css");
    write(&script, "var a = 1;");
    write(&style, ".a { color: red; }");

    assert!(storage.get_cached_assets("bundle").await.unwrap().is_none());

    let cached = storage
        .cache_assets(&[AssetFile::script(&script), AssetFile::style(&style)], "bundle")
        .await
        .unwrap();
    assert_eq!(
        std::fs::read_to_string(cached.scripts.as_ref().unwrap()).unwrap(),
        "var a = 1;\n"
    );
    assert!(cached.styles.is_some());

    let hit = storage.get_cached_assets("bundle").await.unwrap().unwrap();
    assert_eq!(hit, cached);

    storage.delete_cached_assets(&["bundle"]).await.unwrap();
    assert!(storage.get_cached_assets("bundle").await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_access_check() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    assert!(storage.has_write_access().await);

    // A regular file where a root directory should be
    let blocked = temp.path().join("blocked");
    write(&blocked, "not a directory");
    let mut config = StorageConfig::with_home(temp.path());
    config.exports_dir = blocked.join("exports");
    config.store = StoreBackend::Memory;
    let storage = FileStorageAdapter::open(config).unwrap();
    assert!(!storage.has_write_access().await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_directory_cannot_redirect_file_ops() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let id = PackageId::new(1);
    let outside = temp.path().join("outside");
    write(&outside.join("secret.txt"), "secret");

    let workdir = storage.content().working_directory(id);
    std::fs::create_dir_all(&workdir).unwrap();
    std::os::unix::fs::symlink(&outside, workdir.join("link")).unwrap();

    let err = storage
        .save_file(FileSource::Package(id), "link/evil.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PathTraversal { .. }));
    assert!(!outside.join("evil.txt").exists());

    let err = storage
        .clone_content_file("link/secret.txt", FileSource::Package(id), PackageId::new(2))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PathTraversal { .. }));

    assert!(storage
        .remove_content_file(id, "link/secret.txt")
        .await
        .is_err());
    assert!(outside.join("secret.txt").exists());

    assert!(matches!(
        storage.get_content("1/link/secret.txt").await.unwrap_err(),
        StorageError::PathTraversal { .. }
    ));
    assert!(storage.has_content_file(id, "link/secret.txt").await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlinked_working_directory_rejected() {
    let temp = TempDir::new().unwrap();
    let storage = storage(&temp);
    let outside = temp.path().join("outside");
    std::fs::create_dir_all(&outside).unwrap();
    std::fs::create_dir_all(&storage.config().temp_root).unwrap();
    std::os::unix::fs::symlink(&outside, storage.content().working_directory(PackageId::new(3)))
        .unwrap();

    let err = storage
        .save_file(FileSource::Package(PackageId::new(3)), "a.txt", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::PathTraversal { .. }));
    assert!(!outside.join("a.txt").exists());
}
