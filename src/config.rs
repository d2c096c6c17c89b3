//! Configuration for packvault storage roots and backends.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (PACKVAULT_HOME, PACKVAULT_TEMP_ROOT, PACKVAULT_STORE)
//! 2. Config file (.packvault/config.yaml)
//! 3. Defaults (~/.packvault)
//!
//! Config file discovery:
//! - Searches current directory and parents for .packvault/config.yaml
//! - Paths in config file are relative to the project root (parent of .packvault/)

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::Compression;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<StorageConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
    #[serde(default)]
    pub locking: Option<LockingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Data home (relative to project root)
    pub home: Option<String>,
    /// Temp root for working directories
    pub temp_root: Option<String>,
    /// Directory for saved exports
    pub exports: Option<String>,
    /// Directory for cached asset bundles
    pub cache: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    Local { root: Option<String> },
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub compression: Compression,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LockingConfig {
    pub enabled: bool,
}

/// Resource store backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Blobs as files under `root`
    Local { root: PathBuf },
    /// Blobs in process memory
    Memory,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data home
    pub home: PathBuf,
    /// Temp root holding working directories, staging archives and leases
    pub temp_root: PathBuf,
    /// Saved exports
    pub exports_dir: PathBuf,
    /// Cached asset bundles
    pub cache_dir: PathBuf,
    /// Resource store backend
    pub store: StoreBackend,
    /// Archive entry compression
    pub compression: Compression,
    /// Whether package leases take a file lock
    pub locking: bool,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl StorageConfig {
    /// Configuration with every root placed under `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            temp_root: paths::default_temp_root(&home),
            exports_dir: home.join("exports"),
            cache_dir: home.join("cache"),
            store: StoreBackend::Local {
                root: home.join("resources"),
            },
            compression: Compression::default(),
            locking: true,
            config_file: None,
            home,
        }
    }

    /// Every directory the engine writes to
    pub fn writable_roots(&self) -> Vec<&Path> {
        let mut roots = vec![
            self.temp_root.as_path(),
            self.exports_dir.as_path(),
            self.cache_dir.as_path(),
        ];
        if let StoreBackend::Local { root } = &self.store {
            roots.push(root.as_path());
        }
        roots
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".packvault").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Merge defaults, an optional config file and environment overrides
fn resolve(
    default_home: PathBuf,
    file: Option<(&Path, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<StorageConfig> {
    let (base_dir, file_path, file) = match file {
        Some((path, config)) => {
            // Base directory is the parent of .packvault/
            let base = path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."))
                .to_path_buf();
            (base, Some(path.to_path_buf()), Some(config))
        }
        None => (PathBuf::from("."), None, None),
    };

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let home = match (env("PACKVAULT_HOME"), paths.home.as_deref()) {
        (Some(env_home), _) => PathBuf::from(env_home),
        (None, Some(home)) => resolve_path(&base_dir, home),
        (None, None) => default_home,
    };

    let mut config = StorageConfig::with_home(&home);
    config.config_file = file_path;

    if let Some(temp_root) = env("PACKVAULT_TEMP_ROOT") {
        config.temp_root = PathBuf::from(temp_root);
    } else if let Some(temp_root) = paths.temp_root.as_deref() {
        config.temp_root = resolve_path(&base_dir, temp_root);
    }
    if let Some(exports) = paths.exports.as_deref() {
        config.exports_dir = resolve_path(&base_dir, exports);
    }
    if let Some(cache) = paths.cache.as_deref() {
        config.cache_dir = resolve_path(&base_dir, cache);
    }

    if let Some(file) = &file {
        match &file.store {
            Some(StoreConfig::Local { root: Some(root) }) => {
                config.store = StoreBackend::Local {
                    root: resolve_path(&base_dir, root),
                };
            }
            Some(StoreConfig::Memory) => config.store = StoreBackend::Memory,
            Some(StoreConfig::Local { root: None }) | None => {}
        }
        if let Some(archive) = &file.archive {
            config.compression = archive.compression;
        }
        if let Some(locking) = &file.locking {
            config.locking = locking.enabled;
        }
    }

    match env("PACKVAULT_STORE").as_deref() {
        Some("memory") => config.store = StoreBackend::Memory,
        Some("local") => {
            if config.store == StoreBackend::Memory {
                config.store = StoreBackend::Local {
                    root: home.join("resources"),
                };
            }
        }
        Some(other) => anyhow::bail!("Unknown store backend in PACKVAULT_STORE: {}", other),
        None => {}
    }

    Ok(config)
}

/// Load configuration from all sources
fn load_config() -> Result<StorageConfig> {
    let default_home = paths::default_home()?;

    match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            resolve(default_home, Some((path.as_path(), file)), |key| std::env::var(key).ok())
        }
        None => resolve(default_home, None, |key| std::env::var(key).ok()),
    }
}

/// Load configuration from an explicit config file (env overrides still apply)
pub fn load_config_from(path: &Path) -> Result<StorageConfig> {
    let file = load_config_file(path)?;
    resolve(paths::default_home()?, Some((path, file)), |key| {
        std::env::var(key).ok()
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static StorageConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_with_home_layout() {
        let config = StorageConfig::with_home("/data/pv");

        assert_eq!(config.temp_root, PathBuf::from("/data/pv/tmp"));
        assert_eq!(config.exports_dir, PathBuf::from("/data/pv/exports"));
        assert_eq!(config.cache_dir, PathBuf::from("/data/pv/cache"));
        assert_eq!(
            config.store,
            StoreBackend::Local {
                root: PathBuf::from("/data/pv/resources")
            }
        );
        assert_eq!(config.writable_roots().len(), 4);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".packvault");
        std::fs::create_dir_all(&dir).unwrap();

        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: data
  temp_root: /var/tmp/pv
store:
  backend: local
  root: blobs
archive:
  compression: stored
locking:
  enabled: false
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        assert_eq!(parsed.version, "1.0");
        assert_eq!(parsed.paths.home, Some("data".to_string()));

        let config = resolve(
            PathBuf::from("/default"),
            Some((config_path.as_path(), parsed)),
            no_env,
        )
        .unwrap();
        assert_eq!(config.home, temp.path().join("data"));
        assert_eq!(config.temp_root, PathBuf::from("/var/tmp/pv"));
        assert_eq!(config.exports_dir, temp.path().join("data/exports"));
        assert_eq!(
            config.store,
            StoreBackend::Local {
                root: temp.path().join("blobs")
            }
        );
        assert_eq!(config.compression, Compression::Stored);
        assert!(!config.locking);
        assert_eq!(config.config_file, Some(config_path));
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(PathBuf::from("/home/u/.packvault"), None, no_env).unwrap();

        assert_eq!(config.home, PathBuf::from("/home/u/.packvault"));
        assert_eq!(config.compression, Compression::Deflated);
        assert!(config.locking);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PACKVAULT_HOME", "/env/home"),
            ("PACKVAULT_TEMP_ROOT", "/env/tmp"),
            ("PACKVAULT_STORE", "memory"),
        ]
        .into_iter()
        .collect();

        let config = resolve(PathBuf::from("/default"), None, |key| {
            env.get(key).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(config.home, PathBuf::from("/env/home"));
        assert_eq!(config.temp_root, PathBuf::from("/env/tmp"));
        assert_eq!(config.store, StoreBackend::Memory);
    }

    #[test]
    fn test_unknown_store_backend_is_rejected() {
        let result = resolve(PathBuf::from("/default"), None, |key| {
            (key == "PACKVAULT_STORE").then(|| "s3".to_string())
        });
        assert!(result.is_err());
    }
}
