//! Command-line interface for packvault.
//!
//! Provides commands for archiving and extracting directories, packaging
//! library uploads into the configured resource store, and checking the
//! resolved storage configuration.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, StorageConfig, StoreBackend};
use crate::core::{archive, Compression};
use crate::domain::LibraryRecord;
use crate::storage::FileStorageAdapter;

/// packvault - Package storage engine
#[derive(Parser, Debug)]
#[command(name = "packvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Explicit config file (skips discovery of .packvault/config.yaml)
    #[arg(long, global = true, env = "PACKVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive a directory into a zip file
    Pack {
        /// Directory to archive
        source: PathBuf,

        /// Archive to write (must be outside the source directory)
        archive: PathBuf,

        /// Entry compression (defaults to the configured one)
        #[arg(short, long, value_enum)]
        compression: Option<CompressionArg>,
    },

    /// Extract a zip file into a directory
    Unpack {
        /// Archive to extract
        archive: PathBuf,

        /// Destination directory (created if missing)
        dest: PathBuf,
    },

    /// Package a library upload directory into the resource store
    PackageLibrary {
        /// Library upload directory
        dir: PathBuf,

        /// Library id the archive belongs to
        #[arg(long)]
        library_id: u64,

        /// Machine name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Major version
        #[arg(long, default_value = "1")]
        major: u32,

        /// Minor version
        #[arg(long, default_value = "0")]
        minor: u32,
    },

    /// Check that every storage root is writable
    Doctor,

    /// Show resolved configuration (debug)
    Config,
}

/// Archive compression for CLI
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CompressionArg {
    Deflated,
    Stored,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::Deflated => Compression::Deflated,
            CompressionArg::Stored => Compression::Stored,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => config::config()?.clone(),
        };

        match self.command {
            Commands::Pack {
                source,
                archive,
                compression,
            } => run_pack(&cfg, source, archive, compression).await,
            Commands::Unpack { archive, dest } => run_unpack(archive, dest).await,
            Commands::PackageLibrary {
                dir,
                library_id,
                name,
                major,
                minor,
            } => package_library(cfg, dir, library_id, name, major, minor).await,
            Commands::Doctor => run_doctor(cfg).await,
            Commands::Config => {
                print_config(&cfg);
                Ok(())
            }
        }
    }
}

async fn run_pack(
    cfg: &StorageConfig,
    source: PathBuf,
    archive_path: PathBuf,
    compression: Option<CompressionArg>,
) -> Result<()> {
    let compression = match compression {
        Some(arg) => arg.into(),
        None => cfg.compression,
    };

    let target = archive_path.clone();
    let summary = tokio::task::spawn_blocking(move || archive::pack(&source, &target, compression))
        .await
        .context("Pack task panicked")?
        .with_context(|| format!("Failed to pack into {}", archive_path.display()))?;

    eprintln!(
        "[Packed {} entries ({} bytes) into {}]",
        summary.entries,
        summary.total_bytes,
        archive_path.display()
    );
    Ok(())
}

async fn run_unpack(archive_path: PathBuf, dest: PathBuf) -> Result<()> {
    let (source, target) = (archive_path.clone(), dest.clone());
    let summary = tokio::task::spawn_blocking(move || archive::unpack(&source, &target))
        .await
        .context("Unpack task panicked")?
        .with_context(|| format!("Failed to unpack {}", archive_path.display()))?;

    eprintln!(
        "[Extracted {} entries ({} bytes) into {}]",
        summary.entries,
        summary.total_bytes,
        dest.display()
    );
    Ok(())
}

async fn package_library(
    cfg: StorageConfig,
    dir: PathBuf,
    library_id: u64,
    name: Option<String>,
    major: u32,
    minor: u32,
) -> Result<()> {
    let machine_name = match name {
        Some(name) => name,
        None => dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Cannot derive a library name from the directory; pass --name")?,
    };

    let storage = FileStorageAdapter::open(cfg).context("Failed to open storage")?;
    let mut record = LibraryRecord::new(library_id, machine_name, major, minor);
    let handle = storage
        .save_library(&dir, &mut record)
        .await
        .with_context(|| format!("Failed to package library {}", record.folder_name()))?;

    eprintln!(
        "[Imported {} at {}]",
        record.folder_name(),
        handle.imported_at().to_rfc3339()
    );
    println!("{}", serde_json::to_string_pretty(&handle)?);
    Ok(())
}

async fn run_doctor(cfg: StorageConfig) -> Result<()> {
    let storage = FileStorageAdapter::open(cfg).context("Failed to open storage")?;
    let cfg = storage.config();

    print_config(cfg);
    println!();

    if storage.has_write_access().await {
        println!("Write access: ok");
        Ok(())
    } else {
        bail!("One or more storage roots are not writable (see log output)")
    }
}

fn print_config(cfg: &StorageConfig) {
    println!("packvault configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Temp root: {}", cfg.temp_root.display());
    println!("  Exports:   {}", cfg.exports_dir.display());
    println!("  Cache:     {}", cfg.cache_dir.display());
    println!();
    println!("Resource store:");
    match &cfg.store {
        StoreBackend::Local { root } => println!("  local ({})", root.display()),
        StoreBackend::Memory => println!("  memory (not persisted)"),
    }
    println!();
    println!("Archive compression: {:?}", cfg.compression);
    println!("Package locking:     {}", if cfg.locking { "on" } else { "off" });
}
