//! fileservice CLI — run storage operations against the configured backend.
//!
//! Configuration comes from `--config <file.json>` or, when absent, from the
//! `FILE_PROVIDER` / `S3_*` environment variables:
//!
//! - `fileservice ls testing/s3-service`
//! - `fileservice put ./report.tsv results/report.tsv`
//! - `fileservice copy-dir ./out results/run-42`

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fileservice_core::{
    purge_temporary_files, FileServiceError, Result, StorageBackend, StorageConfig, UploadBuffer,
};
use fileservice_storage::open_backend;

/// Read, write and list files on local disk or S3-compatible storage.
#[derive(Parser, Debug)]
#[command(name = "fileservice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a JSON storage configuration; the environment is used otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a stored file to stdout
    Cat { path: String },

    /// Fetch a stored file into a local destination
    Fetch { path: String, dest: PathBuf },

    /// Buffer a local file in memory and save it at a storage path
    Put { local: PathBuf, path: String },

    /// Copy a local file to a storage path
    Copy { local: PathBuf, path: String },

    /// List every file under a folder or prefix
    Ls { folder: String },

    /// Delete a stored file
    Rm { path: String },

    /// Report whether a file exists at a storage path
    Exists { path: String },

    /// Delete every file under a folder or prefix
    Clean { folder: String },

    /// Copy a local directory tree under a storage folder or prefix
    CopyDir { source: PathBuf, dest: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = run(cli).await;

    let purged = purge_temporary_files();
    if purged > 0 {
        info!("Removed {} leftover temporary files", purged);
    }

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let backend = open_backend(&config).await?;
    let backend = backend.as_ref();

    match cli.command {
        Command::Cat { path } => cat(backend, &path).await,
        Command::Fetch { path, dest } => fetch(backend, &path, &dest).await,
        Command::Put { local, path } => put(backend, &local, &path).await,
        Command::Copy { local, path } => backend.copy_file(&local, &path).await,
        Command::Ls { folder } => {
            for file in backend.try_list_files_from_folder(&folder).await? {
                println!("{file}");
            }
            Ok(())
        }
        Command::Rm { path } => {
            backend.delete_file(&path).await;
            Ok(())
        }
        Command::Exists { path } => {
            let exists = backend.is_file(&path).await;
            println!("{exists}");
            if exists {
                Ok(())
            } else {
                Err(FileServiceError::not_found(path))
            }
        }
        Command::Clean { folder } => {
            backend.clean_directory(&folder).await;
            Ok(())
        }
        Command::CopyDir { source, dest } => {
            backend.copy_directory(&source, &dest).await;
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<StorageConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                FileServiceError::config(format!("Cannot read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                FileServiceError::config(format!("Invalid config {}: {e}", path.display()))
            })
        }
        None => StorageConfig::from_env(),
    }
}

async fn cat(backend: &dyn StorageBackend, path: &str) -> Result<()> {
    let mut stream = backend.get_input_stream(path).await?;
    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = stream.try_next().await? {
        stdout
            .write_all(&chunk)
            .await
            .map_err(|e| FileServiceError::storage("Failed to write to stdout", e))?;
    }
    stdout
        .flush()
        .await
        .map_err(|e| FileServiceError::storage("Failed to flush stdout", e))
}

async fn fetch(backend: &dyn StorageBackend, path: &str, dest: &Path) -> Result<()> {
    let handle = backend.get_file(path).await?;
    tokio::fs::copy(handle.path(), dest).await.map_err(|e| {
        FileServiceError::storage(format!("Failed to copy into {}", dest.display()), e)
    })?;
    handle.release()
}

async fn put(backend: &dyn StorageBackend, local: &Path, path: &str) -> Result<()> {
    let mut file = tokio::fs::File::open(local).await.map_err(|e| {
        FileServiceError::storage(format!("Failed to open {}", local.display()), e)
    })?;
    let mut buffer = UploadBuffer::new();
    tokio::io::copy(&mut file, &mut buffer).await.map_err(|e| {
        FileServiceError::storage(format!("Failed to read {}", local.display()), e)
    })?;
    info!("Saving {} bytes to {}", buffer.len(), path);
    backend.save_file(buffer, path).await
}
