//! Image discovery, registration and ingestion
//!
//! Two entry points:
//! - [`scan_images_folder`] registers every image of a project's flat
//!   images folder in the database.
//! - [`ingest`] copies images found anywhere under input folders into a flat
//!   output folder named by content hash, which deduplicates them.
//!
//! Files are recognised as images by magic bytes, never by extension.

use futures::stream::{self, StreamExt};
use rotulador_common::db::ImageRepository;
use rotulador_common::hash::hash_file;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The images folder must be flat
    #[error("{0} is a folder; the images folder must be flat, use the ingest command to flatten it")]
    NestedFolder(PathBuf),

    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error(transparent)]
    Common(#[from] rotulador_common::Error),

    /// A blocking worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Outcome of registering an images folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Images newly added to the database
    pub registered: usize,
    /// Images whose hash was already known
    pub already_known: usize,
    /// Files that are not images
    pub skipped: usize,
}

/// Outcome of an ingest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub copied: usize,
    /// Content already present in the output folder
    pub duplicates: usize,
    /// Files that are not images
    pub skipped: usize,
    pub failed: usize,
}

/// Per-file result of an ingest worker
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileOutcome {
    Copied(PathBuf),
    Duplicate(PathBuf),
    NotAnImage,
}

/// Image file extension for a file, `None` when it is not an image
pub fn detect_image(path: &Path) -> std::io::Result<Option<&'static str>> {
    let kind = infer::get_from_path(path)?;
    Ok(kind
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.extension()))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn ensure_directory(path: &Path) -> IngestResult<()> {
    if !path.exists() {
        return Err(IngestError::PathNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(IngestError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Register every image of a flat images folder
///
/// Subfolders are an error. Non-image files are skipped with a warning.
pub async fn scan_images_folder(pool: &SqlitePool, images_dir: &Path) -> IngestResult<ScanReport> {
    ensure_directory(images_dir)?;
    info!("Scanning images folder {}", images_dir.display());

    let mut entries: Vec<PathBuf> = Vec::new();
    let read_dir =
        std::fs::read_dir(images_dir).map_err(|e| IngestError::Io(images_dir.to_path_buf(), e))?;
    for entry in read_dir {
        let entry = entry.map_err(|e| IngestError::Io(images_dir.to_path_buf(), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| IngestError::Io(path.clone(), e))?;
        if is_hidden(&path) {
            continue;
        }
        if file_type.is_dir() {
            return Err(IngestError::NestedFolder(path));
        }
        entries.push(path);
    }
    entries.sort();

    let repository = ImageRepository::new(pool.clone());
    let mut report = ScanReport::default();

    for path in entries {
        let blocking_path = path.clone();
        let detected = tokio::task::spawn_blocking(move || -> IngestResult<Option<String>> {
            match detect_image(&blocking_path).map_err(|e| IngestError::Io(blocking_path.clone(), e))? {
                Some(_) => Ok(Some(hash_file(&blocking_path)?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| IngestError::Worker(e.to_string()))??;

        let Some(sha256) = detected else {
            warn!("Skipping {}: not an image", path.display());
            report.skipped += 1;
            continue;
        };

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if repository.create(&sha256, &filename).await? {
            debug!("Registered {} as {}", filename, sha256);
            report.registered += 1;
        } else {
            report.already_known += 1;
        }
    }

    info!(
        "Images folder scanned: {} new, {} already known, {} skipped",
        report.registered, report.already_known, report.skipped
    );
    Ok(report)
}

/// Every regular, non-hidden file under the input folders
fn collect_files(inputs: &[PathBuf]) -> IngestResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        ensure_directory(input)?;
        let walker = WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.path()));
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("Error accessing entry: {}", e),
            }
        }
    }
    Ok(files)
}

/// Copy one file into the output folder as `<sha256>.<ext>`
///
/// The copy goes through a hidden temporary name so a partially written
/// file never carries a final name.
fn ingest_file(source: &Path, output: &Path) -> IngestResult<FileOutcome> {
    let Some(extension) = detect_image(source).map_err(|e| IngestError::Io(source.to_path_buf(), e))?
    else {
        return Ok(FileOutcome::NotAnImage);
    };

    let sha256 = hash_file(source)?;
    let target = output.join(format!("{}.{}", sha256, extension));
    if target.exists() {
        return Ok(FileOutcome::Duplicate(target));
    }

    let temporary = output.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    if let Err(e) = std::fs::copy(source, &temporary) {
        let _ = std::fs::remove_file(&temporary);
        return Err(IngestError::Io(source.to_path_buf(), e));
    }
    // hard_link fails when the target exists, so exactly one worker claims it
    let claimed = std::fs::hard_link(&temporary, &target);
    let _ = std::fs::remove_file(&temporary);
    match claimed {
        Ok(()) => Ok(FileOutcome::Copied(target)),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(FileOutcome::Duplicate(target))
        }
        Err(e) => Err(IngestError::Io(target, e)),
    }
}

/// Copy all images under `inputs` into the flat folder `output`
///
/// `jobs` files are processed concurrently (at least one). Per-file
/// failures are logged and counted, not fatal.
pub async fn ingest(inputs: &[PathBuf], output: &Path, jobs: usize) -> IngestResult<IngestReport> {
    std::fs::create_dir_all(output).map_err(|e| IngestError::Io(output.to_path_buf(), e))?;

    let files = {
        let inputs = inputs.to_vec();
        tokio::task::spawn_blocking(move || collect_files(&inputs))
            .await
            .map_err(|e| IngestError::Worker(e.to_string()))??
    };
    let jobs = jobs.max(1);
    info!(
        "Ingesting {} files into {} with {} workers",
        files.len(),
        output.display(),
        jobs
    );

    let results: Vec<(PathBuf, IngestResult<FileOutcome>)> = stream::iter(files)
        .map(|source| {
            let output = output.to_path_buf();
            async move {
                let worker_source = source.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || ingest_file(&worker_source, &output))
                        .await
                        .unwrap_or_else(|e| Err(IngestError::Worker(e.to_string())));
                (source, outcome)
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    let mut report = IngestReport::default();
    for (source, outcome) in results {
        match outcome {
            Ok(FileOutcome::Copied(target)) => {
                debug!("{} -> {}", source.display(), target.display());
                report.copied += 1;
            }
            Ok(FileOutcome::Duplicate(target)) => {
                debug!("{} already ingested as {}", source.display(), target.display());
                report.duplicates += 1;
            }
            Ok(FileOutcome::NotAnImage) => {
                warn!("Skipping {}: not an image", source.display());
                report.skipped += 1;
            }
            Err(e) => {
                warn!("Failed to ingest {}: {}", source.display(), e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Ingest finished: {} copied, {} duplicates, {} skipped, {} failed",
        report.copied, report.duplicates, report.skipped, report.failed
    );
    Ok(report)
}
