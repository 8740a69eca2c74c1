//! `annotator`: serve the annotation web interface

use anyhow::{bail, Context, Result};
use clap::Args;
use rotulador_common::config::write_sample_config;
use rotulador_common::db::init_database;
use rotulador_common::ProjectConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::signal;
use tracing::{error, info};

use crate::i18n::Translations;
use crate::ingest::scan_images_folder;
use crate::{build_router, AppState};

/// Project file inside a project folder
pub const FOLDER_CONFIG: &str = "config.yaml";
/// Database inside a project folder
pub const FOLDER_DATABASE: &str = "annotations.db";
/// Images folder inside a project folder
pub const FOLDER_IMAGES: &str = "images";

#[derive(Debug, Clone, Args)]
pub struct AnnotatorArgs {
    /// Project folder (config.yaml, annotations.db, images/) or project file
    pub target: Option<PathBuf>,

    /// Project file
    #[arg(short, long, env = "ROTULADOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database
    #[arg(short, long, env = "ROTULADOR_DATABASE")]
    pub database: Option<PathBuf>,

    /// Flat folder of images to annotate
    #[arg(short, long, env = "ROTULADOR_IMAGES")]
    pub images: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "ROTULADOR_ADDR")]
    pub addr: SocketAddr,

    /// Interface language when the browser asks for none we have
    #[arg(long, default_value = "en", env = "ROTULADOR_LANGUAGE")]
    pub language: String,
}

/// Resolved locations of a project's files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub config: PathBuf,
    pub database: PathBuf,
    pub images: PathBuf,
}

/// Work out where the project lives
///
/// A folder target supplies defaults for all three paths (explicit flags
/// still win) and gets a sample project file and an images folder when they
/// are missing. A file target is the project file and needs `--database` and
/// `--images`. Without a target all three flags are required.
pub fn resolve_paths(args: &AnnotatorArgs) -> Result<ProjectPaths> {
    match &args.target {
        Some(folder) if folder.is_dir() => {
            let config = args
                .config
                .clone()
                .unwrap_or_else(|| folder.join(FOLDER_CONFIG));
            let database = args
                .database
                .clone()
                .unwrap_or_else(|| folder.join(FOLDER_DATABASE));
            let images = args
                .images
                .clone()
                .unwrap_or_else(|| folder.join(FOLDER_IMAGES));

            if !config.exists() {
                write_sample_config(&config)
                    .with_context(|| format!("Failed to write {}", config.display()))?;
                info!("Created sample project file {}", config.display());
            }
            if !images.exists() {
                std::fs::create_dir_all(&images)
                    .with_context(|| format!("Failed to create {}", images.display()))?;
                info!("Created images folder {}", images.display());
            }

            Ok(ProjectPaths {
                config,
                database,
                images,
            })
        }
        Some(file) => {
            if !file.is_file() {
                bail!("{} is neither a project folder nor a project file", file.display());
            }
            Ok(ProjectPaths {
                config: file.clone(),
                database: required(&args.database, "--database")?,
                images: required(&args.images, "--images")?,
            })
        }
        None => Ok(ProjectPaths {
            config: required(&args.config, "--config")?,
            database: required(&args.database, "--database")?,
            images: required(&args.images, "--images")?,
        }),
    }
}

fn required(value: &Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    value
        .clone()
        .with_context(|| format!("{} is required unless a project folder is given", flag))
}

/// Load everything the server needs and build its state
pub async fn prepare_state(paths: &ProjectPaths, language: &str) -> Result<AppState> {
    info!("Project file: {}", paths.config.display());
    let config = ProjectConfig::from_file(&paths.config).context("Failed to load project file")?;
    info!(
        "Loaded {} tasks and {} users",
        config.tasks.len(),
        config.auth.len()
    );

    info!("Database: {}", paths.database.display());
    let pool = init_database(&paths.database)
        .await
        .context("Failed to initialize database")?;

    scan_images_folder(&pool, &paths.images)
        .await
        .context("Failed to register images")?;

    let translations = Translations::load(language).context("Failed to load translations")?;

    Ok(AppState::new(pool, config, absolute(&paths.images), translations))
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub async fn run(args: AnnotatorArgs) -> Result<()> {
    let paths = resolve_paths(&args)?;
    let state = prepare_state(&paths, &args.language).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("Failed to bind to {}", args.addr))?;
    info!("Listening on http://{}", args.addr);
    info!("Health check: http://{}/health", args.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(target: Option<PathBuf>) -> AnnotatorArgs {
        AnnotatorArgs {
            target,
            config: None,
            database: None,
            images: None,
            addr: "127.0.0.1:0".parse().unwrap(),
            language: "en".to_string(),
        }
    }

    #[test]
    fn test_folder_mode_creates_project() {
        let dir = tempfile::tempdir().unwrap();
        let paths = resolve_paths(&args(Some(dir.path().to_path_buf()))).unwrap();

        assert_eq!(paths.config, dir.path().join("config.yaml"));
        assert_eq!(paths.database, dir.path().join("annotations.db"));
        assert_eq!(paths.images, dir.path().join("images"));
        assert!(paths.config.is_file());
        assert!(paths.images.is_dir());
        ProjectConfig::from_file(&paths.config).unwrap();
    }

    #[test]
    fn test_folder_mode_keeps_existing_config_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "custom").unwrap();

        let mut a = args(Some(dir.path().to_path_buf()));
        a.database = Some(dir.path().join("other.db"));
        let paths = resolve_paths(&a).unwrap();

        assert_eq!(std::fs::read_to_string(&config).unwrap(), "custom");
        assert_eq!(paths.database, dir.path().join("other.db"));
    }

    #[test]
    fn test_file_mode_requires_database_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("project.yaml");
        std::fs::write(&config, "tasks: []").unwrap();

        let err = resolve_paths(&args(Some(config.clone()))).unwrap_err();
        assert!(err.to_string().contains("--database"));

        let mut a = args(Some(config.clone()));
        a.database = Some(dir.path().join("a.db"));
        a.images = Some(dir.path().join("imgs"));
        let paths = resolve_paths(&a).unwrap();
        assert_eq!(paths.config, config);
    }

    #[test]
    fn test_no_target_requires_all_flags() {
        let err = resolve_paths(&args(None)).unwrap_err();
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn test_missing_target_is_an_error() {
        let err = resolve_paths(&args(Some(PathBuf::from("/no/such/project")))).unwrap_err();
        assert!(err.to_string().contains("neither"));
    }

    #[tokio::test]
    async fn test_prepare_state_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        let paths = resolve_paths(&args(Some(dir.path().to_path_buf()))).unwrap();
        let state = prepare_state(&paths, "pt-BR").await.unwrap();

        assert_eq!(state.config.tasks.len(), 3);
        assert_eq!(state.translations.default_language(), "pt-BR");
        assert!(paths.database.is_file());
    }
}
