//! `init`: start a new annotation project

use anyhow::{bail, Context, Result};
use clap::Args;
use rotulador_common::config::write_sample_config;
use rotulador_common::db::{init_database, ImageRepository};
use rotulador_common::ProjectConfig;
use std::path::PathBuf;
use tracing::info;

use crate::ingest::scan_images_folder;

#[derive(Debug, Clone, Args)]
pub struct InitArgs {
    /// Flat folder of images to register
    #[arg(short, long)]
    pub images_dir: Option<PathBuf>,

    /// Project file to create
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Database file to create
    #[arg(short, long, default_value = "annotations.db")]
    pub database: PathBuf,
}

/// Summary printed after initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOutcome {
    pub config_created: bool,
    pub images: i64,
}

/// Write the sample project file if missing, create the database and
/// register images when a folder is given
pub async fn init_project(args: &InitArgs) -> Result<InitOutcome> {
    let config_created = !args.config.exists();
    if config_created {
        write_sample_config(&args.config)
            .with_context(|| format!("Failed to create {}", args.config.display()))?;
        info!("Created sample project file {}", args.config.display());
    } else {
        info!("Project file already exists: {}", args.config.display());
    }

    // Validate before touching the database
    ProjectConfig::from_file(&args.config).context("Failed to load project file")?;

    let pool = init_database(&args.database)
        .await
        .context("Failed to create database")?;

    if let Some(images_dir) = &args.images_dir {
        if !images_dir.is_dir() {
            bail!("Images folder does not exist: {}", images_dir.display());
        }
        scan_images_folder(&pool, images_dir)
            .await
            .context("Failed to register images")?;
    }

    let images = ImageRepository::new(pool.clone()).count().await?;
    pool.close().await;

    Ok(InitOutcome {
        config_created,
        images,
    })
}

pub async fn run(args: InitArgs) -> Result<()> {
    let outcome = init_project(&args).await?;

    println!("Initialization complete");
    if outcome.config_created {
        println!("  Created {}", args.config.display());
    }
    println!("  Database {} ({} images)", args.database.display(), outcome.images);
    println!();
    println!("Next steps:");
    println!("  1. Review and customize {}", args.config.display());
    match &args.images_dir {
        Some(images) => println!(
            "  2. rotulador annotator -c {} -d {} -i {}",
            args.config.display(),
            args.database.display(),
            images.display()
        ),
        None => println!(
            "  2. rotulador annotator -c {} -d {} -i <images folder>",
            args.config.display(),
            args.database.display()
        ),
    }
    println!("Then open http://localhost:8080 in your browser");

    Ok(())
}
