//! `migrate-legacy-db`: convert a per-task-table database
//!
//! Legacy databases kept one `task_<id>(image, user, value, sure)` table per
//! task next to `images(sha256, filename)`. Each task table becomes rows of
//! the unified `annotations` table at the task's stage index.

use anyhow::{bail, Context, Result};
use clap::Args;
use rotulador_common::db::{connect_readonly, init_database};
use rotulador_common::ProjectConfig;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Args)]
pub struct MigrateLegacyArgs {
    /// Legacy database to read
    pub old_database: PathBuf,
    /// Database to create; must not exist
    pub new_database: PathBuf,
    /// Project file giving the task order
    pub config: PathBuf,
}

/// Counts of migrated rows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub images: usize,
    /// (task id, annotations copied) in pipeline order
    pub tasks: Vec<(String, usize)>,
    /// Task tables absent from the legacy database
    pub missing_tables: Vec<String>,
    /// Rows pointing at images the legacy database does not list
    pub orphaned: usize,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Copy a legacy database into a new one
pub async fn migrate_legacy_database(
    old_path: &Path,
    new_path: &Path,
    config: &ProjectConfig,
) -> Result<MigrationReport> {
    if new_path.exists() {
        bail!(
            "New database already exists: {} (delete it first to recreate it)",
            new_path.display()
        );
    }

    let old = connect_readonly(old_path)
        .await
        .with_context(|| format!("Failed to open legacy database {}", old_path.display()))?;

    if !table_exists(&old, "images").await? {
        bail!("images table not found in legacy database");
    }
    if !has_column(&old, "images", "sha256").await? {
        bail!("images table has no sha256 column (not a legacy database?)");
    }

    let new = init_database(new_path)
        .await
        .context("Failed to create new database")?;
    let mut tx = new.begin().await?;
    let mut report = MigrationReport::default();

    info!("Migrating images...");
    let legacy_images = sqlx::query("SELECT sha256, filename FROM images")
        .fetch_all(&old)
        .await?;
    let mut known_images = HashSet::new();
    for row in legacy_images {
        let sha256: String = row.try_get("sha256")?;
        let filename: String = row.try_get("filename")?;
        sqlx::query("INSERT INTO images (sha256, filename) VALUES (?, ?) ON CONFLICT(sha256) DO NOTHING")
            .bind(&sha256)
            .bind(&filename)
            .execute(&mut *tx)
            .await?;
        known_images.insert(sha256);
    }
    report.images = known_images.len();
    info!("  ✓ Migrated {} images", report.images);

    for (stage_index, task) in config.tasks.iter().enumerate() {
        let table = format!("task_{}", task.id);
        if !table_exists(&old, &table).await? {
            warn!("Task table '{}' not found, skipping", table);
            report.missing_tables.push(table);
            continue;
        }

        let sure_column = if has_column(&old, &table, "sure").await? {
            "sure"
        } else {
            "1"
        };
        let rows = sqlx::query(&format!(
            "SELECT image, user, value, {} AS sure FROM {} WHERE value IS NOT NULL",
            sure_column,
            quote_identifier(&table)
        ))
        .fetch_all(&old)
        .await?;

        let mut copied = 0;
        for row in rows {
            let image: String = row.try_get("image")?;
            if !known_images.contains(&image) {
                report.orphaned += 1;
                continue;
            }
            let user: String = row.try_get("user")?;
            let value: String = row.try_get("value")?;
            let sure: Option<i64> = row.try_get("sure")?;

            sqlx::query(
                r#"
                INSERT INTO annotations (image_sha256, username, stage_index, option_value, sure)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(image_sha256, username, stage_index) DO UPDATE SET
                    option_value = excluded.option_value,
                    sure = excluded.sure
                "#,
            )
            .bind(&image)
            .bind(&user)
            .bind(stage_index as i64)
            .bind(&value)
            .bind(sure.unwrap_or(1) != 0)
            .execute(&mut *tx)
            .await?;
            copied += 1;
        }

        info!("  ✓ Task '{}' (stage {}): {} annotations", task.id, stage_index, copied);
        report.tasks.push((task.id.clone(), copied));
    }

    tx.commit().await?;
    old.close().await;
    new.close().await;

    if report.orphaned > 0 {
        warn!("Skipped {} annotations of unknown images", report.orphaned);
    }
    Ok(report)
}

pub async fn run(args: MigrateLegacyArgs) -> Result<()> {
    let config = ProjectConfig::from_file(&args.config).context("Failed to load project file")?;

    info!("Starting database migration");
    info!("  Old DB: {}", args.old_database.display());
    info!("  New DB: {}", args.new_database.display());
    info!("  Config: {}", args.config.display());

    let report = migrate_legacy_database(&args.old_database, &args.new_database, &config).await?;

    println!("Migrated {} images", report.images);
    for (task, count) in &report.tasks {
        println!("  {}: {} annotations", task, count);
    }
    println!("Use the new database with: rotulador annotator -d {}", args.new_database.display());
    Ok(())
}
