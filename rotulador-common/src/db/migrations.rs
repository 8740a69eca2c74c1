//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//! Databases written by releases that predate the table start at version 0.
//!
//! Never modify an existing migration; add a new one and bump
//! [`CURRENT_SCHEMA_VERSION`].

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database (0 when none recorded)
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    Ok(())
}

/// Migration v1: lookup indexes on annotations
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: annotation indexes");

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_annotations_image_sha256 ON annotations(image_sha256)",
        "CREATE INDEX IF NOT EXISTS idx_annotations_username ON annotations(username)",
        "CREATE INDEX IF NOT EXISTS idx_annotations_stage ON annotations(stage_index)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

/// Migration v2: add `sure` column to annotations
///
/// Databases created before the confidence checkbox was persisted lack the
/// column; existing rows are treated as sure.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: add sure column to annotations");

    let has_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('annotations') WHERE name = 'sure'",
    )
    .fetch_one(pool)
    .await?;

    if has_column > 0 {
        info!("  sure column already exists - skipping");
        return Ok(());
    }

    sqlx::query("ALTER TABLE annotations ADD COLUMN sure INTEGER NOT NULL DEFAULT 1")
        .execute(pool)
        .await?;

    info!("  ✓ Added sure column to annotations table");
    Ok(())
}
