//! Annotation records
//!
//! One row per (image, user, stage). Stage indexes are task positions in the
//! project file, so reordering tasks in the file reassigns existing answers.

use crate::Result;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

/// A user's answer for one image at one stage
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Annotation {
    pub id: i64,
    pub image_sha256: String,
    pub username: String,
    pub stage_index: i64,
    pub option_value: String,
    pub sure: bool,
    pub annotated_at: NaiveDateTime,
}

/// Annotation joined with the annotated image's filename
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnnotationWithImage {
    pub id: i64,
    pub image_sha256: String,
    pub username: String,
    pub stage_index: i64,
    pub option_value: String,
    pub sure: bool,
    pub annotated_at: NaiveDateTime,
    pub filename: String,
}

/// Minimal projection used to build selection snapshots
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StageValue {
    pub image_sha256: String,
    pub stage_index: i64,
    pub option_value: String,
}

/// Overall annotation statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct AnnotationStats {
    pub annotated_images: i64,
    pub total_annotations: i64,
    pub total_users: i64,
}

const ANNOTATION_COLUMNS: &str =
    "id, image_sha256, username, stage_index, option_value, sure, annotated_at";

/// Annotation table access
#[derive(Clone)]
pub struct AnnotationRepository {
    pool: SqlitePool,
}

impl AnnotationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a user's answer, replacing any previous answer for the same stage
    pub async fn upsert(
        &self,
        image_sha256: &str,
        username: &str,
        stage_index: usize,
        option_value: &str,
        sure: bool,
    ) -> Result<Annotation> {
        let annotation = sqlx::query_as::<_, Annotation>(&format!(
            r#"
            INSERT INTO annotations (image_sha256, username, stage_index, option_value, sure)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(image_sha256, username, stage_index) DO UPDATE SET
                option_value = excluded.option_value,
                sure = excluded.sure,
                annotated_at = CURRENT_TIMESTAMP
            RETURNING {}
            "#,
            ANNOTATION_COLUMNS
        ))
        .bind(image_sha256)
        .bind(username)
        .bind(stage_index as i64)
        .bind(option_value)
        .bind(sure)
        .fetch_one(&self.pool)
        .await?;

        Ok(annotation)
    }

    pub async fn get(
        &self,
        image_sha256: &str,
        username: &str,
        stage_index: usize,
    ) -> Result<Option<Annotation>> {
        let annotation = sqlx::query_as::<_, Annotation>(&format!(
            "SELECT {} FROM annotations WHERE image_sha256 = ? AND username = ? AND stage_index = ?",
            ANNOTATION_COLUMNS
        ))
        .bind(image_sha256)
        .bind(username)
        .bind(stage_index as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(annotation)
    }

    /// Every annotation of an image, by stage then user
    pub async fn for_image(&self, image_sha256: &str) -> Result<Vec<Annotation>> {
        let annotations = sqlx::query_as::<_, Annotation>(&format!(
            "SELECT {} FROM annotations WHERE image_sha256 = ? ORDER BY stage_index, username",
            ANNOTATION_COLUMNS
        ))
        .bind(image_sha256)
        .fetch_all(&self.pool)
        .await?;

        Ok(annotations)
    }

    /// A user's annotations, newest first
    pub async fn by_user(
        &self,
        username: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AnnotationWithImage>> {
        let rows = sqlx::query_as::<_, AnnotationWithImage>(
            r#"
            SELECT a.id, a.image_sha256, a.username, a.stage_index, a.option_value,
                   a.sure, a.annotated_at, i.filename
            FROM annotations a
            JOIN images i ON i.sha256 = a.image_sha256
            WHERE a.username = ?
            ORDER BY a.annotated_at DESC, a.id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(username)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_by_user(&self, username: &str) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM annotations WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether an image has an answer at `stage_index`; `None` matches any user
    pub async fn exists(
        &self,
        image_sha256: &str,
        username: Option<&str>,
        stage_index: usize,
    ) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM annotations
                WHERE image_sha256 = ?
                  AND stage_index = ?
                  AND (? IS NULL OR username = ?)
            )
            "#,
        )
        .bind(image_sha256)
        .bind(stage_index as i64)
        .bind(username)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every annotation of an image; returns the number removed
    pub async fn delete_for_image(&self, image_sha256: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM annotations WHERE image_sha256 = ?")
            .bind(image_sha256)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<AnnotationStats> {
        let stats = sqlx::query_as::<_, AnnotationStats>(
            r#"
            SELECT COUNT(DISTINCT image_sha256) AS annotated_images,
                   COUNT(*) AS total_annotations,
                   COUNT(DISTINCT username) AS total_users
            FROM annotations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Distinct (image, stage, value) triples across all users
    pub async fn stage_values(&self) -> Result<Vec<StageValue>> {
        let rows = sqlx::query_as::<_, StageValue>(
            "SELECT DISTINCT image_sha256, stage_index, option_value FROM annotations",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
