//! Image records
//!
//! Images are identified by the SHA-256 of their content and stored as flat
//! files named `filename` inside the project's images folder.

use crate::Result;
use chrono::NaiveDateTime;
use sqlx::SqlitePool;

/// Image registered for annotation
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Image {
    pub sha256: String,
    pub filename: String,
    pub ingested_at: NaiveDateTime,
}

/// Image table access
#[derive(Clone)]
pub struct ImageRepository {
    pool: SqlitePool,
}

impl ImageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an image; returns false when the hash was already known
    pub async fn create(&self, sha256: &str, filename: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO images (sha256, filename)
            VALUES (?, ?)
            ON CONFLICT(sha256) DO NOTHING
            "#,
        )
        .bind(sha256)
        .bind(filename)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, sha256: &str) -> Result<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(
            "SELECT sha256, filename, ingested_at FROM images WHERE sha256 = ?",
        )
        .bind(sha256)
        .fetch_optional(&self.pool)
        .await?;

        Ok(image)
    }

    /// All images, ordered by hash
    pub async fn list(&self) -> Result<Vec<Image>> {
        let images = sqlx::query_as::<_, Image>(
            "SELECT sha256, filename, ingested_at FROM images ORDER BY sha256",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    pub async fn count(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Remove an image and, through the foreign key, its annotations
    pub async fn delete(&self, sha256: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE sha256 = ?")
            .bind(sha256)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = ImageRepository::new(connect_in_memory().await.unwrap());

        assert!(repo.create("bbb", "b.png").await.unwrap());
        let image = repo.get("bbb").await.unwrap().expect("image should exist");
        assert_eq!(image.filename, "b.png");

        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_ignored() {
        let repo = ImageRepository::new(connect_in_memory().await.unwrap());

        assert!(repo.create("aaa", "first.png").await.unwrap());
        assert!(!repo.create("aaa", "second.png").await.unwrap());

        let image = repo.get("aaa").await.unwrap().unwrap();
        assert_eq!(image.filename, "first.png");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_ordered_by_hash() {
        let repo = ImageRepository::new(connect_in_memory().await.unwrap());
        for (hash, name) in [("ccc", "c.png"), ("aaa", "a.png"), ("bbb", "b.png")] {
            repo.create(hash, name).await.unwrap();
        }

        let hashes: Vec<String> = repo.list().await.unwrap().into_iter().map(|i| i.sha256).collect();
        assert_eq!(hashes, vec!["aaa", "bbb", "ccc"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = ImageRepository::new(connect_in_memory().await.unwrap());
        repo.create("aaa", "a.png").await.unwrap();

        assert!(repo.delete("aaa").await.unwrap());
        assert!(!repo.delete("aaa").await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
