//! `query`: inspect recorded annotations from the command line

use anyhow::{Context, Result};
use clap::Args;
use rotulador_common::db::connect_readonly;
use sqlx::SqlitePool;
use std::path::PathBuf;

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Project database
    pub database: PathBuf,

    /// Stage index (task position in the project file)
    pub stage: Option<i64>,

    /// Answer value at that stage
    pub value: Option<String>,

    /// Only this image (sha256 or filename)
    pub image: Option<String>,

    /// Print image hashes instead of filenames
    #[arg(short = 'i', long)]
    pub show_ids: bool,
}

/// Output lines for a query
///
/// - no stage: distinct stage indexes
/// - stage only: distinct values answered at that stage
/// - stage and value: images with that answer, optionally narrowed to one
pub async fn query_lines(pool: &SqlitePool, args: &QueryArgs) -> Result<Vec<String>> {
    let Some(stage) = args.stage else {
        let stages: Vec<i64> =
            sqlx::query_scalar("SELECT DISTINCT stage_index FROM annotations ORDER BY stage_index")
                .fetch_all(pool)
                .await?;
        return Ok(stages.into_iter().map(|s| s.to_string()).collect());
    };

    let Some(value) = &args.value else {
        let values: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT option_value FROM annotations WHERE stage_index = ? ORDER BY option_value",
        )
        .bind(stage)
        .fetch_all(pool)
        .await?;
        return Ok(values);
    };

    let column = if args.show_ids { "i.sha256" } else { "i.filename" };
    let mut sql = format!(
        r#"
        SELECT DISTINCT {column}
        FROM annotations a
        JOIN images i ON i.sha256 = a.image_sha256
        WHERE a.stage_index = ? AND a.option_value = ?
        "#
    );
    if args.image.is_some() {
        sql.push_str(" AND (i.sha256 = ? OR i.filename = ?)");
    }
    sql.push_str(&format!(" ORDER BY {column}"));

    let mut query = sqlx::query_scalar::<_, String>(&sql).bind(stage).bind(value);
    if let Some(image) = &args.image {
        query = query.bind(image).bind(image);
    }

    Ok(query.fetch_all(pool).await?)
}

pub async fn run(args: QueryArgs) -> Result<()> {
    let pool = connect_readonly(&args.database)
        .await
        .with_context(|| format!("Failed to open {}", args.database.display()))?;

    for line in query_lines(&pool, &args).await? {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotulador_common::db::{connect_in_memory, AnnotationRepository, ImageRepository};

    async fn fixture() -> SqlitePool {
        let pool = connect_in_memory().await.unwrap();
        let images = ImageRepository::new(pool.clone());
        images.create("aaa", "cat.png").await.unwrap();
        images.create("bbb", "dog.png").await.unwrap();
        let annotations = AnnotationRepository::new(pool.clone());
        annotations.upsert("aaa", "alice", 0, "good", true).await.unwrap();
        annotations.upsert("bbb", "alice", 0, "good", true).await.unwrap();
        annotations.upsert("bbb", "bob", 0, "bad", false).await.unwrap();
        annotations.upsert("aaa", "alice", 2, "adult", true).await.unwrap();
        pool
    }

    fn args(stage: Option<i64>, value: Option<&str>, image: Option<&str>, show_ids: bool) -> QueryArgs {
        QueryArgs {
            database: PathBuf::from("unused.db"),
            stage,
            value: value.map(str::to_string),
            image: image.map(str::to_string),
            show_ids,
        }
    }

    #[tokio::test]
    async fn test_list_stages() {
        let pool = fixture().await;
        let lines = query_lines(&pool, &args(None, None, None, false)).await.unwrap();
        assert_eq!(lines, vec!["0", "2"]);
    }

    #[tokio::test]
    async fn test_list_values_for_stage() {
        let pool = fixture().await;
        let lines = query_lines(&pool, &args(Some(0), None, None, false)).await.unwrap();
        assert_eq!(lines, vec!["bad", "good"]);
    }

    #[tokio::test]
    async fn test_list_images_with_value() {
        let pool = fixture().await;
        let names = query_lines(&pool, &args(Some(0), Some("good"), None, false))
            .await
            .unwrap();
        assert_eq!(names, vec!["cat.png", "dog.png"]);

        let ids = query_lines(&pool, &args(Some(0), Some("good"), None, true))
            .await
            .unwrap();
        assert_eq!(ids, vec!["aaa", "bbb"]);
    }

    #[tokio::test]
    async fn test_filter_single_image() {
        let pool = fixture().await;
        let by_name = query_lines(&pool, &args(Some(0), Some("good"), Some("dog.png"), true))
            .await
            .unwrap();
        assert_eq!(by_name, vec!["bbb"]);

        let by_hash = query_lines(&pool, &args(Some(0), Some("bad"), Some("aaa"), false))
            .await
            .unwrap();
        assert!(by_hash.is_empty());
    }
}
