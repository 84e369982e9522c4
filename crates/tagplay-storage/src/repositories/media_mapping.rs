#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::MediaMapping;
use sqlx::SqlitePool;
use tracing::info;

/// Result of writing a mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The tag had no mapping before.
    Created,

    /// The tag was mapped to `previous` and now points at the new media.
    Updated { previous: String },
}

/// Repository trait for tag-to-media mappings
///
/// The daemon only calls [`find_by_tag`](Self::find_by_tag); the mapping
/// commands of the binary use the write operations.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
pub trait MediaMappingRepository: Send + Sync {
    /// Find the mapping for a tag
    async fn find_by_tag(&self, tag_id: &str) -> StorageResult<Option<MediaMapping>>;

    /// Create or replace the mapping for a tag
    async fn upsert(&self, tag_id: &str, media_reference: &str) -> StorageResult<UpsertOutcome>;

    /// Delete the mapping for a tag
    async fn delete(&self, tag_id: &str) -> StorageResult<()>;

    /// All mappings, ordered by tag id
    async fn list_all(&self) -> StorageResult<Vec<MediaMapping>>;

    /// Number of stored mappings
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of MediaMappingRepository
#[derive(Debug, Clone)]
pub struct SqliteMediaMappingRepository {
    pool: SqlitePool,
}

impl SqliteMediaMappingRepository {
    /// Create a new SQLite mapping repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn required<'a>(field: &str, value: &'a str) -> StorageResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StorageError::Validation(format!("{field} must not be empty")));
    }
    Ok(value)
}

impl MediaMappingRepository for SqliteMediaMappingRepository {
    async fn find_by_tag(&self, tag_id: &str) -> StorageResult<Option<MediaMapping>> {
        let mapping = sqlx::query_as::<_, MediaMapping>(
            r#"
            SELECT tag_id, media_reference, created_at, updated_at
            FROM media_mappings
            WHERE tag_id = ?
            "#,
        )
        .bind(tag_id.trim())
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn upsert(&self, tag_id: &str, media_reference: &str) -> StorageResult<UpsertOutcome> {
        let tag_id = required("tag_id", tag_id)?;
        let media_reference = required("media_reference", media_reference)?;

        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT media_reference FROM media_mappings WHERE tag_id = ?")
                .bind(tag_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match previous {
            Some(previous) => {
                sqlx::query(
                    r#"
                    UPDATE media_mappings
                    SET media_reference = ?, updated_at = datetime('now')
                    WHERE tag_id = ?
                    "#,
                )
                .bind(media_reference)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;

                info!(
                    "Updating tag mapping: {} from {} to {}",
                    tag_id, previous, media_reference
                );
                UpsertOutcome::Updated { previous }
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO media_mappings (tag_id, media_reference)
                    VALUES (?, ?)
                    "#,
                )
                .bind(tag_id)
                .bind(media_reference)
                .execute(&mut *tx)
                .await?;

                info!("Adding tag mapping: {} to {}", tag_id, media_reference);
                UpsertOutcome::Created
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn delete(&self, tag_id: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM media_mappings WHERE tag_id = ?")
            .bind(tag_id.trim())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity_type: "MediaMapping".to_string(),
                field: "tag_id".to_string(),
                value: tag_id.trim().to_string(),
            });
        }

        info!("Removed tag mapping: {}", tag_id.trim());
        Ok(())
    }

    async fn list_all(&self) -> StorageResult<Vec<MediaMapping>> {
        let mappings = sqlx::query_as::<_, MediaMapping>(
            r#"
            SELECT tag_id, media_reference, created_at, updated_at
            FROM media_mappings
            ORDER BY tag_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(mappings)
    }

    async fn count(&self) -> StorageResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM media_mappings")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    async fn repo() -> SqliteMediaMappingRepository {
        let db = Database::in_memory().await.unwrap();
        SqliteMediaMappingRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_find_unknown_tag() {
        let repo = repo().await;
        assert!(repo.find_by_tag("ABC123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let repo = repo().await;

        let outcome = repo.upsert("ABC123", "stories/fox.mp3").await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let outcome = repo.upsert("ABC123", "stories/owl.mp3").await.unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Updated {
                previous: "stories/fox.mp3".to_string()
            }
        );

        let mapping = repo.find_by_tag("ABC123").await.unwrap().unwrap();
        assert_eq!(mapping.media_reference, "stories/owl.mp3");
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lookup_trims_tag_id() {
        let repo = repo().await;
        repo.upsert(" 584190326114 ", "songs/lullaby.mp3").await.unwrap();

        let mapping = repo.find_by_tag("584190326114\n").await.unwrap().unwrap();
        assert_eq!(mapping.tag_id, "584190326114");
    }

    #[tokio::test]
    async fn test_upsert_rejects_blank_values() {
        let repo = repo().await;

        assert!(matches!(
            repo.upsert("  ", "stories/fox.mp3").await,
            Err(StorageError::Validation(_))
        ));
        assert!(matches!(
            repo.upsert("ABC123", "").await,
            Err(StorageError::Validation(_))
        ));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = repo().await;
        repo.upsert("ABC123", "stories/fox.mp3").await.unwrap();

        repo.delete("ABC123").await.unwrap();
        assert!(repo.find_by_tag("ABC123").await.unwrap().is_none());

        let err = repo.delete("ABC123").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_all_sorted_by_tag() {
        let repo = repo().await;
        repo.upsert("C3", "c.mp3").await.unwrap();
        repo.upsert("A1", "a.mp3").await.unwrap();
        repo.upsert("B2", "b.mp3").await.unwrap();

        let tags: Vec<_> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.tag_id)
            .collect();
        assert_eq!(tags, ["A1", "B2", "C3"]);
    }
}
