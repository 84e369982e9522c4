//! Integration tests for the mapping database
//!
//! Covers file-backed databases (created from a `DATABASE_URL`), persistence
//! across reopen, migrations and concurrent lookups.
//!
//! Run with: cargo test --package tagplay-storage --test integration_database

use std::sync::Arc;
use tagplay_storage::connection::{Database, DatabaseConfig};
use tagplay_storage::repositories::{MediaMappingRepository, SqliteMediaMappingRepository};
use tagplay_storage::{MediaLibrary, TagResolver, UpsertOutcome};
use tempfile::TempDir;
use tokio::sync::Barrier;

#[tokio::test]
async fn test_in_memory_database() {
    let db = Database::in_memory().await.unwrap();
    db.health_check().await.unwrap();
    db.close().await;
}

#[tokio::test]
async fn test_file_database_created_from_url() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("rfid_audio.db");
    // Four slashes: the absolute path follows the three-slash prefix.
    let url = format!("sqlite:///{}", path.display());

    let db = Database::new(DatabaseConfig::from_url(&url).unwrap())
        .await
        .unwrap();
    db.health_check().await.unwrap();
    db.close().await;

    assert!(path.exists());
}

#[tokio::test]
async fn test_mappings_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rfid_audio.db");
    let config = DatabaseConfig::new(path.to_string_lossy());

    let db = Database::new(config.clone()).await.unwrap();
    let repo = SqliteMediaMappingRepository::new(db.pool().clone());
    assert_eq!(
        repo.upsert("ABC123", "stories/fox.mp3").await.unwrap(),
        UpsertOutcome::Created
    );
    db.close().await;

    let db = Database::new(config).await.unwrap();
    let resolver = TagResolver::new(SqliteMediaMappingRepository::new(db.pool().clone()));
    assert_eq!(
        resolver.resolve("ABC123").await.unwrap().as_deref(),
        Some("stories/fox.mp3")
    );
    db.close().await;
}

#[tokio::test]
async fn test_concurrent_lookups() {
    let db = Database::in_memory().await.unwrap();
    let repo = SqliteMediaMappingRepository::new(db.pool().clone());
    for i in 0..5 {
        repo.upsert(&format!("TAG{i}"), &format!("track{i}.mp3"))
            .await
            .unwrap();
    }

    const NUM_CONCURRENT_TASKS: usize = 10;
    let barrier = Arc::new(Barrier::new(NUM_CONCURRENT_TASKS));
    let resolver = Arc::new(TagResolver::new(repo));

    let mut handles = vec![];

    for i in 0..NUM_CONCURRENT_TASKS {
        let resolver = resolver.clone();
        let barrier = barrier.clone();

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            resolver.resolve(&format!("TAG{}", i % 7)).await.unwrap()
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles).await;

    assert_eq!(results.len(), NUM_CONCURRENT_TASKS);
    for (i, result) in results.into_iter().enumerate() {
        let media = result.unwrap();
        let n = i % 7;
        if n < 5 {
            assert_eq!(media, Some(format!("track{n}.mp3")));
        } else {
            assert_eq!(media, None);
        }
    }

    db.close().await;
}

#[tokio::test]
async fn test_migration_idempotency() {
    let db = Database::in_memory().await.unwrap();

    db.migrate().await.unwrap();
    db.migrate().await.unwrap();

    let result: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='media_mappings'",
    )
    .fetch_one(db.pool())
    .await
    .unwrap();

    assert_eq!(result.0, 1);

    db.close().await;
}

#[tokio::test]
async fn test_primary_key_enforced() {
    let db = Database::in_memory().await.unwrap();

    sqlx::query("INSERT INTO media_mappings (tag_id, media_reference) VALUES ('ABC123', 'a.mp3')")
        .execute(db.pool())
        .await
        .unwrap();

    let duplicate = sqlx::query(
        "INSERT INTO media_mappings (tag_id, media_reference) VALUES ('ABC123', 'b.mp3')",
    )
    .execute(db.pool())
    .await;

    assert!(duplicate.is_err());
    db.close().await;
}

#[tokio::test]
async fn test_dangling_mappings_detected_against_library() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("stories")).unwrap();
    std::fs::write(dir.path().join("stories/fox.mp3"), b"ID3").unwrap();

    let db = Database::in_memory().await.unwrap();
    let repo = SqliteMediaMappingRepository::new(db.pool().clone());
    repo.upsert("ABC123", "stories/fox.mp3").await.unwrap();
    repo.upsert("DEF456", "stories/missing.mp3").await.unwrap();

    let library = MediaLibrary::new(dir.path());
    let mut dangling = Vec::new();
    for mapping in repo.list_all().await.unwrap() {
        if !library.contains(&mapping.media_reference).await {
            dangling.push(mapping.tag_id);
        }
    }

    assert_eq!(dangling, ["DEF456"]);
    db.close().await;
}
