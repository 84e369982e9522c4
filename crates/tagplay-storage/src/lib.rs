//! Storage layer for the tagplay RFID audio player.
//!
//! This crate persists the tag-to-media mappings in SQLite and resolves
//! scanned tags against them.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool manager with automatic migrations
//! - [`MediaMappingRepository`] - Data access trait for mappings
//! - [`TagResolver`] - Lookup used by the daemon for every scanned tag
//! - [`MediaLibrary`] - Listing of the files under `MEDIA_PATH`
//!
//! The daemon only reads mappings. Writes happen through the `map`/`unmap`
//! commands of the binary.
//!
//! # Examples
//!
//! ```no_run
//! use tagplay_storage::{Database, DatabaseConfig, TagResolver};
//! use tagplay_storage::repositories::{MediaMappingRepository, SqliteMediaMappingRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig::from_url("sqlite:///rfid_audio.db")?;
//! let db = Database::new(config).await?;
//!
//! let repo = SqliteMediaMappingRepository::new(db.pool().clone());
//! repo.upsert("ABC123", "stories/fox.mp3").await?;
//!
//! let resolver = TagResolver::new(repo);
//! assert_eq!(resolver.resolve("ABC123").await?.as_deref(), Some("stories/fox.mp3"));
//! # Ok(())
//! # }
//! ```
//!
//! # SQL Injection Prevention
//!
//! All queries use parameterized statements via SQLx.

pub mod connection;
pub mod error;
pub mod library;
pub mod models;
pub mod repositories;
pub mod resolver;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use library::MediaLibrary;
pub use models::MediaMapping;
pub use repositories::{MediaMappingRepository, SqliteMediaMappingRepository, UpsertOutcome};
pub use resolver::TagResolver;
