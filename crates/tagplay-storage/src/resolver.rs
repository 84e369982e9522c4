//! Tag-to-media resolution.
//!
//! A tag without a mapping is a normal outcome (`Ok(None)`), never an error:
//! the caller signals "unknown tag" and does not touch playback.

use crate::error::StorageResult;
use crate::repositories::MediaMappingRepository;
use tracing::debug;

/// Looks up the media reference mapped to a tag.
///
/// # Examples
///
/// ```no_run
/// use tagplay_storage::{Database, SqliteMediaMappingRepository, TagResolver};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let resolver = TagResolver::new(SqliteMediaMappingRepository::new(db.pool().clone()));
///
/// match resolver.resolve("ABC123").await? {
///     Some(media) => println!("play {media}"),
///     None => println!("unknown tag"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TagResolver<R> {
    repository: R,
}

impl<R: MediaMappingRepository> TagResolver<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Resolve a tag id to its media reference.
    ///
    /// The id is trimmed before the lookup; a blank id resolves to `None`
    /// without querying the store. The returned reference is trimmed as well,
    /// so callers can compare it with what they loaded.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the lookup itself fails.
    pub async fn resolve(&self, tag_id: &str) -> StorageResult<Option<String>> {
        let tag_id = tag_id.trim();
        if tag_id.is_empty() {
            return Ok(None);
        }

        let media = self
            .repository
            .find_by_tag(tag_id)
            .await?
            .map(|mapping| mapping.media_reference.trim().to_string())
            .filter(|reference| !reference.is_empty());

        match &media {
            Some(reference) => debug!("Tag {} resolves to {}", tag_id, reference),
            None => debug!("Tag {} has no mapping", tag_id),
        }

        Ok(media)
    }
}
