use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Association between an RFID tag and the media it starts.
///
/// # Fields
///
/// * `tag_id` - Tag identifier as reported by the reader (primary key)
/// * `media_reference` - Path of the media file, relative to `MEDIA_PATH`
/// * `created_at` - Record creation timestamp
/// * `updated_at` - Record last modification timestamp
///
/// # Database Schema
///
/// Maps to the `media_mappings` table. `tag_id` is the primary key, so a tag
/// has at most one mapping; writing a mapping for a known tag replaces its
/// media reference.
///
/// # Examples
///
/// ```
/// use tagplay_storage::models::MediaMapping;
///
/// let mapping = MediaMapping::new("ABC123", "stories/fox.mp3");
/// assert_eq!(mapping.tag_id, "ABC123");
/// assert!(mapping.matches_tag(" ABC123 "));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MediaMapping {
    pub tag_id: String,
    pub media_reference: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaMapping {
    /// Build an unsaved mapping stamped with the current time.
    pub fn new(tag_id: impl Into<String>, media_reference: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tag_id: tag_id.into().trim().to_string(),
            media_reference: media_reference.into().trim().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Compare against a raw tag id, ignoring surrounding whitespace.
    pub fn matches_tag(&self, tag_id: &str) -> bool {
        self.tag_id == tag_id.trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_fields() {
        let mapping = MediaMapping::new(" 584190326114\n", " stories/owl.mp3 ");
        assert_eq!(mapping.tag_id, "584190326114");
        assert_eq!(mapping.media_reference, "stories/owl.mp3");
        assert_eq!(mapping.created_at, mapping.updated_at);
    }

    #[test]
    fn test_matches_tag() {
        let mapping = MediaMapping::new("ABC123", "stories/fox.mp3");
        assert!(mapping.matches_tag("ABC123"));
        assert!(mapping.matches_tag("ABC123\r\n"));
        assert!(!mapping.matches_tag("abc123"));
    }
}
