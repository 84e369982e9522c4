use crate::{
    Result,
    constants::{MAX_VOLUME, MIN_VOLUME},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest tag identifier accepted from a reader.
pub const MAX_TAG_ID_LENGTH: usize = 64;

/// A successful RFID read.
///
/// Produced by the RFID session manager and consumed exactly once by the
/// orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRead {
    /// Tag identifier as reported by the reader (trimmed).
    pub tag_id: String,

    /// When the tag was read.
    pub timestamp: DateTime<Utc>,
}

impl TagRead {
    /// Create a tag read stamped with the current time.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagId` if the identifier is empty after trimming,
    /// longer than [`MAX_TAG_ID_LENGTH`], or not ASCII.
    pub fn new(tag_id: &str) -> Result<Self> {
        Self::with_timestamp(tag_id, Utc::now())
    }

    /// Create a tag read with an explicit timestamp.
    pub fn with_timestamp(tag_id: &str, timestamp: DateTime<Utc>) -> Result<Self> {
        let tag_id = tag_id.trim();

        if tag_id.is_empty() {
            return Err(Error::InvalidTagId("tag id is empty".to_string()));
        }
        if tag_id.len() > MAX_TAG_ID_LENGTH {
            return Err(Error::InvalidTagId(format!(
                "tag id must be at most {MAX_TAG_ID_LENGTH} chars, got {}",
                tag_id.len()
            )));
        }
        if !tag_id.is_ascii() {
            return Err(Error::InvalidTagId("tag id must be ASCII".to_string()));
        }

        Ok(Self {
            tag_id: tag_id.to_string(),
            timestamp,
        })
    }
}

impl fmt::Display for TagRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_id)
    }
}

/// Discrete, debounced input from the rotary encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderEvent {
    /// One clockwise detent.
    VolumeUp(DateTime<Utc>),

    /// One counter-clockwise detent.
    VolumeDown(DateTime<Utc>),

    /// One physical press of the encoder button.
    Confirm(DateTime<Utc>),
}

impl EncoderEvent {
    /// When the event settled.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::VolumeUp(at) | Self::VolumeDown(at) | Self::Confirm(at) => *at,
        }
    }

    /// Short lowercase name, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VolumeUp(_) => "volume_up",
            Self::VolumeDown(_) => "volume_down",
            Self::Confirm(_) => "confirm",
        }
    }
}

/// Playback status of the audio output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Nothing loaded or the last stream finished.
    #[default]
    Idle,

    /// A stream is audible.
    Playing,

    /// A stream is loaded but paused.
    Paused,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            Self::Idle => "Idle",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        };
        write!(f, "{}", status)
    }
}

/// Snapshot of the playback controller's state.
///
/// Only the playback controller mutates this; everybody else reads copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Current status.
    pub status: PlaybackStatus,

    /// Media reference of the loaded stream, if any.
    pub current_media: Option<String>,

    /// Volume in percent, always within `[0, 100]`.
    pub volume: u8,
}

impl PlaybackState {
    /// Idle state with the given volume (clamped).
    pub fn idle(volume: i32) -> Self {
        Self {
            status: PlaybackStatus::Idle,
            current_media: None,
            volume: clamp_volume(volume),
        }
    }

    /// Whether `media` is the stream currently loaded (playing or paused).
    pub fn is_current(&self, media: &str) -> bool {
        self.status != PlaybackStatus::Idle && self.current_media.as_deref() == Some(media)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::idle(i32::from(crate::constants::DEFAULT_VOLUME))
    }
}

/// Clamp an arbitrary volume value to `[MIN_VOLUME, MAX_VOLUME]`.
///
/// # Examples
///
/// ```
/// use tagplay_core::clamp_volume;
///
/// assert_eq!(clamp_volume(104), 100);
/// assert_eq!(clamp_volume(-4), 0);
/// assert_eq!(clamp_volume(42), 42);
/// ```
#[must_use]
pub fn clamp_volume(volume: i32) -> u8 {
    volume.clamp(i32::from(MIN_VOLUME), i32::from(MAX_VOLUME)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("ABC123", "ABC123")]
    #[case("  584190326114  ", "584190326114")]
    #[case("7", "7")]
    fn test_tag_read_valid(#[case] input: &str, #[case] expected: &str) {
        let read = TagRead::new(input).unwrap();
        assert_eq!(read.tag_id, expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("tägg")]
    fn test_tag_read_invalid(#[case] input: &str) {
        assert!(TagRead::new(input).is_err());
    }

    #[test]
    fn test_tag_read_too_long() {
        let long = "9".repeat(MAX_TAG_ID_LENGTH + 1);
        assert!(matches!(TagRead::new(&long), Err(Error::InvalidTagId(_))));
    }

    #[rstest]
    #[case(99 + 5, 100)]
    #[case(1 - 5, 0)]
    #[case(50, 50)]
    #[case(i32::MAX, 100)]
    #[case(i32::MIN, 0)]
    fn test_clamp_volume(#[case] input: i32, #[case] expected: u8) {
        assert_eq!(clamp_volume(input), expected);
    }

    #[test]
    fn test_playback_state_is_current() {
        let mut state = PlaybackState::idle(30);
        assert!(!state.is_current("stories/fox.mp3"));

        state.status = PlaybackStatus::Playing;
        state.current_media = Some("stories/fox.mp3".to_string());
        assert!(state.is_current("stories/fox.mp3"));
        assert!(!state.is_current("stories/owl.mp3"));

        state.status = PlaybackStatus::Paused;
        assert!(state.is_current("stories/fox.mp3"));
    }

    #[test]
    fn test_encoder_event_accessors() {
        let now = Utc::now();
        let event = EncoderEvent::Confirm(now);
        assert_eq!(event.timestamp(), now);
        assert_eq!(event.name(), "confirm");
        assert_eq!(EncoderEvent::VolumeDown(now).name(), "volume_down");
    }

    #[test]
    fn test_playback_status_display_and_serde() {
        assert_eq!(PlaybackStatus::Paused.to_string(), "Paused");
        let json = serde_json::to_string(&PlaybackStatus::Playing).unwrap();
        assert_eq!(json, "\"playing\"");
    }
}
