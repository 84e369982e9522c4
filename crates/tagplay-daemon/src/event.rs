//! Events consumed and signals produced by the orchestrator.

use std::fmt;
use tagplay_core::PlaybackStatus;

/// Input to [`Orchestrator::dispatch`](crate::orchestrator::Orchestrator::dispatch).
pub use tagplay_hardware::sources::SourceEvent as PlayerEvent;

/// Transient user-facing signal.
///
/// Published on a broadcast channel; a display or LED driver subscribes to
/// it. Nobody listening is fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    /// A tag was scanned that has no mapping.
    UnknownTag { tag_id: String },

    /// A mapped tag was scanned but its media could not be played.
    PlaybackFailed { media: String, reason: String },
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTag { tag_id } => write!(f, "Unknown tag {tag_id}"),
            Self::PlaybackFailed { media, reason } => {
                write!(f, "Cannot play {media}: {reason}")
            }
        }
    }
}

/// What a successful dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new stream started.
    Started { media: String },

    /// Pause or resume of the current stream; carries the new status.
    Toggled(PlaybackStatus),

    /// Volume changed (or was already at its limit).
    Volume(u8),

    /// The tag has no mapping.
    UnknownTag,

    /// Nothing to do (confirm while idle).
    Ignored,

    /// The reader saw no tag during a whole read window.
    NoTag,
}

impl Outcome {
    /// Whether this outcome resets the fault streak.
    ///
    /// An idle reader produces a steady stream of [`Outcome::NoTag`]; it says
    /// nothing about the health of the rest of the system.
    pub fn is_progress(&self) -> bool {
        !matches!(self, Self::NoTag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_display() {
        let cue = Cue::UnknownTag {
            tag_id: "ZZZ999".to_string(),
        };
        assert_eq!(cue.to_string(), "Unknown tag ZZZ999");

        let cue = Cue::PlaybackFailed {
            media: "stories/fox.mp3".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(cue.to_string(), "Cannot play stories/fox.mp3: not found");
    }

    #[test]
    fn test_no_tag_is_neutral() {
        assert!(!Outcome::NoTag.is_progress());
        assert!(Outcome::Ignored.is_progress());
        assert!(Outcome::Volume(30).is_progress());
    }
}
