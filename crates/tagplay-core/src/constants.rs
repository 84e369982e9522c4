//! Default values and limits shared across the tagplay crates.
//!
//! The daemon reads its configuration from the environment (see
//! [`crate::config`]). Every option has a default here so a bare
//! deployment with only `MEDIA_PATH` and `DATABASE_URL` still starts.
//!
//! # Usage
//!
//! ```
//! use tagplay_core::constants::*;
//! use std::time::Duration;
//!
//! assert!(DEFAULT_VOLUME <= MAX_VOLUME);
//! let window = Duration::from_secs_f64(DEFAULT_ENCODER_BOUNCE_SECS);
//! assert_eq!(window.as_millis(), 20);
//! ```

// ============================================================================
// Volume
// ============================================================================

/// Lowest playback volume (percent).
pub const MIN_VOLUME: u8 = 0;

/// Highest playback volume (percent).
pub const MAX_VOLUME: u8 = 100;

/// Volume applied at process start when `DEFAULT_VOLUME` is unset.
pub const DEFAULT_VOLUME: u8 = 25;

/// Volume change applied per encoder detent.
pub const VOLUME_STEP: i32 = 5;

// ============================================================================
// Audio output
// ============================================================================

/// Output device used when `DEFAULT_AUDIO_DEVICE` is unset.
///
/// `speaker` (or `default`) selects the host's default output and `aux`
/// the on-board headphone jack. Any other value is matched against the
/// output device names.
pub const DEFAULT_AUDIO_DEVICE: &str = "speaker";

/// Directory holding the playable media when `MEDIA_PATH` is unset.
pub const DEFAULT_MEDIA_PATH: &str = "media";

// ============================================================================
// Rotary encoder (BCM pin numbering)
// ============================================================================

/// Default CLK line of the KY-040 encoder.
pub const DEFAULT_ENCODER_CLK: u8 = 17;

/// Default DT line of the KY-040 encoder.
pub const DEFAULT_ENCODER_DT: u8 = 18;

/// Default push-button (SW) line of the KY-040 encoder.
pub const DEFAULT_ENCODER_CONFIRM: u8 = 27;

/// Highest BCM line number exposed on the Raspberry Pi header family.
pub const MAX_GPIO_PIN: u8 = 53;

/// Debounce settle window in seconds.
pub const DEFAULT_ENCODER_BOUNCE_SECS: f64 = 0.02;

/// Upper bound accepted for `ENCODER_BOUNCE_TIME`.
///
/// A window longer than this would swallow deliberate presses.
pub const MAX_ENCODER_BOUNCE_SECS: f64 = 1.0;

/// Interval at which encoder lines are sampled, in milliseconds.
pub const ENCODER_SAMPLE_INTERVAL_MS: u64 = 1;

// ============================================================================
// RFID reader
// ============================================================================

/// Consecutive failed reads tolerated before a forced reinitialization.
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Forced reinitialization period in seconds, even for a healthy reader.
pub const DEFAULT_REINIT_INTERVAL_SECS: u64 = 300;

/// Bound of a single `read_with_timeout` call, in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: f64 = 2.0;

/// Retries performed by `read_with_retries` after the first attempt.
pub const DEFAULT_READ_MAX_RETRIES: u32 = 2;

/// Interval between non-blocking reader polls inside one read attempt.
pub const RFID_POLL_INTERVAL_MS: u64 = 100;

/// Consecutive empty polls after which a resting tag counts as lifted.
///
/// A single empty poll is tolerated: MFRC522 readers miss a resident card
/// on every other request now and then.
pub const TAG_REMOVAL_EMPTY_POLLS: u32 = 2;

// ============================================================================
// Orchestrator
// ============================================================================

/// Consecutive orchestration faults that trigger an RFID reinitialization.
pub const ESCALATION_FAULT_THRESHOLD: u32 = 3;

/// Window within which the escalation threshold must be reached, in seconds.
pub const ESCALATION_WINDOW_SECS: u64 = 30;

// ============================================================================
// Hardware readiness
// ============================================================================

/// I2C bus node (OLED display bus on the reference build).
pub const I2C_DEVICE_NODE: &str = "/dev/i2c-1";

/// SPI node the MFRC522 reader is wired to.
pub const SPI_DEVICE_NODE: &str = "/dev/spidev0.0";

/// GPIO memory node used by the encoder lines.
pub const GPIO_DEVICE_NODE: &str = "/dev/gpiomem";

/// Delay between two readiness checks, in seconds.
pub const READINESS_CHECK_INTERVAL_SECS: u64 = 1;

/// Total time the readiness gate waits before reporting missing nodes.
pub const READINESS_MAX_WAIT_SECS: u64 = 30;

// ============================================================================
// Persistence
// ============================================================================

/// Database location when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://rfid_audio.db";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_volume_in_range() {
        assert!((MIN_VOLUME..=MAX_VOLUME).contains(&DEFAULT_VOLUME));
    }

    #[test]
    fn test_default_pins_are_distinct() {
        assert_ne!(DEFAULT_ENCODER_CLK, DEFAULT_ENCODER_DT);
        assert_ne!(DEFAULT_ENCODER_CLK, DEFAULT_ENCODER_CONFIRM);
        assert_ne!(DEFAULT_ENCODER_DT, DEFAULT_ENCODER_CONFIRM);
    }

    #[test]
    fn test_bounce_window_within_limit() {
        assert!(DEFAULT_ENCODER_BOUNCE_SECS > 0.0);
        assert!(DEFAULT_ENCODER_BOUNCE_SECS <= MAX_ENCODER_BOUNCE_SECS);
    }
}
