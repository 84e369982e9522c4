//! Validated daemon configuration.
//!
//! The binary parses raw values from the environment (or flags) and hands
//! them to the constructors here. Anything malformed is an
//! [`Error::Config`] or [`Error::InvalidPin`], which the daemon treats as an
//! unrecoverable startup error.
//!
//! # Examples
//!
//! ```
//! use tagplay_core::config::{DaemonConfig, EncoderPins};
//!
//! let pins = EncoderPins::new(17, 18, 27, 0.02).unwrap();
//! let config = DaemonConfig::default().with_encoder(pins);
//! assert_eq!(config.encoder.clk, 17);
//!
//! assert!(EncoderPins::new(17, 17, 27, 0.02).is_err());
//! ```

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Encoder pin assignment (BCM numbering) and debounce window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderPins {
    /// Quadrature CLK line.
    pub clk: u8,

    /// Quadrature DT line.
    pub dt: u8,

    /// Push-button line.
    pub confirm: u8,

    /// Debounce settle window (`ENCODER_BOUNCE_TIME`).
    pub bounce_time: Duration,
}

impl EncoderPins {
    /// Validate a pin assignment.
    ///
    /// # Errors
    /// - `Error::InvalidPin` if a pin exceeds [`MAX_GPIO_PIN`] or two lines share a pin
    /// - `Error::Config` if the bounce time is not in `(0, MAX_ENCODER_BOUNCE_SECS]`
    pub fn new(clk: u8, dt: u8, confirm: u8, bounce_secs: f64) -> Result<Self> {
        for (name, pin) in [("ENCODER_CLK", clk), ("ENCODER_DT", dt), ("ENCODER_CONFIRM", confirm)] {
            if pin > MAX_GPIO_PIN {
                return Err(Error::InvalidPin {
                    name: name.to_string(),
                    reason: format!("pin {pin} is above {MAX_GPIO_PIN}"),
                });
            }
        }

        if clk == dt || clk == confirm {
            return Err(Error::InvalidPin {
                name: "ENCODER_CLK".to_string(),
                reason: format!("pin {clk} is assigned to more than one line"),
            });
        }
        if dt == confirm {
            return Err(Error::InvalidPin {
                name: "ENCODER_DT".to_string(),
                reason: format!("pin {dt} is assigned to more than one line"),
            });
        }

        if !bounce_secs.is_finite() || bounce_secs <= 0.0 || bounce_secs > MAX_ENCODER_BOUNCE_SECS {
            return Err(Error::Config(format!(
                "ENCODER_BOUNCE_TIME must be in (0, {MAX_ENCODER_BOUNCE_SECS}] seconds, got {bounce_secs}"
            )));
        }

        Ok(Self {
            clk,
            dt,
            confirm,
            bounce_time: Duration::from_secs_f64(bounce_secs),
        })
    }
}

impl Default for EncoderPins {
    fn default() -> Self {
        Self {
            clk: DEFAULT_ENCODER_CLK,
            dt: DEFAULT_ENCODER_DT,
            confirm: DEFAULT_ENCODER_CONFIRM,
            bounce_time: Duration::from_secs_f64(DEFAULT_ENCODER_BOUNCE_SECS),
        }
    }
}

/// RFID read and recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderSettings {
    /// Failed reads tolerated before a forced reinit (`MAX_CONSECUTIVE_ERRORS`).
    pub max_consecutive_errors: u32,

    /// Forced reinit period (`REINIT_INTERVAL`).
    pub reinit_interval: Duration,

    /// Bound of one read attempt (`READ_TIMEOUT`).
    pub read_timeout: Duration,

    /// Retries after the first attempt (`READ_WITH_TIMEOUT_MAX_RETRIES`).
    pub max_retries: u32,

    /// Delay between non-blocking polls inside one attempt.
    pub poll_interval: Duration,
}

impl ReaderSettings {
    /// Validate reader settings.
    ///
    /// # Errors
    /// Returns `Error::Config` if `max_consecutive_errors` is zero or a duration
    /// is zero, negative, not finite or too large to represent.
    pub fn new(
        max_consecutive_errors: u32,
        reinit_interval_secs: u64,
        read_timeout_secs: f64,
        max_retries: u32,
    ) -> Result<Self> {
        if max_consecutive_errors == 0 {
            return Err(Error::Config(
                "MAX_CONSECUTIVE_ERRORS must be at least 1".to_string(),
            ));
        }
        if reinit_interval_secs == 0 {
            return Err(Error::Config(
                "REINIT_INTERVAL must be at least 1 second".to_string(),
            ));
        }
        if !read_timeout_secs.is_finite() || read_timeout_secs <= 0.0 {
            return Err(Error::Config(format!(
                "READ_TIMEOUT must be a positive number of seconds, got {read_timeout_secs}"
            )));
        }

        let read_timeout = Duration::try_from_secs_f64(read_timeout_secs).map_err(|e| {
            Error::Config(format!("READ_TIMEOUT of {read_timeout_secs} seconds: {e}"))
        })?;

        Ok(Self {
            max_consecutive_errors,
            reinit_interval: Duration::from_secs(reinit_interval_secs),
            read_timeout,
            max_retries,
            poll_interval: Duration::from_millis(RFID_POLL_INTERVAL_MS),
        })
    }

    /// Override the poll interval (tests use short intervals).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            reinit_interval: Duration::from_secs(DEFAULT_REINIT_INTERVAL_SECS),
            read_timeout: Duration::from_secs_f64(DEFAULT_READ_TIMEOUT_SECS),
            max_retries: DEFAULT_READ_MAX_RETRIES,
            poll_interval: Duration::from_millis(RFID_POLL_INTERVAL_MS),
        }
    }
}

/// Audio output selection and start volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Output device name (`DEFAULT_AUDIO_DEVICE`).
    pub device: String,

    /// Volume applied at start (`DEFAULT_VOLUME`).
    pub default_volume: u8,
}

impl AudioSettings {
    /// Validate audio settings.
    ///
    /// # Errors
    /// Returns `Error::Config` if the device name is blank or the volume is above 100.
    pub fn new(device: impl Into<String>, default_volume: u32) -> Result<Self> {
        let device = device.into();
        if device.trim().is_empty() {
            return Err(Error::Config(
                "DEFAULT_AUDIO_DEVICE must not be empty".to_string(),
            ));
        }
        if default_volume > u32::from(MAX_VOLUME) {
            return Err(Error::Config(format!(
                "DEFAULT_VOLUME must be within 0-{MAX_VOLUME}, got {default_volume}"
            )));
        }

        Ok(Self {
            device: device.trim().to_string(),
            default_volume: default_volume as u8,
        })
    }
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_AUDIO_DEVICE.to_string(),
            default_volume: DEFAULT_VOLUME,
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Root directory media references are resolved against (`MEDIA_PATH`).
    pub media_path: PathBuf,

    /// Mapping store location (`DATABASE_URL`).
    pub database_url: String,

    /// Audio output settings.
    pub audio: AudioSettings,

    /// Encoder wiring.
    pub encoder: EncoderPins,

    /// RFID read policy.
    pub reader: ReaderSettings,
}

impl DaemonConfig {
    /// Set the media directory.
    pub fn with_media_path(mut self, media_path: impl Into<PathBuf>) -> Self {
        self.media_path = media_path.into();
        self
    }

    /// Set the database location.
    pub fn with_database_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = database_url.into();
        self
    }

    /// Set the audio settings.
    pub fn with_audio(mut self, audio: AudioSettings) -> Self {
        self.audio = audio;
        self
    }

    /// Set the encoder wiring.
    pub fn with_encoder(mut self, encoder: EncoderPins) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the reader policy.
    pub fn with_reader(mut self, reader: ReaderSettings) -> Self {
        self.reader = reader;
        self
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            media_path: PathBuf::from(DEFAULT_MEDIA_PATH),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            audio: AudioSettings::default(),
            encoder: EncoderPins::default(),
            reader: ReaderSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_encoder_pins_valid() {
        let pins = EncoderPins::new(5, 6, 13, 0.05).unwrap();
        assert_eq!(pins.clk, 5);
        assert_eq!(pins.dt, 6);
        assert_eq!(pins.confirm, 13);
        assert_eq!(pins.bounce_time, Duration::from_millis(50));
    }

    #[rstest]
    #[case(17, 17, 27)]
    #[case(17, 18, 17)]
    #[case(17, 18, 18)]
    #[case(54, 18, 27)]
    #[case(17, 200, 27)]
    fn test_encoder_pins_invalid(#[case] clk: u8, #[case] dt: u8, #[case] confirm: u8) {
        let result = EncoderPins::new(clk, dt, confirm, 0.02);
        assert!(matches!(result, Err(Error::InvalidPin { .. })));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.5)]
    #[case(1.5)]
    #[case(f64::NAN)]
    fn test_encoder_bounce_invalid(#[case] bounce: f64) {
        let result = EncoderPins::new(17, 18, 27, bounce);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_reader_settings_valid() {
        let settings = ReaderSettings::new(3, 60, 1.5, 2).unwrap();
        assert_eq!(settings.max_consecutive_errors, 3);
        assert_eq!(settings.reinit_interval, Duration::from_secs(60));
        assert_eq!(settings.read_timeout, Duration::from_millis(1500));
        assert_eq!(settings.max_retries, 2);
    }

    #[rstest]
    #[case(0, 60, 1.0)]
    #[case(3, 0, 1.0)]
    #[case(3, 60, 0.0)]
    #[case(3, 60, f64::INFINITY)]
    #[case(3, 60, 1e20)]
    fn test_reader_settings_invalid(
        #[case] max_errors: u32,
        #[case] reinit: u64,
        #[case] timeout: f64,
    ) {
        assert!(ReaderSettings::new(max_errors, reinit, timeout, 1).is_err());
    }

    #[test]
    fn test_audio_settings() {
        let audio = AudioSettings::new(" aux ", 40).unwrap();
        assert_eq!(audio.device, "aux");
        assert_eq!(audio.default_volume, 40);

        assert!(AudioSettings::new("speaker", 101).is_err());
        assert!(AudioSettings::new("  ", 10).is_err());
    }

    #[test]
    fn test_daemon_config_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.media_path, PathBuf::from(DEFAULT_MEDIA_PATH));
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.audio.default_volume, DEFAULT_VOLUME);
        assert_eq!(config.reader.max_consecutive_errors, DEFAULT_MAX_CONSECUTIVE_ERRORS);
    }

    #[test]
    fn test_daemon_config_builder() {
        let config = DaemonConfig::default()
            .with_media_path("/mnt/usb/audio")
            .with_database_url("sqlite:///var/lib/tagplay/tags.db");

        assert_eq!(config.media_path, PathBuf::from("/mnt/usb/audio"));
        assert_eq!(config.database_url, "sqlite:///var/lib/tagplay/tags.db");
    }
}
