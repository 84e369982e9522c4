//! Error types for hardware operations.
//!
//! [`HardwareError`] is what device backends return. The components built on
//! top of the devices translate it into their own, narrower taxonomies:
//! [`ReadError`] for the RFID session, [`DeviceError`] and [`PlaybackError`]
//! for the playback controller.

use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware device operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been disconnected.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Invalid data received from device.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Operation requires an open handle.
    #[error("Device not open: {device}")]
    NotOpen { device: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a new invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new not-open error.
    pub fn not_open(device: impl Into<String>) -> Self {
        Self::NotOpen {
            device: device.into(),
        }
    }
}

/// Outcome of a failed bounded RFID read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// No tag was seen within the read window.
    #[error("No tag read within {after:?}")]
    Timeout { after: Duration },

    /// The reader reported a fault or could not be opened.
    #[error("RFID device fault: {0}")]
    DeviceFault(String),
}

impl ReadError {
    /// Whether this is the plain "no tag in the field" outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Audio output device failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The output device could not be opened.
    #[error("Failed to open audio device {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    /// A command sent to an open device failed.
    #[error("Audio device write failed: {reason}")]
    WriteFailed { reason: String },
}

/// Errors reported by the playback controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// Output device failure.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The media reference does not point at a file under the media root.
    #[error("Media file not found: {}", path.display())]
    MediaNotFound { path: PathBuf },

    /// The media reference is malformed (absolute, or escapes the media root).
    #[error("Invalid media reference: {0}")]
    InvalidReference(String),
}
