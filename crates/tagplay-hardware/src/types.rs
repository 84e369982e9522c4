//! Common types shared across hardware device implementations.

use serde::{Deserialize, Serialize};

/// Generic device information.
///
/// Reported by audio outputs so the daemon can log what it opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name (e.g., "Mock Audio", "rodio").
    pub name: String,

    /// Device the backend has open, or "closed".
    pub model: String,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// RFID reader information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    /// Reader name (e.g., "MFRC522", "RDM6300 on /dev/ttyS0").
    pub name: String,

    /// Supported protocols (e.g., ["ISO14443A"]).
    pub protocols: Vec<String>,

    /// Link speed in bits per second, for serial-attached readers.
    pub baud_rate: Option<u32>,
}

impl ReaderInfo {
    /// Create a new ReaderInfo.
    pub fn new(name: impl Into<String>, protocols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            protocols,
            baud_rate: None,
        }
    }

    /// Set the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_new() {
        let info = DeviceInfo::new("rodio", "hw:CARD=Headphones");

        assert_eq!(info.name, "rodio");
        assert_eq!(info.model, "hw:CARD=Headphones");
    }

    #[test]
    fn test_reader_info() {
        let info = ReaderInfo::new("RDM6300", vec!["EM4100".to_string()]).with_baud_rate(9600);

        assert_eq!(info.name, "RDM6300");
        assert_eq!(info.protocols, vec!["EM4100"]);
        assert_eq!(info.baud_rate, Some(9600));
    }

    #[test]
    fn test_reader_info_serialization() {
        let info = ReaderInfo::new("MFRC522", vec!["ISO14443A".to_string()]);
        let json = serde_json::to_string(&info).unwrap();
        let deserialized: ReaderInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(info, deserialized);
    }
}
