//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits (RPITIT - Rust Edition 2024) are not
//! object-safe, so we cannot use `Box<dyn RfidDevice>`. The enums in this
//! module provide concrete type dispatch at compile time instead. Real
//! backends are compiled in behind feature flags; the mock variants are
//! always available.
//!
//! # Examples
//!
//! ```
//! use tagplay_hardware::devices::AnyRfidDevice;
//! use tagplay_hardware::mock::MockRfid;
//!
//! let (reader, _handle) = MockRfid::new();
//! let any_reader = AnyRfidDevice::Mock(reader);
//!
//! // Can now be used polymorphically through the RfidDevice trait
//! ```

use crate::gpio::SysfsLine;
use crate::mock::{MockAudio, MockLine, MockRfid};
use crate::traits::{AudioOutput, InputLine, RfidDevice};
use crate::{DeviceInfo, ReaderInfo, Result};
use std::path::Path;

#[cfg(feature = "hardware-gpio")]
use crate::gpio::CdevLine;
#[cfg(feature = "hardware-spi")]
use crate::mfrc522::SpiRfid;
#[cfg(feature = "audio-rodio")]
use crate::rodio_output::RodioOutput;
#[cfg(feature = "hardware-serial")]
use crate::serial::SerialRfid;

/// Enum wrapper for RFID reader device dispatch.
///
/// # Examples
///
/// ```
/// use tagplay_hardware::devices::AnyRfidDevice;
/// use tagplay_hardware::traits::RfidDevice;
/// use tagplay_hardware::mock::MockRfid;
///
/// #[tokio::main]
/// async fn main() -> tagplay_hardware::Result<()> {
///     let (reader, _handle) = MockRfid::new();
///     let any_reader = AnyRfidDevice::Mock(reader);
///
///     let info = any_reader.get_reader_info().await?;
///     println!("Reader: {}", info.name);
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyRfidDevice {
    /// Mock RFID reader for development and testing.
    Mock(MockRfid),

    /// Serial-attached reader.
    #[cfg(feature = "hardware-serial")]
    Serial(SerialRfid),

    /// MFRC522 on a spidev node.
    #[cfg(feature = "hardware-spi")]
    Mfrc522(SpiRfid),
}

impl RfidDevice for AnyRfidDevice {
    async fn open(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.open().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(device) => device.open().await,
            #[cfg(feature = "hardware-spi")]
            Self::Mfrc522(device) => device.open().await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.close().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(device) => device.close().await,
            #[cfg(feature = "hardware-spi")]
            Self::Mfrc522(device) => device.close().await,
        }
    }

    async fn poll_tag(&mut self) -> Result<Option<String>> {
        match self {
            Self::Mock(device) => device.poll_tag().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(device) => device.poll_tag().await,
            #[cfg(feature = "hardware-spi")]
            Self::Mfrc522(device) => device.poll_tag().await,
        }
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        match self {
            Self::Mock(device) => device.get_reader_info().await,
            #[cfg(feature = "hardware-serial")]
            Self::Serial(device) => device.get_reader_info().await,
            #[cfg(feature = "hardware-spi")]
            Self::Mfrc522(device) => device.get_reader_info().await,
        }
    }
}

/// Enum wrapper for audio output dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyAudioOutput {
    /// Mock output for development and testing.
    Mock(MockAudio),

    /// rodio output on the host's audio devices.
    #[cfg(feature = "audio-rodio")]
    Rodio(RodioOutput),
}

impl AudioOutput for AnyAudioOutput {
    async fn open(&mut self, device: &str) -> Result<()> {
        match self {
            Self::Mock(output) => output.open(device).await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.open(device).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Mock(output) => output.close().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.close().await,
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Mock(output) => output.is_open(),
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.is_open(),
        }
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        match self {
            Self::Mock(output) => output.load(path).await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.load(path).await,
        }
    }

    async fn pause(&mut self) -> Result<()> {
        match self {
            Self::Mock(output) => output.pause().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.pause().await,
        }
    }

    async fn resume(&mut self) -> Result<()> {
        match self {
            Self::Mock(output) => output.resume().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.resume().await,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        match self {
            Self::Mock(output) => output.stop().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.stop().await,
        }
    }

    async fn set_volume(&mut self, volume: u8) -> Result<()> {
        match self {
            Self::Mock(output) => output.set_volume(volume).await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.set_volume(volume).await,
        }
    }

    async fn is_finished(&self) -> Result<bool> {
        match self {
            Self::Mock(output) => output.is_finished().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.is_finished().await,
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(output) => output.get_info().await,
            #[cfg(feature = "audio-rodio")]
            Self::Rodio(output) => output.get_info().await,
        }
    }
}

/// Enum wrapper for GPIO input lines.
#[derive(Debug)]
pub enum AnyInputLine {
    /// Simulated line.
    Mock(MockLine),

    /// Character-device line (`/dev/gpiochipN`).
    #[cfg(feature = "hardware-gpio")]
    Cdev(CdevLine),

    /// sysfs-backed line, for kernels without the GPIO character device.
    Sysfs(SysfsLine),
}

impl InputLine for AnyInputLine {
    fn pin(&self) -> u8 {
        match self {
            Self::Mock(line) => line.pin(),
            #[cfg(feature = "hardware-gpio")]
            Self::Cdev(line) => line.pin(),
            Self::Sysfs(line) => line.pin(),
        }
    }

    fn read_level(&mut self) -> Result<bool> {
        match self {
            Self::Mock(line) => line.read_level(),
            #[cfg(feature = "hardware-gpio")]
            Self::Cdev(line) => line.read_level(),
            Self::Sysfs(line) => line.read_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_rfid_device_mock() {
        let (reader, handle) = MockRfid::new();
        let mut any_reader = AnyRfidDevice::Mock(reader);

        let info = any_reader.get_reader_info().await.unwrap();
        assert_eq!(info.name, "Mock RFID Reader");

        handle.place_tag("ABC123").await;
        any_reader.open().await.unwrap();
        assert_eq!(
            any_reader.poll_tag().await.unwrap(),
            Some("ABC123".to_string())
        );
    }

    #[tokio::test]
    async fn test_any_audio_output_mock() {
        let (output, handle) = MockAudio::new();
        let mut any_output = AnyAudioOutput::Mock(output);

        assert!(!any_output.is_open());
        any_output.open("speaker").await.unwrap();
        assert!(any_output.is_open());
        any_output.load(Path::new("fox.mp3")).await.unwrap();
        assert_eq!(handle.load_count().await, 1);
    }

    #[test]
    fn test_any_input_line_mock() {
        let (line, handle) = MockLine::new(17);
        let mut any_line = AnyInputLine::Mock(line);

        handle.press();
        assert_eq!(any_line.pin(), 17);
        assert!(!any_line.read_level().unwrap());
    }
}
