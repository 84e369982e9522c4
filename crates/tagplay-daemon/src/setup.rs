//! Construction of devices and storage from the validated configuration.
//!
//! Missing hardware never stops the daemon: a backend that cannot be built
//! is replaced by its mock with a warning, or (for the encoder) left out.

use crate::cli::HardwareArgs;
use tagplay_core::EncoderPins;
use tagplay_hardware::encoder::EncoderInput;
use tagplay_hardware::gpio::SysfsLine;
use tagplay_hardware::mock::{MockAudio, MockLine, MockRfid, MockRfidHandle};
use tagplay_hardware::{AnyAudioOutput, AnyInputLine, AnyRfidDevice};
use tagplay_storage::{
    Database, DatabaseConfig, MediaLibrary, MediaMapping, MediaMappingRepository, StorageResult,
};
use tracing::{info, warn};

/// The RFID reader, plus a control handle when it is simulated.
///
/// A configured serial port wins; otherwise the MFRC522 on the spidev node
/// is used.
pub fn rfid_device(hw: &HardwareArgs) -> (AnyRfidDevice, Option<MockRfidHandle>) {
    if !hw.simulate {
        let reader = match hw.rfid_port.as_deref() {
            Some(port) => serial_reader(port, hw.rfid_baud),
            None => spi_reader(&hw.rfid_spi),
        };
        if let Some(reader) = reader {
            return (reader, None);
        }
        warn!("No RFID reader available, using a simulated reader");
    }

    let (reader, handle) = MockRfid::new();
    (AnyRfidDevice::Mock(reader), Some(handle))
}

#[cfg(feature = "hardware-serial")]
fn serial_reader(port: &str, baud: u32) -> Option<AnyRfidDevice> {
    info!("Using serial RFID reader on {} at {} baud", port, baud);
    Some(AnyRfidDevice::Serial(tagplay_hardware::serial::SerialRfid::new(port, baud)))
}

#[cfg(not(feature = "hardware-serial"))]
fn serial_reader(port: &str, _baud: u32) -> Option<AnyRfidDevice> {
    warn!(
        "RFID reader on {} configured but serial support is not compiled in",
        port
    );
    None
}

#[cfg(feature = "hardware-spi")]
fn spi_reader(path: &str) -> Option<AnyRfidDevice> {
    info!("Using MFRC522 RFID reader on {}", path);
    Some(AnyRfidDevice::Mfrc522(tagplay_hardware::mfrc522::SpiRfid::new(path)))
}

#[cfg(not(feature = "hardware-spi"))]
fn spi_reader(path: &str) -> Option<AnyRfidDevice> {
    warn!(
        "MFRC522 reader on {} expected but SPI support is not compiled in",
        path
    );
    None
}

/// The audio output backend.
pub fn audio_output(hw: &HardwareArgs) -> AnyAudioOutput {
    if !hw.simulate {
        if let Some(output) = hardware_audio() {
            return output;
        }
        warn!("No audio backend available, using a simulated output");
    }

    let (output, _handle) = MockAudio::new();
    AnyAudioOutput::Mock(output)
}

#[cfg(feature = "audio-rodio")]
fn hardware_audio() -> Option<AnyAudioOutput> {
    info!("Using rodio audio output");
    Some(AnyAudioOutput::Rodio(tagplay_hardware::rodio_output::RodioOutput::new()))
}

#[cfg(not(feature = "audio-rodio"))]
fn hardware_audio() -> Option<AnyAudioOutput> {
    warn!("Audio support is not compiled in");
    None
}

/// The encoder lines, or `None` if they cannot be claimed.
pub fn encoder_input(pins: &EncoderPins, simulate: bool) -> Option<EncoderInput<AnyInputLine>> {
    let lines = if simulate {
        [pins.clk, pins.dt, pins.confirm].map(|pin| Ok(AnyInputLine::Mock(MockLine::new(pin).0)))
    } else {
        [pins.clk, pins.dt, pins.confirm].map(hardware_line)
    };

    let [clk, dt, confirm] = lines;
    let result = clk.and_then(|clk| {
        let dt = dt?;
        let confirm = confirm?;
        EncoderInput::new(clk, dt, confirm, pins.bounce_time)
    });

    match result {
        Ok(input) => Some(input),
        Err(e) => {
            warn!("Encoder unavailable, volume and pause controls disabled: {}", e);
            None
        }
    }
}

/// A GPIO input line: the character device when available, sysfs otherwise.
#[cfg(feature = "hardware-gpio")]
fn hardware_line(pin: u8) -> tagplay_hardware::Result<AnyInputLine> {
    match tagplay_hardware::gpio::CdevLine::open(pin) {
        Ok(line) => Ok(AnyInputLine::Cdev(line)),
        Err(e) => {
            warn!("Falling back to sysfs for GPIO {}: {}", pin, e);
            SysfsLine::open(pin).map(AnyInputLine::Sysfs)
        }
    }
}

#[cfg(not(feature = "hardware-gpio"))]
fn hardware_line(pin: u8) -> tagplay_hardware::Result<AnyInputLine> {
    SysfsLine::open(pin).map(AnyInputLine::Sysfs)
}

/// Open (and migrate) the mapping database named by `DATABASE_URL`.
pub async fn open_database(database_url: &str) -> StorageResult<Database> {
    Database::new(DatabaseConfig::from_url(database_url)?).await
}

/// Mappings whose media file is missing from the library.
pub async fn dangling_mappings<R: MediaMappingRepository>(
    repository: &R,
    library: &MediaLibrary,
) -> StorageResult<Vec<MediaMapping>> {
    let mut dangling = Vec::new();
    for mapping in repository.list_all().await? {
        if !library.contains(&mapping.media_reference).await {
            dangling.push(mapping);
        }
    }
    Ok(dangling)
}
