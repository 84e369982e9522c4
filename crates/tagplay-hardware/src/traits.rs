//! Hardware device trait definitions.
//!
//! These traits are the contract between the daemon's components and the
//! physical peripherals: the RFID reader, the audio output and the encoder's
//! GPIO lines. Mock and real implementations are interchangeable behind them.
//!
//! The RFID and audio traits use native `async fn` methods (Rust 1.90 +
//! Edition 2024 RPITIT), eliminating the need for the `async_trait` macro.
//! GPIO line reads are plain synchronous calls; they are sampled at a fixed
//! rate by the encoder task and never block.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::types::{DeviceInfo, ReaderInfo};
use std::path::Path;

/// RFID reader device abstraction.
///
/// Handles have an explicit lifecycle: [`open`](RfidDevice::open) before
/// polling, [`close`](RfidDevice::close) to release the underlying bus.
/// Closing and reopening is how a wedged reader is reinitialized.
///
/// # Object Safety and Dynamic Dispatch
///
/// **NOTE**: This trait is NOT object-safe because `async fn` methods return
/// `impl Future`. For dynamic dispatch, use
/// [`AnyRfidDevice`](crate::devices::AnyRfidDevice).
///
/// # Examples
///
/// ```no_run
/// use tagplay_hardware::traits::RfidDevice;
/// use tagplay_hardware::error::Result;
///
/// async fn first_tag<R: RfidDevice>(reader: &mut R) -> Result<String> {
///     reader.open().await?;
///     loop {
///         if let Some(tag) = reader.poll_tag().await? {
///             reader.close().await?;
///             return Ok(tag);
///         }
///         tokio::time::sleep(std::time::Duration::from_millis(100)).await;
///     }
/// }
/// ```
pub trait RfidDevice: Send {
    /// Acquire the reader (open the bus, reset the chip).
    ///
    /// # Errors
    ///
    /// Returns an error if the device node is missing or the reader does not
    /// answer.
    async fn open(&mut self) -> Result<()>;

    /// Release the reader.
    ///
    /// Closing an already closed reader is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Check the field once without blocking.
    ///
    /// Returns `Ok(Some(tag_id))` while a tag is in the field and `Ok(None)`
    /// otherwise. A tag resting on the reader is reported on every poll.
    ///
    /// # Errors
    ///
    /// Returns an error on communication failure or if the handle is closed.
    async fn poll_tag(&mut self) -> Result<Option<String>>;

    /// Get reader information.
    async fn get_reader_info(&self) -> Result<ReaderInfo>;
}

/// Audio output device abstraction.
///
/// One stream at a time: [`load`](AudioOutput::load) replaces whatever was
/// loaded before and starts it.
///
/// # Object Safety and Dynamic Dispatch
///
/// Not object-safe, see [`AnyAudioOutput`](crate::devices::AnyAudioOutput).
pub trait AudioOutput: Send {
    /// Open the named output device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device does not exist or is busy.
    async fn open(&mut self, device: &str) -> Result<()>;

    /// Release the output device. Idempotent.
    async fn close(&mut self) -> Result<()>;

    /// Whether a handle is currently held.
    fn is_open(&self) -> bool;

    /// Decode `path` and start playing it.
    async fn load(&mut self, path: &Path) -> Result<()>;

    /// Pause the current stream.
    async fn pause(&mut self) -> Result<()>;

    /// Resume the current stream.
    async fn resume(&mut self) -> Result<()>;

    /// Stop and discard the current stream.
    async fn stop(&mut self) -> Result<()>;

    /// Set the output volume in percent (0-100).
    async fn set_volume(&mut self, volume: u8) -> Result<()>;

    /// Whether the loaded stream has played to its end.
    async fn is_finished(&self) -> Result<bool>;

    /// Get device information.
    async fn get_info(&self) -> Result<DeviceInfo>;
}

/// A single digital input line (one GPIO pin).
pub trait InputLine: Send {
    /// BCM pin number of the line.
    fn pin(&self) -> u8;

    /// Sample the current level (`true` = high).
    ///
    /// # Errors
    ///
    /// Returns an error if the line can no longer be read.
    fn read_level(&mut self) -> Result<bool>;
}
