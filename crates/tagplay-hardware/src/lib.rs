//! Hardware layer for the tagplay RFID audio player.
//!
//! This crate owns everything that touches a peripheral: the RFID reader,
//! the rotary encoder's GPIO lines and the audio output. Each peripheral is
//! hidden behind a trait so mock implementations (for development and
//! testing) and real drivers are interchangeable.
//!
//! # Design Philosophy
//!
//! - **Async-first**: device I/O uses native `async fn` in traits (Rust 1.90 +
//!   Edition 2024 RPITIT); enum wrappers in [`devices`] provide dispatch.
//! - **Single owner**: every handle is owned by exactly one component with an
//!   explicit open/close lifecycle.
//! - **Never fatal**: hardware failures are retried at the component
//!   boundary and reported upward as values.
//!
//! # Components
//!
//! - [`readiness`]: waits for the device nodes to appear at boot.
//! - [`rfid_session`]: bounded reads with automatic reinitialization.
//! - [`encoder`]: debouncing quadrature and push-button decoder.
//! - [`playback`]: the audio state machine.
//! - [`sources`]: per-input tasks feeding the event consumer.
//!
//! ## RFID Readers
//!
//! ```no_run
//! use tagplay_core::ReaderSettings;
//! use tagplay_hardware::mock::MockRfid;
//! use tagplay_hardware::rfid_session::RfidSession;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let (reader, _handle) = MockRfid::new();
//! let mut session = RfidSession::new(reader, ReaderSettings::default());
//!
//! match session.read_with_retries(Duration::from_secs(2), 2).await {
//!     Ok(read) => println!("Tag: {}", read.tag_id),
//!     Err(e) => eprintln!("No tag: {}", e),
//! }
//! # }
//! ```
//!
//! ## Playback
//!
//! ```no_run
//! use tagplay_core::AudioSettings;
//! use tagplay_hardware::mock::MockAudio;
//! use tagplay_hardware::playback::PlaybackController;
//!
//! # async fn example() -> Result<(), tagplay_hardware::PlaybackError> {
//! let (output, _handle) = MockAudio::new();
//! let mut playback = PlaybackController::new(output, "media", &AudioSettings::default());
//!
//! playback.load_and_play("stories/fox.mp3").await?;
//! playback.adjust_volume(5).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Device backends return [`HardwareError`]. Components translate it into
//! narrower types: [`ReadError`] for RFID reads and [`PlaybackError`] (with
//! [`DeviceError`]) for playback.
//!
//! # Feature Flags
//!
//! - `hardware-serial`: serial-attached RFID readers via `serialport`.
//! - `hardware-spi`: MFRC522 readers on spidev via `spidev`.
//! - `hardware-gpio`: encoder lines on the GPIO character device via `gpiocdev`.
//! - `audio-rodio`: audio output via rodio.

pub mod devices;
pub mod encoder;
pub mod error;
pub mod gpio;
pub mod mfrc522;
pub mod mock;
pub mod playback;
pub mod readiness;
pub mod rfid_session;
#[cfg(feature = "audio-rodio")]
pub mod rodio_output;
#[cfg(feature = "hardware-serial")]
pub mod serial;
pub mod sources;
pub mod traits;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DeviceError, HardwareError, PlaybackError, ReadError, Result};
pub use traits::{AudioOutput, InputLine, RfidDevice};
pub use types::{DeviceInfo, ReaderInfo};

pub use devices::{AnyAudioOutput, AnyInputLine, AnyRfidDevice};
pub use encoder::{EncoderAction, EncoderDecoder, EncoderInput, Line};
pub use playback::PlaybackController;
pub use readiness::{DeviceNode, NodeKind, NotReady, Ready, await_ready};
pub use rfid_session::{ReaderHealth, RfidSession};
pub use sources::{
    EventBatch, RfidCommand, SourceConfig, SourceError, SourceEvent, SourceHandle, SourceInjector,
    SourceKind, SourceManager,
};
