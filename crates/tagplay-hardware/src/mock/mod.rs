//! Mock device implementations for testing and development.
//!
//! This module provides simulated device implementations that can be controlled
//! programmatically without requiring physical hardware. The daemon also falls
//! back to them when it is built without hardware features.

pub mod audio;
pub mod gpio;
pub mod rfid;

// Re-export commonly used types
pub use audio::{AudioCommand, MockAudio, MockAudioHandle};
pub use gpio::{MockLine, MockLineHandle};
pub use rfid::{MockRead, MockRfid, MockRfidHandle};
