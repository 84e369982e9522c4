//! Serial-attached RFID readers (RDM6300 and similar).
//!
//! These readers stream one ASCII frame per detection while a tag is in the
//! field: an optional STX (`0x02`), the tag id, then a terminator (`\r`,
//! `\n` or ETX `0x03`).

use crate::{HardwareError, Result, traits::RfidDevice, types::ReaderInfo};
use serialport::SerialPort;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, warn};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Bytes kept while waiting for a terminator before the buffer is discarded.
const MAX_PENDING_BYTES: usize = 256;

/// Line-oriented RFID reader on a serial port.
pub struct SerialRfid {
    port_name: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialRfid {
    /// Reader on `port_name` at `baud_rate`. Nothing is opened yet.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            port: None,
            pending: Vec::new(),
        }
    }
}

impl std::fmt::Debug for SerialRfid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialRfid")
            .field("port_name", &self.port_name)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl RfidDevice for SerialRfid {
    async fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| {
                HardwareError::initialization_failed(format!("{}: {e}", self.port_name))
            })?;

        debug!("Opened serial reader on {}", self.port_name);
        self.pending.clear();
        self.port = Some(port);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            debug!("Closed serial reader on {}", self.port_name);
        }
        self.pending.clear();
        Ok(())
    }

    async fn poll_tag(&mut self) -> Result<Option<String>> {
        let Some(port) = self.port.as_mut() else {
            return Err(HardwareError::not_open(self.port_name.clone()));
        };

        let available = port
            .bytes_to_read()
            .map_err(|e| HardwareError::communication(e.to_string()))?;

        if available > 0 {
            let mut chunk = vec![0u8; available as usize];
            let read = port.read(&mut chunk)?;
            self.pending.extend_from_slice(&chunk[..read]);
        }

        let frame = take_frame(&mut self.pending);
        if frame.is_none() && self.pending.len() > MAX_PENDING_BYTES {
            warn!(
                "Discarding {} bytes without frame terminator from {}",
                self.pending.len(),
                self.port_name
            );
            self.pending.clear();
        }

        Ok(frame)
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        Ok(
            ReaderInfo::new(format!("Serial reader on {}", self.port_name), vec![
                "EM4100".to_string(),
            ])
            .with_baud_rate(self.baud_rate),
        )
    }
}

/// Remove and return the first complete, non-empty frame from `buffer`.
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    while let Some(end) = buffer
        .iter()
        .position(|&b| b == b'\n' || b == b'\r' || b == ETX)
    {
        let raw: Vec<u8> = buffer.drain(..=end).collect();
        let body: Vec<u8> = raw[..raw.len() - 1]
            .iter()
            .copied()
            .filter(|&b| b != STX)
            .collect();

        let tag = String::from_utf8_lossy(&body).trim().to_string();
        if !tag.is_empty() {
            return Some(tag);
        }
    }
    None
}
