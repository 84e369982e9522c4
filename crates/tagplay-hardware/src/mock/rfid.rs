//! Mock RFID reader implementation for testing and development.
//!
//! This module provides a simulated RFID reader that can be controlled
//! programmatically for testing without requiring physical hardware.

use crate::{
    HardwareError, Result,
    traits::RfidDevice,
    types::ReaderInfo,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// One scripted outcome of a `poll_tag` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// The poll sees this tag.
    Tag(String),

    /// The poll sees an empty field.
    Empty,

    /// The poll fails with a communication error.
    Fault(String),

    /// The poll never returns, like a wedged SPI transfer.
    Hang,
}

#[derive(Debug, Default)]
struct ReaderState {
    script: VecDeque<MockRead>,
    resident: Option<String>,
    fail_open: bool,
}

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
    polls: AtomicUsize,
}

/// Mock RFID reader for testing and development.
///
/// Each poll first consumes the next scripted [`MockRead`]; once the script
/// is exhausted it reports the resident tag (the tag "lying on the reader"),
/// if any.
///
/// # Examples
///
/// ```
/// use tagplay_hardware::mock::MockRfid;
/// use tagplay_hardware::traits::RfidDevice;
///
/// #[tokio::main]
/// async fn main() -> tagplay_hardware::Result<()> {
///     let (mut reader, handle) = MockRfid::new();
///
///     handle.place_tag("ABC123").await;
///
///     reader.open().await?;
///     assert_eq!(reader.poll_tag().await?, Some("ABC123".to_string()));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockRfid {
    /// Device name
    name: String,

    /// Whether `open()` succeeded and `close()` has not been called since
    open: bool,

    state: Arc<Mutex<ReaderState>>,
    counters: Arc<Counters>,
}

impl MockRfid {
    /// Create a new mock RFID reader with the default name.
    ///
    /// Returns a tuple of (MockRfid, MockRfidHandle) where the handle
    /// can be used to simulate tag presentations and faults.
    pub fn new() -> (Self, MockRfidHandle) {
        Self::with_name("Mock RFID Reader".to_string())
    }

    /// Create a new mock RFID reader with a custom name.
    pub fn with_name(name: String) -> (Self, MockRfidHandle) {
        let state = Arc::new(Mutex::new(ReaderState::default()));
        let counters = Arc::new(Counters::default());

        let reader = Self {
            name: name.clone(),
            open: false,
            state: Arc::clone(&state),
            counters: Arc::clone(&counters),
        };

        let handle = MockRfidHandle {
            name,
            state,
            counters,
        };

        (reader, handle)
    }

    /// Whether the reader is currently open.
    pub fn is_open(&self) -> bool {
        self.open
    }
}

impl Default for MockRfid {
    fn default() -> Self {
        Self::new().0
    }
}

impl RfidDevice for MockRfid {
    async fn open(&mut self) -> Result<()> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);

        if self.state.lock().await.fail_open {
            self.open = false;
            return Err(HardwareError::initialization_failed(format!(
                "{} did not answer",
                self.name
            )));
        }

        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.open = false;
        Ok(())
    }

    async fn poll_tag(&mut self) -> Result<Option<String>> {
        if !self.open {
            return Err(HardwareError::not_open(self.name.clone()));
        }
        self.counters.polls.fetch_add(1, Ordering::SeqCst);

        let next = {
            let mut state = self.state.lock().await;
            match state.script.pop_front() {
                Some(read) => read,
                None => {
                    return Ok(state.resident.clone());
                }
            }
        };

        match next {
            MockRead::Tag(tag) => Ok(Some(tag)),
            MockRead::Empty => Ok(None),
            MockRead::Fault(message) => Err(HardwareError::communication(message)),
            MockRead::Hang => std::future::pending().await,
        }
    }

    async fn get_reader_info(&self) -> Result<ReaderInfo> {
        Ok(ReaderInfo::new(
            self.name.clone(),
            vec!["ISO14443A".to_string()],
        ))
    }
}

/// Handle for controlling a mock RFID reader.
///
/// Clones share the reader's state, so a handle can be moved into a test
/// task while another clone inspects the counters.
#[derive(Debug, Clone)]
pub struct MockRfidHandle {
    /// Device name
    name: String,

    state: Arc<Mutex<ReaderState>>,
    counters: Arc<Counters>,
}

impl MockRfidHandle {
    /// Put a tag on the reader; it is reported until removed.
    pub async fn place_tag(&self, tag_id: impl Into<String>) {
        self.state.lock().await.resident = Some(tag_id.into());
    }

    /// Lift the resident tag off the reader.
    pub async fn remove_tag(&self) {
        self.state.lock().await.resident = None;
    }

    /// Queue scripted poll outcomes, consumed before the resident tag.
    pub async fn push_reads(&self, reads: impl IntoIterator<Item = MockRead>) {
        self.state.lock().await.script.extend(reads);
    }

    /// Make subsequent `open()` calls fail (or succeed again).
    pub async fn set_fail_open(&self, fail: bool) {
        self.state.lock().await.fail_open = fail;
    }

    /// Number of scripted reads not yet consumed.
    pub async fn pending_reads(&self) -> usize {
        self.state.lock().await.script.len()
    }

    /// Number of `open()` attempts so far.
    pub fn open_count(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    /// Number of closes of an open handle so far.
    pub fn close_count(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Number of polls that reached the device.
    pub fn poll_count(&self) -> usize {
        self.counters.polls.load(Ordering::SeqCst)
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_rfid_resident_tag() {
        let (mut reader, handle) = MockRfid::new();
        reader.open().await.unwrap();

        assert_eq!(reader.poll_tag().await.unwrap(), None);

        handle.place_tag("584190326114").await;
        assert_eq!(
            reader.poll_tag().await.unwrap(),
            Some("584190326114".to_string())
        );
        assert_eq!(
            reader.poll_tag().await.unwrap(),
            Some("584190326114".to_string())
        );

        handle.remove_tag().await;
        assert_eq!(reader.poll_tag().await.unwrap(), None);
        assert_eq!(handle.poll_count(), 4);
    }

    #[tokio::test]
    async fn test_mock_rfid_script_before_resident() {
        let (mut reader, handle) = MockRfid::new();
        reader.open().await.unwrap();

        handle.place_tag("RESIDENT").await;
        handle
            .push_reads([
                MockRead::Empty,
                MockRead::Fault("CRC error".to_string()),
                MockRead::Tag("ABC123".to_string()),
            ])
            .await;
        assert_eq!(handle.pending_reads().await, 3);

        assert_eq!(reader.poll_tag().await.unwrap(), None);
        assert!(matches!(
            reader.poll_tag().await,
            Err(HardwareError::CommunicationError { .. })
        ));
        assert_eq!(reader.poll_tag().await.unwrap(), Some("ABC123".to_string()));
        assert_eq!(reader.poll_tag().await.unwrap(), Some("RESIDENT".to_string()));
    }

    #[tokio::test]
    async fn test_mock_rfid_poll_requires_open() {
        let (mut reader, handle) = MockRfid::new();

        assert!(matches!(
            reader.poll_tag().await,
            Err(HardwareError::NotOpen { .. })
        ));
        assert_eq!(handle.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_rfid_open_failure() {
        let (mut reader, handle) = MockRfid::new();
        handle.set_fail_open(true).await;

        assert!(reader.open().await.is_err());
        assert!(!reader.is_open());

        handle.set_fail_open(false).await;
        reader.open().await.unwrap();
        assert!(reader.is_open());
        assert_eq!(handle.open_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_rfid_close_counts_only_open_handles() {
        let (mut reader, handle) = MockRfid::new();

        reader.close().await.unwrap();
        assert_eq!(handle.close_count(), 0);

        reader.open().await.unwrap();
        reader.close().await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(handle.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_rfid_hang_never_returns() {
        let (mut reader, handle) = MockRfid::new();
        reader.open().await.unwrap();
        handle.push_reads([MockRead::Hang]).await;

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(5), reader.poll_tag()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_rfid_get_reader_info() {
        let (reader, handle) = MockRfid::with_name("Test Reader".to_string());

        let info = reader.get_reader_info().await.unwrap();
        assert_eq!(info.name, "Test Reader");
        assert_eq!(handle.name(), "Test Reader");
        assert!(info.protocols.contains(&"ISO14443A".to_string()));
    }
}
