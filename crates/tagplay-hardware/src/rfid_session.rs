//! Bounded RFID reads with self-healing reinitialization.
//!
//! [`RfidSession`] owns the reader handle. Every read attempt is bounded by a
//! timeout, failed attempts are counted, and the handle is closed and
//! reopened once too many attempts failed in a row or the periodic
//! reinitialization interval has elapsed. A reader that stops answering
//! therefore recovers without restarting the process.
//!
//! # Examples
//!
//! ```
//! use tagplay_core::ReaderSettings;
//! use tagplay_hardware::mock::MockRfid;
//! use tagplay_hardware::rfid_session::RfidSession;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (reader, handle) = MockRfid::new();
//!     handle.place_tag("ABC123").await;
//!
//!     let mut session = RfidSession::new(reader, ReaderSettings::default());
//!     let read = session.read_with_timeout(Duration::from_secs(1)).await.unwrap();
//!     assert_eq!(read.tag_id, "ABC123");
//! }
//! ```

use crate::error::ReadError;
use crate::traits::RfidDevice;
use std::time::Duration;
use tagplay_core::constants::TAG_REMOVAL_EMPTY_POLLS;
use tagplay_core::{ReaderSettings, TagRead};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Failure bookkeeping for the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderHealth {
    /// Failed read attempts since the last success or reinitialization.
    pub consecutive_errors: u32,

    /// When the handle was last reinitialized (or the session created).
    pub last_reinit: Instant,
}

impl ReaderHealth {
    fn new() -> Self {
        Self {
            consecutive_errors: 0,
            last_reinit: Instant::now(),
        }
    }
}

/// Owner of the RFID reader handle.
#[derive(Debug)]
pub struct RfidSession<D: RfidDevice> {
    device: D,
    settings: ReaderSettings,
    health: ReaderHealth,
    is_open: bool,
    reinit_count: u64,
    empty_polls: u32,
    field_emptied: bool,
}

impl<D: RfidDevice> RfidSession<D> {
    /// Wrap a reader. The handle is opened lazily by the first read.
    pub fn new(device: D, settings: ReaderSettings) -> Self {
        Self {
            device,
            settings,
            health: ReaderHealth::new(),
            is_open: false,
            reinit_count: 0,
            empty_polls: 0,
            field_emptied: false,
        }
    }

    pub fn health(&self) -> ReaderHealth {
        self.health
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Number of reinitializations performed so far.
    pub fn reinit_count(&self) -> u64 {
        self.reinit_count
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    /// Whether the field was seen empty for [`TAG_REMOVAL_EMPTY_POLLS`] polls
    /// in a row since the last call. Clears the flag.
    ///
    /// Set within a single attempt, so a lifted tag is noticed long before
    /// the attempt (or its retries) runs out.
    pub fn take_field_emptied(&mut self) -> bool {
        std::mem::take(&mut self.field_emptied)
    }

    /// Open the reader handle.
    ///
    /// # Errors
    ///
    /// Returns `ReadError::DeviceFault` if the reader cannot be opened.
    pub async fn open(&mut self) -> Result<(), ReadError> {
        match self.device.open().await {
            Ok(()) => {
                self.is_open = true;
                match self.device.get_reader_info().await {
                    Ok(info) => debug!("RFID reader opened: {}", info.name),
                    Err(_) => debug!("RFID reader opened"),
                }
                Ok(())
            }
            Err(e) => {
                self.is_open = false;
                Err(ReadError::DeviceFault(format!("open failed: {e}")))
            }
        }
    }

    /// Close the reader handle. Close failures are logged, never returned.
    pub async fn close(&mut self) {
        if let Err(e) = self.device.close().await {
            warn!("Failed to close RFID reader: {}", e);
        }
        self.is_open = false;
    }

    /// Close and reopen the handle, then reset the failure counter.
    ///
    /// The counter and timestamp are reset even if reopening fails; the next
    /// read attempt will try to open again.
    pub async fn reinitialize(&mut self) {
        info!(
            "Reinitializing RFID reader after {} consecutive errors",
            self.health.consecutive_errors
        );

        self.close().await;
        if let Err(e) = self.open().await {
            warn!("RFID reader did not come back after reinit: {}", e);
        }

        self.health.consecutive_errors = 0;
        self.health.last_reinit = Instant::now();
        self.reinit_count += 1;
        self.empty_polls = 0;
    }

    fn needs_reinit(&self) -> bool {
        self.health.consecutive_errors >= self.settings.max_consecutive_errors
            || self.health.last_reinit.elapsed() >= self.settings.reinit_interval
    }

    /// Poll the reader until a tag is seen or `timeout` elapses.
    ///
    /// Applies the reinitialization policy before polling. A failed attempt
    /// increments [`ReaderHealth::consecutive_errors`]; a successful one
    /// resets it.
    ///
    /// # Errors
    ///
    /// - `ReadError::Timeout` if no tag was seen in time (including a wedged
    ///   driver call)
    /// - `ReadError::DeviceFault` if the reader could not be opened or
    ///   reported an error
    pub async fn read_with_timeout(&mut self, timeout: Duration) -> Result<TagRead, ReadError> {
        if self.needs_reinit() {
            self.reinitialize().await;
        }

        let result = match tokio::time::timeout(timeout, self.poll_until_tag()).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout { after: timeout }),
        };

        match &result {
            Ok(read) => {
                self.health.consecutive_errors = 0;
                debug!("RFID tag read: {}", read.tag_id);
            }
            Err(e) => {
                self.health.consecutive_errors = self.health.consecutive_errors.saturating_add(1);
                debug!(
                    "RFID read failed ({} in a row): {}",
                    self.health.consecutive_errors, e
                );
            }
        }

        result
    }

    /// Up to `max_retries + 1` calls of [`read_with_timeout`](Self::read_with_timeout).
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once all attempts failed.
    pub async fn read_with_retries(
        &mut self,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<TagRead, ReadError> {
        let mut attempt = 0;
        loop {
            match self.read_with_timeout(timeout).await {
                Ok(read) => return Ok(read),
                Err(e) if attempt >= max_retries => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if !e.is_timeout() {
                        warn!("RFID read attempt {} failed: {}", attempt, e);
                    }
                }
            }
        }
    }

    async fn poll_until_tag(&mut self) -> Result<TagRead, ReadError> {
        if !self.is_open {
            self.open().await?;
        }

        loop {
            match self.device.poll_tag().await {
                Ok(Some(raw)) => {
                    self.empty_polls = 0;
                    match TagRead::new(&raw) {
                        Ok(read) => return Ok(read),
                        Err(e) => debug!("Ignoring malformed tag id {:?}: {}", raw, e),
                    }
                }
                Ok(None) => {
                    self.empty_polls = self.empty_polls.saturating_add(1);
                    if self.empty_polls == TAG_REMOVAL_EMPTY_POLLS {
                        self.field_emptied = true;
                    }
                }
                Err(e) => return Err(ReadError::DeviceFault(e.to_string())),
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockRead, MockRfid, MockRfidHandle};

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn session(max_errors: u32) -> (RfidSession<MockRfid>, MockRfidHandle) {
        let (reader, handle) = MockRfid::new();
        let settings = ReaderSettings::new(max_errors, 300, 2.0, 2)
            .unwrap()
            .with_poll_interval(Duration::from_millis(100));
        (RfidSession::new(reader, settings), handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_success_opens_lazily() {
        let (mut session, handle) = session(3);
        handle.place_tag(" ABC123 ").await;

        assert!(!session.is_open());
        let read = session.read_with_timeout(TIMEOUT).await.unwrap();

        assert_eq!(read.tag_id, "ABC123");
        assert!(session.is_open());
        assert_eq!(handle.open_count(), 1);
        assert_eq!(session.health().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_error() {
        let (mut session, _handle) = session(3);

        let err = session.read_with_timeout(TIMEOUT).await.unwrap_err();
        assert_eq!(err, ReadError::Timeout { after: TIMEOUT });
        assert_eq!(session.health().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_before_fourth_attempt() {
        let (mut session, handle) = session(3);

        for _ in 0..3 {
            assert!(session.read_with_timeout(TIMEOUT).await.is_err());
        }
        assert_eq!(session.health().consecutive_errors, 3);
        assert_eq!(session.reinit_count(), 0);
        assert_eq!(handle.open_count(), 1);

        handle.place_tag("ABC123").await;
        let read = session.read_with_timeout(TIMEOUT).await.unwrap();

        assert_eq!(read.tag_id, "ABC123");
        assert_eq!(session.reinit_count(), 1);
        assert_eq!(handle.close_count(), 1);
        assert_eq!(handle.open_count(), 2);
        assert_eq!(session.health().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_resets_counter_even_when_reopen_fails() {
        let (mut session, handle) = session(1);

        assert!(session.read_with_timeout(TIMEOUT).await.is_err());
        handle.set_fail_open(true).await;

        let err = session.read_with_timeout(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ReadError::DeviceFault(_)));
        assert_eq!(session.reinit_count(), 1);
        // Reset to 0 by the reinit, then the failed attempt counts once.
        assert_eq!(session.health().consecutive_errors, 1);
        assert!(!session.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reinit() {
        let (mut session, handle) = session(3);
        handle.place_tag("ABC123").await;

        session.read_with_timeout(TIMEOUT).await.unwrap();
        assert_eq!(session.reinit_count(), 0);

        tokio::time::advance(Duration::from_secs(301)).await;
        session.read_with_timeout(TIMEOUT).await.unwrap();

        assert_eq!(session.reinit_count(), 1);
        assert_eq!(handle.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wedged_driver_is_bounded() {
        let (mut session, handle) = session(3);
        handle.push_reads([MockRead::Hang]).await;

        let started = Instant::now();
        let err = session.read_with_timeout(TIMEOUT).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() >= TIMEOUT);
        assert!(started.elapsed() < TIMEOUT + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_fault() {
        let (mut session, handle) = session(3);
        handle
            .push_reads([MockRead::Fault("SPI transfer failed".to_string())])
            .await;

        let err = session.read_with_timeout(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ReadError::DeviceFault(ref m) if m.contains("SPI transfer failed")));
        assert_eq!(session.health().consecutive_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let (mut session, handle) = session(10);

        let err = session.read_with_retries(TIMEOUT, 2).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(session.health().consecutive_errors, 3);
        assert!(handle.poll_count() > 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_second_attempt() {
        let (mut session, handle) = session(3);

        let placer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            placer.place_tag("584190326114").await;
        });

        let read = session.read_with_retries(TIMEOUT, 2).await.unwrap();
        assert_eq!(read.tag_id, "584190326114");
        assert_eq!(session.health().consecutive_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_field_emptied_after_two_empty_polls() {
        let (mut session, handle) = session(3);
        handle.place_tag("ABC123").await;
        session.read_with_timeout(TIMEOUT).await.unwrap();
        assert!(!session.take_field_emptied());

        handle
            .push_reads([MockRead::Empty, MockRead::Tag("ABC123".to_string())])
            .await;
        session.read_with_timeout(TIMEOUT).await.unwrap();
        assert!(!session.take_field_emptied());

        handle.remove_tag().await;
        let placer = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(350)).await;
            placer.place_tag("ABC123").await;
        });

        let read = session.read_with_timeout(TIMEOUT).await.unwrap();
        assert_eq!(read.tag_id, "ABC123");
        assert!(session.take_field_emptied());
        assert!(!session.take_field_emptied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_close() {
        let (mut session, handle) = session(3);
        session.open().await.unwrap();
        session.close().await;

        assert!(!session.is_open());
        assert_eq!(handle.close_count(), 1);
    }
}
