//! Input sources: one task per hardware input, merged by the consumer.
//!
//! The [`SourceManager`] takes ownership of the RFID session and the encoder
//! input and spawns one task for each. The encoder task samples its lines on
//! a blocking thread, off the async workers. Every task posts to its own
//! bounded channel, so a wedged RFID read never delays encoder events. The
//! consumer pulls [`EventBatch`]es holding at most one event per channel.
//!
//! ```text
//! ┌──────────┐  tag channel   ┌──────────────┐
//! │ RFID     │───────────────►│              │
//! │ Task     │◄───────────────│ SourceHandle │──────► Orchestrator
//! └──────────┘  commands      │              │
//!                             │              │
//! ┌──────────┐  input channel │              │
//! │ Encoder  │───────────────►│              │
//! │ Task     │                └──────────────┘
//! └──────────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use tagplay_core::ReaderSettings;
//! use tagplay_hardware::devices::AnyRfidDevice;
//! use tagplay_hardware::mock::MockRfid;
//! use tagplay_hardware::rfid_session::RfidSession;
//! use tagplay_hardware::sources::{SourceConfig, SourceManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (reader, _handle) = MockRfid::new();
//!     let session = RfidSession::new(AnyRfidDevice::Mock(reader), ReaderSettings::default());
//!
//!     let mut manager = SourceManager::new(SourceConfig::default());
//!     manager.register_rfid(session);
//!
//!     let mut sources = manager.start();
//!     while let Some(batch) = sources.next_batch().await {
//!         for event in batch.into_ordered() {
//!             println!("Event: {:?}", event);
//!         }
//!     }
//!     sources.shutdown().await;
//! }
//! ```

use crate::Result;
use crate::devices::{AnyInputLine, AnyRfidDevice};
use crate::encoder::EncoderInput;
use crate::error::ReadError;
use crate::rfid_session::RfidSession;
use chrono::Utc;
use std::fmt;
use std::time::Duration;
use tagplay_core::constants::ENCODER_SAMPLE_INTERVAL_MS;
use tagplay_core::{EncoderEvent, TagRead};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Time source tasks get to stop on their own before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Delay before retrying a send into a full channel.
const BACKPRESSURE_DELAY: Duration = Duration::from_millis(100);

/// Which input produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Rfid,
    Encoder,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rfid => write!(f, "RFID"),
            Self::Encoder => write!(f, "Encoder"),
        }
    }
}

/// A failure reported by a source task. Tasks keep running after reporting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("RFID read failed: {0}")]
    Rfid(#[from] ReadError),

    #[error("Encoder line unreadable: {0}")]
    Encoder(String),
}

impl SourceError {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Rfid(_) => SourceKind::Rfid,
            Self::Encoder(_) => SourceKind::Encoder,
        }
    }

    /// Whether this is only "no tag seen within the read window".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Rfid(e) if e.is_timeout())
    }
}

/// Event produced by a source task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A tag arrived on the reader.
    Tag(TagRead),

    /// Debounced encoder gesture.
    Encoder(EncoderEvent),

    /// A source reported a failure.
    Error(SourceError),
}

/// Commands accepted by the RFID task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfidCommand {
    /// Close and reopen the reader now.
    Reinitialize,
}

/// Source task configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Capacity of each event channel.
    pub channel_capacity: usize,

    /// Interval between encoder line samples.
    pub encoder_sample_interval: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            encoder_sample_interval: Duration::from_millis(ENCODER_SAMPLE_INTERVAL_MS),
        }
    }
}

/// Events taken in one consumer iteration.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventBatch {
    /// At most one event from the RFID channel.
    pub tag: Option<SourceEvent>,

    /// At most one event from the encoder channel.
    pub input: Option<SourceEvent>,
}

impl EventBatch {
    /// The batch's events, RFID first.
    pub fn into_ordered(self) -> impl Iterator<Item = SourceEvent> {
        self.tag.into_iter().chain(self.input)
    }

    pub fn is_empty(&self) -> bool {
        self.tag.is_none() && self.input.is_none()
    }
}

/// Consumer side of the source channels.
pub struct SourceHandle {
    tag_rx: mpsc::Receiver<SourceEvent>,
    input_rx: mpsc::Receiver<SourceEvent>,
    tag_closed: bool,
    input_closed: bool,
    rfid_commands: mpsc::Sender<RfidCommand>,
    tasks: JoinSet<Result<()>>,
    cancel: CancellationToken,
}

/// Producer side of a [`SourceHandle`] built with [`SourceHandle::channels`].
#[derive(Debug)]
pub struct SourceInjector {
    pub tag_tx: mpsc::Sender<SourceEvent>,
    pub input_tx: mpsc::Sender<SourceEvent>,
    pub rfid_commands: mpsc::Receiver<RfidCommand>,
}

impl SourceHandle {
    /// A handle fed by the caller instead of hardware tasks.
    pub fn channels(capacity: usize) -> (Self, SourceInjector) {
        let (tag_tx, tag_rx) = mpsc::channel(capacity);
        let (input_tx, input_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(4);

        let handle = Self {
            tag_rx,
            input_rx,
            tag_closed: false,
            input_closed: false,
            rfid_commands: command_tx,
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
        };
        let injector = SourceInjector {
            tag_tx,
            input_tx,
            rfid_commands: command_rx,
        };
        (handle, injector)
    }

    /// Wait for any source, then take at most one event from each channel.
    ///
    /// Returns `None` once both channels are closed and drained.
    pub async fn next_batch(&mut self) -> Option<EventBatch> {
        loop {
            if self.tag_closed && self.input_closed {
                return None;
            }

            let first = tokio::select! {
                biased;
                event = self.tag_rx.recv(), if !self.tag_closed => match event {
                    Some(event) => Some((SourceKind::Rfid, event)),
                    None => {
                        self.tag_closed = true;
                        None
                    }
                },
                event = self.input_rx.recv(), if !self.input_closed => match event {
                    Some(event) => Some((SourceKind::Encoder, event)),
                    None => {
                        self.input_closed = true;
                        None
                    }
                },
                else => return None,
            };

            let Some((kind, event)) = first else {
                continue;
            };

            let batch = match kind {
                SourceKind::Rfid => EventBatch {
                    tag: Some(event),
                    input: self.try_input(),
                },
                SourceKind::Encoder => EventBatch {
                    tag: self.try_tag(),
                    input: Some(event),
                },
            };
            return Some(batch);
        }
    }

    fn try_tag(&mut self) -> Option<SourceEvent> {
        if self.tag_closed {
            return None;
        }
        match self.tag_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.tag_closed = true;
                None
            }
        }
    }

    fn try_input(&mut self) -> Option<SourceEvent> {
        if self.input_closed {
            return None;
        }
        match self.input_rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.input_closed = true;
                None
            }
        }
    }

    /// Ask the RFID task to reinitialize the reader.
    ///
    /// Returns `false` if the RFID task is gone. A request while another is
    /// still queued is merged into it.
    pub fn request_rfid_reinit(&self) -> bool {
        match self.rfid_commands.try_send(RfidCommand::Reinitialize) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Stop all source tasks.
    ///
    /// Tasks are cancelled and given a grace period to close their devices;
    /// stragglers are aborted. Task failures are logged, never returned.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            let mut tally = TaskTally::default();
            while let Some(result) = tasks.join_next().await {
                tally.record(result);
            }
            tally
        })
        .await;

        let tally = match drained {
            Ok(tally) => tally,
            Err(_) => {
                warn!("Source tasks did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                self.tasks.abort_all();
                let mut tally = TaskTally::default();
                while let Some(result) = self.tasks.join_next().await {
                    tally.record(result);
                }
                tally
            }
        };

        if tally.errors + tally.panics > 0 {
            warn!(
                "Source tasks stopped with {} errors and {} panics",
                tally.errors, tally.panics
            );
        } else {
            debug!("Source tasks stopped");
        }
    }
}

/// Task termination counts collected during shutdown.
#[derive(Debug, Default)]
struct TaskTally {
    errors: usize,
    panics: usize,
}

impl TaskTally {
    fn record(&mut self, result: std::result::Result<Result<()>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Source task failed: {}", e);
                self.errors += 1;
            }
            Err(e) if e.is_cancelled() => {}
            Err(_) => self.panics += 1,
        }
    }
}

/// Owns the inputs until [`start`](SourceManager::start) hands them to tasks.
pub struct SourceManager {
    rfid: Option<RfidSession<AnyRfidDevice>>,
    encoder: Option<EncoderInput<AnyInputLine>>,
    config: SourceConfig,
}

impl SourceManager {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            rfid: None,
            encoder: None,
            config,
        }
    }

    /// Register the RFID session.
    pub fn register_rfid(&mut self, session: RfidSession<AnyRfidDevice>) {
        self.rfid = Some(session);
    }

    /// Register the encoder input.
    pub fn register_encoder(&mut self, input: EncoderInput<AnyInputLine>) {
        self.encoder = Some(input);
    }

    /// Spawn one task per registered input.
    ///
    /// A channel whose input was not registered is closed immediately.
    pub fn start(self) -> SourceHandle {
        let (mut handle, injector) = SourceHandle::channels(self.config.channel_capacity);
        let SourceInjector {
            tag_tx,
            input_tx,
            rfid_commands,
        } = injector;

        if let Some(session) = self.rfid {
            let cancel = handle.cancel.child_token();
            handle
                .tasks
                .spawn(rfid_task(session, tag_tx, rfid_commands, cancel));
        }

        if let Some(input) = self.encoder {
            let cancel = handle.cancel.child_token();
            let sample_interval = self.config.encoder_sample_interval;
            handle
                .tasks
                .spawn_blocking(move || encoder_task(input, input_tx, sample_interval, cancel));
        }

        handle
    }
}

/// Send with backpressure. Returns `false` once the consumer is gone.
async fn forward(tx: &mpsc::Sender<SourceEvent>, event: SourceEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            debug!("Event channel full, backing off");
            tokio::time::sleep(BACKPRESSURE_DELAY).await;
            tx.send(event).await.is_ok()
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn rfid_task(
    mut session: RfidSession<AnyRfidDevice>,
    tx: mpsc::Sender<SourceEvent>,
    mut commands: mpsc::Receiver<RfidCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let read_timeout = session.settings().read_timeout;
    let max_retries = session.settings().max_retries;
    let min_interval = session.settings().poll_interval;

    // Tag currently resting on the reader; reported once on arrival.
    let mut present: Option<String> = None;

    loop {
        let start = Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(command) = commands.recv() => {
                match command {
                    RfidCommand::Reinitialize => session.reinitialize().await,
                }
                continue;
            }
            result = session.read_with_retries(read_timeout, max_retries) => result,
        };

        if session.take_field_emptied() {
            if let Some(tag) = present.take() {
                debug!("Tag {} left the reader", tag);
            }
        }

        match outcome {
            Ok(read) if present.as_deref() == Some(read.tag_id.as_str()) => {}
            Ok(read) => {
                info!("Tag detected: {}", read.tag_id);
                present = Some(read.tag_id.clone());
                if !forward(&tx, SourceEvent::Tag(read)).await {
                    break;
                }
            }
            Err(e) => {
                if let Some(tag) = present.take() {
                    debug!("Tag {} left the reader", tag);
                }
                if !forward(&tx, SourceEvent::Error(SourceError::Rfid(e))).await {
                    break;
                }
            }
        }

        // A resident tag answers every poll immediately.
        let elapsed = start.elapsed();
        if elapsed < min_interval {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(min_interval - elapsed) => {}
            }
        }
    }

    session.close().await;
    debug!("RFID task stopped");
    Ok(())
}

/// Sampling loop for the encoder lines. Runs on a blocking thread.
///
/// Line reads are plain file or ioctl calls, so the loop sleeps with the
/// thread instead of a timer. Events that do not fit into the channel are
/// dropped rather than stalling the sampler.
fn encoder_task(
    mut input: EncoderInput<AnyInputLine>,
    tx: mpsc::Sender<SourceEvent>,
    sample_interval: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    // Report a failing line once per failure streak, not every sample.
    let mut failing = false;

    while !cancel.is_cancelled() && !tx.is_closed() {
        std::thread::sleep(sample_interval);

        match input.sample(Instant::now()) {
            Ok(actions) => {
                failing = false;
                for action in actions {
                    let event = action.stamp(Utc::now());
                    debug!("Encoder event: {}", event.name());
                    if !offer(&tx, SourceEvent::Encoder(event)) {
                        return Ok(());
                    }
                }
            }
            Err(e) if !failing => {
                failing = true;
                warn!("Encoder sample failed: {}", e);
                if !offer(&tx, SourceEvent::Error(SourceError::Encoder(e.to_string()))) {
                    return Ok(());
                }
            }
            Err(_) => {}
        }
    }

    debug!("Encoder task stopped");
    Ok(())
}

/// Non-blocking send. Returns `false` once the consumer is gone.
fn offer(tx: &mpsc::Sender<SourceEvent>, event: SourceEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("Event channel full, dropping {:?}", event);
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockLine, MockLineHandle, MockRfid, MockRfidHandle};
    use tagplay_core::ReaderSettings;

    fn rfid_session() -> (RfidSession<AnyRfidDevice>, MockRfidHandle) {
        let (reader, handle) = MockRfid::new();
        let settings = ReaderSettings::new(3, 300, 0.5, 0).unwrap();
        (RfidSession::new(AnyRfidDevice::Mock(reader), settings), handle)
    }

    fn encoder_input() -> (EncoderInput<AnyInputLine>, [MockLineHandle; 3]) {
        let (clk, clk_handle) = MockLine::new(17);
        let (dt, dt_handle) = MockLine::new(18);
        let (confirm, confirm_handle) = MockLine::new(27);
        let input = EncoderInput::new(
            AnyInputLine::Mock(clk),
            AnyInputLine::Mock(dt),
            AnyInputLine::Mock(confirm),
            Duration::from_millis(20),
        )
        .unwrap();
        (input, [clk_handle, dt_handle, confirm_handle])
    }

    async fn next_event(sources: &mut SourceHandle) -> SourceEvent {
        let batch = sources.next_batch().await.unwrap();
        batch.into_ordered().next().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_resident_tag_reported_once() {
        let (session, reader) = rfid_session();
        reader.place_tag("ABC123").await;

        let mut manager = SourceManager::new(SourceConfig::default());
        manager.register_rfid(session);
        let mut sources = manager.start();

        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Tag(ref read) if read.tag_id == "ABC123"));

        // Still on the reader: the next event is the timeout after removal.
        tokio::time::sleep(Duration::from_secs(2)).await;
        reader.remove_tag().await;
        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Error(ref e) if e.is_timeout()));

        reader.place_tag("ABC123").await;
        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Tag(ref read) if read.tag_id == "ABC123"));

        sources.shutdown().await;
        assert_eq!(reader.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_retap_reported_again() {
        let (reader, handle) = MockRfid::new();
        let session = RfidSession::new(AnyRfidDevice::Mock(reader), ReaderSettings::default());
        handle.place_tag("ABC123").await;

        let mut manager = SourceManager::new(SourceConfig::default());
        manager.register_rfid(session);
        let mut sources = manager.start();

        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Tag(ref read) if read.tag_id == "ABC123"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.remove_tag().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.place_tag("ABC123").await;

        // Lifted for 1 s: well inside one 2 s read attempt.
        let batch = tokio::time::timeout(Duration::from_secs(10), sources.next_batch())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(batch.tag, Some(SourceEvent::Tag(ref read)) if read.tag_id == "ABC123"));

        sources.shutdown().await;
    }

    #[tokio::test]
    async fn test_encoder_stops_when_consumer_dropped() {
        let (input, _lines) = encoder_input();

        let mut manager = SourceManager::new(SourceConfig::default());
        manager.register_encoder(input);
        let mut sources = manager.start();

        // Dropping the receivers closes the channel the sampler posts to.
        let tasks = std::mem::take(&mut sources.tasks);
        drop(sources);

        let finished = tokio::time::timeout(Duration::from_secs(2), tasks.join_all()).await;
        assert!(finished.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reinit_command() {
        let (session, reader) = rfid_session();

        let mut manager = SourceManager::new(SourceConfig::default());
        manager.register_rfid(session);
        let sources = manager.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(reader.open_count(), 1);

        assert!(sources.request_rfid_reinit());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(reader.open_count(), 2);
        assert_eq!(reader.close_count(), 1);
        sources.shutdown().await;
    }

    // Real time: the sampler thread keeps a paused clock from advancing.
    #[tokio::test]
    async fn test_encoder_events() {
        let (input, [clk, dt, confirm]) = encoder_input();

        let mut manager = SourceManager::new(SourceConfig::default());
        manager.register_encoder(input);
        let mut sources = manager.start();

        clk.press();
        dt.press();
        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Encoder(EncoderEvent::VolumeUp(_))));

        tokio::time::sleep(Duration::from_millis(50)).await;
        confirm.press();
        let event = next_event(&mut sources).await;
        assert!(matches!(event, SourceEvent::Encoder(EncoderEvent::Confirm(_))));

        sources.shutdown().await;
    }

    #[tokio::test]
    async fn test_batch_takes_tag_before_encoder() {
        let (mut sources, injector) = SourceHandle::channels(8);
        let now = Utc::now();

        injector
            .input_tx
            .send(SourceEvent::Encoder(EncoderEvent::Confirm(now)))
            .await
            .unwrap();
        injector
            .input_tx
            .send(SourceEvent::Encoder(EncoderEvent::VolumeUp(now)))
            .await
            .unwrap();
        let tag = TagRead::new("ABC123").unwrap();
        injector
            .tag_tx
            .send(SourceEvent::Tag(tag.clone()))
            .await
            .unwrap();

        let batch = sources.next_batch().await.unwrap();
        let events: Vec<_> = batch.into_ordered().collect();
        assert_eq!(
            events,
            vec![
                SourceEvent::Tag(tag),
                SourceEvent::Encoder(EncoderEvent::Confirm(now)),
            ]
        );

        let batch = sources.next_batch().await.unwrap();
        assert_eq!(batch.tag, None);
        assert_eq!(
            batch.input,
            Some(SourceEvent::Encoder(EncoderEvent::VolumeUp(now)))
        );
    }

    #[tokio::test]
    async fn test_batches_end_when_channels_close() {
        let (mut sources, injector) = SourceHandle::channels(8);
        drop(injector);

        assert_eq!(sources.next_batch().await, None);
        assert!(!sources.request_rfid_reinit());
    }

    #[test]
    fn test_source_error_kind() {
        let timeout = SourceError::Rfid(ReadError::Timeout {
            after: Duration::from_secs(2),
        });
        assert!(timeout.is_timeout());
        assert_eq!(timeout.kind(), SourceKind::Rfid);

        let encoder = SourceError::Encoder("gpio17 vanished".to_string());
        assert!(!encoder.is_timeout());
        assert_eq!(encoder.kind().to_string(), "Encoder");
    }
}
