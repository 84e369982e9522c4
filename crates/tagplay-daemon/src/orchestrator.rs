//! The coordination loop.
//!
//! [`Orchestrator`] is the single consumer of the input sources. Each
//! iteration takes at most one RFID event and at most one encoder event
//! (RFID first), hands each to [`Orchestrator::dispatch`] and keeps the
//! playback state fresh. Nothing that goes wrong in here ends the loop:
//! failures are logged, counted, and escalated to an RFID reinitialization
//! when they pile up.
//!
//! # Dispatch policy
//!
//! | Event                           | Action                              |
//! |---------------------------------|-------------------------------------|
//! | Tag, mapped to new media        | `load_and_play`                     |
//! | Tag, mapped to current media    | toggle pause/resume                 |
//! | Tag, no mapping                 | [`Cue::UnknownTag`], no playback    |
//! | Volume up / down                | `adjust_volume(±step)`              |
//! | Confirm                         | toggle pause/resume (no-op if idle) |
//! | RFID timeout                    | nothing                             |
//! | Other source error              | fault                               |

use crate::event::{Cue, Outcome, PlayerEvent};
use std::time::Duration;
use tagplay_core::constants::{ESCALATION_FAULT_THRESHOLD, ESCALATION_WINDOW_SECS, VOLUME_STEP};
use tagplay_core::{EncoderEvent, PlaybackState, PlaybackStatus, TagRead};
use tagplay_hardware::playback::PlaybackController;
use tagplay_hardware::sources::{SourceError, SourceHandle};
use tagplay_hardware::{AudioOutput, PlaybackError};
use tagplay_storage::{MediaMappingRepository, StorageError, TagResolver};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval at which a finished stream is noticed without any input.
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

const CUE_CAPACITY: usize = 16;

/// A failed dispatch.
#[derive(Debug, Error)]
pub enum OrchestrationFault {
    #[error("Playback failed: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Mapping lookup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{} source failed: {}", .0.kind(), .0)]
    Source(#[from] SourceError),

    #[error("Inconsistent playback state: {0}")]
    Inconsistent(String),
}

/// Tunables of the coordination loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Volume change per encoder detent.
    pub volume_step: i32,

    /// Consecutive faults that trigger an RFID reinitialization.
    pub fault_threshold: u32,

    /// Window the threshold must be reached in.
    pub fault_window: Duration,

    /// Playback refresh period while no input arrives.
    pub refresh_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            volume_step: VOLUME_STEP,
            fault_threshold: ESCALATION_FAULT_THRESHOLD,
            fault_window: Duration::from_secs(ESCALATION_WINDOW_SECS),
            refresh_interval: REFRESH_INTERVAL,
        }
    }
}

/// Consecutive fault tracking.
#[derive(Debug)]
struct FaultStreak {
    count: u32,
    started: Option<Instant>,
    threshold: u32,
    window: Duration,
}

impl FaultStreak {
    fn new(threshold: u32, window: Duration) -> Self {
        Self {
            count: 0,
            started: None,
            threshold: threshold.max(1),
            window,
        }
    }

    /// Count a fault. Returns `true` when the streak reached the threshold,
    /// in which case it starts over.
    fn record(&mut self, now: Instant) -> bool {
        match self.started {
            Some(started) if now.duration_since(started) <= self.window => self.count += 1,
            _ => {
                self.started = Some(now);
                self.count = 1;
            }
        }

        if self.count >= self.threshold {
            self.reset();
            return true;
        }
        false
    }

    fn reset(&mut self) {
        self.count = 0;
        self.started = None;
    }
}

/// Single consumer of the input sources; owns the playback controller.
#[derive(Debug)]
pub struct Orchestrator<A: AudioOutput, R: MediaMappingRepository> {
    resolver: TagResolver<R>,
    playback: PlaybackController<A>,
    config: OrchestratorConfig,
    streak: FaultStreak,
    cues: broadcast::Sender<Cue>,
    escalations: u64,
}

impl<A: AudioOutput, R: MediaMappingRepository> Orchestrator<A, R> {
    pub fn new(
        resolver: TagResolver<R>,
        playback: PlaybackController<A>,
        config: OrchestratorConfig,
    ) -> Self {
        let (cues, _) = broadcast::channel(CUE_CAPACITY);
        Self {
            resolver,
            playback,
            streak: FaultStreak::new(config.fault_threshold, config.fault_window),
            config,
            cues,
            escalations: 0,
        }
    }

    /// Receive [`Cue`]s published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Cue> {
        self.cues.subscribe()
    }

    /// Snapshot of the playback state.
    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn playback(&self) -> &PlaybackController<A> {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackController<A> {
        &mut self.playback
    }

    /// Number of RFID reinitializations requested so far.
    pub fn escalations(&self) -> u64 {
        self.escalations
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns an [`OrchestrationFault`] if playback or the mapping lookup
    /// failed, or the event itself reports a source failure other than an
    /// RFID timeout.
    pub async fn dispatch(&mut self, event: PlayerEvent) -> Result<Outcome, OrchestrationFault> {
        match event {
            PlayerEvent::Tag(read) => self.on_tag(read).await,
            PlayerEvent::Encoder(input) => self.on_encoder(input).await,
            PlayerEvent::Error(e) if e.is_timeout() => {
                debug!("No tag within the read window");
                Ok(Outcome::NoTag)
            }
            PlayerEvent::Error(e) => Err(e.into()),
        }
    }

    async fn on_tag(&mut self, read: TagRead) -> Result<Outcome, OrchestrationFault> {
        let Some(media) = self.resolver.resolve(&read.tag_id).await? else {
            warn!(tag_id = %read.tag_id, "Unknown tag");
            self.publish(Cue::UnknownTag {
                tag_id: read.tag_id,
            });
            return Ok(Outcome::UnknownTag);
        };

        if self.playback.state().is_current(&media) {
            self.playback.toggle_pause().await?;
            let status = self.playback.status();
            info!(tag_id = %read.tag_id, "Tag rescanned, playback now {:?}", status);
            return Ok(Outcome::Toggled(status));
        }

        info!(tag_id = %read.tag_id, "Playing {}", media);
        if let Err(e) = self.playback.load_and_play(&media).await {
            self.publish(Cue::PlaybackFailed {
                media,
                reason: e.to_string(),
            });
            return Err(e.into());
        }

        if !self.playback.state().is_current(&media) {
            return Err(OrchestrationFault::Inconsistent(format!(
                "{media} loaded but controller reports {:?}",
                self.playback.status()
            )));
        }

        Ok(Outcome::Started { media })
    }

    async fn on_encoder(&mut self, input: EncoderEvent) -> Result<Outcome, OrchestrationFault> {
        match input {
            EncoderEvent::VolumeUp(_) => {
                let volume = self.playback.adjust_volume(self.config.volume_step).await?;
                debug!("Volume up to {}", volume);
                Ok(Outcome::Volume(volume))
            }
            EncoderEvent::VolumeDown(_) => {
                let volume = self.playback.adjust_volume(-self.config.volume_step).await?;
                debug!("Volume down to {}", volume);
                Ok(Outcome::Volume(volume))
            }
            EncoderEvent::Confirm(_) if self.playback.status() == PlaybackStatus::Idle => {
                debug!("Confirm ignored while idle");
                Ok(Outcome::Ignored)
            }
            EncoderEvent::Confirm(_) => {
                self.playback.toggle_pause().await?;
                Ok(Outcome::Toggled(self.playback.status()))
            }
        }
    }

    fn publish(&self, cue: Cue) {
        // No subscribers is not an error.
        let _ = self.cues.send(cue);
    }

    /// Dispatch and apply the fault policy.
    ///
    /// Returns `true` if the fault streak asks for an RFID reinitialization.
    async fn handle(&mut self, event: PlayerEvent) -> bool {
        match self.dispatch(event).await {
            Ok(outcome) => {
                if outcome.is_progress() {
                    self.streak.reset();
                }
                false
            }
            Err(fault) => {
                warn!("Dispatch failed: {}", fault);
                self.streak.record(Instant::now())
            }
        }
    }

    fn escalate(&mut self, sources: &SourceHandle) {
        self.escalations += 1;
        error!(
            "{} consecutive faults within {:?}, reinitializing RFID reader",
            self.config.fault_threshold, self.config.fault_window
        );
        if !sources.request_rfid_reinit() {
            warn!("RFID source is not running, reinitialization skipped");
        }
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// When every source channel has closed the loop keeps refreshing
    /// playback, so a running stream still finishes cleanly. On exit the
    /// sources are stopped (closing the RFID reader) and the audio output is
    /// released.
    pub async fn run(&mut self, mut sources: SourceHandle, shutdown: CancellationToken) {
        let mut refresh = tokio::time::interval(self.config.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut inputs_open = true;

        info!("Orchestrator started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                batch = sources.next_batch(), if inputs_open => match batch {
                    Some(batch) => {
                        for event in batch.into_ordered() {
                            if self.handle(event).await {
                                self.escalate(&sources);
                            }
                        }
                        self.playback.refresh().await;
                    }
                    None => {
                        warn!("All input sources stopped");
                        inputs_open = false;
                    }
                },
                _ = refresh.tick() => {
                    self.playback.refresh().await;
                }
            }
        }

        info!("Orchestrator stopping");
        sources.shutdown().await;
        self.playback.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn test_streak_reaches_threshold() {
        let mut streak = FaultStreak::new(3, WINDOW);

        assert!(!streak.record(Instant::now()));
        assert!(!streak.record(Instant::now()));
        assert!(streak.record(Instant::now()));

        // Starts over after escalating.
        assert!(!streak.record(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streak_outside_window_restarts() {
        let mut streak = FaultStreak::new(3, WINDOW);

        assert!(!streak.record(Instant::now()));
        assert!(!streak.record(Instant::now()));
        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(!streak.record(Instant::now()));
        assert!(!streak.record(Instant::now()));
        assert!(streak.record(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streak_reset() {
        let mut streak = FaultStreak::new(3, WINDOW);

        streak.record(Instant::now());
        streak.record(Instant::now());
        streak.reset();

        assert!(!streak.record(Instant::now()));
        assert!(!streak.record(Instant::now()));
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.volume_step, 5);
        assert_eq!(config.fault_threshold, 3);
        assert_eq!(config.fault_window, WINDOW);
    }
}
