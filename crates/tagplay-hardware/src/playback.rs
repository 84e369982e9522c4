//! Playback controller: the single owner of the audio output.
//!
//! ```text
//!            load_and_play              pause
//!   Idle ──────────────────▶ Playing ─────────▶ Paused
//!    ▲                        │   ▲   resume     │
//!    │   stop / end of stream │   └──────────────┘
//!    └────────────────────────┴──────────────────┘ stop
//! ```
//!
//! At most one stream is active: loading a new reference stops the current
//! one first. The output device is opened lazily on the first load and kept
//! open afterwards; if opening fails the controller stays idle and retries on
//! the next request only.

use crate::error::{DeviceError, PlaybackError};
use crate::traits::AudioOutput;
use std::path::{Component, Path, PathBuf};
use tagplay_core::{AudioSettings, PlaybackState, PlaybackStatus, clamp_volume};
use tracing::{debug, info, warn};

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Owns the audio output and the [`PlaybackState`].
#[derive(Debug)]
pub struct PlaybackController<A: AudioOutput> {
    output: A,
    media_root: PathBuf,
    device: String,
    state: PlaybackState,
}

impl<A: AudioOutput> PlaybackController<A> {
    /// Create an idle controller. Nothing is opened yet.
    pub fn new(output: A, media_root: impl Into<PathBuf>, audio: &AudioSettings) -> Self {
        Self {
            output,
            media_root: media_root.into(),
            device: audio.device.clone(),
            state: PlaybackState::idle(i32::from(audio.default_volume)),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PlaybackState {
        self.state.clone()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    /// Name of the output device in use (or to be opened).
    pub fn device_name(&self) -> &str {
        &self.device
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn output(&self) -> &A {
        &self.output
    }

    /// Stop whatever is playing and start `reference`.
    ///
    /// # Errors
    ///
    /// - `PlaybackError::InvalidReference` if the reference is empty,
    ///   absolute or escapes the media root
    /// - `PlaybackError::MediaNotFound` if no such file exists
    /// - `DeviceError::OpenFailed` / `DeviceError::WriteFailed` on output
    ///   failures
    ///
    /// The controller is `Idle` after any error.
    pub async fn load_and_play(&mut self, reference: &str) -> Result<()> {
        let reference = reference.trim();
        let path = self.resolve(reference)?;

        if self.state.status != PlaybackStatus::Idle {
            self.stop_stream().await;
        }

        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            warn!("Media file not found: {}", path.display());
            return Err(PlaybackError::MediaNotFound { path });
        }

        self.ensure_open().await?;

        if let Err(e) = self.output.load(&path).await {
            warn!("Failed to start {}: {}", reference, e);
            return Err(DeviceError::WriteFailed {
                reason: e.to_string(),
            }
            .into());
        }

        self.state.status = PlaybackStatus::Playing;
        self.state.current_media = Some(reference.to_string());
        info!("Playing {}", reference);
        Ok(())
    }

    /// Pause a playing stream. No-op otherwise.
    pub async fn pause(&mut self) -> Result<()> {
        if self.state.status != PlaybackStatus::Playing {
            debug!("Pause ignored while {}", self.state.status);
            return Ok(());
        }

        self.output.pause().await.map_err(write_failed)?;
        self.state.status = PlaybackStatus::Paused;
        info!("Paused");
        Ok(())
    }

    /// Resume a paused stream. No-op otherwise.
    pub async fn resume(&mut self) -> Result<()> {
        if self.state.status != PlaybackStatus::Paused {
            debug!("Resume ignored while {}", self.state.status);
            return Ok(());
        }

        self.output.resume().await.map_err(write_failed)?;
        self.state.status = PlaybackStatus::Playing;
        info!("Resumed");
        Ok(())
    }

    /// Pause if playing, resume if paused, nothing if idle.
    pub async fn toggle_pause(&mut self) -> Result<()> {
        match self.state.status {
            PlaybackStatus::Playing => self.pause().await,
            PlaybackStatus::Paused => self.resume().await,
            PlaybackStatus::Idle => {
                debug!("Toggle ignored while Idle");
                Ok(())
            }
        }
    }

    /// Stop the current stream.
    ///
    /// The controller is `Idle` afterwards even if the device rejected the
    /// command.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state.status == PlaybackStatus::Idle {
            debug!("Stop ignored while Idle");
            return Ok(());
        }

        let result = self.output.stop().await.map_err(write_failed);
        self.set_idle();
        info!("Stopped");
        result
    }

    /// Set the volume, clamped to 0-100. Returns the applied value.
    ///
    /// The value is remembered even when the device write fails, and applied
    /// again whenever the device is (re)opened.
    pub async fn set_volume(&mut self, volume: i32) -> Result<u8> {
        let volume = clamp_volume(volume);
        self.state.volume = volume;

        if self.output.is_open() {
            self.output.set_volume(volume).await.map_err(write_failed)?;
        }
        debug!("Volume set to {}", volume);
        Ok(volume)
    }

    /// Change the volume by `delta` steps of one percent.
    pub async fn adjust_volume(&mut self, delta: i32) -> Result<u8> {
        self.set_volume(i32::from(self.state.volume) + delta).await
    }

    /// Move a finished stream to `Idle`. Returns whether it did.
    pub async fn refresh(&mut self) -> bool {
        if self.state.status != PlaybackStatus::Playing || !self.output.is_open() {
            return false;
        }

        match self.output.is_finished().await {
            Ok(true) => {
                info!(
                    "Finished {}",
                    self.state.current_media.as_deref().unwrap_or("stream")
                );
                self.set_idle();
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!("Could not query stream position: {}", e);
                false
            }
        }
    }

    /// Switch to another output device.
    ///
    /// Stops playback and reopens on `device`. On failure the controller is
    /// left closed, pointed at `device`, and the next load retries the open.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::OpenFailed` if the new device cannot be opened.
    pub async fn select_output(&mut self, device: &str) -> Result<()> {
        if self.state.status != PlaybackStatus::Idle {
            self.stop_stream().await;
        }
        self.close_output().await;

        self.device = device.trim().to_string();
        self.ensure_open().await?;
        info!("Switched audio output to {}", self.device);
        Ok(())
    }

    /// Stop playback and release the output device.
    pub async fn shutdown(&mut self) {
        if self.state.status != PlaybackStatus::Idle {
            self.stop_stream().await;
        }
        self.close_output().await;
        debug!("Playback controller shut down");
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if reference.is_empty() {
            return Err(PlaybackError::InvalidReference(
                "media reference is empty".to_string(),
            ));
        }

        let relative = Path::new(reference);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(PlaybackError::InvalidReference(format!(
                "{reference} is not a path below the media directory"
            )));
        }

        Ok(self.media_root.join(relative))
    }

    async fn ensure_open(&mut self) -> Result<()> {
        if self.output.is_open() {
            return Ok(());
        }

        if let Err(e) = self.output.open(&self.device).await {
            warn!("Audio output {} unavailable: {}", self.device, e);
            return Err(DeviceError::OpenFailed {
                device: self.device.clone(),
                reason: e.to_string(),
            }
            .into());
        }
        if let Ok(info) = self.output.get_info().await {
            info!("Audio output open: {} ({})", info.name, info.model);
        }

        if let Err(e) = self.output.set_volume(self.state.volume).await {
            warn!("Failed to apply volume {}: {}", self.state.volume, e);
        }
        Ok(())
    }

    async fn stop_stream(&mut self) {
        if let Err(e) = self.output.stop().await {
            warn!("Failed to stop current stream: {}", e);
        }
        self.set_idle();
    }

    async fn close_output(&mut self) {
        if let Err(e) = self.output.close().await {
            warn!("Failed to close audio output: {}", e);
        }
    }

    fn set_idle(&mut self) {
        self.state.status = PlaybackStatus::Idle;
        self.state.current_media = None;
    }
}

fn write_failed(error: crate::HardwareError) -> PlaybackError {
    DeviceError::WriteFailed {
        reason: error.to_string(),
    }
    .into()
}
