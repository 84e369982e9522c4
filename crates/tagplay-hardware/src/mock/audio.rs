//! Mock audio output for testing and development.
//!
//! Records every command it receives so tests can assert on what the
//! playback controller asked the device to do.

use crate::{
    HardwareError, Result,
    traits::AudioOutput,
    types::DeviceInfo,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A command received by [`MockAudio`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCommand {
    /// `open(device)` was called (recorded even when it fails).
    Open(String),
    Close,
    Load(PathBuf),
    Pause,
    Resume,
    Stop,
    SetVolume(u8),
}

#[derive(Debug, Default)]
struct OutputState {
    commands: Vec<AudioCommand>,
    fail_open: bool,
    fail_load: bool,
    unavailable: HashSet<String>,
    finished: bool,
    volume: Option<u8>,
    device: Option<String>,
}

/// Mock audio output.
///
/// # Examples
///
/// ```
/// use tagplay_hardware::mock::{AudioCommand, MockAudio};
/// use tagplay_hardware::traits::AudioOutput;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> tagplay_hardware::Result<()> {
///     let (mut output, handle) = MockAudio::new();
///
///     output.open("speaker").await?;
///     output.load(Path::new("media/fox.mp3")).await?;
///
///     assert_eq!(handle.load_count().await, 1);
///     assert_eq!(
///         handle.commands().await.first(),
///         Some(&AudioCommand::Open("speaker".to_string()))
///     );
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockAudio {
    name: String,
    open: bool,
    state: Arc<Mutex<OutputState>>,
}

impl MockAudio {
    /// Create a new mock audio output and its controlling handle.
    pub fn new() -> (Self, MockAudioHandle) {
        let state = Arc::new(Mutex::new(OutputState::default()));

        let output = Self {
            name: "Mock Audio".to_string(),
            open: false,
            state: Arc::clone(&state),
        };

        (output, MockAudioHandle { state })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(HardwareError::not_open(self.name.clone()))
        }
    }
}

impl Default for MockAudio {
    fn default() -> Self {
        Self::new().0
    }
}

impl AudioOutput for MockAudio {
    async fn open(&mut self, device: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.commands.push(AudioCommand::Open(device.to_string()));

        if state.fail_open || state.unavailable.contains(device) {
            self.open = false;
            state.device = None;
            return Err(HardwareError::initialization_failed(format!(
                "audio device '{device}' is unavailable"
            )));
        }

        self.open = true;
        state.device = Some(device.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().await;
        if self.open {
            state.commands.push(AudioCommand::Close);
        }
        self.open = false;
        state.device = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;

        if state.fail_load {
            return Err(HardwareError::communication(format!(
                "cannot decode {}",
                path.display()
            )));
        }

        state.commands.push(AudioCommand::Load(path.to_path_buf()));
        state.finished = false;
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().await.commands.push(AudioCommand::Pause);
        Ok(())
    }

    async fn resume(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().await.commands.push(AudioCommand::Resume);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.state.lock().await.commands.push(AudioCommand::Stop);
        Ok(())
    }

    async fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state.commands.push(AudioCommand::SetVolume(volume));
        state.volume = Some(volume);
        Ok(())
    }

    async fn is_finished(&self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.state.lock().await.finished)
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        let device = self
            .state
            .lock()
            .await
            .device
            .clone()
            .unwrap_or_else(|| "closed".to_string());
        Ok(DeviceInfo::new(self.name.clone(), device))
    }
}

/// Handle for controlling and inspecting a [`MockAudio`].
#[derive(Debug, Clone)]
pub struct MockAudioHandle {
    state: Arc<Mutex<OutputState>>,
}

impl MockAudioHandle {
    /// All commands received so far, oldest first.
    pub async fn commands(&self) -> Vec<AudioCommand> {
        self.state.lock().await.commands.clone()
    }

    /// Forget the recorded commands.
    pub async fn clear_commands(&self) {
        self.state.lock().await.commands.clear();
    }

    /// Number of successful `load()` calls.
    pub async fn load_count(&self) -> usize {
        self.state
            .lock()
            .await
            .commands
            .iter()
            .filter(|command| matches!(command, AudioCommand::Load(_)))
            .count()
    }

    /// Path of the most recent successful `load()`.
    pub async fn last_loaded(&self) -> Option<PathBuf> {
        self.state
            .lock()
            .await
            .commands
            .iter()
            .rev()
            .find_map(|command| match command {
                AudioCommand::Load(path) => Some(path.clone()),
                _ => None,
            })
    }

    /// Make every `open()` fail (or succeed again).
    pub async fn set_fail_open(&self, fail: bool) {
        self.state.lock().await.fail_open = fail;
    }

    /// Make every `load()` fail (or succeed again).
    pub async fn set_fail_load(&self, fail: bool) {
        self.state.lock().await.fail_load = fail;
    }

    /// Make `open()` fail for one device name only.
    pub async fn mark_unavailable(&self, device: impl Into<String>) {
        self.state.lock().await.unavailable.insert(device.into());
    }

    /// Simulate the loaded stream reaching its end.
    pub async fn finish_track(&self) {
        self.state.lock().await.finished = true;
    }

    /// Last volume written to the device.
    pub async fn volume(&self) -> Option<u8> {
        self.state.lock().await.volume
    }

    /// Device the output is currently open on.
    pub async fn current_device(&self) -> Option<String> {
        self.state.lock().await.device.clone()
    }
}
