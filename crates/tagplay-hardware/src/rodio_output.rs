//! Audio output through rodio.
//!
//! rodio's `OutputStream` is not `Send`, so the stream and its sink live on a
//! dedicated thread. [`RodioOutput`] forwards each command over a channel and
//! awaits the reply on a oneshot.

use crate::{HardwareError, Result, traits::AudioOutput, types::DeviceInfo};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Device substring matched for the `aux` alias (on-board jack).
const AUX_DEVICE_MATCH: &str = "headphones";

type Reply = oneshot::Sender<std::result::Result<bool, String>>;

#[derive(Debug)]
enum Command {
    Load(PathBuf),
    Pause,
    Resume,
    Stop,
    SetVolume(u8),
    IsFinished,
}

struct Request {
    command: Command,
    reply: Reply,
}

/// rodio-backed [`AudioOutput`].
#[derive(Debug, Default)]
pub struct RodioOutput {
    worker: Option<mpsc::Sender<Request>>,
    device_name: Option<String>,
}

impl RodioOutput {
    /// Create a closed output.
    pub fn new() -> Self {
        Self::default()
    }

    async fn request(&self, command: Command) -> Result<bool> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| HardwareError::not_open("rodio output"))?;

        let (reply, response) = oneshot::channel();
        worker
            .send(Request { command, reply })
            .map_err(|_| HardwareError::disconnected("audio output thread"))?;

        response
            .await
            .map_err(|_| HardwareError::disconnected("audio output thread"))?
            .map_err(HardwareError::communication)
    }
}

impl AudioOutput for RodioOutput {
    async fn open(&mut self, device: &str) -> Result<()> {
        self.close().await?;

        let (requests, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let wanted = device.to_string();

        std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || run_output_thread(&wanted, ready_tx, inbox))?;

        let name = ready_rx
            .await
            .map_err(|_| HardwareError::initialization_failed("audio thread exited"))?
            .map_err(HardwareError::initialization_failed)?;

        info!("Audio output '{}' opened on {}", device, name);
        self.worker = Some(requests);
        self.device_name = Some(name);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the sender ends the thread's receive loop.
        if self.worker.take().is_some() {
            debug!("Audio output closed");
        }
        self.device_name = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.worker.is_some()
    }

    async fn load(&mut self, path: &Path) -> Result<()> {
        self.request(Command::Load(path.to_path_buf())).await.map(|_| ())
    }

    async fn pause(&mut self) -> Result<()> {
        self.request(Command::Pause).await.map(|_| ())
    }

    async fn resume(&mut self) -> Result<()> {
        self.request(Command::Resume).await.map(|_| ())
    }

    async fn stop(&mut self) -> Result<()> {
        self.request(Command::Stop).await.map(|_| ())
    }

    async fn set_volume(&mut self, volume: u8) -> Result<()> {
        self.request(Command::SetVolume(volume)).await.map(|_| ())
    }

    async fn is_finished(&self) -> Result<bool> {
        self.request(Command::IsFinished).await
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(
            "rodio",
            self.device_name.clone().unwrap_or_else(|| "closed".to_string()),
        ))
    }
}

/// Lowercase substring to look for in device names, `None` for the host default.
fn device_match(device: &str) -> Option<String> {
    let wanted = device.trim().to_lowercase();
    match wanted.as_str() {
        "speaker" | "default" => None,
        "aux" => Some(AUX_DEVICE_MATCH.to_string()),
        _ => Some(wanted),
    }
}

fn open_stream(device: &str) -> std::result::Result<(OutputStream, OutputStreamHandle, String), String> {
    let host = rodio::cpal::default_host();

    let Some(needle) = device_match(device) else {
        let (stream, handle) = OutputStream::try_default().map_err(|e| e.to_string())?;
        let name = host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_else(|| "default".to_string());
        return Ok((stream, handle, name));
    };

    let devices = host.output_devices().map_err(|e| e.to_string())?;
    for candidate in devices {
        let Ok(name) = candidate.name() else {
            continue;
        };
        if name.to_lowercase().contains(&needle) {
            let (stream, handle) =
                OutputStream::try_from_device(&candidate).map_err(|e| e.to_string())?;
            return Ok((stream, handle, name));
        }
    }

    Err(format!("no output device matching '{device}'"))
}

fn run_output_thread(
    device: &str,
    ready: oneshot::Sender<std::result::Result<String, String>>,
    inbox: mpsc::Receiver<Request>,
) {
    let (_stream, handle, name) = match open_stream(device) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(name)).is_err() {
        return;
    }

    let mut sink: Option<Sink> = None;
    let mut volume = 1.0f32;

    while let Ok(Request { command, reply }) = inbox.recv() {
        let result = match command {
            Command::Load(path) => {
                if let Some(previous) = sink.take() {
                    previous.stop();
                }
                start_sink(&handle, &path, volume).map(|started| {
                    sink = Some(started);
                    true
                })
            }
            Command::Pause => {
                if let Some(sink) = &sink {
                    sink.pause();
                }
                Ok(true)
            }
            Command::Resume => {
                if let Some(sink) = &sink {
                    sink.play();
                }
                Ok(true)
            }
            Command::Stop => {
                if let Some(sink) = sink.take() {
                    sink.stop();
                }
                Ok(true)
            }
            Command::SetVolume(percent) => {
                volume = f32::from(percent) / 100.0;
                if let Some(sink) = &sink {
                    sink.set_volume(volume);
                }
                Ok(true)
            }
            Command::IsFinished => Ok(sink.as_ref().is_none_or(Sink::empty)),
        };

        if reply.send(result).is_err() {
            warn!("Audio command reply dropped");
        }
    }
}

fn start_sink(
    handle: &OutputStreamHandle,
    path: &Path,
    volume: f32,
) -> std::result::Result<Sink, String> {
    let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let source =
        Decoder::new(BufReader::new(file)).map_err(|e| format!("{}: {e}", path.display()))?;
    let sink = Sink::try_new(handle).map_err(|e| e.to_string())?;

    sink.set_volume(volume);
    sink.append(source);
    sink.play();
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("speaker", None)]
    #[case("Default", None)]
    #[case("aux", Some("headphones"))]
    #[case(" USB Audio ", Some("usb audio"))]
    fn test_device_match(#[case] device: &str, #[case] expected: Option<&str>) {
        assert_eq!(device_match(device).as_deref(), expected);
    }

    #[tokio::test]
    async fn test_rodio_output_requires_open() {
        let mut output = RodioOutput::new();
        assert!(!output.is_open());
        assert!(matches!(
            output.pause().await,
            Err(HardwareError::NotOpen { .. })
        ));
        assert_eq!(output.get_info().await.unwrap().model, "closed");
    }
}
