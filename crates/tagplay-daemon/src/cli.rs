//! Command line and environment configuration.
//!
//! Every option of the daemon can be given as a flag or through the
//! environment variable named next to it, so a `.env`-style systemd
//! `EnvironmentFile` works unchanged.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tagplay_core::constants::*;
use tagplay_core::{AudioSettings, DaemonConfig, EncoderPins, ReaderSettings};

/// Default baud rate of serial RFID readers.
pub const DEFAULT_RFID_BAUD: u32 = 9600;

/// Time a `map` command waits for a tag on the reader, in seconds.
pub const SCAN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(
    name = "tagplay",
    about = "RFID-triggered audio player",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Mapping database location
    #[arg(long, global = true, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Directory media references are resolved against
    #[arg(long, global = true, env = "MEDIA_PATH", default_value = DEFAULT_MEDIA_PATH)]
    pub media_path: PathBuf,

    /// Also append logs to this file
    #[arg(long, global = true, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub hardware: HardwareArgs,

    /// Command to run (default: run the player)
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the player (default)
    Run,

    /// Map a tag to a media file
    Map {
        /// Media reference, relative to the media directory
        media: String,

        /// Tag id; without it the next tag held to the reader is used
        #[arg(long)]
        tag: Option<String>,
    },

    /// Remove the mapping of a tag
    Unmap {
        /// Tag id
        tag: String,
    },

    /// List mappings, flagging those whose media file is missing
    List,

    /// List the files in the media directory
    Files,
}

/// Device wiring and playback options.
#[derive(Debug, Clone, Args)]
pub struct HardwareArgs {
    /// Audio output: `speaker`, `aux` or a device name
    #[arg(long, env = "DEFAULT_AUDIO_DEVICE", default_value = DEFAULT_AUDIO_DEVICE)]
    pub audio_device: String,

    /// Start volume, 0-100
    #[arg(long, env = "DEFAULT_VOLUME", default_value_t = u32::from(DEFAULT_VOLUME))]
    pub volume: u32,

    /// Encoder CLK line (BCM)
    #[arg(long, env = "ENCODER_CLK", default_value_t = DEFAULT_ENCODER_CLK)]
    pub encoder_clk: u8,

    /// Encoder DT line (BCM)
    #[arg(long, env = "ENCODER_DT", default_value_t = DEFAULT_ENCODER_DT)]
    pub encoder_dt: u8,

    /// Encoder push-button line (BCM)
    #[arg(long, env = "ENCODER_CONFIRM", default_value_t = DEFAULT_ENCODER_CONFIRM)]
    pub encoder_confirm: u8,

    /// Encoder debounce window in seconds
    #[arg(long, env = "ENCODER_BOUNCE_TIME", default_value_t = DEFAULT_ENCODER_BOUNCE_SECS)]
    pub encoder_bounce_time: f64,

    /// Failed reads tolerated before the reader is reinitialized
    #[arg(long, env = "MAX_CONSECUTIVE_ERRORS", default_value_t = DEFAULT_MAX_CONSECUTIVE_ERRORS)]
    pub max_consecutive_errors: u32,

    /// Forced reader reinitialization period in seconds
    #[arg(long, env = "REINIT_INTERVAL", default_value_t = DEFAULT_REINIT_INTERVAL_SECS)]
    pub reinit_interval: u64,

    /// Bound of one read attempt in seconds
    #[arg(long, env = "READ_TIMEOUT", default_value_t = DEFAULT_READ_TIMEOUT_SECS)]
    pub read_timeout: f64,

    /// Retries after a failed read attempt
    #[arg(long, env = "READ_WITH_TIMEOUT_MAX_RETRIES", default_value_t = DEFAULT_READ_MAX_RETRIES)]
    pub read_max_retries: u32,

    /// Serial port of the RFID reader (e.g. /dev/ttyUSB0)
    #[arg(long, env = "RFID_SERIAL_PORT")]
    pub rfid_port: Option<String>,

    /// Baud rate of the serial RFID reader
    #[arg(long, env = "RFID_BAUD_RATE", default_value_t = DEFAULT_RFID_BAUD)]
    pub rfid_baud: u32,

    /// spidev node of the MFRC522 reader, used when no serial port is set
    #[arg(long, env = "RFID_SPI_DEVICE", default_value = SPI_DEVICE_NODE)]
    pub rfid_spi: String,

    /// Use simulated devices instead of hardware
    #[arg(long, env = "TAGPLAY_SIMULATE")]
    pub simulate: bool,

    /// Do not wait for the device nodes at startup
    #[arg(long)]
    pub skip_readiness: bool,
}

impl Cli {
    /// The command to run, `run` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Validate the options into a [`DaemonConfig`].
    ///
    /// # Errors
    ///
    /// Returns the first invalid option (pin out of range or reused, volume
    /// above 100, non-positive bounce time or timeout).
    pub fn daemon_config(&self) -> tagplay_core::Result<DaemonConfig> {
        let hw = &self.hardware;

        let audio = AudioSettings::new(hw.audio_device.clone(), hw.volume)?;
        let encoder = EncoderPins::new(
            hw.encoder_clk,
            hw.encoder_dt,
            hw.encoder_confirm,
            hw.encoder_bounce_time,
        )?;
        let reader = ReaderSettings::new(
            hw.max_consecutive_errors,
            hw.reinit_interval,
            hw.read_timeout,
            hw.read_max_retries,
        )?;

        Ok(DaemonConfig::default()
            .with_media_path(self.media_path.clone())
            .with_database_url(self.database_url.clone())
            .with_audio(audio)
            .with_encoder(encoder)
            .with_reader(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tagplay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_run_player() {
        let cli = parse(&[]);
        assert_eq!(cli.command(), Command::Run);

        let config = cli.daemon_config().unwrap();
        assert_eq!(config.audio.device, DEFAULT_AUDIO_DEVICE);
        assert_eq!(config.encoder.clk, DEFAULT_ENCODER_CLK);
        assert_eq!(config.reader.max_retries, DEFAULT_READ_MAX_RETRIES);
        assert_eq!(cli.hardware.rfid_spi, SPI_DEVICE_NODE);
        assert_eq!(cli.hardware.rfid_port, None);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--media-path",
            "/mnt/usb/audio",
            "--audio-device",
            "aux",
            "--volume",
            "60",
            "--encoder-bounce-time",
            "0.05",
            "--read-timeout",
            "1.5",
        ]);

        let config = cli.daemon_config().unwrap();
        assert_eq!(config.media_path, PathBuf::from("/mnt/usb/audio"));
        assert_eq!(config.audio.device, "aux");
        assert_eq!(config.audio.default_volume, 60);
        assert_eq!(config.encoder.bounce_time, Duration::from_millis(50));
        assert_eq!(config.reader.read_timeout, Duration::from_millis(1500));
    }

    #[rstest]
    #[case(&["--volume", "101"])]
    #[case(&["--encoder-clk", "27"])]
    #[case(&["--encoder-dt", "60"])]
    #[case(&["--encoder-bounce-time", "0"])]
    #[case(&["--read-timeout", "0"])]
    #[case(&["--read-timeout", "1e20"])]
    #[case(&["--max-consecutive-errors", "0"])]
    fn test_invalid_values_rejected(#[case] args: &[&str]) {
        let cli = parse(args);
        assert!(cli.daemon_config().is_err());
    }

    #[test]
    fn test_malformed_pin_is_parse_error() {
        let result = Cli::try_parse_from(["tagplay", "--encoder-clk", "GPIO17"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_map_subcommand() {
        let cli = parse(&["map", "stories/fox.mp3", "--tag", "ABC123"]);
        assert_eq!(
            cli.command(),
            Command::Map {
                media: "stories/fox.mp3".to_string(),
                tag: Some("ABC123".to_string()),
            }
        );
    }
}
