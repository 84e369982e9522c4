//! GPIO input lines.
//!
//! With the `hardware-gpio` feature, [`CdevLine`] requests lines from the
//! GPIO character device (`/dev/gpiochipN`). Lines are looked up by their
//! `GPIOn` name, since kernels since 6.6 no longer number the Raspberry Pi
//! header from zero.
//!
//! [`SysfsLine`] remains for kernels without the character device: each line
//! is exported under `/sys/class/gpio`, configured as an input and sampled
//! by reading its `value` file (`0` or `1`).

use crate::{HardwareError, Result, traits::InputLine};
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root of the sysfs GPIO class.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Consumer label shown for requested lines.
pub const GPIO_CONSUMER: &str = "tagplay";

/// Name of the header pin `pin` in the chip's line table.
pub fn line_name(pin: u8) -> String {
    format!("GPIO{pin}")
}

/// An input line read through `/sys/class/gpio/gpioN/value`.
#[derive(Debug)]
pub struct SysfsLine {
    pin: u8,
    path: PathBuf,
    value: File,
}

impl SysfsLine {
    /// Export `pin` (if needed) and open it as an input.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be exported or its value file
    /// cannot be opened.
    pub fn open(pin: u8) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), pin)
    }

    /// Like [`open`](Self::open), with an alternative sysfs root.
    pub fn open_at(root: &Path, pin: u8) -> Result<Self> {
        let line_dir = root.join(format!("gpio{pin}"));

        if !line_dir.exists() {
            debug!("Exporting GPIO {}", pin);
            fs::write(root.join("export"), pin.to_string())?;
        }

        fs::write(line_dir.join("direction"), "in").map_err(|e| {
            HardwareError::initialization_failed(format!(
                "cannot configure GPIO {pin} as input: {e}"
            ))
        })?;

        let path = line_dir.join("value");
        let value = File::open(&path)?;

        Ok(Self { pin, path, value })
    }

    /// Path of the value file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InputLine for SysfsLine {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn read_level(&mut self) -> Result<bool> {
        let mut buf = [0u8; 1];
        self.value.seek(SeekFrom::Start(0))?;
        self.value.read_exact(&mut buf)?;

        match buf[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(HardwareError::invalid_data(format!(
                "GPIO {} value is {:?}",
                self.pin, other as char
            ))),
        }
    }
}

#[cfg(feature = "hardware-gpio")]
pub use cdev::CdevLine;

#[cfg(feature = "hardware-gpio")]
mod cdev {
    use super::{GPIO_CONSUMER, line_name};
    use crate::{HardwareError, Result, traits::InputLine};
    use gpiocdev::Request;
    use gpiocdev::line::{Bias, Value};
    use std::path::PathBuf;
    use tracing::debug;

    /// Chip searched when no line carries the pin's name.
    const DEFAULT_GPIO_CHIP: &str = "/dev/gpiochip0";

    /// An input line requested from the GPIO character device, pulled up.
    pub struct CdevLine {
        pin: u8,
        chip: PathBuf,
        offset: u32,
        request: Request,
    }

    impl CdevLine {
        /// Request header pin `pin` as an input.
        ///
        /// The line is found by name first; without a match the pin number
        /// is used as the offset on the first chip.
        ///
        /// # Errors
        ///
        /// Returns `HardwareError::InitializationFailed` if the line cannot
        /// be requested (missing chip, line busy, no permission).
        pub fn open(pin: u8) -> Result<Self> {
            let (chip, offset) = match gpiocdev::find_named_line(&line_name(pin)) {
                Some(found) => (found.chip, found.info.offset),
                None => (PathBuf::from(DEFAULT_GPIO_CHIP), u32::from(pin)),
            };

            let request = Request::builder()
                .on_chip(chip.clone())
                .with_consumer(GPIO_CONSUMER)
                .with_line(offset)
                .as_input()
                .with_bias(Bias::PullUp)
                .request()
                .map_err(|e| {
                    HardwareError::initialization_failed(format!(
                        "cannot request GPIO {pin} ({} line {offset}): {e}",
                        chip.display()
                    ))
                })?;

            debug!("Requested GPIO {} as {} line {}", pin, chip.display(), offset);
            Ok(Self {
                pin,
                chip,
                offset,
                request,
            })
        }
    }

    impl std::fmt::Debug for CdevLine {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CdevLine")
                .field("pin", &self.pin)
                .field("chip", &self.chip)
                .field("offset", &self.offset)
                .finish()
        }
    }

    impl InputLine for CdevLine {
        fn pin(&self) -> u8 {
            self.pin
        }

        fn read_level(&mut self) -> Result<bool> {
            let value = self.request.value(self.offset).map_err(|e| {
                HardwareError::communication(format!("GPIO {} read failed: {e}", self.pin))
            })?;
            Ok(value == Value::Active)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_line(root: &Path, pin: u8, value: &str) {
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), "out").unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    #[test]
    fn test_sysfs_line_reads_levels() {
        let root = TempDir::new().unwrap();
        fake_line(root.path(), 17, "1\n");

        let mut line = SysfsLine::open_at(root.path(), 17).unwrap();
        assert_eq!(line.pin(), 17);
        assert!(line.read_level().unwrap());

        fs::write(line.path(), "0\n").unwrap();
        assert!(!line.read_level().unwrap());

        let direction = fs::read_to_string(root.path().join("gpio17/direction")).unwrap();
        assert_eq!(direction, "in");
    }

    #[test]
    fn test_sysfs_line_rejects_garbage() {
        let root = TempDir::new().unwrap();
        fake_line(root.path(), 18, "x");

        let mut line = SysfsLine::open_at(root.path(), 18).unwrap();
        assert!(matches!(
            line.read_level(),
            Err(HardwareError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_line_name() {
        assert_eq!(line_name(17), "GPIO17");
    }

    #[test]
    fn test_sysfs_line_missing_after_export() {
        let root = TempDir::new().unwrap();

        assert!(SysfsLine::open_at(root.path(), 27).is_err());
        let exported = fs::read_to_string(root.path().join("export")).unwrap();
        assert_eq!(exported, "27");
    }
}
