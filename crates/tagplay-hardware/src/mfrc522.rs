//! MFRC522 RFID readers (ISO 14443A, 13.56 MHz).
//!
//! The chip is driven through its register file. [`Mfrc522`] implements the
//! card dialogue on top of any [`RegisterBus`]; with the `hardware-spi`
//! feature, [`SpiRfid`] runs it over a Linux spidev node.
//!
//! One poll is: wake-up request (WUPA), cascade level 1 anticollision,
//! SELECT, then HALT. Halting the card lets the next WUPA wake it again, so a
//! card resting on the antenna is reported on every poll.
//!
//! Tag ids are the four UID bytes followed by their check byte, read as one
//! big-endian number and printed in decimal (`"584183854250"`).

use crate::{HardwareError, Result};
use tracing::debug;

// Registers.
const COMMAND: u8 = 0x01;
const COM_IEN: u8 = 0x02;
const COM_IRQ: u8 = 0x04;
const ERROR: u8 = 0x06;
const FIFO_DATA: u8 = 0x09;
const FIFO_LEVEL: u8 = 0x0A;
const CONTROL: u8 = 0x0C;
const BIT_FRAMING: u8 = 0x0D;
const MODE: u8 = 0x11;
const TX_CONTROL: u8 = 0x14;
const TX_ASK: u8 = 0x15;
const T_MODE: u8 = 0x2A;
const T_PRESCALER: u8 = 0x2B;
const T_RELOAD_H: u8 = 0x2C;
const T_RELOAD_L: u8 = 0x2D;
const VERSION: u8 = 0x37;

// Chip commands.
const CMD_IDLE: u8 = 0x00;
const CMD_TRANSCEIVE: u8 = 0x0C;
const CMD_SOFT_RESET: u8 = 0x0F;

// Card commands.
const PICC_WUPA: u8 = 0x52;
const PICC_CASCADE_1: u8 = 0x93;
const PICC_HLTA: u8 = 0x50;

/// `ComIrqReg` bits: receiver done, idle, timer expired.
const IRQ_RX: u8 = 0x20;
const IRQ_IDLE: u8 = 0x10;
const IRQ_TIMER: u8 = 0x01;

/// `ErrorReg` bits that void a reply: buffer overflow, collision, parity, protocol.
const ERROR_MASK: u8 = 0x1B;

/// Register reads spent waiting for one transceive to finish.
const TRANSCEIVE_POLLS: usize = 2000;

/// Raw access to the chip's registers.
pub trait RegisterBus {
    fn read_register(&mut self, register: u8) -> Result<u8>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;
}

/// Address byte for an SPI register access.
pub const fn spi_address(register: u8, read: bool) -> u8 {
    let address = (register << 1) & 0x7E;
    if read { address | 0x80 } else { address }
}

/// ISO 14443A CRC (CRC_A), low byte first.
pub fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut b = byte ^ (crc as u8);
        b ^= b << 4;
        let b = u16::from(b);
        crc = (crc >> 8) ^ (b << 8) ^ (b << 3) ^ (b >> 4);
    }
    crc.to_le_bytes()
}

/// Bits received in a reply, from `FIFOLevelReg` and `ControlReg.RxLastBits`.
pub fn received_bits(fifo_level: u8, last_bits: u8) -> usize {
    let level = usize::from(fifo_level);
    match last_bits & 0x07 {
        0 => level * 8,
        last => level.saturating_sub(1) * 8 + usize::from(last),
    }
}

/// Validate an anticollision reply: four UID bytes and their XOR check byte.
///
/// # Errors
///
/// Returns `HardwareError::InvalidData` for a short frame or a check byte
/// mismatch (usually two cards in the field).
pub fn parse_anticollision(frame: &[u8]) -> Result<[u8; 5]> {
    let uid: [u8; 5] = frame.try_into().map_err(|_| {
        HardwareError::invalid_data(format!("anticollision reply has {} bytes", frame.len()))
    })?;

    let check = uid[..4].iter().fold(0u8, |acc, b| acc ^ b);
    if check != uid[4] {
        return Err(HardwareError::invalid_data(format!(
            "UID check byte {:#04x} does not match {:#04x}",
            uid[4], check
        )));
    }
    Ok(uid)
}

/// Decimal tag id of a UID and its check byte.
pub fn tag_id(uid: &[u8; 5]) -> String {
    uid.iter()
        .fold(0u64, |n, &b| n * 256 + u64::from(b))
        .to_string()
}

/// Outcome of one transceive.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Data { bytes: Vec<u8>, bits: usize },
    NoCard,
    Failed,
}

/// MFRC522 card dialogue over a register bus.
#[derive(Debug)]
pub struct Mfrc522<B> {
    bus: B,
}

impl<B: RegisterBus> Mfrc522<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    /// Reset the chip, program the receive timeout and switch the antenna on.
    ///
    /// Returns the chip's version byte.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if nothing answers on
    /// the bus, or the bus error.
    pub fn init(&mut self) -> Result<u8> {
        self.bus.write_register(COMMAND, CMD_SOFT_RESET)?;
        for _ in 0..TRANSCEIVE_POLLS {
            // PowerDown clears once the reset is done.
            if self.bus.read_register(COMMAND)? & 0x10 == 0 {
                break;
            }
        }

        // ~25 ms receive timeout.
        self.bus.write_register(T_MODE, 0x8D)?;
        self.bus.write_register(T_PRESCALER, 0x3E)?;
        self.bus.write_register(T_RELOAD_L, 30)?;
        self.bus.write_register(T_RELOAD_H, 0)?;
        self.bus.write_register(TX_ASK, 0x40)?;
        self.bus.write_register(MODE, 0x3D)?;

        let tx = self.bus.read_register(TX_CONTROL)?;
        if tx & 0x03 != 0x03 {
            self.bus.write_register(TX_CONTROL, tx | 0x03)?;
        }

        let version = self.bus.read_register(VERSION)?;
        if version == 0x00 || version == 0xFF {
            return Err(HardwareError::initialization_failed(format!(
                "no MFRC522 answering, version register reads {version:#04x}"
            )));
        }
        Ok(version)
    }

    /// Look for a card once.
    ///
    /// Returns `Ok(None)` for an empty field and for garbled replies.
    ///
    /// # Errors
    ///
    /// Only bus failures are errors.
    pub fn poll_uid(&mut self) -> Result<Option<String>> {
        // WUPA is a 7-bit short frame.
        self.bus.write_register(BIT_FRAMING, 0x07)?;
        match self.transceive(&[PICC_WUPA])? {
            Reply::Data { bits: 16, .. } => {}
            _ => return Ok(None),
        }

        self.bus.write_register(BIT_FRAMING, 0x00)?;
        let uid = match self.transceive(&[PICC_CASCADE_1, 0x20])? {
            Reply::Data { bytes, .. } => match parse_anticollision(&bytes) {
                Ok(uid) => uid,
                Err(e) => {
                    debug!("Discarding anticollision reply: {}", e);
                    return Ok(None);
                }
            },
            _ => return Ok(None),
        };

        let mut select = vec![PICC_CASCADE_1, 0x70];
        select.extend_from_slice(&uid);
        select.extend_from_slice(&crc_a(&select));
        if !matches!(self.transceive(&select)?, Reply::Data { bits: 24, .. }) {
            debug!("Card did not acknowledge SELECT");
        }

        // A halted card stays silent, so no reply is expected here.
        let mut halt = vec![PICC_HLTA, 0x00];
        halt.extend_from_slice(&crc_a(&halt));
        self.transceive(&halt)?;

        Ok(Some(tag_id(&uid)))
    }

    fn set_bits(&mut self, register: u8, mask: u8) -> Result<()> {
        let value = self.bus.read_register(register)?;
        self.bus.write_register(register, value | mask)
    }

    fn clear_bits(&mut self, register: u8, mask: u8) -> Result<()> {
        let value = self.bus.read_register(register)?;
        self.bus.write_register(register, value & !mask)
    }

    fn transceive(&mut self, frame: &[u8]) -> Result<Reply> {
        self.bus.write_register(COM_IEN, 0x77 | 0x80)?;
        // Set1 cleared: every marked bit is cleared.
        self.bus.write_register(COM_IRQ, 0x7F)?;
        self.bus.write_register(FIFO_LEVEL, 0x80)?;
        self.bus.write_register(COMMAND, CMD_IDLE)?;

        for &byte in frame {
            self.bus.write_register(FIFO_DATA, byte)?;
        }
        self.bus.write_register(COMMAND, CMD_TRANSCEIVE)?;
        self.set_bits(BIT_FRAMING, 0x80)?;

        let mut irq = 0;
        for _ in 0..TRANSCEIVE_POLLS {
            irq = self.bus.read_register(COM_IRQ)?;
            if irq & (IRQ_RX | IRQ_IDLE | IRQ_TIMER) != 0 {
                break;
            }
        }
        self.clear_bits(BIT_FRAMING, 0x80)?;

        if irq & (IRQ_RX | IRQ_IDLE) == 0 {
            return Ok(Reply::NoCard);
        }
        let error = self.bus.read_register(ERROR)?;
        if error & ERROR_MASK != 0 {
            debug!("MFRC522 error register reads {:#04x}", error);
            return Ok(Reply::Failed);
        }
        if irq & IRQ_TIMER != 0 {
            return Ok(Reply::NoCard);
        }

        let level = self.bus.read_register(FIFO_LEVEL)?;
        let last_bits = self.bus.read_register(CONTROL)?;
        let bits = received_bits(level, last_bits);

        let count = level.clamp(1, 16);
        let mut bytes = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            bytes.push(self.bus.read_register(FIFO_DATA)?);
        }
        Ok(Reply::Data { bytes, bits })
    }
}

#[cfg(feature = "hardware-spi")]
pub use spi::{SpiBus, SpiRfid};

#[cfg(feature = "hardware-spi")]
mod spi {
    use super::{Mfrc522, RegisterBus, spi_address};
    use crate::{HardwareError, Result, traits::RfidDevice, types::ReaderInfo};
    use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
    use tracing::debug;

    const SPI_SPEED_HZ: u32 = 1_000_000;

    /// Register access over a spidev node.
    pub struct SpiBus {
        spi: Spidev,
    }

    impl SpiBus {
        /// Open and configure `path` (SPI mode 0, 1 MHz).
        ///
        /// # Errors
        ///
        /// Returns the I/O error if the node cannot be opened or configured.
        pub fn open(path: &str) -> Result<Self> {
            let mut spi = Spidev::open(path)?;
            let options = SpidevOptions::new()
                .bits_per_word(8)
                .max_speed_hz(SPI_SPEED_HZ)
                .mode(SpiModeFlags::SPI_MODE_0)
                .build();
            spi.configure(&options)?;
            Ok(Self { spi })
        }

        fn exchange(&mut self, tx: [u8; 2]) -> Result<[u8; 2]> {
            let mut rx = [0u8; 2];
            let mut transfer = SpidevTransfer::read_write(&tx, &mut rx);
            self.spi
                .transfer(&mut transfer)
                .map_err(|e| HardwareError::communication(format!("SPI transfer failed: {e}")))?;
            Ok(rx)
        }
    }

    impl RegisterBus for SpiBus {
        fn read_register(&mut self, register: u8) -> Result<u8> {
            let rx = self.exchange([spi_address(register, true), 0])?;
            Ok(rx[1])
        }

        fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
            self.exchange([spi_address(register, false), value])?;
            Ok(())
        }
    }

    /// MFRC522 reader on a spidev node.
    ///
    /// Bus transfers run on the blocking pool. A poll abandoned mid-transfer
    /// (the read timed out) takes the handle with it; later polls report the
    /// reader as not open until it is reinitialized.
    pub struct SpiRfid {
        path: String,
        chip: Option<Mfrc522<SpiBus>>,
        version: Option<u8>,
    }

    impl SpiRfid {
        /// Reader on `path`, e.g. `/dev/spidev0.0`. Nothing is opened yet.
        pub fn new(path: impl Into<String>) -> Self {
            Self {
                path: path.into(),
                chip: None,
                version: None,
            }
        }
    }

    impl std::fmt::Debug for SpiRfid {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("SpiRfid")
                .field("path", &self.path)
                .field("version", &self.version)
                .field("open", &self.chip.is_some())
                .finish()
        }
    }

    fn join_failed(e: tokio::task::JoinError) -> HardwareError {
        HardwareError::communication(format!("SPI worker failed: {e}"))
    }

    impl RfidDevice for SpiRfid {
        async fn open(&mut self) -> Result<()> {
            let path = self.path.clone();
            let (chip, version) = tokio::task::spawn_blocking(move || {
                let bus = SpiBus::open(&path).map_err(|e| {
                    HardwareError::initialization_failed(format!("{path}: {e}"))
                })?;
                let mut chip = Mfrc522::new(bus);
                let version = chip.init()?;
                Ok::<_, HardwareError>((chip, version))
            })
            .await
            .map_err(join_failed)??;

            debug!("Opened MFRC522 (version {:#04x}) on {}", version, self.path);
            self.chip = Some(chip);
            self.version = Some(version);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            if self.chip.take().is_some() {
                debug!("Closed MFRC522 on {}", self.path);
            }
            Ok(())
        }

        async fn poll_tag(&mut self) -> Result<Option<String>> {
            let Some(mut chip) = self.chip.take() else {
                return Err(HardwareError::not_open(self.path.clone()));
            };

            let (chip, result) = tokio::task::spawn_blocking(move || {
                let result = chip.poll_uid();
                (chip, result)
            })
            .await
            .map_err(join_failed)?;

            self.chip = Some(chip);
            result
        }

        async fn get_reader_info(&self) -> Result<ReaderInfo> {
            let name = match self.version {
                Some(version) => format!("MFRC522 v{version:#04x} on {}", self.path),
                None => format!("MFRC522 on {}", self.path),
            };
            Ok(ReaderInfo::new(name, vec!["ISO14443A".to_string()]))
        }
    }
}
