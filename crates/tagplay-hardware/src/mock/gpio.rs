//! Mock GPIO input line.

use crate::{Result, traits::InputLine};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Simulated input line. Starts high (pulled up, contact open).
#[derive(Debug)]
pub struct MockLine {
    pin: u8,
    level: Arc<AtomicBool>,
}

impl MockLine {
    /// Create a line on `pin` and the handle that drives it.
    pub fn new(pin: u8) -> (Self, MockLineHandle) {
        let level = Arc::new(AtomicBool::new(true));
        (
            Self {
                pin,
                level: Arc::clone(&level),
            },
            MockLineHandle { level },
        )
    }
}

impl InputLine for MockLine {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn read_level(&mut self) -> Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Drives the level of a [`MockLine`].
#[derive(Debug, Clone)]
pub struct MockLineHandle {
    level: Arc<AtomicBool>,
}

impl MockLineHandle {
    /// Set the line level (`true` = high).
    pub fn set_level(&self, high: bool) {
        self.level.store(high, Ordering::SeqCst);
    }

    /// Pull the line low (contact closed).
    pub fn press(&self) {
        self.set_level(false);
    }

    /// Let the line float back high.
    pub fn release(&self) {
        self.set_level(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_line_levels() {
        let (mut line, handle) = MockLine::new(27);
        assert_eq!(line.pin(), 27);
        assert!(line.read_level().unwrap());

        handle.press();
        assert!(!line.read_level().unwrap());

        handle.release();
        assert!(line.read_level().unwrap());
    }
}
