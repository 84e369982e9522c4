//! Rotary encoder (KY-040 style) decoding.
//!
//! [`EncoderDecoder`] is a pure state machine: it is fed timestamped line
//! edges and yields at most one [`EncoderAction`] per edge. It never reads
//! hardware and never sleeps, so it is driven directly in tests.
//! [`EncoderInput`] samples three [`InputLine`]s, turns level changes into
//! edges and feeds the decoder.
//!
//! All lines are active-low: a falling edge means the contact closed.
//!
//! Rotation: the first falling edge of CLK or DT arms the decoder. A falling
//! edge of the other line within the bounce window settles one detent
//! (CLK first is clockwise). Further rotation edges inside the window after a
//! settled detent are ignored.
//!
//! Button: one `Confirm` per press. Transitions closer than the bounce window
//! to the previous accepted transition are ignored.

use crate::Result;
use crate::traits::InputLine;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tagplay_core::EncoderEvent;
use tokio::time::Instant;
use tracing::trace;

/// Encoder input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Clk,
    Dt,
    Confirm,
}

/// A level change on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub line: Line,
    /// New level (`true` = high).
    pub level: bool,
    pub at: Instant,
}

impl Edge {
    /// Contact closed.
    pub fn falling(line: Line, at: Instant) -> Self {
        Self {
            line,
            level: false,
            at,
        }
    }

    /// Contact opened.
    pub fn rising(line: Line, at: Instant) -> Self {
        Self {
            line,
            level: true,
            at,
        }
    }
}

/// Decoded gesture, before it is stamped with wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderAction {
    VolumeUp,
    VolumeDown,
    Confirm,
}

impl EncoderAction {
    pub fn stamp(self, at: DateTime<Utc>) -> EncoderEvent {
        match self {
            Self::VolumeUp => EncoderEvent::VolumeUp(at),
            Self::VolumeDown => EncoderEvent::VolumeDown(at),
            Self::Confirm => EncoderEvent::Confirm(at),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RotationState {
    Idle,
    EdgeDetected { first: Line, since: Instant },
    Debouncing { first: Line, since: Instant },
    Settled { at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonState {
    Released { since: Option<Instant> },
    Pressed { since: Instant },
}

/// Debouncing quadrature and push-button decoder.
#[derive(Debug, Clone)]
pub struct EncoderDecoder {
    bounce: Duration,
    rotation: RotationState,
    button: ButtonState,
    dropped: u64,
}

impl EncoderDecoder {
    pub fn new(bounce: Duration) -> Self {
        Self {
            bounce,
            rotation: RotationState::Idle,
            button: ButtonState::Released { since: None },
            dropped: 0,
        }
    }

    /// Rotation edges that never found a partner edge.
    pub fn dropped_edges(&self) -> u64 {
        self.dropped
    }

    /// Feed one edge.
    pub fn feed(&mut self, edge: Edge) -> Option<EncoderAction> {
        match edge.line {
            Line::Clk | Line::Dt => self.feed_rotation(edge),
            Line::Confirm => self.feed_button(edge),
        }
    }

    /// Age out pending state at `now`.
    ///
    /// A lone rotation edge older than the bounce window is dropped, and an
    /// expired post-detent lockout returns the decoder to idle.
    pub fn expire(&mut self, now: Instant) {
        match self.rotation {
            RotationState::EdgeDetected { since, .. } | RotationState::Debouncing { since, .. }
                if now.saturating_duration_since(since) > self.bounce =>
            {
                trace!("Dropping unpaired encoder edge");
                self.dropped += 1;
                self.rotation = RotationState::Idle;
            }
            RotationState::Settled { at } if now.saturating_duration_since(at) >= self.bounce => {
                self.rotation = RotationState::Idle;
            }
            _ => {}
        }
    }

    fn feed_rotation(&mut self, edge: Edge) -> Option<EncoderAction> {
        // Rising edges carry no direction information.
        if edge.level {
            return None;
        }
        let t = edge.at;

        match self.rotation {
            RotationState::Idle => {
                self.rotation = RotationState::EdgeDetected {
                    first: edge.line,
                    since: t,
                };
                None
            }
            RotationState::EdgeDetected { first, since }
            | RotationState::Debouncing { first, since } => {
                if t.saturating_duration_since(since) > self.bounce {
                    self.dropped += 1;
                    self.rotation = RotationState::EdgeDetected {
                        first: edge.line,
                        since: t,
                    };
                    None
                } else if edge.line == first {
                    self.rotation = RotationState::Debouncing { first, since };
                    None
                } else {
                    self.rotation = RotationState::Settled { at: t };
                    Some(if first == Line::Clk {
                        EncoderAction::VolumeUp
                    } else {
                        EncoderAction::VolumeDown
                    })
                }
            }
            RotationState::Settled { at } => {
                if t.saturating_duration_since(at) < self.bounce {
                    None
                } else {
                    self.rotation = RotationState::EdgeDetected {
                        first: edge.line,
                        since: t,
                    };
                    None
                }
            }
        }
    }

    fn feed_button(&mut self, edge: Edge) -> Option<EncoderAction> {
        let t = edge.at;

        match (self.button, edge.level) {
            (ButtonState::Released { since }, false) => {
                let settled =
                    since.is_none_or(|since| t.saturating_duration_since(since) >= self.bounce);
                if settled {
                    self.button = ButtonState::Pressed { since: t };
                    Some(EncoderAction::Confirm)
                } else {
                    None
                }
            }
            (ButtonState::Pressed { since }, true) => {
                if t.saturating_duration_since(since) >= self.bounce {
                    self.button = ButtonState::Released { since: Some(t) };
                }
                None
            }
            _ => None,
        }
    }
}

/// Samples the three encoder lines and decodes their edges.
#[derive(Debug)]
pub struct EncoderInput<L: InputLine> {
    clk: L,
    dt: L,
    confirm: L,
    levels: [bool; 3],
    decoder: EncoderDecoder,
}

impl<L: InputLine> EncoderInput<L> {
    /// Take ownership of the lines and record their current levels.
    ///
    /// # Errors
    ///
    /// Returns an error if any line cannot be read.
    pub fn new(mut clk: L, mut dt: L, mut confirm: L, bounce: Duration) -> Result<Self> {
        let levels = [clk.read_level()?, dt.read_level()?, confirm.read_level()?];

        Ok(Self {
            clk,
            dt,
            confirm,
            levels,
            decoder: EncoderDecoder::new(bounce),
        })
    }

    /// Pins of the CLK, DT and confirm lines.
    pub fn pins(&self) -> [u8; 3] {
        [self.clk.pin(), self.dt.pin(), self.confirm.pin()]
    }

    /// Read all lines once and decode any level changes.
    ///
    /// # Errors
    ///
    /// Returns an error if a line cannot be read; the other lines are not
    /// sampled in that round.
    pub fn sample(&mut self, now: Instant) -> Result<Vec<EncoderAction>> {
        let current = [
            self.clk.read_level()?,
            self.dt.read_level()?,
            self.confirm.read_level()?,
        ];

        self.decoder.expire(now);

        let mut actions = Vec::new();
        for (index, line) in [Line::Clk, Line::Dt, Line::Confirm].into_iter().enumerate() {
            if current[index] == self.levels[index] {
                continue;
            }
            self.levels[index] = current[index];

            let edge = Edge {
                line,
                level: current[index],
                at: now,
            };
            if let Some(action) = self.decoder.feed(edge) {
                actions.push(action);
            }
        }

        Ok(actions)
    }
}
