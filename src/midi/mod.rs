// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI output abstraction layer.
//!
//! This module provides:
//! - The `OutputSink` trait the core emits triggers through
//! - Channel allocation with the reserved percussion channel
//! - Cached, self-recovering output connections
//! - The midir-based hardware backend

pub mod channels;
pub mod connection;
pub mod midir_backend;

pub use channels::{ChannelAllocator, DRUM_CHANNEL};
pub use connection::{ConnectionError, ConnectionManager, DeviceProvider, SharedSink};
pub use midir_backend::{list_destinations, print_destinations, MidirProvider, MidirSink};

use anyhow::Result;

/// Output sink the core emits musical events through.
///
/// Implementations cover hardware MIDI connections and the built-in
/// fallback synthesizer; the core never touches device discovery
/// beyond the `ConnectionManager` contract.
pub trait OutputSink: Send {
    /// Send a note-on
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()>;

    /// Send a note-off
    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()>;

    /// Send a control change
    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()>;

    /// Send a program change with bank select
    fn program_change(&mut self, channel: u8, program: u8, bank: u16) -> Result<()>;

    /// Cheap liveness probe; the default assumes the sink is healthy.
    ///
    /// Hardware-backed sinks override this with a message that has no
    /// audible effect (active sensing).
    fn probe(&mut self) -> Result<()> {
        Ok(())
    }
}

/// MIDI message constants
pub mod messages {
    // Channel Voice Messages (upper nibble, lower nibble is channel 0-15)
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    pub const PROGRAM_CHANGE: u8 = 0xC0;

    // Control change numbers
    pub const CC_BANK_SELECT_MSB: u8 = 0;
    pub const CC_BANK_SELECT_LSB: u8 = 32;
    pub const CC_ALL_SOUND_OFF: u8 = 120;
    pub const CC_ALL_NOTES_OFF: u8 = 123;

    // System Real-Time Messages
    pub const ACTIVE_SENSING: u8 = 0xFE;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Recorded sink call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SinkCall {
        NoteOn(u8, u8, u8),
        NoteOff(u8, u8, u8),
        ControlChange(u8, u8, u8),
        ProgramChange(u8, u8, u16),
    }

    /// Mock sink recording every call for assertions
    pub struct RecordingSink {
        pub calls: Arc<Mutex<Vec<SinkCall>>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn new() -> (Self, Arc<Mutex<Vec<SinkCall>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    calls: Arc::clone(&calls),
                    fail: false,
                },
                calls,
            )
        }
    }

    impl OutputSink for RecordingSink {
        fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
            if self.fail {
                anyhow::bail!("sink failure");
            }
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::NoteOn(channel, note, velocity));
            Ok(())
        }

        fn note_off(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
            if self.fail {
                anyhow::bail!("sink failure");
            }
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::NoteOff(channel, note, velocity));
            Ok(())
        }

        fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::ControlChange(channel, controller, value));
            Ok(())
        }

        fn program_change(&mut self, channel: u8, program: u8, bank: u16) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(SinkCall::ProgramChange(channel, program, bank));
            Ok(())
        }
    }
}
