// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session model and persistence seam.
//!
//! A session owns the global timing state (tempo, resolution, meter,
//! counters) and the players. Exactly one session is active at a time;
//! the transport binds it and the timing cascade advances its counters
//! pulse by pulse.

pub mod store;
pub mod watcher;

pub use store::{SessionFile, YamlSessionStore};
pub use watcher::{SessionEvent, SessionWatcher};

use anyhow::Result;

use crate::player::Player;
use crate::timing::{PulsePosition, TimingSpec};

/// Result of advancing the counters by one pulse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseAdvance {
    /// Counter values after the advance
    pub position: PulsePosition,
    /// The tick counter wrapped: beat-level events fire
    pub tick_wrapped: bool,
    /// The beat counter wrapped: bar-level events fire
    pub beat_wrapped: bool,
}

/// The active arrangement: timing state plus players.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session name
    pub name: String,
    /// Tempo in beats per minute
    pub tempo: f64,
    /// Ticks per beat (PPQ)
    pub ticks_per_beat: u32,
    /// Beats per bar
    pub beats_per_bar: u32,
    /// Song length in bars
    pub bars: u32,
    /// Number of parts the song cycles through (0 = single part)
    pub part_count: u32,
    /// Bars per part (0 = single part)
    pub bars_per_part: u32,
    /// Transport running flag
    pub running: bool,
    /// Tick counter within the beat
    pub tick: u32,
    /// Beat counter within the bar
    pub beat: u32,
    /// Bar counter, monotonic from transport start
    pub bar: u64,
    /// Players owned by this session
    pub players: Vec<Player>,
}

impl Session {
    /// Create an empty session
    pub fn new(name: impl Into<String>, tempo: f64, ticks_per_beat: u32, beats_per_bar: u32) -> Self {
        Self {
            name: name.into(),
            tempo,
            ticks_per_beat,
            beats_per_bar,
            bars: 16,
            part_count: 0,
            bars_per_part: 0,
            running: false,
            tick: 0,
            beat: 0,
            bar: 0,
            players: Vec::new(),
        }
    }

    /// Timing parameters for the scheduler
    pub fn timing_spec(&self) -> TimingSpec {
        TimingSpec::new(self.tempo, self.ticks_per_beat, self.beats_per_bar)
    }

    /// Part tag derived from the bar counter
    pub fn current_part(&self) -> u32 {
        if self.part_count == 0 || self.bars_per_part == 0 {
            return 0;
        }
        ((self.bar / self.bars_per_part as u64) % self.part_count as u64) as u32
    }

    /// Snapshot of the current counters
    pub fn position(&self) -> PulsePosition {
        PulsePosition {
            tick: self.tick,
            beat: self.beat,
            bar: self.bar,
            part: self.current_part(),
        }
    }

    /// Advance the counters by one pulse.
    ///
    /// The tick counter increments modulo `ticks_per_beat`; its wrap
    /// advances the beat modulo `beats_per_bar`, whose wrap increments
    /// the bar. Returns the new position and which levels wrapped.
    pub fn advance_pulse(&mut self) -> PulseAdvance {
        let ticks_per_beat = self.ticks_per_beat.max(1);
        let beats_per_bar = self.beats_per_bar.max(1);

        self.tick += 1;
        let mut tick_wrapped = false;
        let mut beat_wrapped = false;

        if self.tick >= ticks_per_beat {
            self.tick = 0;
            tick_wrapped = true;
            self.beat += 1;
            if self.beat >= beats_per_bar {
                self.beat = 0;
                beat_wrapped = true;
                self.bar += 1;
            }
        }

        PulseAdvance {
            position: self.position(),
            tick_wrapped,
            beat_wrapped,
        }
    }

    /// Reset the counters to the start of the song
    pub fn reset_position(&mut self) {
        self.tick = 0;
        self.beat = 0;
        self.bar = 0;
        for player in &mut self.players {
            player.reset_cycles();
        }
    }

    /// Jump to the start of the next bar
    pub fn seek_next_bar(&mut self) {
        self.tick = 0;
        self.beat = 0;
        self.bar += 1;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("Untitled", 120.0, 24, 4)
    }
}

/// Persistence seam for the active session.
///
/// Called at transport boundaries only (play/stop/retune), never
/// mid-tick.
pub trait SessionStore: Send {
    /// Load the active session
    fn load_active(&self) -> Result<Session>;

    /// Persist the session
    fn save(&self, session: &Session) -> Result<()>;
}
