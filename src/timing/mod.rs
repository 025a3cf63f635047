// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing primitives for the sequencer core.
//!
//! This module provides:
//! - Tempo/resolution arithmetic and the nanosecond tick interval
//! - The clock scheduler that drives pulses on a dedicated thread
//! - The timing cascade that fans pulses into tick/beat/bar events

pub mod cascade;
pub mod clock;

pub use cascade::{BarListener, BeatListener, PulseHandler, TickListener, TimingCascade};
pub use clock::ClockScheduler;

use std::time::Duration;

use thiserror::Error;

/// Errors from timing parameter validation.
///
/// These are the only fatal errors in the core: without a valid tick
/// interval no schedule can be derived, so `ClockScheduler::start`
/// surfaces them instead of logging and continuing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimingError {
    /// Tempo must be a positive, finite number of beats per minute
    #[error("tempo must be positive, got {0}")]
    NonPositiveTempo(f64),
    /// Resolution (ticks per beat) must be at least 1
    #[error("ticks per beat must be at least 1")]
    ZeroResolution,
    /// Beats per bar must be at least 1
    #[error("beats per bar must be at least 1")]
    ZeroBeatsPerBar,
}

/// Tempo and meter parameters from which the pulse schedule is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingSpec {
    /// Tempo in beats per minute
    pub tempo: f64,
    /// Ticks per beat (PPQ)
    pub ticks_per_beat: u32,
    /// Beats per bar (time signature numerator)
    pub beats_per_bar: u32,
}

impl Default for TimingSpec {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            ticks_per_beat: 24,
            beats_per_bar: 4,
        }
    }
}

impl TimingSpec {
    /// Create a new spec
    pub fn new(tempo: f64, ticks_per_beat: u32, beats_per_bar: u32) -> Self {
        Self {
            tempo,
            ticks_per_beat,
            beats_per_bar,
        }
    }

    /// Validate tempo and meter fields
    pub fn validate(&self) -> Result<(), TimingError> {
        if !(self.tempo > 0.0) || !self.tempo.is_finite() {
            return Err(TimingError::NonPositiveTempo(self.tempo));
        }
        if self.ticks_per_beat == 0 {
            return Err(TimingError::ZeroResolution);
        }
        if self.beats_per_bar == 0 {
            return Err(TimingError::ZeroBeatsPerBar);
        }
        Ok(())
    }

    /// Tick interval in nanoseconds: `60e9 / (tempo * ticks_per_beat)`.
    ///
    /// Kept as `f64` so the scheduler can compute absolute deadlines
    /// without rounding error accumulating across pulses.
    pub fn tick_interval_nanos(&self) -> Result<f64, TimingError> {
        self.validate()?;
        Ok(60_000_000_000.0 / (self.tempo * self.ticks_per_beat as f64))
    }

    /// Tick interval as a `Duration`, rounded to whole nanoseconds
    pub fn tick_interval(&self) -> Result<Duration, TimingError> {
        Ok(Duration::from_nanos(self.tick_interval_nanos()?.round() as u64))
    }

    /// Ticks per bar
    pub fn ticks_per_bar(&self) -> u64 {
        self.ticks_per_beat as u64 * self.beats_per_bar as u64
    }
}

/// Snapshot of the counters for one pulse.
///
/// Carries the *new* counter values after the pulse advanced them, plus
/// the part tag the session derives from the bar counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePosition {
    /// Tick within the beat (0..ticks_per_beat)
    pub tick: u32,
    /// Beat within the bar (0..beats_per_bar)
    pub beat: u32,
    /// Bar number, monotonic from transport start
    pub bar: u64,
    /// Part grouping tag
    pub part: u32,
}

impl PulsePosition {
    /// Position at the start of playback
    pub fn zero() -> Self {
        Self {
            tick: 0,
            beat: 0,
            bar: 0,
            part: 0,
        }
    }
}
