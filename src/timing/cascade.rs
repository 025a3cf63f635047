// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing cascade: fans one raw clock pulse into ordered counter events.
//!
//! Each pulse advances the bound session's tick counter; a tick wrap
//! advances the beat counter and a beat wrap advances the bar counter.
//! Listeners are held in one explicit list per event category and run
//! synchronously on the clock thread in a fixed phase order:
//! before-tick, tick, after-tick, then (on wrap) the beat phases, then
//! (on wrap) the bar phases.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use super::PulsePosition;
use crate::session::Session;

/// Receiver of raw pulses from the clock scheduler.
pub trait PulseHandler: Send {
    /// Handle one pulse. Errors are logged by the scheduler and do not
    /// stop the clock.
    fn handle_pulse(&mut self) -> Result<()>;
}

/// Listener for tick-level events.
///
/// All phase methods default to no-ops so implementors only write the
/// phases they care about.
pub trait TickListener: Send {
    /// Called before the standard tick phase
    fn before_tick(&mut self, _pos: &PulsePosition) {}
    /// Called for every pulse
    fn on_tick(&mut self, _pos: &PulsePosition) {}
    /// Called after the standard tick phase
    fn after_tick(&mut self, _pos: &PulsePosition) {}
}

/// Listener for beat-level events (fired when the tick counter wraps).
pub trait BeatListener: Send {
    /// Called before the standard beat phase
    fn before_beat(&mut self, _pos: &PulsePosition) {}
    /// Called once per beat
    fn on_beat(&mut self, _pos: &PulsePosition) {}
    /// Called after the standard beat phase
    fn after_beat(&mut self, _pos: &PulsePosition) {}
}

/// Listener for bar-level events (fired when the beat counter wraps).
pub trait BarListener: Send {
    /// Called before the standard bar phase
    fn before_bar(&mut self, _pos: &PulsePosition) {}
    /// Called once per bar
    fn on_bar(&mut self, _pos: &PulsePosition) {}
    /// Called after the standard bar phase
    fn after_bar(&mut self, _pos: &PulsePosition) {}
}

/// Fans raw pulses into ordered tick/beat/bar events.
pub struct TimingCascade {
    /// Session whose counters this cascade advances
    session: Arc<Mutex<Session>>,
    /// Tick subscribers, in registration order
    tick_listeners: Vec<Box<dyn TickListener>>,
    /// Beat subscribers, in registration order
    beat_listeners: Vec<Box<dyn BeatListener>>,
    /// Bar subscribers, in registration order
    bar_listeners: Vec<Box<dyn BarListener>>,
}

impl TimingCascade {
    /// Create a cascade bound to a session
    pub fn new(session: Arc<Mutex<Session>>) -> Self {
        Self {
            session,
            tick_listeners: Vec::new(),
            beat_listeners: Vec::new(),
            bar_listeners: Vec::new(),
        }
    }

    /// Register a tick listener
    pub fn add_tick_listener(&mut self, listener: Box<dyn TickListener>) {
        self.tick_listeners.push(listener);
    }

    /// Register a beat listener
    pub fn add_beat_listener(&mut self, listener: Box<dyn BeatListener>) {
        self.beat_listeners.push(listener);
    }

    /// Register a bar listener
    pub fn add_bar_listener(&mut self, listener: Box<dyn BarListener>) {
        self.bar_listeners.push(listener);
    }

    /// Number of registered listeners across all categories
    pub fn listener_count(&self) -> usize {
        self.tick_listeners.len() + self.beat_listeners.len() + self.bar_listeners.len()
    }

    /// Advance the counters and deliver one pulse worth of events.
    ///
    /// The session lock is released before any listener runs, so
    /// listeners may take it themselves.
    pub fn pulse(&mut self) {
        let advance = {
            let mut session = self
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            session.advance_pulse()
        };
        let pos = advance.position;

        for listener in &mut self.tick_listeners {
            listener.before_tick(&pos);
        }
        for listener in &mut self.tick_listeners {
            listener.on_tick(&pos);
        }
        for listener in &mut self.tick_listeners {
            listener.after_tick(&pos);
        }

        if advance.tick_wrapped {
            for listener in &mut self.beat_listeners {
                listener.before_beat(&pos);
            }
            for listener in &mut self.beat_listeners {
                listener.on_beat(&pos);
            }
            for listener in &mut self.beat_listeners {
                listener.after_beat(&pos);
            }

            if advance.beat_wrapped {
                for listener in &mut self.bar_listeners {
                    listener.before_bar(&pos);
                }
                for listener in &mut self.bar_listeners {
                    listener.on_bar(&pos);
                }
                for listener in &mut self.bar_listeners {
                    listener.after_bar(&pos);
                }
            }
        }
    }
}

impl PulseHandler for TimingCascade {
    fn handle_pulse(&mut self) -> Result<()> {
        self.pulse();
        Ok(())
    }
}
