// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tick listener that turns evaluated triggers into note jobs.
//!
//! On every tick the engine evaluates the session's players, resolves
//! the output sink through the connection manager, and hands one job
//! per trigger to the dispatcher. An unavailable sink drops the tick's
//! output; it is never an error.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::dispatch::{Dispatcher, NoteJob};
use crate::midi::ConnectionManager;
use crate::player::TriggerEvaluator;
use crate::session::Session;
use crate::timing::{PulsePosition, TickListener};

/// Note hold time, in fraction-of-tick units
const GATE_TICKS: f64 = 0.5;

/// Per-tick player evaluation bound to an output device.
pub struct PlayerEngine {
    session: Arc<Mutex<Session>>,
    evaluator: TriggerEvaluator,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    device_name: String,
}

impl PlayerEngine {
    /// Create an engine with the production random source
    pub fn new(
        session: Arc<Mutex<Session>>,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<Dispatcher>,
        device_name: impl Into<String>,
    ) -> Self {
        Self::with_evaluator(
            session,
            connections,
            dispatcher,
            device_name,
            TriggerEvaluator::new(),
        )
    }

    /// Create an engine with a custom evaluator (scripted randomness)
    pub fn with_evaluator(
        session: Arc<Mutex<Session>>,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<Dispatcher>,
        device_name: impl Into<String>,
        evaluator: TriggerEvaluator,
    ) -> Self {
        Self {
            session,
            evaluator,
            connections,
            dispatcher,
            device_name: device_name.into(),
        }
    }

    /// Device the engine plays through
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl TickListener for PlayerEngine {
    fn on_tick(&mut self, pos: &PulsePosition) {
        let (triggers, tick_nanos) = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            let tick_nanos = session.timing_spec().tick_interval_nanos().unwrap_or(0.0);
            let triggers = self.evaluator.evaluate_all(&mut session.players, pos);
            (triggers, tick_nanos)
        };

        if triggers.is_empty() {
            return;
        }

        let sink = match self.connections.get_or_create(&self.device_name, None) {
            Some(sink) => sink,
            None => {
                debug!(
                    device = %self.device_name,
                    dropped = triggers.len(),
                    "output unavailable, dropping triggers"
                );
                return;
            }
        };

        let gate = Duration::from_nanos((GATE_TICKS * tick_nanos) as u64);
        for trigger in triggers {
            self.dispatcher.submit(NoteJob {
                sink: Arc::clone(&sink),
                channel: trigger.channel,
                note: trigger.note,
                velocity: trigger.velocity,
                delay: Duration::from_nanos((trigger.offset * tick_nanos) as u64),
                gate,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::connection::{ConnectionError, DeviceProvider};
    use crate::midi::testing::{RecordingSink, SinkCall};
    use crate::midi::OutputSink;
    use crate::player::{Player, Rule, RuleComparison, RuleOperator};

    /// Provider handing out recording sinks that share one call log
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<SinkCall>>>,
        available: bool,
    }

    impl DeviceProvider for RecordingProvider {
        fn open(&mut self, name: &str) -> Result<Box<dyn OutputSink>, ConnectionError> {
            if !self.available {
                return Err(ConnectionError::DeviceNotFound(name.to_string()));
            }
            Ok(Box::new(RecordingSink {
                calls: Arc::clone(&self.calls),
                fail: false,
            }))
        }

        fn open_fallback_synth(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError> {
            Err(ConnectionError::FallbackUnavailable("test".into()))
        }

        fn open_default(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError> {
            Err(ConnectionError::NoDefaultOutput)
        }
    }

    fn engine_fixture(available: bool) -> (PlayerEngine, Arc<Mutex<Vec<SinkCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let provider = RecordingProvider {
            calls: Arc::clone(&calls),
            available,
        };

        let mut session = Session::new("test", 120.0, 24, 4);
        session.players.push(
            Player::new("kick")
                .with_note(36)
                .with_rule(Rule::new(RuleOperator::Tick, RuleComparison::Equals, 0)),
        );

        let engine = PlayerEngine::new(
            Arc::new(Mutex::new(session)),
            Arc::new(ConnectionManager::new(Box::new(provider), "FluidSynth")),
            Arc::new(Dispatcher::new(2)),
            "TestDevice",
        );
        (engine, calls)
    }

    fn beat_start() -> PulsePosition {
        PulsePosition {
            tick: 0,
            beat: 0,
            bar: 0,
            part: 0,
        }
    }

    #[test]
    fn test_matching_tick_plays_note() {
        let (mut engine, calls) = engine_fixture(true);

        engine.on_tick(&beat_start());
        // Let the dispatcher play the job out
        std::thread::sleep(Duration::from_millis(50));

        let calls = calls.lock().unwrap();
        assert!(calls
            .iter()
            .any(|call| matches!(call, SinkCall::NoteOn(0, 36, _))));
        assert!(calls
            .iter()
            .any(|call| matches!(call, SinkCall::NoteOff(0, 36, _))));
    }

    #[test]
    fn test_non_matching_tick_is_silent() {
        let (mut engine, calls) = engine_fixture(true);

        engine.on_tick(&PulsePosition {
            tick: 5,
            beat: 0,
            bar: 0,
            part: 0,
        });
        std::thread::sleep(Duration::from_millis(30));

        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unavailable_device_drops_gracefully() {
        let (mut engine, calls) = engine_fixture(false);

        // Must not panic or error; triggers are dropped
        engine.on_tick(&beat_start());
        std::thread::sleep(Duration::from_millis(30));

        assert!(calls.lock().unwrap().is_empty());
    }
}
