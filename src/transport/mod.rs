// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Transport control: binding a session to the clock.
//!
//! This module provides:
//! - The transport state machine (idle/running) with play, stop,
//!   rewind, forward and retune
//! - The closed control-command set and its dispatch
//! - Typed transport events for subscribers
//! - The player engine and the output dispatcher

pub mod dispatch;
pub mod engine;

pub use dispatch::{Dispatcher, NoteJob, DEFAULT_WORKERS};
pub use engine::PlayerEngine;

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use crate::midi::{ChannelAllocator, ConnectionManager, DRUM_CHANNEL};
use crate::session::{Session, SessionStore};
use crate::timing::{ClockScheduler, PulseHandler, TimingCascade, TimingError, TimingSpec};

/// Transport state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Stopped, position at zero
    Idle,
    /// Clock running
    Running,
}

/// Control commands the transport responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Start playback
    Play,
    /// Stop playback and reset position
    Stop,
    /// Reset position to the song start
    Rewind,
    /// Jump to the next bar
    Forward,
    /// Re-read tempo/resolution from the session and reprogram the clock
    Retune,
}

/// Events published to transport subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport state changed
    StateChanged(TransportState),
    /// The clock was reprogrammed with new timing parameters
    Retuned(TimingSpec),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Timing parameters cannot produce a valid schedule
    #[error(transparent)]
    Timing(#[from] TimingError),
    /// The session store failed
    #[error("session store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Binds a session to the clock scheduler and exposes transport
/// semantics.
pub struct TransportController {
    session: Arc<Mutex<Session>>,
    scheduler: ClockScheduler,
    connections: Arc<ConnectionManager>,
    /// One allocator per active session
    channels: Arc<ChannelAllocator>,
    store: Option<Box<dyn SessionStore>>,
    device_name: String,
    state: TransportState,
    subscribers: Vec<Sender<TransportEvent>>,
}

impl TransportController {
    /// Create a controller with the standard wiring: a timing cascade
    /// whose single tick listener is the player engine.
    pub fn new(
        session: Arc<Mutex<Session>>,
        connections: Arc<ConnectionManager>,
        device_name: impl Into<String>,
    ) -> Self {
        let device_name = device_name.into();
        let dispatcher = Arc::new(Dispatcher::default());
        let engine = PlayerEngine::new(
            Arc::clone(&session),
            Arc::clone(&connections),
            dispatcher,
            device_name.clone(),
        );

        let mut cascade = TimingCascade::new(Arc::clone(&session));
        cascade.add_tick_listener(Box::new(engine));

        Self::with_handler(session, connections, device_name, Arc::new(Mutex::new(cascade)))
    }

    /// Create a controller around a prepared pulse handler (custom
    /// cascade wiring).
    pub fn with_handler(
        session: Arc<Mutex<Session>>,
        connections: Arc<ConnectionManager>,
        device_name: impl Into<String>,
        handler: Arc<Mutex<dyn PulseHandler>>,
    ) -> Self {
        let spec = session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timing_spec();

        Self {
            session,
            scheduler: ClockScheduler::new(spec, handler),
            connections,
            channels: Arc::new(ChannelAllocator::new()),
            store: None,
            device_name: device_name.into(),
            state: TransportState::Idle,
            subscribers: Vec::new(),
        }
    }

    /// Attach a session store; the session is saved at transport
    /// boundaries (stop, retune).
    pub fn with_store(mut self, store: Box<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Current transport state
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Channel allocator for this session
    pub fn channels(&self) -> Arc<ChannelAllocator> {
        Arc::clone(&self.channels)
    }

    /// Whether the clock is running
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Subscribe to transport events
    pub fn subscribe(&mut self) -> Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: TransportEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start playback.
    ///
    /// Warms the output connection, programs the scheduler from the
    /// session's tempo and resolution, and starts the clock. Fails only
    /// when no valid tick interval can be derived.
    pub fn play(&mut self) -> Result<(), TransportError> {
        if self.state == TransportState::Running {
            return Ok(());
        }

        // Device readiness: warm the connection cache. Absence is not
        // fatal; the engine drops output until the device recovers.
        if self.connections.get_or_create(&self.device_name, None).is_none() {
            warn!(device = %self.device_name, "output not ready at play");
        }

        self.arbitrate_channels();

        let spec = self.lock_session().timing_spec();
        self.scheduler
            .update_timing_parameters(spec.tempo, spec.ticks_per_beat, spec.beats_per_bar)?;
        self.scheduler.start()?;

        self.lock_session().running = true;
        self.state = TransportState::Running;
        info!(tempo = spec.tempo, "transport started");
        self.publish(TransportEvent::StateChanged(TransportState::Running));
        Ok(())
    }

    /// Stop playback, reset the position, and persist the session.
    pub fn stop(&mut self) {
        self.scheduler.stop();

        {
            let mut session = self.lock_session();
            session.running = false;
            session.reset_position();
        }
        self.channels.release_all();
        self.save_session();

        if self.state != TransportState::Idle {
            self.state = TransportState::Idle;
            info!("transport stopped");
            self.publish(TransportEvent::StateChanged(TransportState::Idle));
        }
    }

    /// Reset the position to the song start without stopping
    pub fn rewind(&mut self) {
        self.lock_session().reset_position();
    }

    /// Jump to the start of the next bar
    pub fn forward(&mut self) {
        self.lock_session().seek_next_bar();
    }

    /// Re-read timing parameters from the session and reprogram the
    /// clock. While running this is a stop/recompute/restart on the
    /// scheduler; the transport stays in `Running`.
    pub fn retune(&mut self) -> Result<(), TransportError> {
        let spec = self.lock_session().timing_spec();
        self.scheduler
            .update_timing_parameters(spec.tempo, spec.ticks_per_beat, spec.beats_per_bar)?;
        self.save_session();
        info!(tempo = spec.tempo, ticks_per_beat = spec.ticks_per_beat, "clock retuned");
        self.publish(TransportEvent::Retuned(spec));
        Ok(())
    }

    /// Dispatch one control command.
    pub fn handle(&mut self, command: ControlCommand) -> Result<(), TransportError> {
        match command {
            ControlCommand::Play => self.play(),
            ControlCommand::Stop => {
                self.stop();
                Ok(())
            }
            ControlCommand::Rewind => {
                self.rewind();
                Ok(())
            }
            ControlCommand::Forward => {
                self.forward();
                Ok(())
            }
            ControlCommand::Retune => self.retune(),
        }
    }

    /// Reserve each player's channel; a player whose channel is
    /// already taken by an earlier player is moved to the next free
    /// melodic channel. Percussion players on the drum channel share
    /// it and skip arbitration.
    fn arbitrate_channels(&self) {
        let mut session = self.lock_session();
        for player in &mut session.players {
            if player.channel == DRUM_CHANNEL {
                continue;
            }
            if !self.channels.reserve(player.channel) {
                let replacement = self.channels.next_available_melodic();
                warn!(
                    player = %player.name,
                    wanted = player.channel,
                    assigned = replacement,
                    "channel in use, reassigned"
                );
                player.channel = replacement;
            }
        }
    }

    fn save_session(&self) {
        if let Some(store) = &self.store {
            let session = self.lock_session();
            if let Err(err) = store.save(&session) {
                warn!(%err, "failed to persist session");
            }
        }
    }
}

impl Drop for TransportController {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
