// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Built-in software synthesizer.
//!
//! This module provides the always-available fallback output: a
//! FluidLite synth rendered through cpal. The connection manager
//! recovers through it when the named synthesizer device cannot be
//! opened as a MIDI port.

pub mod output;
pub mod synth;

pub use output::{AudioConfig, AudioOutput};
pub use synth::SoftSynth;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use thiserror::Error;
use tracing::warn;

use crate::midi::OutputSink;

/// Audio error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    /// Failed to initialize the synth engine
    #[error("synth initialization failed: {0}")]
    InitFailed(String),
    /// Failed to load a soundfont
    #[error("soundfont load failed: {0}")]
    SoundfontLoadFailed(String),
    /// Failed to build or start the audio stream
    #[error("audio stream failed: {0}")]
    StreamFailed(String),
    /// No audio device available
    #[error("no audio device available")]
    NoDevice,
}

/// The always-available fallback synthesizer.
///
/// Owns the synth state and the audio thread that renders it; the
/// `OutputSink` methods route events straight into the synth, so this
/// sink never loses its device.
pub struct FallbackSynth {
    synth: Arc<Mutex<SoftSynth>>,
    _output: AudioOutput,
}

impl FallbackSynth {
    /// Device name the connection manager routes here
    pub const NAME: &'static str = "FluidSynth";

    /// Bring up the synthesizer, optionally loading a soundfont.
    ///
    /// A soundfont that fails to load leaves the synth silent but
    /// available; only a missing audio device or synth engine is an
    /// error.
    pub fn create(soundfont: Option<&str>) -> Result<Self, AudioError> {
        let mut synth = SoftSynth::new(44100.0)?;
        if let Some(path) = soundfont {
            if let Err(err) = synth.load_soundfont(path) {
                warn!(%err, path, "soundfont unavailable, synth will be silent");
            }
        }

        let synth = Arc::new(Mutex::new(synth));
        let output = AudioOutput::start(Arc::clone(&synth), AudioConfig::default())?;

        Ok(Self {
            synth,
            _output: output,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SoftSynth> {
        self.synth.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputSink for FallbackSynth {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.lock().note_on(channel, note, velocity);
        Ok(())
    }

    fn note_off(&mut self, channel: u8, note: u8, _velocity: u8) -> Result<()> {
        self.lock().note_off(channel, note);
        Ok(())
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.lock().control_change(channel, controller, value);
        Ok(())
    }

    fn program_change(&mut self, channel: u8, program: u8, bank: u16) -> Result<()> {
        self.lock().program_change(channel, program, bank);
        Ok(())
    }
}
