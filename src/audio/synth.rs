// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! FluidLite synth engine.
//!
//! Thin wrapper around FluidLite for SF2 playback: event routing in,
//! interleaved float samples out.

use std::path::Path;

use fluidlite::{IsSettings, Settings, Synth};

use super::AudioError;
use crate::midi::messages;

/// Software synth state.
pub struct SoftSynth {
    synth: Synth,
    /// Master gain applied after rendering (0.0 - 1.0)
    gain: f32,
    /// Loaded soundfont ID
    soundfont_id: Option<u32>,
    sample_rate: f64,
}

impl SoftSynth {
    /// Create a synth at the given sample rate
    pub fn new(sample_rate: f64) -> Result<Self, AudioError> {
        let settings = Settings::new()
            .map_err(|e| AudioError::InitFailed(format!("settings: {:?}", e)))?;

        if let Some(setting) = settings.num("synth.sample-rate") {
            setting.set(sample_rate);
        }
        if let Some(setting) = settings.int("synth.polyphony") {
            setting.set(128);
        }
        if let Some(setting) = settings.int("synth.midi-channels") {
            setting.set(16);
        }

        let synth = Synth::new(settings)
            .map_err(|e| AudioError::InitFailed(format!("synth: {:?}", e)))?;

        // Effects off for lower latency
        synth.set_reverb_on(false);
        synth.set_chorus_on(false);

        Ok(Self {
            synth,
            gain: 0.5,
            soundfont_id: None,
            sample_rate,
        })
    }

    /// Load a soundfont, replacing any previously loaded one
    pub fn load_soundfont(&mut self, path: &str) -> Result<(), AudioError> {
        if !Path::new(path).exists() {
            return Err(AudioError::SoundfontLoadFailed(format!(
                "file not found: {}",
                path
            )));
        }

        if let Some(id) = self.soundfont_id.take() {
            let _ = self.synth.sfunload(id, true);
        }

        match self.synth.sfload(path, true) {
            Ok(id) => {
                self.soundfont_id = Some(id);
                Ok(())
            }
            Err(e) => Err(AudioError::SoundfontLoadFailed(format!(
                "{}: {:?}",
                path, e
            ))),
        }
    }

    /// Whether a soundfont is loaded
    pub fn has_soundfont(&self) -> bool {
        self.soundfont_id.is_some()
    }

    /// Sample rate the synth renders at
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Render interleaved samples into `buffer`.
    ///
    /// Stereo renders directly; mono renders stereo and mixes down.
    pub fn render(&mut self, buffer: &mut [f32], channels: usize) {
        match channels {
            2 => {
                let _ = self.synth.write(&mut *buffer);
                for sample in buffer.iter_mut() {
                    *sample *= self.gain;
                }
            }
            1 => {
                let frames = buffer.len();
                let mut stereo = vec![0.0f32; frames * 2];
                let _ = self.synth.write(stereo.as_mut_slice());
                for (i, sample) in buffer.iter_mut().enumerate() {
                    *sample = (stereo[i * 2] + stereo[i * 2 + 1]) * 0.5 * self.gain;
                }
            }
            _ => {
                for sample in buffer.iter_mut() {
                    *sample = 0.0;
                }
            }
        }
    }

    /// Route a note-on
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        let _ = self
            .synth
            .note_on(channel as u32, note as u32, velocity as u32);
    }

    /// Route a note-off
    pub fn note_off(&mut self, channel: u8, note: u8) {
        let _ = self.synth.note_off(channel as u32, note as u32);
    }

    /// Route a control change
    pub fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let _ = self
            .synth
            .cc(channel as u32, controller as u32, value as u32);
    }

    /// Route a program change with bank select
    pub fn program_change(&mut self, channel: u8, program: u8, bank: u16) {
        let channel = channel as u32;
        let _ = self
            .synth
            .cc(channel, messages::CC_BANK_SELECT_MSB as u32, (bank >> 7) as u32);
        let _ = self
            .synth
            .cc(channel, messages::CC_BANK_SELECT_LSB as u32, (bank & 0x7F) as u32);
        let _ = self.synth.program_change(channel, program as u32);
    }

    /// Silence everything on all channels
    pub fn all_sound_off(&mut self) {
        for channel in 0..16 {
            let _ = self.synth.cc(channel, messages::CC_ALL_NOTES_OFF as u32, 0);
            let _ = self.synth.cc(channel, messages::CC_ALL_SOUND_OFF as u32, 0);
        }
    }

    /// Set master gain (clamped to 0.0 - 1.0)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    /// Current master gain
    pub fn gain(&self) -> f32 {
        self.gain
    }
}
