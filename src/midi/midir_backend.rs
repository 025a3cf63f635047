// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! midir-based MIDI output backend.
//!
//! Provides the hardware `OutputSink` implementation plus the
//! `DeviceProvider` that the connection manager acquires ports through.

use anyhow::{anyhow, Result};
use midir::{MidiOutput, MidiOutputConnection};
use tracing::debug;

use super::connection::{ConnectionError, DeviceProvider};
use super::{messages, OutputSink};
use crate::audio::FallbackSynth;

/// Client name registered with the MIDI system
const CLIENT_NAME: &str = "ruleseq";

/// Output sink over a midir port connection.
pub struct MidirSink {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirSink {
    /// Connect to the first port whose name contains `name`
    /// (case-insensitive).
    pub fn connect_by_name(name: &str) -> Result<Self> {
        let client = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("failed to create MIDI client: {}", e))?;

        let wanted = name.to_lowercase();
        let ports = client.ports();
        let port = ports
            .iter()
            .find(|port| {
                client
                    .port_name(port)
                    .map(|n| n.to_lowercase().contains(&wanted))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("no MIDI output matching {:?} found", name))?;

        let port_name = client.port_name(port).unwrap_or_else(|_| name.to_string());
        let connection = client
            .connect(port, CLIENT_NAME)
            .map_err(|e| anyhow!("failed to connect MIDI output: {}", e))?;

        debug!(port = %port_name, "MIDI output connected");
        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Connect to a port by index in the system list
    pub fn connect_by_index(index: usize) -> Result<Self> {
        let client = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("failed to create MIDI client: {}", e))?;

        let ports = client.ports();
        let port = ports
            .get(index)
            .ok_or_else(|| anyhow!("MIDI output {} not found ({} available)", index, ports.len()))?;

        let port_name = client
            .port_name(port)
            .unwrap_or_else(|_| format!("Output {}", index));
        let connection = client
            .connect(port, CLIENT_NAME)
            .map_err(|e| anyhow!("failed to connect MIDI output: {}", e))?;

        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| anyhow!("failed to send MIDI message: {}", e))
    }
}

impl OutputSink for MidirSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send(&[messages::NOTE_ON | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) -> Result<()> {
        self.send(&[messages::NOTE_OFF | (channel & 0x0F), note & 0x7F, velocity & 0x7F])
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) -> Result<()> {
        self.send(&[
            messages::CONTROL_CHANGE | (channel & 0x0F),
            controller & 0x7F,
            value & 0x7F,
        ])
    }

    fn program_change(&mut self, channel: u8, program: u8, bank: u16) -> Result<()> {
        let status = messages::CONTROL_CHANGE | (channel & 0x0F);
        self.send(&[status, messages::CC_BANK_SELECT_MSB, (bank >> 7) as u8 & 0x7F])?;
        self.send(&[status, messages::CC_BANK_SELECT_LSB, (bank & 0x7F) as u8])?;
        self.send(&[messages::PROGRAM_CHANGE | (channel & 0x0F), program & 0x7F])
    }

    fn probe(&mut self) -> Result<()> {
        // Active sensing is ignored by receivers that don't track it
        self.send(&[messages::ACTIVE_SENSING])
    }
}

/// Device provider backed by midir, with the built-in synthesizer as
/// the fallback path.
pub struct MidirProvider {
    /// Soundfont loaded into the fallback synthesizer when it opens
    soundfont: Option<String>,
}

impl MidirProvider {
    /// Create a provider without a soundfont
    pub fn new() -> Self {
        Self { soundfont: None }
    }

    /// Set the soundfont the fallback synthesizer loads
    pub fn with_soundfont(mut self, path: impl Into<String>) -> Self {
        self.soundfont = Some(path.into());
        self
    }
}

impl Default for MidirProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProvider for MidirProvider {
    fn open(&mut self, name: &str) -> Result<Box<dyn OutputSink>, ConnectionError> {
        MidirSink::connect_by_name(name)
            .map(|sink| Box::new(sink) as Box<dyn OutputSink>)
            .map_err(|err| ConnectionError::OpenFailed {
                device: name.to_string(),
                reason: err.to_string(),
            })
    }

    fn open_fallback_synth(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError> {
        FallbackSynth::create(self.soundfont.as_deref())
            .map(|synth| Box::new(synth) as Box<dyn OutputSink>)
            .map_err(|err| ConnectionError::FallbackUnavailable(err.to_string()))
    }

    fn open_default(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError> {
        MidirSink::connect_by_index(0)
            .map(|sink| Box::new(sink) as Box<dyn OutputSink>)
            .map_err(|_| ConnectionError::NoDefaultOutput)
    }
}

/// List all available MIDI outputs as (index, name) pairs.
pub fn list_destinations() -> Vec<(usize, String)> {
    let client = match MidiOutput::new(CLIENT_NAME) {
        Ok(client) => client,
        Err(_) => return Vec::new(),
    };

    client
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = client
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI outputs to stdout.
pub fn print_destinations() {
    let destinations = list_destinations();
    if destinations.is_empty() {
        println!("No MIDI outputs found.");
    } else {
        println!("Available MIDI outputs:");
        for (i, name) in destinations {
            println!("  {}: {}", i, name);
        }
    }
}
