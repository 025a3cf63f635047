// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Audio output via cpal.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated audio
//! thread for the lifetime of the output; dropping the output shuts
//! the thread down.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tracing::error;

use super::synth::SoftSynth;
use super::AudioError;

/// Audio output configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Buffer size in frames
    pub buffer_size: u32,
    /// Number of output channels
    pub channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            buffer_size: 512,
            channels: 2,
        }
    }
}

impl AudioConfig {
    /// Output latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        (self.buffer_size as f64 / self.sample_rate as f64) * 1000.0
    }
}

/// Handle to the audio rendering thread.
pub struct AudioOutput {
    shutdown: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    config: AudioConfig,
}

impl AudioOutput {
    /// Start rendering `synth` through the default output device.
    pub fn start(synth: Arc<Mutex<SoftSynth>>, config: AudioConfig) -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let stream_config = config.clone();
        let worker = thread::Builder::new()
            .name("ruleseq-audio".into())
            .spawn(move || run_audio(synth, stream_config, ready_tx, shutdown_rx))
            .map_err(|e| AudioError::StreamFailed(format!("spawn: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown: Some(shutdown_tx),
                worker: Some(worker),
                config,
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(AudioError::StreamFailed("audio thread died".into()))
            }
        }
    }

    /// Current configuration
    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Audio thread body: build the stream, report readiness, hold the
/// stream alive until shutdown.
fn run_audio(
    synth: Arc<Mutex<SoftSynth>>,
    config: AudioConfig,
    ready: Sender<Result<(), AudioError>>,
    shutdown: Receiver<()>,
) {
    let stream = match build_stream(synth, &config) {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            stream
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    // Blocks until the sender drops
    let _ = shutdown.recv();
    drop(stream);
}

fn build_stream(
    synth: Arc<Mutex<SoftSynth>>,
    config: &AudioConfig,
) -> Result<cpal::Stream, AudioError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

    let stream_config = StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
    };

    let channels = config.channels as usize;
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut synth = synth.lock().unwrap_or_else(PoisonError::into_inner);
                synth.render(data, channels);
            },
            |err| {
                error!(%err, "audio stream error");
            },
            None,
        )
        .map_err(|e| AudioError::StreamFailed(format!("build: {}", e)))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamFailed(format!("play: {}", e)))?;

    Ok(stream)
}
