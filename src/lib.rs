// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! RULESEQ - rule-driven MIDI sequencer core.
//!
//! A periodic clock advances tick/beat/bar counters; for every tick a
//! set of players decide, via rule predicates, probability and timing
//! modifiers, whether to emit a trigger. Output goes through cached,
//! self-recovering connections to MIDI hardware or the built-in
//! software synthesizer.

pub mod audio;
pub mod midi;
pub mod player;
pub mod session;
pub mod timing;
pub mod transport;
