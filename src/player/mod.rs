// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Players: independently configured trigger actors.
//!
//! This module provides:
//! - The `Player` configuration (rules, probability, timing modifiers)
//! - The `Cycler` modular counter for skip/subdivision gating
//! - Rule predicates and combination policies
//! - The per-tick trigger evaluator

pub mod cycler;
pub mod evaluator;
pub mod rule;

pub use cycler::{CycleSlot, Cycler};
pub use evaluator::{EntropyRandom, EvalError, RandomSource, Trigger, TriggerEvaluator};
pub use rule::{Rule, RuleCombination, RuleComparison, RuleOperator, ALL_PARTS};

use serde::{Deserialize, Serialize};

/// An independently triggerable actor.
///
/// Configuration is mutated from the non-real-time context and read
/// (cyclers excepted) during tick evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Player name
    pub name: String,
    /// MIDI channel (0-15)
    #[serde(default)]
    pub channel: u8,
    /// Base note number (0-127)
    #[serde(default = "default_note")]
    pub note: u8,
    /// Rule set
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// How multiple active rules combine
    #[serde(default)]
    pub rule_combination: RuleCombination,
    /// Firing probability, 0-100
    #[serde(default = "default_probability")]
    pub probability: u8,
    /// Minimum rolled velocity (1-127)
    #[serde(default = "default_velocity_min")]
    pub velocity_min: u8,
    /// Maximum rolled velocity (1-127)
    #[serde(default = "default_velocity_max")]
    pub velocity_max: u8,
    /// Swing amount (0.0 - 1.0)
    #[serde(default)]
    pub swing: f64,
    /// Random degree: bounded velocity/timing perturbation (0.0 - 1.0)
    #[serde(default)]
    pub random_degree: f64,
    /// Number of sub-triggers one firing expands into (1 = no ratchet)
    #[serde(default = "default_ratchet_count")]
    pub ratchet_count: u32,
    /// Spacing between ratchet sub-triggers, in fraction-of-tick units
    #[serde(default = "default_ratchet_interval")]
    pub ratchet_interval: f64,
    /// Skip cycler: its skip slot suppresses the tick outright
    #[serde(default)]
    pub skip: Cycler,
    /// Subdivision cycler: its active slots split the tick window
    #[serde(default)]
    pub subdivision: Cycler,
    /// Muted players produce no triggers
    #[serde(default)]
    pub muted: bool,
    /// When any player is soloed, only soloed players fire
    #[serde(default)]
    pub soloed: bool,
    /// Disabled players are skipped entirely
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_note() -> u8 {
    60
}
fn default_probability() -> u8 {
    100
}
fn default_velocity_min() -> u8 {
    64
}
fn default_velocity_max() -> u8 {
    112
}
fn default_ratchet_count() -> u32 {
    1
}
fn default_ratchet_interval() -> f64 {
    0.5
}
fn default_enabled() -> bool {
    true
}

impl Default for Player {
    fn default() -> Self {
        Self::new("Player")
    }
}

impl Player {
    /// Create a player with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: 0,
            note: default_note(),
            rules: Vec::new(),
            rule_combination: RuleCombination::default(),
            probability: default_probability(),
            velocity_min: default_velocity_min(),
            velocity_max: default_velocity_max(),
            swing: 0.0,
            random_degree: 0.0,
            ratchet_count: default_ratchet_count(),
            ratchet_interval: default_ratchet_interval(),
            skip: Cycler::disabled(),
            subdivision: Cycler::disabled(),
            muted: false,
            soloed: false,
            enabled: true,
        }
    }

    /// Set the MIDI channel
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel.min(15);
        self
    }

    /// Set the base note
    pub fn with_note(mut self, note: u8) -> Self {
        self.note = note.min(127);
        self
    }

    /// Add a rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the firing probability (clamped to 0-100)
    pub fn with_probability(mut self, probability: u8) -> Self {
        self.probability = probability.min(100);
        self
    }

    /// Set the rolled velocity range
    pub fn with_velocity_range(mut self, min: u8, max: u8) -> Self {
        self.velocity_min = min.clamp(1, 127);
        self.velocity_max = max.clamp(1, 127);
        self
    }

    /// Set the swing amount (clamped to 0.0 - 1.0)
    pub fn with_swing(mut self, swing: f64) -> Self {
        self.swing = swing.clamp(0.0, 1.0);
        self
    }

    /// Set the random degree (clamped to 0.0 - 1.0)
    pub fn with_random_degree(mut self, degree: f64) -> Self {
        self.random_degree = degree.clamp(0.0, 1.0);
        self
    }

    /// Set ratchet expansion
    pub fn with_ratchet(mut self, count: u32, interval: f64) -> Self {
        self.ratchet_count = count.max(1);
        self.ratchet_interval = interval;
        self
    }

    /// Set the skip cycle length (0 disables skipping)
    pub fn with_skip_cycle(mut self, length: u32) -> Self {
        self.skip = Cycler::new(length);
        self
    }

    /// Set the subdivision cycle length (0 disables subdivision)
    pub fn with_subdivision_cycle(mut self, length: u32) -> Self {
        self.subdivision = Cycler::new(length);
        self
    }

    /// Toggle mute
    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    /// Toggle solo
    pub fn toggle_solo(&mut self) {
        self.soloed = !self.soloed;
    }

    /// Reset cyclers to the start of their cycles
    pub fn reset_cycles(&mut self) {
        self.skip.reset();
        self.subdivision.reset();
    }
}

/// Solo-aware view over a set of players.
///
/// When any player is soloed, only soloed players are eligible;
/// muted and disabled players are never eligible.
pub fn eligible(players: &[Player], index: usize) -> bool {
    let player = match players.get(index) {
        Some(player) => player,
        None => return false,
    };
    if !player.enabled || player.muted {
        return false;
    }
    if players.iter().any(|p| p.soloed) {
        return player.soloed;
    }
    true
}
