// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Per-player trigger decision for one tick.
//!
//! The evaluator runs the decision chain in a fixed order: skip cycler,
//! rules, probability roll, random-degree perturbation, subdivision and
//! swing offsets, ratchet expansion. Randomness comes through the
//! `RandomSource` trait so tests can script every roll.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::warn;

use super::rule::rules_match;
use super::{eligible, CycleSlot, Player};
use crate::timing::PulsePosition;

/// Velocity jitter span at full random degree. Calibration constant.
const VELOCITY_JITTER_SPAN: f64 = 32.0;

/// Timing jitter span at full random degree, in ticks. Calibration constant.
const TIMING_JITTER_SPAN: f64 = 0.25;

/// Offset of the extra sub-trigger on an active subdivision slot, in ticks.
const SUBDIVISION_OFFSET: f64 = 0.5;

/// Errors from evaluating a single player.
///
/// These are isolated at the per-player boundary: one bad player never
/// prevents the rest of the set from evaluating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Ratchet expansion needs a positive spacing between sub-triggers
    #[error("player {player}: ratchet interval must be positive, got {interval}")]
    NonPositiveRatchetInterval { player: String, interval: f64 },
    /// Velocity range is inverted
    #[error("player {player}: velocity range {min}..{max} is inverted")]
    InvertedVelocityRange { player: String, min: u8, max: u8 },
}

/// One scheduled output, relative to the start of the tick window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    /// Offset from the tick window start, in fraction-of-tick units
    pub offset: f64,
    /// Velocity (1-127)
    pub velocity: u8,
    /// Note number
    pub note: u8,
    /// MIDI channel (0-15)
    pub channel: u8,
}

/// Source of the random draws the evaluator consumes.
///
/// Pluggable so probability and degree behavior is observable in tests;
/// the production source is `EntropyRandom`.
pub trait RandomSource: Send {
    /// A draw in `[0, 100)` for the probability gate
    fn roll_percent(&mut self) -> f64;

    /// A velocity in `min..=max`
    fn roll_velocity(&mut self, min: u8, max: u8) -> u8;

    /// A jitter value in `[-magnitude, magnitude]`
    fn roll_jitter(&mut self, magnitude: f64) -> f64;
}

/// Entropy-seeded random source.
pub struct EntropyRandom {
    rng: StdRng,
}

impl EntropyRandom {
    /// Create a source seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for EntropyRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropyRandom {
    fn roll_percent(&mut self) -> f64 {
        self.rng.gen_range(0.0..100.0)
    }

    fn roll_velocity(&mut self, min: u8, max: u8) -> u8 {
        self.rng.gen_range(min..=max)
    }

    fn roll_jitter(&mut self, magnitude: f64) -> f64 {
        if magnitude <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-magnitude..=magnitude)
    }
}

/// Per-tick trigger decision engine.
pub struct TriggerEvaluator {
    random: Box<dyn RandomSource>,
}

impl TriggerEvaluator {
    /// Create an evaluator with the production random source
    pub fn new() -> Self {
        Self::with_random(Box::new(EntropyRandom::new()))
    }

    /// Create an evaluator with a custom random source
    pub fn with_random(random: Box<dyn RandomSource>) -> Self {
        Self { random }
    }

    /// Decide whether `player` fires at `pos` and expand the firing
    /// into concrete triggers.
    ///
    /// Both cyclers advance on every call so they keep phase with the
    /// tick stream even on ticks that end up silent.
    pub fn evaluate(
        &mut self,
        player: &mut Player,
        pos: &PulsePosition,
    ) -> Result<Vec<Trigger>, EvalError> {
        let skip_slot = player.skip.advance();
        let subdivision_slot = player.subdivision.advance();

        if skip_slot == CycleSlot::Skip {
            return Ok(Vec::new());
        }
        if !rules_match(&player.rules, player.rule_combination, pos) {
            return Ok(Vec::new());
        }

        let draw = self.random.roll_percent();
        if !(player.probability as f64 > draw) {
            return Ok(Vec::new());
        }

        if player.velocity_min > player.velocity_max {
            return Err(EvalError::InvertedVelocityRange {
                player: player.name.clone(),
                min: player.velocity_min,
                max: player.velocity_max,
            });
        }

        let channel = if player.channel > 15 {
            warn!(player = %player.name, channel = player.channel, "channel out of range, using 0");
            0
        } else {
            player.channel
        };

        // Base offset within the tick window: swing delays off-ticks,
        // random degree jitters the landing point.
        let mut offset = 0.0;
        if player.swing > 0.0 && pos.tick % 2 == 1 {
            offset += player.swing * 0.5;
        }
        if player.random_degree > 0.0 {
            offset += self
                .random
                .roll_jitter(player.random_degree * TIMING_JITTER_SPAN);
            offset = offset.max(0.0);
        }

        let ratchets = player.ratchet_count.max(1);
        if ratchets > 1 && player.ratchet_interval <= 0.0 {
            return Err(EvalError::NonPositiveRatchetInterval {
                player: player.name.clone(),
                interval: player.ratchet_interval,
            });
        }

        let mut triggers = Vec::with_capacity(ratchets as usize);
        for i in 0..ratchets {
            triggers.push(Trigger {
                offset: offset + i as f64 * player.ratchet_interval,
                velocity: self.roll_jittered_velocity(player),
                note: player.note,
                channel,
            });
        }

        // Subdivision splits the window once; ratchet expansion already
        // subdivides, so it takes precedence.
        if ratchets == 1 && subdivision_slot == CycleSlot::Active && player.subdivision.is_enabled()
        {
            triggers.push(Trigger {
                offset: offset + SUBDIVISION_OFFSET,
                velocity: self.roll_jittered_velocity(player),
                note: player.note,
                channel,
            });
        }

        Ok(triggers)
    }

    /// Evaluate every eligible player for this tick.
    ///
    /// A player whose evaluation fails is logged and skipped; the rest
    /// of the set still evaluates.
    pub fn evaluate_all(&mut self, players: &mut [Player], pos: &PulsePosition) -> Vec<Trigger> {
        let mut triggers = Vec::new();
        for index in 0..players.len() {
            if !eligible(players, index) {
                continue;
            }
            match self.evaluate(&mut players[index], pos) {
                Ok(fired) => triggers.extend(fired),
                Err(err) => {
                    warn!(player = %players[index].name, %err, "player evaluation failed");
                }
            }
        }
        triggers
    }

    fn roll_jittered_velocity(&mut self, player: &Player) -> u8 {
        let rolled = self
            .random
            .roll_velocity(player.velocity_min, player.velocity_max);
        if player.random_degree <= 0.0 {
            return rolled;
        }
        let jitter = self
            .random
            .roll_jitter(player.random_degree * VELOCITY_JITTER_SPAN);
        (rolled as f64 + jitter).round().clamp(1.0, 127.0) as u8
    }
}

impl Default for TriggerEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{Rule, RuleComparison, RuleOperator};

    /// Scripted random source: fixed percent draw, midpoint velocities,
    /// zero jitter.
    struct Scripted {
        percent: f64,
    }

    impl RandomSource for Scripted {
        fn roll_percent(&mut self) -> f64 {
            self.percent
        }
        fn roll_velocity(&mut self, min: u8, max: u8) -> u8 {
            (min + max) / 2
        }
        fn roll_jitter(&mut self, _magnitude: f64) -> f64 {
            0.0
        }
    }

    fn evaluator_drawing(percent: f64) -> TriggerEvaluator {
        TriggerEvaluator::with_random(Box::new(Scripted { percent }))
    }

    fn always_firing_player() -> Player {
        Player::new("test").with_rule(Rule::new(RuleOperator::Tick, RuleComparison::Modulo, 1))
    }

    fn at_tick(tick: u32) -> PulsePosition {
        PulsePosition {
            tick,
            beat: 0,
            bar: 0,
            part: 0,
        }
    }

    #[test]
    fn test_probability_hundred_always_fires() {
        let mut evaluator = evaluator_drawing(99.999);
        let mut player = always_firing_player().with_probability(100);

        for tick in 0..16 {
            let triggers = evaluator.evaluate(&mut player, &at_tick(tick)).unwrap();
            assert_eq!(triggers.len(), 1, "tick {}", tick);
        }
    }

    #[test]
    fn test_probability_zero_never_fires() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_probability(0);

        for tick in 0..16 {
            let triggers = evaluator.evaluate(&mut player, &at_tick(tick)).unwrap();
            assert!(triggers.is_empty(), "tick {}", tick);
        }
    }

    #[test]
    fn test_no_matching_rule_no_fire() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player =
            Player::new("test").with_rule(Rule::new(RuleOperator::Tick, RuleComparison::Equals, 0));

        assert!(evaluator.evaluate(&mut player, &at_tick(1)).unwrap().is_empty());
        assert_eq!(evaluator.evaluate(&mut player, &at_tick(0)).unwrap().len(), 1);
    }

    #[test]
    fn test_ratchet_expansion_offsets() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_ratchet(3, 1.0);

        let triggers = evaluator.evaluate(&mut player, &at_tick(0)).unwrap();
        assert_eq!(triggers.len(), 3);
        assert_eq!(triggers[0].offset, 0.0);
        assert_eq!(triggers[1].offset, 1.0);
        assert_eq!(triggers[2].offset, 2.0);
    }

    #[test]
    fn test_ratchet_velocities_within_range() {
        let mut evaluator = TriggerEvaluator::new();
        let mut player = always_firing_player()
            .with_probability(100)
            .with_velocity_range(40, 80)
            .with_ratchet(4, 0.25);

        let triggers = evaluator.evaluate(&mut player, &at_tick(0)).unwrap();
        assert_eq!(triggers.len(), 4);
        for trigger in triggers {
            assert!((40..=80).contains(&trigger.velocity));
        }
    }

    #[test]
    fn test_skip_cycle_suppresses_every_third_tick() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_skip_cycle(3);

        let fired: Vec<bool> = (0..6)
            .map(|tick| {
                !evaluator
                    .evaluate(&mut player, &at_tick(tick))
                    .unwrap()
                    .is_empty()
            })
            .collect();
        // Cycle positions 1, 2, 0, 1, 2, 0: fires on 2 of every 3
        assert_eq!(fired, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_skip_beats_rules() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_skip_cycle(1);

        // Length-1 skip cycle: every slot is the skip slot
        for tick in 0..4 {
            assert!(evaluator.evaluate(&mut player, &at_tick(tick)).unwrap().is_empty());
        }
    }

    #[test]
    fn test_swing_shifts_odd_ticks() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_swing(0.6);

        let on_beat = evaluator.evaluate(&mut player, &at_tick(0)).unwrap();
        assert_eq!(on_beat[0].offset, 0.0);

        let off_beat = evaluator.evaluate(&mut player, &at_tick(1)).unwrap();
        assert!((off_beat[0].offset - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_subdivision_adds_half_tick_trigger() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player().with_subdivision_cycle(2);

        // Subdivision cycle of 2: positions 1, 0, 1, 0 - active on odd advances
        let first = evaluator.evaluate(&mut player, &at_tick(0)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].offset, 0.0);
        assert_eq!(first[1].offset, 0.5);

        let second = evaluator.evaluate(&mut player, &at_tick(1)).unwrap();
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_invalid_ratchet_interval_is_isolated() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut players = vec![
            always_firing_player().with_ratchet(3, 0.0),
            always_firing_player(),
        ];
        players[0].name = "bad".into();

        let pos = at_tick(0);
        assert!(matches!(
            evaluator.evaluate(&mut players[0].clone(), &pos),
            Err(EvalError::NonPositiveRatchetInterval { .. })
        ));

        // The second player still fires
        let triggers = evaluator.evaluate_all(&mut players, &pos);
        assert_eq!(triggers.len(), 1);
    }

    #[test]
    fn test_muted_player_not_evaluated() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut players = vec![always_firing_player()];
        players[0].muted = true;

        let triggers = evaluator.evaluate_all(&mut players, &at_tick(0));
        assert!(triggers.is_empty());
    }

    #[test]
    fn test_solo_limits_firing() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut players = vec![always_firing_player(), always_firing_player()];
        players[1].name = "solo".into();
        players[1].note = 38;
        players[1].soloed = true;

        let triggers = evaluator.evaluate_all(&mut players, &at_tick(0));
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].note, 38);
    }

    #[test]
    fn test_out_of_range_channel_clamped() {
        let mut evaluator = evaluator_drawing(0.0);
        let mut player = always_firing_player();
        player.channel = 17;

        let triggers = evaluator.evaluate(&mut player, &at_tick(0)).unwrap();
        assert_eq!(triggers[0].channel, 0);
    }
}
