// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance benchmarks for RULESEQ
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Tick interval computation
//! - Counter cascade throughput
//! - Per-tick trigger evaluation across player counts

use std::sync::{Arc, Mutex};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ruleseq::player::{
    Player, RandomSource, Rule, RuleComparison, RuleOperator, TriggerEvaluator,
};
use ruleseq::session::Session;
use ruleseq::timing::{TimingCascade, TimingSpec};

/// Deterministic random source so evaluation cost is stable
struct FixedRandom;

impl RandomSource for FixedRandom {
    fn roll_percent(&mut self) -> f64 {
        50.0
    }
    fn roll_velocity(&mut self, min: u8, _max: u8) -> u8 {
        min
    }
    fn roll_jitter(&mut self, _magnitude: f64) -> f64 {
        0.0
    }
}

/// Benchmark the interval formula (runs on every retune)
fn bench_tick_interval(c: &mut Criterion) {
    let spec = TimingSpec::new(120.0, 24, 4);

    c.bench_function("tick_interval", |b| {
        b.iter(|| black_box(spec).tick_interval_nanos().unwrap())
    });
}

/// Benchmark the pulse cascade without listeners (pure counter cost)
fn bench_cascade_pulse(c: &mut Criterion) {
    let session = Arc::new(Mutex::new(Session::new("bench", 120.0, 24, 4)));
    let mut cascade = TimingCascade::new(session);

    c.bench_function("cascade_pulse", |b| {
        b.iter(|| {
            cascade.pulse();
        })
    });
}

/// Benchmark trigger evaluation across player counts
fn bench_evaluate_players(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_players");

    for count in [1usize, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let mut players: Vec<Player> = (0..count)
                .map(|i| {
                    Player::new(format!("player-{}", i))
                        .with_note(36 + i as u8)
                        .with_rule(Rule::new(RuleOperator::Tick, RuleComparison::Modulo, 2))
                        .with_ratchet(2, 0.5)
                })
                .collect();
            let mut evaluator = TriggerEvaluator::with_random(Box::new(FixedRandom));
            let mut session = Session::new("bench", 120.0, 24, 4);

            b.iter(|| {
                let advance = session.advance_pulse();
                black_box(evaluator.evaluate_all(&mut players, &advance.position))
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_tick_interval,
    bench_cascade_pulse,
    bench_evaluate_players
);
criterion_main!(benches);
