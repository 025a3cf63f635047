// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Clock scheduler: fixed-rate pulse generation on a dedicated thread.
//!
//! Pulses are scheduled against absolute deadlines (start + n * interval)
//! so timing error never accumulates. The thread sleeps until shortly
//! before each deadline, then spins for the final stretch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use super::cascade::PulseHandler;
use super::{TimingError, TimingSpec};

/// How close to the deadline the clock thread switches from sleeping
/// to spinning.
const SPIN_WINDOW: Duration = Duration::from_micros(500);

/// Fixed-rate pulse source.
///
/// One scheduler drives one `PulseHandler`; pulses are delivered
/// synchronously on the clock thread, so they can never overlap.
pub struct ClockScheduler {
    /// Stored timing parameters used on the next `start()`
    spec: TimingSpec,
    /// Shared run flag, checked by the clock thread each iteration
    running: Arc<AtomicBool>,
    /// Clock thread handle while running
    worker: Option<JoinHandle<()>>,
    /// Pulse sink shared with the clock thread
    handler: Arc<Mutex<dyn PulseHandler>>,
}

impl ClockScheduler {
    /// Create a scheduler that feeds pulses to `handler`
    pub fn new(spec: TimingSpec, handler: Arc<Mutex<dyn PulseHandler>>) -> Self {
        Self {
            spec,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            handler,
        }
    }

    /// Current timing parameters
    pub fn spec(&self) -> TimingSpec {
        self.spec
    }

    /// Whether the clock thread is producing pulses
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Begin fixed-rate pulsing from pulse count zero.
    ///
    /// No-op when already running. Fails only when no valid tick
    /// interval can be derived from the stored parameters.
    pub fn start(&mut self) -> Result<(), TimingError> {
        if self.is_running() {
            return Ok(());
        }

        let interval_nanos = self.spec.tick_interval_nanos()?;
        debug!(
            tempo = self.spec.tempo,
            ticks_per_beat = self.spec.ticks_per_beat,
            interval_nanos,
            "starting clock"
        );

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let handler = Arc::clone(&self.handler);

        let worker = thread::Builder::new()
            .name("ruleseq-clock".into())
            .spawn(move || run_clock(interval_nanos, running, handler))
            .expect("failed to spawn clock thread");
        self.worker = Some(worker);
        Ok(())
    }

    /// Halt future pulses. A pulse already in progress completes.
    ///
    /// Idempotent; safe to call when already stopped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("clock thread terminated abnormally");
            }
        }
    }

    /// Replace the timing parameters.
    ///
    /// While running, stops the clock, recomputes the interval and beat
    /// structure, and restarts; while stopped, just updates the stored
    /// defaults used by the next `start()`.
    pub fn update_timing_parameters(
        &mut self,
        tempo: f64,
        ticks_per_beat: u32,
        beats_per_bar: u32,
    ) -> Result<(), TimingError> {
        let spec = TimingSpec::new(tempo, ticks_per_beat, beats_per_bar);
        spec.validate()?;

        if self.is_running() {
            self.stop();
            self.spec = spec;
            self.start()
        } else {
            self.spec = spec;
            Ok(())
        }
    }
}

impl Drop for ClockScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clock thread body: wait for each absolute deadline, then pulse.
fn run_clock(interval_nanos: f64, running: Arc<AtomicBool>, handler: Arc<Mutex<dyn PulseHandler>>) {
    let started = Instant::now();
    let mut pulse: u64 = 0;

    while running.load(Ordering::Acquire) {
        let deadline = started + Duration::from_nanos((interval_nanos * pulse as f64) as u64);
        if !wait_until(deadline, &running) {
            break;
        }

        // A bad pulse must never halt the transport: errors are logged
        // and a panicking listener is contained.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut handler = handler.lock().unwrap_or_else(PoisonError::into_inner);
            handler.handle_pulse()
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, pulse, "pulse handling failed"),
            Err(_) => error!(pulse, "pulse handler panicked"),
        }

        pulse += 1;
    }
}

/// Sleep-then-spin until `deadline`. Returns false if the run flag
/// cleared while waiting.
fn wait_until(deadline: Instant, running: &AtomicBool) -> bool {
    loop {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        if remaining > SPIN_WINDOW {
            thread::sleep(remaining - SPIN_WINDOW);
        } else {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Counts pulses; optionally fails every pulse
    struct CountingHandler {
        pulses: Arc<AtomicU64>,
        fail: bool,
    }

    impl PulseHandler for CountingHandler {
        fn handle_pulse(&mut self) -> anyhow::Result<()> {
            self.pulses.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated pulse fault");
            }
            Ok(())
        }
    }

    fn counting_scheduler(spec: TimingSpec, fail: bool) -> (ClockScheduler, Arc<AtomicU64>) {
        let pulses = Arc::new(AtomicU64::new(0));
        let handler = Arc::new(Mutex::new(CountingHandler {
            pulses: Arc::clone(&pulses),
            fail,
        }));
        (ClockScheduler::new(spec, handler), pulses)
    }

    #[test]
    fn test_start_stop_idempotent() {
        let (mut scheduler, _pulses) = counting_scheduler(TimingSpec::default(), false);
        assert!(!scheduler.is_running());

        scheduler.start().unwrap();
        assert!(scheduler.is_running());
        scheduler.start().unwrap(); // second start is a no-op
        assert!(scheduler.is_running());

        scheduler.stop();
        assert!(!scheduler.is_running());
        scheduler.stop(); // second stop is a no-op
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_start_rejects_invalid_interval() {
        let (mut scheduler, _pulses) = counting_scheduler(TimingSpec::new(0.0, 24, 4), false);
        assert_eq!(
            scheduler.start(),
            Err(TimingError::NonPositiveTempo(0.0))
        );
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_pulses_are_delivered() {
        // 300 BPM at 24 PPQ: one pulse every ~8.3ms
        let (mut scheduler, pulses) = counting_scheduler(TimingSpec::new(300.0, 24, 4), false);
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.stop();

        let count = pulses.load(Ordering::SeqCst);
        assert!(count >= 8, "expected at least 8 pulses, got {}", count);
    }

    #[test]
    fn test_pulse_faults_do_not_stop_the_clock() {
        let (mut scheduler, pulses) = counting_scheduler(TimingSpec::new(300.0, 24, 4), true);
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(60));

        assert!(scheduler.is_running());
        assert!(pulses.load(Ordering::SeqCst) > 1);
        scheduler.stop();
    }

    #[test]
    fn test_update_while_stopped_stores_defaults() {
        let (mut scheduler, _pulses) = counting_scheduler(TimingSpec::default(), false);
        scheduler
            .update_timing_parameters(90.0, 48, 3)
            .unwrap();
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.spec(), TimingSpec::new(90.0, 48, 3));
    }

    #[test]
    fn test_update_while_running_restarts() {
        let (mut scheduler, pulses) = counting_scheduler(TimingSpec::new(300.0, 24, 4), false);
        scheduler.start().unwrap();
        thread::sleep(Duration::from_millis(30));

        scheduler.update_timing_parameters(240.0, 24, 4).unwrap();
        assert!(scheduler.is_running());
        assert_eq!(scheduler.spec().tempo, 240.0);

        let before = pulses.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert!(pulses.load(Ordering::SeqCst) > before);
        scheduler.stop();
    }

    #[test]
    fn test_update_rejects_invalid_parameters() {
        let (mut scheduler, _pulses) = counting_scheduler(TimingSpec::default(), false);
        assert!(scheduler.update_timing_parameters(120.0, 0, 4).is_err());
        // Stored defaults untouched by the failed update
        assert_eq!(scheduler.spec(), TimingSpec::default());
    }
}
