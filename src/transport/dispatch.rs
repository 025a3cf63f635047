// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Bounded worker pool for note output.
//!
//! The clock thread only decides and enqueues; the actual I/O (waiting
//! out the intra-tick offset, note-on, gate, note-off) happens here so
//! a slow or blocking sink can never delay the next tick. The queue is
//! bounded: when it fills, jobs are dropped with a warning rather than
//! ever blocking the clock.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::midi::SharedSink;

/// Default number of worker threads
pub const DEFAULT_WORKERS: usize = 4;

/// Queue capacity; excess work is dropped, not blocked on
pub const QUEUE_CAPACITY: usize = 256;

/// One note to play through a sink.
pub struct NoteJob {
    /// Sink to play through
    pub sink: SharedSink,
    /// MIDI channel
    pub channel: u8,
    /// Note number
    pub note: u8,
    /// Velocity
    pub velocity: u8,
    /// Wait before the note-on (intra-tick offset)
    pub delay: Duration,
    /// Hold time between note-on and note-off
    pub gate: Duration,
}

/// Fixed-size worker pool draining a bounded job queue.
pub struct Dispatcher {
    sender: Option<SyncSender<NoteJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Create a pool with `workers` threads
    pub fn new(workers: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel::<NoteJob>(QUEUE_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("ruleseq-dispatch-{}", index))
                    .spawn(move || run_worker(receiver))
                    .expect("failed to spawn dispatch worker")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Enqueue a job without blocking.
    ///
    /// Returns false when the job was dropped (queue full or pool shut
    /// down).
    pub fn submit(&self, job: NoteJob) -> bool {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return false,
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("dispatch queue full, dropping trigger");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the workers drain and exit
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// Worker body: take the next job, play the note, swallow sink faults.
fn run_worker(receiver: Arc<Mutex<Receiver<NoteJob>>>) {
    loop {
        let job = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        match job {
            Ok(job) => play_note(job),
            Err(_) => break,
        }
    }
}

fn play_note(job: NoteJob) {
    if !job.delay.is_zero() {
        thread::sleep(job.delay);
    }

    {
        let mut sink = job.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = sink.note_on(job.channel, job.note, job.velocity) {
            debug!(%err, note = job.note, "note-on failed");
            return;
        }
    }

    thread::sleep(job.gate);

    let mut sink = job.sink.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(err) = sink.note_off(job.channel, job.note, 0) {
        debug!(%err, note = job.note, "note-off failed");
    }
}
