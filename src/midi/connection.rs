// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Cached output connections with validation throttling and recovery.
//!
//! Acquiring a connection on the real-time path must be cheap: a handle
//! validated within the last five seconds is returned as-is. A stale
//! handle gets one cheap probe; on failure the manager walks a fixed
//! recovery chain (caller-provided handle, fresh open by name, the named
//! built-in synthesizer, the process default output) and callers see
//! absence, never an error, when the chain is exhausted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::OutputSink;

/// How long a validated handle is trusted without re-probing
pub const REVALIDATE_AFTER: Duration = Duration::from_secs(5);

/// Shared handle to an output sink
pub type SharedSink = Arc<Mutex<Box<dyn OutputSink>>>;

/// Errors from opening output devices.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    /// No device with the requested name exists
    #[error("no output device named {0:?}")]
    DeviceNotFound(String),
    /// The device exists but could not be opened
    #[error("failed to open {device:?}: {reason}")]
    OpenFailed { device: String, reason: String },
    /// The built-in synthesizer could not be brought up
    #[error("fallback synthesizer unavailable: {0}")]
    FallbackUnavailable(String),
    /// No process-wide default output exists
    #[error("no default output available")]
    NoDefaultOutput,
}

/// Transport seam the manager acquires and probes connections through.
pub trait DeviceProvider: Send {
    /// Cheap liveness probe for a previously opened sink
    fn validate(&mut self, _name: &str, sink: &SharedSink) -> bool {
        sink.lock()
            .map(|mut sink| sink.probe().is_ok())
            .unwrap_or(false)
    }

    /// Open a fresh sink for the named device
    fn open(&mut self, name: &str) -> Result<Box<dyn OutputSink>, ConnectionError>;

    /// Bring up the built-in fallback synthesizer
    fn open_fallback_synth(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError>;

    /// Open the process-wide default output
    fn open_default(&mut self) -> Result<Box<dyn OutputSink>, ConnectionError>;
}

struct CacheEntry {
    /// Open sink, absent while a first open or recovery is in flight
    sink: Option<SharedSink>,
    /// When the sink last passed (or was excused from) validation
    validated_at: Instant,
    /// Recovery in flight; concurrent callers back off
    reconnecting: bool,
}

/// Connection cache keyed by device name.
pub struct ConnectionManager {
    provider: Mutex<Box<dyn DeviceProvider>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    /// Device name that routes to the built-in synthesizer
    fallback_name: String,
    /// Trust window for cached handles
    revalidate_after: Duration,
}

impl ConnectionManager {
    /// Create a manager over the given provider. `fallback_name` is the
    /// device name whose recovery path is the built-in synthesizer.
    pub fn new(provider: Box<dyn DeviceProvider>, fallback_name: impl Into<String>) -> Self {
        Self {
            provider: Mutex::new(provider),
            cache: Mutex::new(HashMap::new()),
            fallback_name: fallback_name.into(),
            revalidate_after: REVALIDATE_AFTER,
        }
    }

    /// Override the trust window (used by tests)
    pub fn with_revalidation(mut self, window: Duration) -> Self {
        self.revalidate_after = window;
        self
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_provider(&self) -> MutexGuard<'_, Box<dyn DeviceProvider>> {
        self.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire a usable sink for `name`.
    ///
    /// `known` is an already-open handle the caller may hold; it is
    /// preferred over a fresh open when recovery runs. Returns `None`
    /// when nothing can be acquired or a recovery for this name is
    /// already in flight; callers drop the output gracefully.
    pub fn get_or_create(
        &self,
        name: &str,
        known: Option<Box<dyn OutputSink>>,
    ) -> Option<SharedSink> {
        let stale = {
            let mut cache = self.lock_cache();
            match cache.get_mut(name) {
                Some(entry) if entry.reconnecting => {
                    debug!(device = name, "recovery in flight, output unavailable");
                    return None;
                }
                Some(entry) => match &entry.sink {
                    Some(sink) if entry.validated_at.elapsed() < self.revalidate_after => {
                        return Some(Arc::clone(sink));
                    }
                    Some(sink) => {
                        entry.reconnecting = true;
                        Some(Arc::clone(sink))
                    }
                    None => {
                        entry.reconnecting = true;
                        None
                    }
                },
                None => {
                    cache.insert(
                        name.to_string(),
                        CacheEntry {
                            sink: None,
                            validated_at: Instant::now(),
                            reconnecting: true,
                        },
                    );
                    None
                }
            }
        };

        // Cheap probe outside the cache lock
        if let Some(sink) = stale {
            if self.lock_provider().validate(name, &sink) {
                let mut cache = self.lock_cache();
                if let Some(entry) = cache.get_mut(name) {
                    entry.validated_at = Instant::now();
                    entry.reconnecting = false;
                }
                return Some(sink);
            }
            debug!(device = name, "cached connection failed validation");
        }

        let recovered = self.recover(name, known);
        let mut cache = self.lock_cache();
        match recovered {
            Some(sink) => {
                cache.insert(
                    name.to_string(),
                    CacheEntry {
                        sink: Some(Arc::clone(&sink)),
                        validated_at: Instant::now(),
                        reconnecting: false,
                    },
                );
                Some(sink)
            }
            None => {
                cache.remove(name);
                warn!(device = name, "all recovery steps failed, dropping output");
                None
            }
        }
    }

    /// Multi-step recovery: known handle, fresh open, named fallback
    /// synthesizer, process default.
    fn recover(&self, name: &str, known: Option<Box<dyn OutputSink>>) -> Option<SharedSink> {
        if let Some(known) = known {
            info!(device = name, "using caller-provided handle");
            return Some(Arc::new(Mutex::new(known)));
        }

        let mut provider = self.lock_provider();

        match provider.open(name) {
            Ok(sink) => {
                info!(device = name, "opened fresh connection");
                return Some(Arc::new(Mutex::new(sink)));
            }
            Err(err) => debug!(device = name, %err, "fresh open failed"),
        }

        if name == self.fallback_name {
            match provider.open_fallback_synth() {
                Ok(sink) => {
                    info!(device = name, "recovered via built-in synthesizer");
                    return Some(Arc::new(Mutex::new(sink)));
                }
                Err(err) => debug!(device = name, %err, "built-in synthesizer unavailable"),
            }
        }

        match provider.open_default() {
            Ok(sink) => {
                info!(device = name, "recovered via default output");
                Some(Arc::new(Mutex::new(sink)))
            }
            Err(err) => {
                debug!(device = name, %err, "default output unavailable");
                None
            }
        }
    }

    /// Close and evict the cached handle for `name`. Unknown names are
    /// a no-op.
    pub fn close(&self, name: &str) {
        if self.lock_cache().remove(name).is_some() {
            debug!(device = name, "closed cached connection");
        }
    }

    /// Number of cached connections
    pub fn cached_count(&self) -> usize {
        self.lock_cache()
            .values()
            .filter(|entry| entry.sink.is_some())
            .count()
    }
}
