// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Arbitration of the 16 logical MIDI channels.
//!
//! Channel 9 is the percussion channel: reserved at construction,
//! never handed out by allocation queries and never released.

use std::sync::{Mutex, PoisonError};

use tracing::warn;

/// Number of logical MIDI channels
pub const CHANNEL_COUNT: usize = 16;

/// Channel permanently reserved for percussion
pub const DRUM_CHANNEL: u8 = 9;

/// Thread-safe channel bookkeeping.
///
/// All methods take `&self`; the allocator is shared between the
/// configuration context and the trigger-evaluation context.
pub struct ChannelAllocator {
    in_use: Mutex<[bool; CHANNEL_COUNT]>,
}

impl ChannelAllocator {
    /// Create an allocator with only the drum channel in use
    pub fn new() -> Self {
        let mut in_use = [false; CHANNEL_COUNT];
        in_use[DRUM_CHANNEL as usize] = true;
        Self {
            in_use: Mutex::new(in_use),
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, [bool; CHANNEL_COUNT]> {
        self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lowest-indexed free melodic channel, marked in use.
    ///
    /// Never returns the drum channel. When every melodic channel is
    /// taken, channel 0 is returned as a shared fallback.
    pub fn next_available_melodic(&self) -> u8 {
        let mut slots = self.slots();
        for channel in 0..CHANNEL_COUNT {
            if channel == DRUM_CHANNEL as usize {
                continue;
            }
            if !slots[channel] {
                slots[channel] = true;
                return channel as u8;
            }
        }
        warn!("all melodic channels in use, sharing channel 0");
        0
    }

    /// Deterministic channel for a sequencer slot index.
    ///
    /// Indices at or above the drum channel shift up by one so the
    /// mapping skips it; the result wraps modulo 16 and skips the drum
    /// channel again if the wrap lands there. The channel is marked in
    /// use.
    pub fn for_sequencer_index(&self, index: usize) -> u8 {
        let mut channel = index;
        if channel >= DRUM_CHANNEL as usize {
            channel += 1;
        }
        channel %= CHANNEL_COUNT;
        if channel == DRUM_CHANNEL as usize {
            channel = (channel + 1) % CHANNEL_COUNT;
        }

        self.slots()[channel] = true;
        channel as u8
    }

    /// Mark a channel free. Releasing the drum channel or an
    /// out-of-range channel is a no-op.
    pub fn release(&self, channel: u8) {
        if channel == DRUM_CHANNEL || channel as usize >= CHANNEL_COUNT {
            return;
        }
        self.slots()[channel as usize] = false;
    }

    /// Whether a channel is currently in use. Out-of-range channels
    /// report false.
    pub fn is_in_use(&self, channel: u8) -> bool {
        if channel as usize >= CHANNEL_COUNT {
            return false;
        }
        self.slots()[channel as usize]
    }

    /// Reserve a specific channel.
    ///
    /// Fails for out-of-range channels, the drum channel, and channels
    /// already in use.
    pub fn reserve(&self, channel: u8) -> bool {
        if channel as usize >= CHANNEL_COUNT || channel == DRUM_CHANNEL {
            return false;
        }
        let mut slots = self.slots();
        if slots[channel as usize] {
            return false;
        }
        slots[channel as usize] = true;
        true
    }

    /// Release every melodic channel
    pub fn release_all(&self) {
        let mut slots = self.slots();
        for channel in 0..CHANNEL_COUNT {
            slots[channel] = channel == DRUM_CHANNEL as usize;
        }
    }
}

impl Default for ChannelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drum_channel_reserved_at_init() {
        let allocator = ChannelAllocator::new();
        assert!(allocator.is_in_use(DRUM_CHANNEL));
    }

    #[test]
    fn test_next_available_never_returns_drum_channel() {
        let allocator = ChannelAllocator::new();
        let mut seen = Vec::new();
        for _ in 0..15 {
            seen.push(allocator.next_available_melodic());
        }
        assert!(!seen.contains(&DRUM_CHANNEL));
        assert_eq!(seen[..9], [0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(seen[9], 10);
    }

    #[test]
    fn test_exhaustion_falls_back_to_channel_zero() {
        let allocator = ChannelAllocator::new();
        for _ in 0..15 {
            allocator.next_available_melodic();
        }
        // All melodic channels taken: fallback is shared channel 0
        assert_eq!(allocator.next_available_melodic(), 0);
    }

    #[test]
    fn test_reserve_release_lifecycle() {
        let allocator = ChannelAllocator::new();

        assert!(allocator.reserve(5));
        assert!(!allocator.reserve(5));
        assert!(allocator.is_in_use(5));

        allocator.release(5);
        assert!(!allocator.is_in_use(5));
        assert!(allocator.reserve(5));
    }

    #[test]
    fn test_reserve_rejects_drum_and_out_of_range() {
        let allocator = ChannelAllocator::new();
        assert!(!allocator.reserve(DRUM_CHANNEL));
        assert!(!allocator.reserve(16));
        assert!(!allocator.reserve(200));
    }

    #[test]
    fn test_release_drum_channel_is_noop() {
        let allocator = ChannelAllocator::new();
        allocator.release(DRUM_CHANNEL);
        assert!(allocator.is_in_use(DRUM_CHANNEL));
        // Out of range release is also a no-op
        allocator.release(42);
    }

    #[test]
    fn test_sequencer_index_mapping_skips_drum() {
        let allocator = ChannelAllocator::new();
        // Indices 0-7 map straight through
        for index in 0..8 {
            assert_eq!(allocator.for_sequencer_index(index), index as u8);
        }
        // Index 8 stays below the drum channel, 9 and up shift past it
        assert_eq!(allocator.for_sequencer_index(8), 8);
        assert_eq!(allocator.for_sequencer_index(9), 10);
        assert_eq!(allocator.for_sequencer_index(14), 15);
        // Wraps modulo 16
        assert_eq!(allocator.for_sequencer_index(15), 0);
    }

    #[test]
    fn test_sequencer_index_marks_in_use() {
        let allocator = ChannelAllocator::new();
        let channel = allocator.for_sequencer_index(3);
        assert!(allocator.is_in_use(channel));
    }

    #[test]
    fn test_release_all_keeps_drum_reserved() {
        let allocator = ChannelAllocator::new();
        allocator.reserve(2);
        allocator.reserve(5);

        allocator.release_all();
        assert!(!allocator.is_in_use(2));
        assert!(!allocator.is_in_use(5));
        assert!(allocator.is_in_use(DRUM_CHANNEL));
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;
        use std::thread;

        let allocator = Arc::new(ChannelAllocator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let allocator = Arc::clone(&allocator);
            handles.push(thread::spawn(move || allocator.next_available_melodic()));
        }

        let mut channels: Vec<u8> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        channels.sort();
        channels.dedup();
        // Four concurrent allocations yield four distinct channels
        assert_eq!(channels.len(), 4);
    }
}
