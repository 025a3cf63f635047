// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Bounded modular counter used for skip and subdivision gating.
//!
//! A cycler of length L steps through positions 0..L; position 0 of
//! each cycle is the skip slot. Length 0 disables the cycler entirely:
//! every slot is active and the position stays at 0.

use serde::{Deserialize, Serialize};

/// Kind of slot a cycler advance landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSlot {
    /// The slot is active
    Active,
    /// The slot is the skip slot of its cycle
    Skip,
}

impl CycleSlot {
    /// Whether the slot is active
    pub fn is_active(&self) -> bool {
        matches!(self, CycleSlot::Active)
    }
}

/// Bounded modular counter with a skip slot at position 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycler {
    /// Cycle length; 0 disables the cycler
    length: u32,
    /// Current position within the cycle
    #[serde(default)]
    position: u32,
}

impl Cycler {
    /// Create a cycler with the given length (0 = disabled)
    pub fn new(length: u32) -> Self {
        Self {
            length,
            position: 0,
        }
    }

    /// A cycler that never skips
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Cycle length
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Current position
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Whether this cycler can ever report a skip slot
    pub fn is_enabled(&self) -> bool {
        self.length > 0
    }

    /// Change the cycle length and restart the cycle
    pub fn set_length(&mut self, length: u32) {
        self.length = length;
        self.position = 0;
    }

    /// Advance one slot and report the kind of slot landed on.
    ///
    /// A disabled cycler always reports an active slot.
    pub fn advance(&mut self) -> CycleSlot {
        if self.length == 0 {
            return CycleSlot::Active;
        }
        self.position = (self.position + 1) % self.length;
        if self.position == 0 {
            CycleSlot::Skip
        } else {
            CycleSlot::Active
        }
    }

    /// Reset the position to the start of the cycle
    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Default for Cycler {
    fn default() -> Self {
        Self::disabled()
    }
}
