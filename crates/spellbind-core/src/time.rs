//! Time system for tick-based simulation
//!
//! Effect durations, periods, ability cooldowns and ability durations are all
//! measured in ticks. The host advances the world once per simulation step.

use serde::{Deserialize, Serialize};

/// A discrete tick identifier (logical time unit)
pub type Tick = u64;

/// Simulation clock state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clock {
    /// Current tick number
    pub tick: Tick,
}

impl Clock {
    /// Create a clock at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next tick
    pub fn advance(&mut self) {
        self.tick += 1;
    }
}
