//! A recording pulse output with a single-steppable clock.
//!
//! Plays the role of the hardware timer and the two GPIO ports: arming the
//! one-shot timer stores the pending interval, stepping the clock consumes
//! it, and every pulse-start edge is recorded with its elapsed tick time for
//! later assertion or dumping.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stepcore::{decode_delay, PulseOutput, CLOCK_MASK, PORT_A_MASK, PORT_B_MASK};

/// One recorded pulse-start edge.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRecord {
    /// Simulated time of the edge, in scheduler ticks since the run began.
    pub at: u64,
    /// The bitmask driven onto the output ports at that edge.
    pub activation: u8,
}

#[derive(Debug, Default)]
struct DriverState {
    now: u64,
    armed: Option<u16>,
    enabled: bool,
    port_a: u8,
    port_b: u8,
    trace: Vec<PulseRecord>,
}

/// Simulated [`PulseOutput`].
#[derive(Debug, Default)]
pub struct SimDriver {
    state: Mutex<DriverState>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock to the next armed overflow.
    ///
    /// Returns `false` when the timer is disabled or nothing is armed; the
    /// caller's consume loop ends there.
    pub fn step_clock(&self) -> bool {
        let mut state = self.state.lock();
        if !state.enabled {
            return false;
        }
        match state.armed.take() {
            Some(delay) => {
                state.now += u64::from(decode_delay(delay));
                true
            }
            None => false,
        }
    }

    /// Current simulated time in ticks.
    pub fn now(&self) -> u64 {
        self.state.lock().now
    }

    /// Snapshot of all recorded pulse-start edges.
    pub fn trace(&self) -> Vec<PulseRecord> {
        self.state.lock().trace.clone()
    }

    /// Levels currently driven on the two ports, port A in the low nibble
    /// position of the combined mask.
    pub fn port_levels(&self) -> u8 {
        let state = self.state.lock();
        state.port_a | state.port_b
    }
}

impl PulseOutput for SimDriver {
    fn apply_activation(&self, mask: u8) {
        let mut state = self.state.lock();
        state.port_a = mask & PORT_A_MASK;
        state.port_b = mask & PORT_B_MASK;
        let at = state.now;
        state.trace.push(PulseRecord { at, activation: mask });
    }

    fn end_pulse(&self) {
        let mut state = self.state.lock();
        state.port_a |= CLOCK_MASK & PORT_A_MASK;
        state.port_b |= CLOCK_MASK & PORT_B_MASK;
    }

    fn schedule_next_tick(&self, timer_value: u16) {
        self.state.lock().armed = Some(timer_value);
    }

    fn set_timer_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    fn is_timer_enabled(&self) -> bool {
        self.state.lock().enabled
    }
}
