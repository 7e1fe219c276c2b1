//! # Step Pulse Core
//!
//! The real-time heart of a multi-axis CNC controller, usable on both host
//! and MCU (`no_std`-friendly, allocation-free, lock-free).
//!
//! Two cooperating stages turn decoded motion plans into timed CLK/DIR
//! pulses:
//!
//! - Per-axis [`Plan`] evaluators produce step inter-arrival times with
//!   integer incremental formulas (a Taylor-series acceleration ramp or a
//!   constant rate with Bresenham sub-tick distribution).
//! - The [`MergeScheduler`] interleaves the axes onto one time axis, groups
//!   near-coincident steps into shared records, and feeds the fixed-size
//!   [`ScheduleRing`] that the timer tick drains.
//!
//! The [`StepperController`] facade owns the consumer side: ring, signed
//! step counters, event flags, and the tick itself, behind the
//! [`PulseOutput`] hardware seam. All times are in 0.5 µs ticks.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod controller;
pub mod error;
pub mod output;
pub mod plan;
pub mod ring;
pub mod scheduler;

// Re-export the wire-format types the API surfaces.
pub use cnc_proto::{Notification, PlanKind};

pub use controller::StepperController;
pub use error::PlanFault;
pub use output::{
    DirectionPolarity, NotificationSink, PulseOutput, SlotWiring, CLOCK_MASK,
    MIN_ACTIVATION_DELAY, PORT_A_MASK, PORT_B_MASK, PORT_CHANGE_DELAY, SLOTS, SLOT_COUNT,
    TIMER_RESET_COMPENSATION,
};
pub use plan::{Plan, StepTimes};
pub use ring::{decode_delay, encode_delay, ScheduleRing, SlotView, SCHEDULE_BUFFER_LEN};
pub use scheduler::MergeScheduler;
