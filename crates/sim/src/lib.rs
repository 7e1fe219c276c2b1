//! # In-Process Simulation Harness
//!
//! A deterministic simulation environment for the step pulse core, built for
//! CI validation without physical hardware. The [`SimDriver`] stands in for
//! the hardware timer and GPIO ports, recording every pulse-start edge with
//! its elapsed tick time; the [`SimHarness`] wires a full core instance to it
//! and pumps producer and consumer cooperatively so runs replay identically.

pub mod driver;
pub mod harness;

pub use driver::{PulseRecord, SimDriver};
pub use harness::{ChannelSink, HarnessError, SimHarness};
