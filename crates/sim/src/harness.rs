//! The simulation harness: core wiring, a cooperative producer/consumer
//! pump, notification capture, and trace dumping.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use cnc_proto::{Notification, PlanKind};
use crossbeam_channel::{unbounded, Receiver, Sender};
use stepcore::{
    DirectionPolarity, MergeScheduler, NotificationSink, StepperController, SLOTS, SLOT_COUNT,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::driver::{PulseRecord, SimDriver};

/// Collects the core's upstream notification bytes into a channel.
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // the receiver lives as long as the harness; a closed channel just
        // drops the byte, like an unplugged serial port would
        let _ = self.tx.send(notification);
    }
}

/// Errors surfaced by a simulated run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("instruction payload rejected: {0}")]
    Rejected(#[from] cnc_proto::Error),
}

/// An `N`-axis core instance with a simulated clock.
///
/// The producer (instruction loading and schedule filling) and the consumer
/// (the timer tick) run cooperatively: filling pauses whenever the ring
/// fills up, the clock drains it, and filling resumes, which keeps runs
/// deterministic while still exercising the back-pressure path.
pub struct SimHarness<const N: usize> {
    controller: StepperController<SimDriver, ChannelSink>,
    scheduler: MergeScheduler<N>,
    notifications: Receiver<Notification>,
}

impl<const N: usize> SimHarness<N> {
    pub fn new() -> Self {
        Self::with_polarity(DirectionPolarity::default())
    }

    pub fn with_polarity(polarity: DirectionPolarity) -> Self {
        assert!(N <= SLOT_COUNT, "the core drives at most four slots");
        let (tx, rx) = unbounded();
        let wiring = core::array::from_fn(|slot| SLOTS[slot]);
        Self {
            controller: StepperController::new(SimDriver::new(), ChannelSink { tx }),
            scheduler: MergeScheduler::with_polarity(wiring, polarity),
            notifications: rx,
        }
    }

    /// Loads one instruction and runs it to completion.
    pub fn run_instruction(&mut self, kind: PlanKind, payload: &[u8]) -> Result<(), HarnessError> {
        self.scheduler.init_from(&self.controller, kind, payload)?;
        self.pump();
        Ok(())
    }

    /// Runs the fixed homing travel to completion.
    pub fn run_homing(&mut self, kind: PlanKind) {
        self.scheduler.init_for_homing(kind);
        self.pump();
    }

    /// Loads and schedules an instruction without starting the consumer, the
    /// way a streaming producer runs ahead of the timer. Chained calls keep
    /// cadence across the instruction boundary; [`Self::run_queued`] plays
    /// everything back.
    pub fn queue_instruction(&mut self, kind: PlanKind, payload: &[u8]) -> Result<(), HarnessError> {
        self.scheduler.init_from(&self.controller, kind, payload)?;
        while self.scheduler.fill_schedule(&self.controller, false) {
            // over-long instruction: relieve the full ring before resuming
            self.controller.start_scheduler();
            self.drain();
        }
        Ok(())
    }

    /// Starts the consumer and runs every queued record; returns the tick
    /// count.
    pub fn run_queued(&self) -> u32 {
        self.controller.start_scheduler();
        self.drain()
    }

    fn pump(&mut self) {
        loop {
            let ring_full = self.scheduler.fill_schedule(&self.controller, true);
            if !ring_full {
                break;
            }
            // the ring filled before the consumer was (re)started; it will
            // not empty on its own, so run it dry here before resuming
            self.controller.start_scheduler();
            let ticks = self.drain();
            debug!(ticks, "ring full; drained and resuming");
        }
        self.drain();
    }

    /// Runs the consumer until the timer stops; returns the tick count.
    pub fn drain(&self) -> u32 {
        let mut ticks = 0;
        while self.controller.output().step_clock() {
            self.controller.tick();
            ticks += 1;
        }
        ticks
    }

    /// All recorded pulse-start edges.
    pub fn trace(&self) -> Vec<PulseRecord> {
        self.controller.output().trace()
    }

    /// Times at which the given axis's CLK line pulsed low, in ticks.
    pub fn axis_step_times(&self, axis: usize) -> Vec<u64> {
        let clk_mask = SLOTS[axis].clk_mask;
        self.trace()
            .iter()
            .filter(|record| record.activation & clk_mask == 0)
            .map(|record| record.at)
            .collect()
    }

    /// Drains and returns the notifications emitted so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }

    /// The four signed step counters.
    pub fn step_positions(&self) -> [i32; SLOT_COUNT] {
        self.controller.step_positions()
    }

    /// Residual per-axis slack after the last instruction.
    pub fn slack(&self) -> &[i32; N] {
        self.scheduler.slack()
    }

    /// The controller under simulation.
    pub fn controller(&self) -> &StepperController<SimDriver, ChannelSink> {
        &self.controller
    }

    /// Writes the recorded trace as pretty-printed JSON.
    pub fn dump_trace(&self, path: &Path) -> Result<()> {
        let trace = self.trace();
        info!(path = %path.display(), records = trace.len(), "dumping trace file");
        let json = serde_json::to_string_pretty(&trace)?;
        let mut file = File::create(path)
            .with_context(|| format!("failed to create trace file {}", path.display()))?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

impl<const N: usize> Default for SimHarness<N> {
    fn default() -> Self {
        Self::new()
    }
}
