//! The stepper controller: schedule ring, step counters, event flags and the
//! timer tick in one shared value.
//!
//! On a target this is the process-wide singleton; hosted tests construct one
//! per test and share it by reference between the producer and the simulated
//! consumer. All consumer-side state is atomic, so the value itself needs no
//! locking.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use cnc_proto::Notification;

use crate::output::{NotificationSink, PulseOutput, SLOTS, SLOT_COUNT};
use crate::ring::ScheduleRing;

/// Facade over the consumer half of the pipeline.
pub struct StepperController<O: PulseOutput, S: NotificationSink = ()> {
    ring: ScheduleRing,
    output: O,
    sink: S,
    /// Signed distance from home, per slot. Written only by the tick.
    step_positions: [AtomicI32; SLOT_COUNT],
    /// External inhibit mask: a zero bit parks the corresponding output line.
    activation_mask: AtomicU8,
    /// Latched by the tick when the ring drains; cleared by the producer.
    stopped_event: AtomicBool,
    /// Latched when the consumer is started; cleared by the producer.
    started_event: AtomicBool,
}

impl<O: PulseOutput, S: NotificationSink> StepperController<O, S> {
    /// Builds the controller around a pulse output and a notification sink,
    /// leaving the timer disabled and the ring empty.
    pub fn new(output: O, sink: S) -> Self {
        output.set_timer_enabled(false);
        Self {
            ring: ScheduleRing::new(),
            output,
            sink,
            step_positions: core::array::from_fn(|_| AtomicI32::new(0)),
            activation_mask: AtomicU8::new(u8::MAX),
            stopped_event: AtomicBool::new(false),
            started_event: AtomicBool::new(false),
        }
    }

    /// Starts the consumer if there is anything to consume.
    ///
    /// Idempotent: returns `true` when the timer is already running. With an
    /// empty ring there is nothing to start and the call returns `false`.
    /// Otherwise the leading delay is armed, the started event is latched,
    /// `'S'` goes upstream, and the call returns `false` ("just started").
    pub fn start_scheduler(&self) -> bool {
        if self.output.is_timer_enabled() {
            return true;
        }
        if self.ring.is_empty() {
            return false;
        }

        self.sink.notify(Notification::SchedulerStarted);
        self.started_event.store(true, Ordering::Release);
        let delay = self.ring.take_start_delay();
        self.output.schedule_next_tick(delay);
        self.output.set_timer_enabled(true);
        false
    }

    /// Whether the consumer timer is running.
    pub fn is_scheduler_running(&self) -> bool {
        self.output.is_timer_enabled()
    }

    /// The timer tick: emits one schedule record.
    ///
    /// Called by the hardware (or a simulated clock) on every timer overflow.
    /// Runs to completion and never waits.
    pub fn tick(&self) {
        let slot = self.ring.pop();
        // a cleared mask bit forces its line high: the parked state of an
        // active-low CLK
        let inhibit = !self.activation_mask.load(Ordering::Relaxed);
        let activation = slot.activation | inhibit;

        self.output.schedule_next_tick(slot.delay);
        self.output.apply_activation(activation);

        if !slot.has_more {
            self.output.set_timer_enabled(false);
            self.stopped_event.store(true, Ordering::Release);
        }

        // counter accounting doubles as the minimum-pulse-width dwell
        // between the two edges
        self.account_steps(activation);

        if slot.is_instruction_end {
            self.sink.notify(Notification::InstructionFinished);
        }

        self.output.end_pulse();
    }

    fn account_steps(&self, activation: u8) {
        let lowered = !activation;
        for (slot, position) in SLOTS.iter().zip(&self.step_positions) {
            let lane = lowered & slot.lane_mask();
            let forward = lane == slot.lane_mask();
            let backward = lane == slot.clk_mask;
            position.fetch_add(i32::from(forward) - i32::from(backward), Ordering::Relaxed);
        }
    }

    /// Replaces the external inhibit mask; a zero bit blocks the line from
    /// the next tick on.
    pub fn set_activation_mask(&self, mask: u8) {
        self.activation_mask.store(mask, Ordering::Relaxed);
    }

    /// Signed step counter of one slot.
    pub fn step_position(&self, slot: usize) -> i32 {
        self.step_positions[slot].load(Ordering::Relaxed)
    }

    /// All four step counters at once.
    pub fn step_positions(&self) -> [i32; SLOT_COUNT] {
        core::array::from_fn(|i| self.step_position(i))
    }

    /// Consumes the latched "consumer stopped" event.
    pub fn take_stopped_event(&self) -> bool {
        self.stopped_event.swap(false, Ordering::AcqRel)
    }

    /// Consumes the latched "consumer started" event.
    pub fn take_started_event(&self) -> bool {
        self.started_event.swap(false, Ordering::AcqRel)
    }

    /// The shared schedule ring.
    pub fn ring(&self) -> &ScheduleRing {
        &self.ring
    }

    /// The pulse output behind the controller.
    pub fn output(&self) -> &O {
        &self.output
    }

    /// The notification sink behind the controller.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub(crate) fn notify(&self, notification: Notification) {
        self.sink.notify(notification);
    }
}
