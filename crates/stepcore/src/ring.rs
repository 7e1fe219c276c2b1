//! The fixed-capacity schedule ring shared between the producer and the
//! timer tick.
//!
//! Capacity is exactly 256 records so the 8-bit heads wrap for free. The ring
//! is empty when the heads are equal and full when the write head is one slot
//! behind the read head, which reserves one slot and leaves 255 usable.
//!
//! A record's activation is stored one slot ahead of the delay that precedes
//! it: [`ScheduleRing::take_start_delay`] consumes the leading delay when the
//! consumer is started, after which every tick finds its activation and its
//! re-arm value under a single index. See [`crate::StepperController::tick`].
//!
//! Single producer, single consumer. Payload stores become visible before the
//! write head advances (release store, acquire loads on the consumer side);
//! the consumer copies the slot out before advancing the read head.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use crate::output::TIMER_RESET_COMPENSATION;

/// Number of slots in the schedule ring. Changing this breaks the 8-bit
/// wrap-around the head arithmetic relies on.
pub const SCHEDULE_BUFFER_LEN: usize = 256;

/// Encodes a tick interval as the raw value loaded into the overflow timer.
///
/// The timer counts up and fires on overflow, so the stored value is the
/// counter start `2^16 - interval`, advanced by the fixed per-tick
/// compensation.
pub const fn encode_delay(interval: u16) -> u16 {
    u16::MAX
        .wrapping_sub(interval)
        .wrapping_add(TIMER_RESET_COMPENSATION)
}

/// Recovers the tick interval from a raw timer value. Inverse of
/// [`encode_delay`]; simulated timers use this to advance their clock.
pub const fn decode_delay(delay: u16) -> u16 {
    u16::MAX
        .wrapping_sub(delay)
        .wrapping_add(TIMER_RESET_COMPENSATION)
}

/// One consumed record, copied out of the ring before the read head moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotView {
    /// Raw timer value to arm for the interval following this tick.
    pub delay: u16,
    /// Output bitmask to emit at this tick.
    pub activation: u8,
    /// Whether this tick is the last pulse of an upstream instruction.
    pub is_instruction_end: bool,
    /// False when the ring drained at this tick and the consumer must stop.
    pub has_more: bool,
}

/// Fixed-size single-producer / single-consumer schedule buffer.
pub struct ScheduleRing {
    delays: [AtomicU16; SCHEDULE_BUFFER_LEN],
    activations: [AtomicU8; SCHEDULE_BUFFER_LEN],
    instruction_ends: [AtomicBool; SCHEDULE_BUFFER_LEN],
    write_head: AtomicU8,
    read_head: AtomicU8,
}

impl ScheduleRing {
    pub const fn new() -> Self {
        Self {
            delays: [const { AtomicU16::new(0) }; SCHEDULE_BUFFER_LEN],
            activations: [const { AtomicU8::new(0) }; SCHEDULE_BUFFER_LEN],
            instruction_ends: [const { AtomicBool::new(false) }; SCHEDULE_BUFFER_LEN],
            write_head: AtomicU8::new(0),
            read_head: AtomicU8::new(0),
        }
    }

    /// Appends a record. Returns `false` without effect when the ring is
    /// full; the producer must wait for the consumer and retry.
    pub fn push(&self, delay: u16, activation: u8, is_end: bool) -> bool {
        let write = self.write_head.load(Ordering::Relaxed);
        let read = self.read_head.load(Ordering::Acquire);
        if write.wrapping_add(1) == read {
            return false;
        }

        let ahead = write.wrapping_add(1) as usize;
        self.delays[write as usize].store(delay, Ordering::Relaxed);
        self.activations[ahead].store(activation, Ordering::Relaxed);
        self.instruction_ends[ahead].store(is_end, Ordering::Relaxed);
        // publish only after the payload is in place
        self.write_head.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Copies out the record under the read head, advancing the head only
    /// when further records remain. Consumer context only.
    pub fn pop(&self) -> SlotView {
        let read = self.read_head.load(Ordering::Relaxed);
        let write = self.write_head.load(Ordering::Acquire);
        let idx = read as usize;
        let view = SlotView {
            delay: self.delays[idx].load(Ordering::Relaxed),
            activation: self.activations[idx].load(Ordering::Relaxed),
            is_instruction_end: self.instruction_ends[idx].load(Ordering::Relaxed),
            has_more: write != read,
        };
        if view.has_more {
            self.read_head.store(read.wrapping_add(1), Ordering::Release);
        }
        view
    }

    /// Consumes the leading delay when the consumer is started: the interval
    /// armed before the first pending activation fires. Caller must have
    /// observed a non-empty ring, and the consumer must not be running.
    pub fn take_start_delay(&self) -> u16 {
        let read = self.read_head.load(Ordering::Relaxed);
        let delay = self.delays[read as usize].load(Ordering::Relaxed);
        self.read_head.store(read.wrapping_add(1), Ordering::Release);
        delay
    }

    pub fn is_empty(&self) -> bool {
        self.write_head.load(Ordering::Acquire) == self.read_head.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        let write = self.write_head.load(Ordering::Acquire);
        let read = self.read_head.load(Ordering::Acquire);
        write.wrapping_add(1) == read
    }

    /// Records currently buffered.
    pub fn len(&self) -> u8 {
        let write = self.write_head.load(Ordering::Acquire);
        let read = self.read_head.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl Default for ScheduleRing {
    fn default() -> Self {
        Self::new()
    }
}
