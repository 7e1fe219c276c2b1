#![deny(clippy::all)]
#![cfg_attr(not(feature = "std"), no_std)]

//! # CNC Plan Payload Protocol
//!
//! A `no_std` implementation of the wire format spoken between the command
//! dispatcher and the motion-control core.
//!
//! An *instruction* is the concatenation of one encoded plan record per axis,
//! all of the same kind, in slot order. Records are fixed-layout big-endian:
//!
//! | Kind | Size | Fields |
//! |---|---|---|
//! | Acceleration | 14 B | `step_count: i16`, `initial_delta_t: i32`, `n: i32`, `base_delta: i16`, `base_remainder: i16` |
//! | Constant | 10 B | `step_count: i16`, `base_delta_t: i32`, `period_numerator: u16`, `period_denominator: u16` |
//!
//! ## Key Components
//!
//! - **[`records`]**: Typed records with their encoders, used by host tooling
//!   to build instruction payloads.
//! - **[`parser`]**: `nom`-based decoders that partition an N-axis payload
//!   into per-axis records.
//! - **[`Notification`]**: the single-byte upstream notification codes the
//!   core writes back on the serial boundary.

pub mod parser;
pub mod records;

pub use parser::{decode_acceleration, decode_constant, decode_instruction};
pub use records::encode_instruction;
pub use records::{AccelerationRecord, ConstantRecord, PlanRecord, MAX_AXES};

/// Which evaluator an encoded plan record drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// Taylor-series acceleration ramp.
    Acceleration,
    /// Constant rate with sub-tick remainder distribution.
    Constant,
}

impl PlanKind {
    /// Encoded size of one record of this kind, in bytes.
    pub const fn payload_len(self) -> usize {
        match self {
            PlanKind::Acceleration => AccelerationRecord::PAYLOAD_LEN,
            PlanKind::Constant => ConstantRecord::PAYLOAD_LEN,
        }
    }
}

/// Single-byte notifications written back on the serial boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// The schedule consumer was started.
    SchedulerStarted,
    /// The end-of-instruction tick was emitted.
    InstructionFinished,
    /// Cross-instruction slack could not be honored without going backwards
    /// in time; the first step was clamped.
    MissedStep,
    /// Internal consistency fault; the offending axis idles for the
    /// instruction.
    PlanFault,
}

impl Notification {
    /// The byte written upstream for this notification.
    pub const fn to_byte(self) -> u8 {
        match self {
            Notification::SchedulerStarted => b'S',
            Notification::InstructionFinished => b'F',
            Notification::MissedStep => b'M',
            Notification::PlanFault => b'X',
        }
    }

    /// Parses a notification byte received from the core.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'S' => Some(Notification::SchedulerStarted),
            b'F' => Some(Notification::InstructionFinished),
            b'M' => Some(Notification::MissedStep),
            b'X' => Some(Notification::PlanFault),
            _ => None,
        }
    }
}

/// Common error type for the protocol crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The payload is shorter than the records it must carry.
    Truncated { expected: usize, got: usize },
    /// More axes were requested than the wire format carries.
    TooManyAxes(usize),
    /// A record field could not be parsed.
    Malformed,
    /// An instruction mixed records of different kinds.
    KindMismatch,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Truncated { expected, got } => {
                write!(f, "payload truncated: expected {expected} bytes, got {got}")
            }
            Error::TooManyAxes(n) => write!(f, "instruction carries {n} axes, limit is {MAX_AXES}"),
            Error::Malformed => write!(f, "malformed plan record"),
            Error::KindMismatch => write!(f, "instruction mixes plan kinds"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
