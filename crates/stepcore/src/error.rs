//! Error types for the motion core.

/// A plan payload that cannot be evaluated safely.
///
/// Faults are reported upstream as an `'X'` notification; the offending axis
/// idles for the instruction while the remaining axes continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFault {
    /// A deceleration plan whose Taylor index is smaller than its step count
    /// would underflow the incremental series.
    DecelerationTooShort { steps: u16, n: u32 },
}

impl core::fmt::Display for PlanFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PlanFault::DecelerationTooShort { steps, n } => write!(
                f,
                "deceleration plan of {steps} steps exceeds its series index {n}"
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PlanFault {}
