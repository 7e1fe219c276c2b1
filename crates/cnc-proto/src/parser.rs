//! `nom`-based decoders for encoded plan payloads.
//!
//! The scheduler hands the raw instruction bytes here; the payload is
//! partitioned by the cumulative encoded size of the preceding records.

use crate::{
    records::{AccelerationRecord, ConstantRecord, PlanRecord, MAX_AXES},
    Error, PlanKind,
};
use nom::{
    combinator::map,
    number::complete::{be_i16, be_i32, be_u16},
    sequence::tuple,
    IResult,
};

fn acceleration_record(input: &[u8]) -> IResult<&[u8], AccelerationRecord> {
    map(
        tuple((be_i16, be_i32, be_i32, be_i16, be_i16)),
        |(step_count, initial_delta_t, n, base_delta, base_remainder)| AccelerationRecord {
            step_count,
            initial_delta_t,
            n,
            base_delta,
            base_remainder,
        },
    )(input)
}

fn constant_record(input: &[u8]) -> IResult<&[u8], ConstantRecord> {
    map(
        tuple((be_i16, be_i32, be_u16, be_u16)),
        |(step_count, base_delta_t, period_numerator, period_denominator)| ConstantRecord {
            step_count,
            base_delta_t,
            period_numerator,
            period_denominator,
        },
    )(input)
}

/// Decodes a single acceleration record, returning it and the unread rest.
pub fn decode_acceleration(input: &[u8]) -> Result<(AccelerationRecord, &[u8]), Error> {
    if input.len() < AccelerationRecord::PAYLOAD_LEN {
        return Err(Error::Truncated {
            expected: AccelerationRecord::PAYLOAD_LEN,
            got: input.len(),
        });
    }
    let (rest, record) = acceleration_record(input).map_err(|_| Error::Malformed)?;
    Ok((record, rest))
}

/// Decodes a single constant record, returning it and the unread rest.
pub fn decode_constant(input: &[u8]) -> Result<(ConstantRecord, &[u8]), Error> {
    if input.len() < ConstantRecord::PAYLOAD_LEN {
        return Err(Error::Truncated {
            expected: ConstantRecord::PAYLOAD_LEN,
            got: input.len(),
        });
    }
    let (rest, record) = constant_record(input).map_err(|_| Error::Malformed)?;
    Ok((record, rest))
}

/// Decodes an `axes`-axis instruction of the given kind.
///
/// The total length is validated up front so an instruction either decodes
/// whole or is rejected without partial effect.
pub fn decode_instruction(
    kind: PlanKind,
    input: &[u8],
    axes: usize,
) -> Result<heapless::Vec<PlanRecord, MAX_AXES>, Error> {
    if axes > MAX_AXES {
        return Err(Error::TooManyAxes(axes));
    }
    let expected = axes * kind.payload_len();
    if input.len() < expected {
        return Err(Error::Truncated {
            expected,
            got: input.len(),
        });
    }

    let mut records = heapless::Vec::new();
    let mut rest = input;
    for _ in 0..axes {
        let record = match kind {
            PlanKind::Acceleration => {
                let (r, tail) = decode_acceleration(rest)?;
                rest = tail;
                PlanRecord::Acceleration(r)
            }
            PlanKind::Constant => {
                let (r, tail) = decode_constant(rest)?;
                rest = tail;
                PlanRecord::Constant(r)
            }
        };
        // capacity checked above against MAX_AXES
        let _ = records.push(record);
    }
    Ok(records)
}
