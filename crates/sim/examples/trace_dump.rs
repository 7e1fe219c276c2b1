//! Runs a constant-rate instruction against the simulated core and dumps the
//! recorded pulse trace as JSON.
//!
//! ```text
//! cargo run --example trace_dump -- --steps 100 --delta-t 1000 --out trace.json
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use cnc_proto::{encode_instruction, ConstantRecord, PlanKind, PlanRecord};
use sim::SimHarness;
use tracing::info;

/// Simulate a two-axis constant-rate instruction and dump its pulse trace.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Signed step count for axis 0 (axis 1 stays parked).
    #[arg(long, default_value_t = 100)]
    steps: i16,

    /// Step period in 0.5 µs ticks.
    #[arg(long, default_value_t = 1000)]
    delta_t: i32,

    /// Extra-tick numerator distributed across the segment.
    #[arg(long, default_value_t = 0)]
    numerator: u16,

    /// Extra-tick denominator.
    #[arg(long, default_value_t = 0)]
    denominator: u16,

    /// Output path for the JSON trace.
    #[arg(long, default_value = "trace.json")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let records = [
        PlanRecord::Constant(ConstantRecord {
            step_count: args.steps,
            base_delta_t: args.delta_t,
            period_numerator: args.numerator,
            period_denominator: args.denominator,
        }),
        PlanRecord::Constant(ConstantRecord {
            step_count: 0,
            base_delta_t: 0,
            period_numerator: 0,
            period_denominator: 0,
        }),
    ];
    let payload = encode_instruction(&records)?;

    let mut harness = SimHarness::<2>::new();
    harness.run_instruction(PlanKind::Constant, &payload)?;

    info!(
        positions = ?harness.step_positions(),
        pulses = harness.axis_step_times(0).len(),
        notifications = ?harness.notifications(),
        "instruction complete"
    );
    harness.dump_trace(&args.out)?;
    Ok(())
}
