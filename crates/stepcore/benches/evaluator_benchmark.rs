//! Benchmarks for the evaluator hot loop and the merge/fill path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cnc_proto::{encode_instruction, AccelerationRecord, ConstantRecord, PlanKind, PlanRecord};
use stepcore::{MergeScheduler, Plan, PulseOutput, StepperController, SLOTS};

struct NullOutput;

impl PulseOutput for NullOutput {
    fn apply_activation(&self, _mask: u8) {}
    fn end_pulse(&self) {}
    fn schedule_next_tick(&self, _timer_value: u16) {}
    fn set_timer_enabled(&self, _enabled: bool) {}
    fn is_timer_enabled(&self) -> bool {
        false
    }
}

fn bench_acceleration_evaluator(c: &mut Criterion) {
    let record = PlanRecord::Acceleration(AccelerationRecord {
        step_count: 5000,
        initial_delta_t: 8000,
        n: 1,
        base_delta: 0,
        base_remainder: 0,
    });

    c.bench_function("acceleration_ramp_5000_steps", |b| {
        b.iter(|| {
            let mut plan = Plan::new(SLOTS[0]);
            plan.load(&record, Default::default()).unwrap();
            let mut total: i64 = 0;
            for delta_t in plan.step_times() {
                total += i64::from(delta_t);
            }
            black_box(total)
        })
    });
}

fn bench_merge_fill(c: &mut Criterion) {
    let records = [
        PlanRecord::Constant(ConstantRecord {
            step_count: 200,
            base_delta_t: 1000,
            period_numerator: 3,
            period_denominator: 7,
        }),
        PlanRecord::Constant(ConstantRecord {
            step_count: -150,
            base_delta_t: 1300,
            period_numerator: 0,
            period_denominator: 0,
        }),
    ];
    let payload = encode_instruction(&records).unwrap();

    c.bench_function("merge_fill_two_axes_200_steps", |b| {
        b.iter(|| {
            let controller = StepperController::new(NullOutput, ());
            let mut scheduler = MergeScheduler::new([SLOTS[0], SLOTS[1]]);
            scheduler
                .init_from(&controller, PlanKind::Constant, &payload)
                .unwrap();
            while scheduler.fill_schedule(&controller, false) {
                // consume without timing emulation to keep the producer hot
                while !controller.ring().is_empty() {
                    controller.ring().pop();
                }
            }
            black_box(controller.ring().len())
        })
    });
}

criterion_group!(benches, bench_acceleration_evaluator, bench_merge_fill);
criterion_main!(benches);
