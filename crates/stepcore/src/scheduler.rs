//! The N-axis merge scheduler.
//!
//! Owns one [`Plan`] per axis and interleaves their step events onto a single
//! monotonically advancing time axis: repeatedly pick the earliest pending
//! step, advance every axis by that amount, compose the output bitmask for
//! all steps that fall inside the grouping window, and push the record into
//! the schedule ring.
//!
//! Fractional residual time survives each instruction as per-axis *slack* so
//! that step cadence stays continuous across back-to-back instructions.

use cnc_proto::{decode_instruction, Error, Notification, PlanKind};

use crate::controller::StepperController;
use crate::output::{
    DirectionPolarity, NotificationSink, PulseOutput, SlotWiring, CLOCK_MASK,
    MIN_ACTIVATION_DELAY, PORT_CHANGE_DELAY,
};
use crate::plan::Plan;
use crate::ring::encode_delay;

/// Merge scheduler over `N` axes (two- and four-axis machines exist).
pub struct MergeScheduler<const N: usize> {
    plans: [Plan; N],
    /// Signed residual ticks per axis, carried across instructions.
    slack: [i32; N],
    /// Running output level of every line as of the last pushed record.
    cumulative_activation: u8,
    /// The next record must establish DIR levels and wait out the guard.
    need_init: bool,
    /// Whether the instruction end is reported upstream (homing is not).
    has_end: bool,
    polarity: DirectionPolarity,
}

impl<const N: usize> MergeScheduler<N> {
    pub fn new(wiring: [SlotWiring; N]) -> Self {
        Self::with_polarity(wiring, DirectionPolarity::default())
    }

    pub fn with_polarity(wiring: [SlotWiring; N], polarity: DirectionPolarity) -> Self {
        Self {
            plans: wiring.map(Plan::new),
            slack: [0; N],
            cumulative_activation: 0,
            need_init: false,
            has_end: false,
            polarity,
        }
    }

    /// Loads a new instruction from its encoded payload.
    ///
    /// The payload is the concatenation of `N` same-kind records in slot
    /// order; it is validated as a whole before any axis is touched. A
    /// faulted axis reports `'X'` and idles while the others proceed. Slack
    /// that cannot be honored without scheduling into the past clamps to the
    /// DIR guard and reports `'M'` once.
    pub fn init_from<O: PulseOutput, S: NotificationSink>(
        &mut self,
        controller: &StepperController<O, S>,
        kind: PlanKind,
        payload: &[u8],
    ) -> Result<(), Error> {
        if controller.take_stopped_event() {
            // the consumer drained and stopped since the last instruction;
            // cadence continuity is broken, so the residuals mean nothing
            self.slack = [0; N];
        }

        let records = decode_instruction(kind, payload, N)?;

        let mut step_missed = false;
        for ((plan, slack), record) in
            self.plans.iter_mut().zip(&mut self.slack).zip(&records)
        {
            if plan.load(record, self.polarity).is_err() {
                controller.notify(Notification::PlanFault);
            }
            plan.create_next_activation();
            step_missed |= Self::apply_slack(slack, plan);
        }
        if step_missed {
            controller.notify(Notification::MissedStep);
        }

        self.need_init = true;
        self.has_end = true;
        Ok(())
    }

    /// Seeds every axis with its fixed homing profile. Homing instructions
    /// carry no upstream end notification and no cross-instruction slack.
    pub fn init_for_homing(&mut self, kind: PlanKind) {
        for plan in &mut self.plans {
            plan.load_homing(kind, self.polarity);
            plan.create_next_activation();
        }
        self.need_init = true;
        self.has_end = false;
    }

    fn apply_slack(slack: &mut i32, plan: &mut Plan) -> bool {
        if plan.is_activation_boundary() {
            *slack = 0;
            return false;
        }
        plan.add_time(*slack);
        if plan.next_activation_time() < PORT_CHANGE_DELAY {
            // cannot go backwards in time - the step is simply late
            plan.set_time(PORT_CHANGE_DELAY);
            return true;
        }
        false
    }

    /// Fills the schedule ring from the loaded instruction.
    ///
    /// Returns `true` when the ring just became full (the caller has free
    /// time until the consumer catches up; state is kept and the next call
    /// resumes), `false` when the instruction is fully scheduled. On the
    /// `false` path the per-axis residuals are captured as slack and, when
    /// `may_start_consumer` is set, the consumer is started.
    pub fn fill_schedule<O: PulseOutput, S: NotificationSink>(
        &mut self,
        controller: &StepperController<O, S>,
        may_start_consumer: bool,
    ) -> bool {
        while self.any_active() {
            let mut min_active = i32::MAX;
            for plan in self.plans.iter().filter(|p| p.is_active()) {
                min_active = min_active.min(plan.next_activation_time());
            }
            // clip to the timer range: an over-long gap becomes an
            // intermediate tick with no edges instead of an overflow
            let mut earliest = min_active.min(i32::from(u16::MAX)) as u16;

            if self.need_init {
                // the first record of an instruction only establishes DIR
                // levels; CLK edges wait out the direction guard
                earliest = PORT_CHANGE_DELAY as u16;
                self.cumulative_activation = CLOCK_MASK;
                for plan in &self.plans {
                    self.cumulative_activation |= plan.step_mask();
                }
                self.need_init = false;
            }

            // restore CLK high; new low edges are cut below
            self.cumulative_activation |= CLOCK_MASK;

            for index in 0..N {
                self.trigger_plan(index, i32::from(earliest));
            }

            let is_end = self.has_end && !self.any_active();
            let delay = encode_delay(earliest);
            while !controller.ring().push(delay, self.cumulative_activation, is_end) {
                // back-pressure: wait for the consumer, nudging it awake in
                // case it drained and stopped while we were computing
                if may_start_consumer {
                    controller.start_scheduler();
                }
                core::hint::spin_loop();
            }

            if controller.ring().is_full() {
                return true;
            }
        }

        for (slack, plan) in self.slack.iter_mut().zip(&self.plans) {
            *slack = plan.next_activation_time();
        }
        if may_start_consumer {
            controller.start_scheduler();
        }
        false
    }

    /// Advances one axis past the chosen emission point.
    fn trigger_plan(&mut self, index: usize, earliest: i32) {
        let plan = &mut self.plans[index];
        if !plan.is_active() {
            if !plan.is_activation_boundary() {
                // keep accounting time so the residual carried into the
                // next instruction stays truthful
                plan.sub_time(earliest);
            }
            return;
        }

        plan.sub_time(earliest);
        if plan.next_activation_time() > MIN_ACTIVATION_DELAY {
            return;
        }

        // this axis steps now: cut its CLK low in the record
        self.cumulative_activation &= !plan.clk_mask();

        let residual = plan.next_activation_time();
        plan.create_next_activation();
        if residual > 0 {
            // grouped a few ticks early; charge the shortfall to the next
            // step so the intended spacing survives
            plan.add_time(residual);
        }
    }

    fn any_active(&self) -> bool {
        self.plans.iter().any(Plan::is_active)
    }

    /// Residual ticks per axis as of the last drained instruction.
    pub fn slack(&self) -> &[i32; N] {
        &self.slack
    }

    /// The per-axis evaluators, slot-ordered.
    pub fn plans(&self) -> &[Plan; N] {
        &self.plans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnc_proto::{encode_instruction, ConstantRecord, PlanRecord};
    use core::cell::{Cell, RefCell};

    use crate::output::{SLOTS, SLOT0_CLK_MASK, SLOT1_CLK_MASK};
    use crate::ring::decode_delay;

    #[derive(Default)]
    struct TestOutput {
        enabled: Cell<bool>,
        armed: Cell<u16>,
    }

    impl PulseOutput for TestOutput {
        fn apply_activation(&self, _mask: u8) {}
        fn end_pulse(&self) {}
        fn schedule_next_tick(&self, timer_value: u16) {
            self.armed.set(timer_value);
        }
        fn set_timer_enabled(&self, enabled: bool) {
            self.enabled.set(enabled);
        }
        fn is_timer_enabled(&self) -> bool {
            self.enabled.get()
        }
    }

    #[derive(Default)]
    struct TestSink(RefCell<Vec<Notification>>);

    impl NotificationSink for TestSink {
        fn notify(&self, notification: Notification) {
            self.0.borrow_mut().push(notification);
        }
    }

    type TestController = StepperController<TestOutput, TestSink>;

    fn controller() -> TestController {
        StepperController::new(TestOutput::default(), TestSink::default())
    }

    fn scheduler() -> MergeScheduler<2> {
        MergeScheduler::new([SLOTS[0], SLOTS[1]])
    }

    fn constant(step_count: i16, base_delta_t: i32) -> PlanRecord {
        PlanRecord::Constant(ConstantRecord {
            step_count,
            base_delta_t,
            period_numerator: 0,
            period_denominator: 0,
        })
    }

    fn constant_payload(axes: &[(i16, i32)]) -> Vec<u8> {
        let records: Vec<PlanRecord> =
            axes.iter().map(|&(steps, dt)| constant(steps, dt)).collect();
        encode_instruction(&records).unwrap().to_vec()
    }

    /// Drains the ring without running the consumer, returning the decoded
    /// `(interval, activation, is_end)` sequence.
    fn drain_records(ctl: &TestController) -> Vec<(u16, u8, bool)> {
        let mut out = Vec::new();
        if ctl.ring().is_empty() {
            return out;
        }
        let mut interval = decode_delay(ctl.ring().take_start_delay());
        loop {
            let slot = ctl.ring().pop();
            out.push((interval, slot.activation, slot.is_instruction_end));
            interval = decode_delay(slot.delay);
            if !slot.has_more {
                break;
            }
        }
        out
    }

    #[test]
    fn guard_record_precedes_the_first_step() {
        let ctl = controller();
        let mut sched = scheduler();
        let payload = constant_payload(&[(3, 1000), (0, 0)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        assert!(!sched.fill_schedule(&ctl, false));

        let records = drain_records(&ctl);
        assert_eq!(records.len(), 4);
        // DIR-establishing guard tick: all CLK high, no edges
        assert_eq!(records[0], (PORT_CHANGE_DELAY as u16, CLOCK_MASK, false));
        // the guard consumed its share of the first period, so the first
        // pulse still lands one full period into the instruction
        let step_mask = CLOCK_MASK & !SLOT0_CLK_MASK;
        assert_eq!(records[1].0, 1000 - PORT_CHANGE_DELAY as u16);
        for step in &records[1..] {
            assert_eq!(step.1, step_mask);
        }
        assert_eq!(records[2].0, 1000);
        assert_eq!(records[3].0, 1000);
        assert!(records[3].2, "last pulse carries the end marker");
        assert!(!records[2].2);
    }

    #[test]
    fn coincident_steps_share_one_record() {
        let ctl = controller();
        let mut sched = scheduler();
        // 3k-tick horizon: axis 0 at 1000/2000/3000, axis 1 at 1500/3000
        let payload = constant_payload(&[(3, 1000), (2, 1500)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        sched.fill_schedule(&ctl, false);

        let records = drain_records(&ctl);
        let both = CLOCK_MASK & !(SLOT0_CLK_MASK | SLOT1_CLK_MASK);
        let expected = [
            (PORT_CHANGE_DELAY as u16, CLOCK_MASK, false),
            (980, CLOCK_MASK & !SLOT0_CLK_MASK, false),
            (500, CLOCK_MASK & !SLOT1_CLK_MASK, false),
            (500, CLOCK_MASK & !SLOT0_CLK_MASK, false),
            (1000, both, true),
        ];
        assert_eq!(records, expected);
    }

    #[test]
    fn drained_instruction_leaves_slack_and_starts_the_consumer() {
        let ctl = controller();
        let mut sched = scheduler();
        let payload = constant_payload(&[(2, 1000), (1, 1700)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        assert!(!sched.fill_schedule(&ctl, true));

        assert!(ctl.is_scheduler_running());
        assert!(ctl.take_started_event());
        // axis 0 fired at 2000 exactly; axis 1 fired at 1700 and then kept
        // aging for the 300 ticks to the horizon
        assert_eq!(sched.slack(), &[0, -300]);
    }

    #[test]
    fn boundary_axis_resets_its_slack() {
        let ctl = controller();
        let mut sched = scheduler();
        let payload = constant_payload(&[(2, 1000), (1, 1700)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        sched.fill_schedule(&ctl, false);
        assert_eq!(sched.slack(), &[0, -300]);

        // axis 1 is inert in the follow-up: its stale residual must not leak
        let payload = constant_payload(&[(1, 1000), (0, 0)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        sched.fill_schedule(&ctl, false);
        assert_eq!(sched.slack()[1], 0);
        assert!(ctl.sink().0.borrow().iter().all(|n| *n != Notification::MissedStep));
    }

    #[test]
    fn unhonorable_slack_clamps_and_reports_one_missed_step() {
        let ctl = controller();
        let mut sched = scheduler();
        // leave axis 0 with a deep negative residual: it finishes at 1000
        // and ages for the remaining 4000 ticks of axis 1's run
        let payload = constant_payload(&[(1, 1000), (5, 1000)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();
        sched.fill_schedule(&ctl, false);
        assert_eq!(sched.slack(), &[-4000, 0]);

        let payload = constant_payload(&[(1, 30), (1, 5000)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();

        let missed = ctl
            .sink()
            .0
            .borrow()
            .iter()
            .filter(|n| **n == Notification::MissedStep)
            .count();
        assert_eq!(missed, 1);
        // clamped to the DIR guard instead of scheduling into the past
        assert_eq!(sched.plans()[0].next_activation_time(), PORT_CHANGE_DELAY);
    }

    #[test]
    fn faulted_deceleration_axis_idles_while_the_other_runs() {
        use cnc_proto::AccelerationRecord;
        let ctl = controller();
        let mut sched = scheduler();
        let records = [
            PlanRecord::Acceleration(AccelerationRecord {
                step_count: 10,
                initial_delta_t: 1000,
                n: -5, // shorter than the step count: fault
                base_delta: 0,
                base_remainder: 0,
            }),
            PlanRecord::Acceleration(AccelerationRecord {
                step_count: 3,
                initial_delta_t: 1000,
                n: 1000,
                base_delta: 0,
                base_remainder: 0,
            }),
        ];
        let payload = encode_instruction(&records).unwrap();
        sched.init_from(&ctl, PlanKind::Acceleration, &payload).unwrap();
        sched.fill_schedule(&ctl, false);

        assert!(ctl
            .sink()
            .0
            .borrow()
            .contains(&Notification::PlanFault));

        let records = drain_records(&ctl);
        // guard plus the three steps of the surviving axis; the faulted
        // axis never cuts a CLK edge
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .all(|(_, activation, _)| activation & SLOT0_CLK_MASK != 0));
        assert_eq!(records[1].1, CLOCK_MASK & !SLOT1_CLK_MASK);
    }

    #[test]
    fn truncated_payload_rejects_the_instruction_atomically() {
        let ctl = controller();
        let mut sched = scheduler();
        let payload = constant_payload(&[(3, 1000)]); // one record, two axes
        let err = sched
            .init_from(&ctl, PlanKind::Constant, &payload)
            .unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
        assert!(!sched.fill_schedule(&ctl, false));
        assert!(ctl.ring().is_empty());
    }

    #[test]
    fn full_ring_pauses_filling_until_the_consumer_drains() {
        let ctl = controller();
        let mut sched = scheduler();
        // 300 steps needs 301 records: more than the ring holds
        let payload = constant_payload(&[(300, 1000), (0, 0)]);
        sched.init_from(&ctl, PlanKind::Constant, &payload).unwrap();

        assert!(sched.fill_schedule(&ctl, false), "ring must fill up");
        assert!(ctl.ring().is_full());
        assert_eq!(ctl.ring().len(), 255);

        // consume everything without running the timer, then resume
        let drained = drain_records(&ctl);
        assert_eq!(drained.len(), 255);
        assert!(!sched.fill_schedule(&ctl, false), "remainder must fit now");
        let rest = drain_records(&ctl);
        assert_eq!(drained.len() + rest.len(), 301);
        let last = rest.last().unwrap();
        assert!(last.2, "end marker sits on the final pulse");
    }
}
