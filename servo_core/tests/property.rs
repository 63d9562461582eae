use proptest::prelude::*;
use servo_core::fixed_point::{signed_max, signed_min};
use servo_core::mocks::{ConstantSource, NullGain, NullLink};
use servo_core::{
    Acquisition, AcquisitionParams, CoefficientSet, FilterBank, FilterWidths, LoopCfg, Servo,
    StateSlot,
};

fn coefficient() -> impl Strategy<Value = i32> {
    -(1i32 << 17)..(1i32 << 17)
}

fn coefficients() -> impl Strategy<Value = CoefficientSet> {
    (
        coefficient(),
        coefficient(),
        coefficient(),
        -(1i64 << 40)..(1i64 << 40),
        -(1i32 << 15)..(1i32 << 15),
    )
        .prop_map(|(gain, integrator, zero, offset, set_point_input)| CoefficientSet {
            gain,
            integrator,
            zero,
            offset,
            set_point_input,
            set_point_output: 0,
        })
}

proptest! {
    #[test]
    fn capture_arrives_after_fixed_latency(hold in 1u32..16, convert in 0u32..80, settle in 0u32..16) {
        let params = AcquisitionParams {
            hold_cycles: hold,
            convert_cycles: convert,
            settle_cycles: settle,
            ..AcquisitionParams::default()
        };
        let latency = params.latency_cycles();
        let mut acq = Acquisition::new(params);
        let mut source = ConstantSource::new(vec![5; 8]);
        acq.begin(4).unwrap();
        let mut ticks = 0u64;
        loop {
            ticks += 1;
            if acq.tick(&mut source).unwrap() {
                break;
            }
            prop_assert!(ticks < 1_000);
        }
        prop_assert_eq!(ticks, latency);
        prop_assert_eq!(acq.lanes(), &[5, 5, 5, 5][..]);
    }

    #[test]
    fn outputs_stay_within_output_word(c in coefficients(), samples in prop::collection::vec(any::<i32>(), 1..32)) {
        let widths = FilterWidths::default();
        let (lo, hi) = (signed_min(widths.output_word), signed_max(widths.output_word));
        let mut bank = FilterBank::new(widths, 8);
        bank.set_coefficients(3, 1, c).unwrap();
        for s in samples {
            let y = i64::from(bank.compute(3, 1, s).unwrap());
            prop_assert!(lo <= y && y <= hi);
            prop_assert_eq!(i64::from(bank.state(3, 1).unwrap().previous_output), y);
        }
    }

    #[test]
    fn proportional_path_matches_floor_division(gain in coefficient(), sample in -(1i32 << 15)..(1i32 << 15)) {
        let mut bank = FilterBank::new(FilterWidths::default(), 8);
        bank.set_coefficients(0, 0, CoefficientSet::proportional(gain)).unwrap();
        let expected = (i64::from(gain) * i64::from(sample)).div_euclid(1 << 11);
        let expected = expected.clamp(signed_min(16), signed_max(16));
        prop_assert_eq!(i64::from(bank.compute(0, 0, sample).unwrap()), expected);
    }

    #[test]
    fn injected_state_reads_back(x1 in -(1i32 << 15)..(1i32 << 15), y1 in -(1i32 << 24)..(1i32 << 24)) {
        let mut servo = Servo::builder()
            .with_source(ConstantSource::default())
            .with_link(NullLink)
            .with_gain_sink(NullGain)
            .build()
            .unwrap();
        servo.set_state(6, 1, StateSlot::PreviousInput, x1).unwrap();
        servo.set_state(6, 1, StateSlot::PreviousOutput, y1).unwrap();
        let s = servo.filter_state(6, 1).unwrap();
        prop_assert_eq!((s.previous_input, s.previous_output), (x1, y1));
    }

    #[test]
    fn identical_loops_produce_identical_records(
        values in prop::collection::vec(-(1i32 << 15)..(1i32 << 15), 8),
        gain in coefficient(),
        integrator in -(1i32 << 11)..(1i32 << 11),
    ) {
        let build = || {
            let mut b = Servo::builder()
                .with_source(ConstantSource::new(values.clone()))
                .with_link(NullLink)
                .with_gain_sink(NullGain);
            for ch in 0..8 {
                b = b.with_coefficients(ch, 0, CoefficientSet { gain, integrator, ..CoefficientSet::default() });
            }
            b.build().unwrap()
        };
        let (mut a, mut b) = (build(), build());
        for _ in 0..3 {
            prop_assert_eq!(a.run_pass().unwrap(), b.run_pass().unwrap());
        }
        prop_assert_eq!(a.cycle(), b.cycle());
    }

    // Every tick is unwrapped: a begin or gain select while busy fails the case.
    #[test]
    fn held_start_never_begins_while_busy(
        lane_count in prop::sample::select(vec![1usize, 2, 4, 8]),
        hold in 2u32..10,
        convert in 0u32..150,
        settle in 0u32..16,
        overlap in any::<bool>(),
        codes in prop::collection::vec(prop::collection::vec(any::<u16>(), 8), 3),
    ) {
        let mut servo = Servo::builder()
            .with_source(ConstantSource::new(vec![100; 8]))
            .with_link(NullLink)
            .with_gain_sink(NullGain)
            .with_acquisition(AcquisitionParams {
                lane_count,
                hold_cycles: hold,
                convert_cycles: convert,
                settle_cycles: settle,
                ..AcquisitionParams::default()
            })
            .with_loop(LoopCfg { overlap_acquisition: overlap, ..LoopCfg::default() })
            .build()
            .unwrap();
        let timing = servo.timing();
        for (ch, &code) in codes[0].iter().enumerate() {
            servo.set_gain_code(ch, code).unwrap();
        }

        servo.set_start(true);
        let mut done_at = Vec::new();
        while done_at.len() < codes.len() {
            prop_assert!(servo.cycle() < 4 * timing.pass_period() * codes.len() as u64);
            let status = servo.tick().unwrap();
            if !status.signals.done {
                continue;
            }
            done_at.push(servo.cycle());
            prop_assert_eq!(servo.last_pass_cycles(), Some(timing.expected_pass_cycles()));
            // Idle for this one tick, so new codes are accepted.
            if let Some(next) = codes.get(done_at.len()) {
                for (ch, &code) in next.iter().enumerate() {
                    servo.set_gain_code(ch, code).unwrap();
                }
            }
        }
        for pair in done_at.windows(2) {
            prop_assert_eq!(pair[1] - pair[0], timing.pass_period());
        }
    }
}
