use rstest::rstest;
use servo_frontend::{DacReceiver, FrameLayout};
use servo_traits::{DacLink, LinkLevels};

/// Drive one frame the way the write engine does: sync high window, bits with
/// `div` cycles per clock half, then a sync low window.
fn drive_frame(rx: &mut DacReceiver, word: u32, width: u32, div: u32, high: u32, low: u32) {
    for _ in 0..high {
        rx.drive(LinkLevels { sync: true, sclk: false, sdi: false }).unwrap();
    }
    for bit in (0..width).rev() {
        let sdi = (word >> bit) & 1 == 1;
        for half in 0..2 {
            for _ in 0..div {
                rx.drive(LinkLevels { sync: false, sclk: half == 1, sdi }).unwrap();
            }
        }
    }
    for _ in 0..low {
        rx.drive(LinkLevels::default()).unwrap();
    }
}

#[rstest]
#[case(1, 1, 1)]
#[case(2, 4, 2)]
#[case(5, 3, 7)]
fn frames_decode_for_any_clock_divisor(#[case] div: u32, #[case] high: u32, #[case] low: u32) {
    let mut rx = DacReceiver::new(FrameLayout::default());
    let h = rx.handle();
    for ch in 0..8u32 {
        let data = 0x8000 + ch * 100;
        drive_frame(&mut rx, (3 << 22) | ((ch + 8) << 16) | data, 24, div, high, low);
    }
    rx.drive(LinkLevels { sync: true, ..LinkLevels::default() }).unwrap();

    let words = h.words();
    assert_eq!(words.len(), 8);
    for (i, w) in words.iter().enumerate() {
        assert_eq!(w.channel, i);
        assert_eq!(w.value, i as i32 * 100);
    }
    let per_frame = u64::from(high + 24 * 2 * div + low);
    assert_eq!(h.cycles(), 8 * per_frame + 1);
}

#[rstest]
#[case(0)]
#[case(3)]
fn history_keeps_only_recent_frames(#[case] depth: usize) {
    let mut rx = DacReceiver::with_history(FrameLayout::default(), depth);
    let h = rx.handle();
    for pass in 0..50u32 {
        for ch in 0..8u32 {
            drive_frame(&mut rx, (3 << 22) | ((ch + 8) << 16) | (0x8000 + pass), 24, 1, 1, 1);
        }
    }
    rx.drive(LinkLevels { sync: true, ..LinkLevels::default() }).unwrap();

    assert_eq!(h.frame_count(), 400);
    let channels: Vec<usize> = h.words().iter().map(|w| w.channel).collect();
    assert_eq!(channels, (8 - depth..8).collect::<Vec<_>>());
    assert_eq!(h.latest(0), Some(49));
    assert_eq!(h.latest(7), Some(49));
}

#[rstest]
fn unknown_address_is_rejected() {
    let mut rx = DacReceiver::new(FrameLayout::default());
    drive_frame(&mut rx, (3 << 22) | (2 << 16), 24, 1, 1, 1);
    let err = rx
        .drive(LinkLevels { sync: true, ..LinkLevels::default() })
        .unwrap_err();
    assert!(err.to_string().contains("maps to no channel"));
}
