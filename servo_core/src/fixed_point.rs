//! Fixed-point helpers for the filter datapath.
//!
//! Every bus in the loop has an explicit signed bit width. Values are carried
//! in native integers (`i32` for samples/state/coefficients, `i128` for the
//! exact accumulator sum) and narrowed with the helpers below. Narrowing always
//! saturates; nothing in the datapath wraps.

// Range and index-width checks are shared with config validation.
pub use servo_config::{clog2, fits};

/// Largest supported width for sample, state, coefficient and output buses.
pub const MAX_WORD_BITS: u32 = 32;
/// Largest supported accumulator width.
pub const MAX_ACCU_BITS: u32 = 64;

/// Smallest value representable in `width` signed bits.
#[inline]
pub fn signed_min(width: u32) -> i64 {
    debug_assert!((1..=MAX_ACCU_BITS).contains(&width), "width {width}");
    if width >= 64 {
        i64::MIN
    } else {
        -(1i64 << (width - 1))
    }
}

/// Largest value representable in `width` signed bits.
#[inline]
pub fn signed_max(width: u32) -> i64 {
    debug_assert!((1..=MAX_ACCU_BITS).contains(&width), "width {width}");
    if width >= 64 {
        i64::MAX
    } else {
        (1i64 << (width - 1)) - 1
    }
}

/// Clamp `value` to the signed range of `width` bits.
#[inline]
pub fn saturate(value: i128, width: u32) -> i64 {
    let lo = i128::from(signed_min(width));
    let hi = i128::from(signed_max(width));
    // Clamped into [lo, hi], which always fits i64.
    value.clamp(lo, hi) as i64
}

/// Saturate into a bus of at most 32 bits.
#[inline]
pub fn saturate_i32(value: i128, width: u32) -> i32 {
    debug_assert!(width <= MAX_WORD_BITS);
    saturate(value, width.min(MAX_WORD_BITS)) as i32
}

/// Arithmetic shift right (floor division by `2^shift`), the way a hardware
/// shifter drops low bits.
#[inline]
pub fn shift_right(value: i128, shift: u32) -> i128 {
    if shift >= 127 {
        if value < 0 { -1 } else { 0 }
    } else {
        value >> shift
    }
}

/// Low `width` bits set.
#[inline]
pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Two's complement value re-expressed as offset binary in `width` bits
/// (`signed_min` maps to 0, `signed_max` to all ones).
#[inline]
pub fn offset_binary(value: i64, width: u32) -> u64 {
    let v = saturate(i128::from(value), width);
    ((v as i128 - i128::from(signed_min(width))) as u64) & mask(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_for_common_widths() {
        assert_eq!(signed_min(16), -32_768);
        assert_eq!(signed_max(16), 32_767);
        assert_eq!(signed_min(1), -1);
        assert_eq!(signed_max(1), 0);
        assert_eq!(signed_min(64), i64::MIN);
        assert_eq!(signed_max(48), (1i64 << 47) - 1);
    }

    #[test]
    fn saturate_clamps_both_ends() {
        assert_eq!(saturate(40_000, 16), 32_767);
        assert_eq!(saturate(-40_000, 16), -32_768);
        assert_eq!(saturate(-5, 16), -5);
        assert_eq!(saturate(i128::MAX, 64), i64::MAX);
        assert_eq!(saturate_i32(1 << 40, 25), (1 << 24) - 1);
    }

    #[test]
    fn shift_right_floors_negative_values() {
        assert_eq!(shift_right(-1, 11), -1);
        assert_eq!(shift_right(-2048, 11), -1);
        assert_eq!(shift_right(-2049, 11), -2);
        assert_eq!(shift_right(4095, 11), 1);
        assert_eq!(shift_right(-7, 200), -1);
    }

    #[test]
    fn offset_binary_endpoints() {
        assert_eq!(offset_binary(-32_768, 16), 0);
        assert_eq!(offset_binary(0, 16), 0x8000);
        assert_eq!(offset_binary(32_767, 16), 0xFFFF);
    }

    #[test]
    fn clog2_matches_channel_index_widths() {
        assert_eq!(clog2(1), 0);
        assert_eq!(clog2(2), 1);
        assert_eq!(clog2(8), 3);
        assert_eq!(clog2(9), 4);
    }

    #[test]
    fn fits_is_inclusive() {
        assert!(fits(32_767, 16));
        assert!(fits(-32_768, 16));
        assert!(!fits(32_768, 16));
    }

    #[test]
    fn fits_agrees_with_signed_range() {
        for w in 1..=MAX_ACCU_BITS {
            assert!(fits(signed_min(w), w) && fits(signed_max(w), w), "width {w}");
            if w < 64 {
                assert!(!fits(signed_min(w) - 1, w), "width {w}");
                assert!(!fits(signed_max(w) + 1, w), "width {w}");
            }
        }
    }
}
