//! Runtime parameter structs for the servo core.
//!
//! These are the structs the components are built from. They are separate from
//! the TOML-deserialized config in `servo_config`; `conversions` maps one onto
//! the other. Defaults reproduce the reference 8-channel configuration.

use crate::error::BuildError;
use crate::fixed_point::{MAX_ACCU_BITS, MAX_WORD_BITS, clog2, mask};

/// Input acquisition timing and lane layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionParams {
    /// Bits per sample delivered by each lane.
    pub sample_width: u32,
    pub channel_count: usize,
    /// Samples latched in parallel per acquisition. `channel_count` must be a
    /// multiple of it.
    pub lane_count: usize,
    /// Cycles the conversion-start line stays asserted.
    pub hold_cycles: u32,
    /// Cycles the device needs to convert.
    pub convert_cycles: u32,
    /// Round-trip/propagation delay before data is valid.
    pub settle_cycles: u32,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            sample_width: 16,
            channel_count: 8,
            lane_count: 4,
            hold_cycles: 4,
            convert_cycles: 53,
            settle_cycles: 8,
        }
    }
}

impl AcquisitionParams {
    /// Cycles from `begin()` to valid data.
    #[inline]
    pub fn latency_cycles(&self) -> u64 {
        u64::from(self.hold_cycles) + u64::from(self.convert_cycles) + u64::from(self.settle_cycles) + 1
    }

    /// Acquisitions needed to cover every channel once.
    #[inline]
    pub fn groups(&self) -> usize {
        self.channel_count / self.lane_count.max(1)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if !(1..=MAX_WORD_BITS).contains(&self.sample_width) {
            return Err(BuildError::InvalidConfig("sample_width must be in 1..=32"));
        }
        if self.channel_count == 0 {
            return Err(BuildError::InvalidConfig("channel_count must be >= 1"));
        }
        if self.lane_count == 0 {
            return Err(BuildError::InvalidConfig("lane_count must be >= 1"));
        }
        if self.channel_count % self.lane_count != 0 {
            return Err(BuildError::InvalidConfig(
                "channel_count must be a multiple of lane_count",
            ));
        }
        if self.hold_cycles == 0 {
            return Err(BuildError::InvalidConfig("hold_cycles must be >= 1"));
        }
        Ok(())
    }
}

/// Bus widths of the filter datapath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterWidths {
    /// Stored previous-output width.
    pub state: u32,
    pub coefficient: u32,
    /// Sample and previous-input width.
    pub sample: u32,
    /// Width of the word produced per channel.
    pub output_word: u32,
    pub accumulator: u32,
    /// Right shift applied to the accumulator before output saturation.
    pub shift: u32,
    /// Bits used to address a channel.
    pub channel_index: u32,
    /// Coefficient/state sets per channel.
    pub profile_count: usize,
}

impl Default for FilterWidths {
    fn default() -> Self {
        Self {
            state: 25,
            coefficient: 18,
            sample: 16,
            output_word: 16,
            accumulator: 48,
            shift: 11,
            channel_index: 3,
            profile_count: 2,
        }
    }
}

impl FilterWidths {
    /// Widths for `channel_count` channels with the channel index sized to fit.
    pub fn for_channels(channel_count: usize) -> Self {
        Self {
            channel_index: clog2(channel_count),
            ..Self::default()
        }
    }

    pub fn validate(&self, channel_count: usize) -> Result<(), BuildError> {
        for w in [self.state, self.coefficient, self.sample, self.output_word] {
            if !(1..=MAX_WORD_BITS).contains(&w) {
                return Err(BuildError::InvalidConfig(
                    "state/coefficient/sample/output_word widths must be in 1..=32",
                ));
            }
        }
        if !(1..=MAX_ACCU_BITS).contains(&self.accumulator) {
            return Err(BuildError::InvalidConfig("accumulator width must be in 1..=64"));
        }
        if self.accumulator < self.state + self.coefficient {
            return Err(BuildError::InvalidConfig(
                "accumulator width must be >= state + coefficient",
            ));
        }
        if self.shift >= self.accumulator {
            return Err(BuildError::InvalidConfig("shift must be < accumulator width"));
        }
        if self.output_word > self.state {
            return Err(BuildError::InvalidConfig("output_word must be <= state width"));
        }
        if self.channel_index < clog2(channel_count) {
            return Err(BuildError::InvalidConfig(
                "channel_index width too small for channel_count",
            ));
        }
        if self.profile_count == 0 {
            return Err(BuildError::InvalidConfig("profile_count must be >= 1"));
        }
        Ok(())
    }
}

/// Serial write link parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParams {
    /// Bits shifted per channel frame.
    pub word_width: u32,
    /// Cycles per serial clock half period.
    pub clock_divisor: u32,
    pub channel_count: usize,
    /// Framing strobe high window before a frame.
    pub sync_high_cycles: u32,
    /// Framing strobe low window after the last bit.
    pub sync_low_cycles: u32,
    /// Two-bit write mode placed at the top of framed words.
    pub mode: u8,
    /// Added to the channel index to form the frame address.
    pub address_offset: u32,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            word_width: 24,
            clock_divisor: 2,
            channel_count: 8,
            sync_high_cycles: 4,
            sync_low_cycles: 2,
            mode: 3,
            address_offset: 8,
        }
    }
}

impl OutputParams {
    #[inline]
    pub fn frame_guard_cycles(&self) -> u64 {
        u64::from(self.sync_high_cycles) + u64::from(self.sync_low_cycles)
    }

    /// Cycles spent per channel, identical for every channel.
    #[inline]
    pub fn cycle_budget(&self) -> u64 {
        u64::from(self.word_width) * 2 * u64::from(self.clock_divisor) + self.frame_guard_cycles()
    }

    pub fn validate(&self, output_word: u32) -> Result<(), BuildError> {
        if !(1..=MAX_WORD_BITS).contains(&self.word_width) {
            return Err(BuildError::InvalidConfig("output word_width must be in 1..=32"));
        }
        if self.clock_divisor == 0 {
            return Err(BuildError::InvalidConfig("output clock_divisor must be >= 1"));
        }
        if self.channel_count == 0 {
            return Err(BuildError::InvalidConfig("output channel_count must be >= 1"));
        }
        if self.sync_high_cycles == 0 || self.sync_low_cycles == 0 {
            return Err(BuildError::InvalidConfig("sync guard windows must be >= 1 cycle"));
        }
        if self.word_width < output_word {
            return Err(BuildError::InvalidConfig("output word_width must be >= output_word"));
        }
        if self.word_width > output_word && self.word_width < output_word + 2 {
            return Err(BuildError::InvalidConfig(
                "framed words need two mode bits above the data field",
            ));
        }
        if self.mode > 3 {
            return Err(BuildError::InvalidConfig("output mode must be in 0..=3"));
        }
        if self.word_width > output_word {
            let addr_bits = self.word_width - 2 - output_word;
            let highest = (self.channel_count - 1) as u64 + u64::from(self.address_offset);
            if highest > mask(addr_bits) {
                return Err(BuildError::InvalidConfig(
                    "address_offset + channel does not fit the frame address field",
                ));
            }
        }
        Ok(())
    }
}

/// Gain-stage latch parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GainParams {
    /// Bits of the gain code.
    pub word_width: u32,
    /// Cycles needed to latch a code.
    pub clock_divisor: u32,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            word_width: 16,
            clock_divisor: 2,
        }
    }
}

impl GainParams {
    pub fn validate(&self, hold_cycles: u32) -> Result<(), BuildError> {
        if !(1..=16).contains(&self.word_width) {
            return Err(BuildError::InvalidConfig("gain word_width must be in 1..=16"));
        }
        if self.clock_divisor == 0 {
            return Err(BuildError::InvalidConfig("gain clock_divisor must be >= 1"));
        }
        if self.clock_divisor > hold_cycles {
            return Err(BuildError::InvalidConfig(
                "gain latch must complete within hold_cycles",
            ));
        }
        Ok(())
    }
}

/// Filter coefficients of one (channel, profile) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoefficientSet {
    /// Multiplies `sample - set_point_input`.
    pub gain: i32,
    /// Multiplies the previous output.
    pub integrator: i32,
    /// Multiplies `previous_input - set_point_input`.
    pub zero: i32,
    /// Added to the accumulator before the shift.
    pub offset: i64,
    pub set_point_input: i32,
    /// Loaded into the previous output on `reset`.
    pub set_point_output: i32,
}

impl CoefficientSet {
    /// Proportional-only set with the given gain.
    pub fn proportional(gain: i32) -> Self {
        Self {
            gain,
            ..Self::default()
        }
    }
}

/// Orchestrator options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopCfg {
    /// Start the next group's acquisition while the current group transmits.
    pub overlap_acquisition: bool,
    /// Abort a run if a single pass exceeds this many cycles (0 disables).
    pub cycle_limit: u64,
    /// Length of one logical cycle on the target, for reporting only.
    pub clock_period_ns: u32,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            overlap_acquisition: false,
            cycle_limit: 1_000_000,
            clock_period_ns: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_configuration_is_valid() {
        let acq = AcquisitionParams::default();
        acq.validate().unwrap();
        let widths = FilterWidths::default();
        widths.validate(acq.channel_count).unwrap();
        OutputParams::default().validate(widths.output_word).unwrap();
        GainParams::default().validate(acq.hold_cycles).unwrap();
        assert_eq!(acq.latency_cycles(), 4 + 53 + 8 + 1);
        assert_eq!(acq.groups(), 2);
        assert_eq!(OutputParams::default().cycle_budget(), 24 * 2 * 2 + 6);
    }

    #[test]
    fn lane_count_must_divide_channels() {
        let acq = AcquisitionParams {
            lane_count: 3,
            ..AcquisitionParams::default()
        };
        assert!(matches!(acq.validate(), Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn accumulator_must_hold_full_products() {
        let widths = FilterWidths {
            accumulator: 40,
            ..FilterWidths::default()
        };
        assert!(widths.validate(8).is_err());
    }

    #[test]
    fn channel_index_width_checked() {
        let widths = FilterWidths {
            channel_index: 2,
            ..FilterWidths::default()
        };
        assert!(widths.validate(8).is_err());
        assert_eq!(FilterWidths::for_channels(16).channel_index, 4);
    }

    #[test]
    fn frame_address_must_fit_its_field() {
        // 24-bit frames around a 16-bit data field leave six address bits.
        let out = OutputParams {
            address_offset: 56,
            ..OutputParams::default()
        };
        assert!(out.validate(16).is_ok());
        let out = OutputParams {
            address_offset: 57,
            ..OutputParams::default()
        };
        assert!(matches!(out.validate(16), Err(BuildError::InvalidConfig(_))));
        // Unframed words carry no address.
        let out = OutputParams {
            word_width: 16,
            address_offset: 1000,
            ..OutputParams::default()
        };
        assert!(out.validate(16).is_ok());
    }

    #[test]
    fn gain_latch_bounded_by_hold() {
        let gain = GainParams {
            clock_divisor: 5,
            ..GainParams::default()
        };
        assert!(gain.validate(4).is_err());
        assert!(gain.validate(5).is_ok());
    }
}
