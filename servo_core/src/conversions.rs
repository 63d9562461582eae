//! `From` implementations bridging `servo_config` types to `servo_core` types.

use crate::builder::Seeds;
use crate::config::{AcquisitionParams, CoefficientSet, FilterWidths, GainParams, LoopCfg, OutputParams};
use crate::iir::StateSlot;

// ── AcquisitionParams ────────────────────────────────────────────────────────

impl From<&servo_config::Acquisition> for AcquisitionParams {
    fn from(c: &servo_config::Acquisition) -> Self {
        Self {
            sample_width: c.sample_width,
            channel_count: c.channel_count,
            lane_count: c.lane_count,
            hold_cycles: c.hold_cycles,
            convert_cycles: c.convert_cycles,
            settle_cycles: c.settle_cycles,
        }
    }
}

// ── FilterWidths ─────────────────────────────────────────────────────────────

/// Needs the whole config: the channel index width defaults from the channel count.
impl From<&servo_config::Config> for FilterWidths {
    fn from(c: &servo_config::Config) -> Self {
        let f = &c.filter;
        Self {
            state: f.state,
            coefficient: f.coefficient,
            sample: f.sample,
            output_word: f.output_word,
            accumulator: f.accumulator,
            shift: f.shift,
            channel_index: f.channel_index_for(c.acquisition.channel_count),
            profile_count: f.profile_count,
        }
    }
}

// ── OutputParams ─────────────────────────────────────────────────────────────

impl From<&servo_config::Config> for OutputParams {
    fn from(c: &servo_config::Config) -> Self {
        let o = &c.output;
        Self {
            word_width: o.word_width,
            clock_divisor: o.clock_divisor,
            channel_count: c.acquisition.channel_count,
            sync_high_cycles: o.sync_high_cycles,
            sync_low_cycles: o.sync_low_cycles,
            mode: o.mode,
            address_offset: o.address_offset,
        }
    }
}

// ── GainParams / LoopCfg ─────────────────────────────────────────────────────

impl From<&servo_config::Gain> for GainParams {
    fn from(c: &servo_config::Gain) -> Self {
        Self {
            word_width: c.word_width,
            clock_divisor: c.clock_divisor,
        }
    }
}

impl From<&servo_config::ServoCfg> for LoopCfg {
    fn from(c: &servo_config::ServoCfg) -> Self {
        Self {
            overlap_acquisition: c.overlap_acquisition,
            cycle_limit: c.cycle_limit,
            clock_period_ns: c.clock_period_ns,
        }
    }
}

// ── Coefficients ─────────────────────────────────────────────────────────────

impl From<&servo_config::CoefficientRow> for CoefficientSet {
    fn from(c: &servo_config::CoefficientRow) -> Self {
        Self {
            gain: c.gain,
            integrator: c.integrator,
            zero: c.zero,
            offset: c.offset,
            set_point_input: c.set_point_input,
            set_point_output: c.set_point_output,
        }
    }
}

// ── Seeds ────────────────────────────────────────────────────────────────────

impl TryFrom<&servo_config::Config> for Seeds {
    type Error = eyre::Report;

    fn try_from(c: &servo_config::Config) -> Result<Self, Self::Error> {
        let mut seeds = Self::default();
        for row in &c.coefficients {
            seeds
                .coefficients
                .push((row.channel, row.profile, CoefficientSet::from(row)));
        }
        for ch in &c.channel {
            seeds.profiles.push((ch.index, ch.profile));
            seeds.gain_codes.push((ch.index, ch.gain_code));
        }
        for s in &c.state {
            let slot: StateSlot = s.slot.parse()?;
            let value = i32::try_from(s.value)
                .map_err(|_| eyre::eyre!("state value {} does not fit 32 bits", s.value))?;
            seeds.states.push((s.channel, s.profile, slot, value));
        }
        Ok(seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_defaults_line_up() {
        let cfg = servo_config::Config::default();
        assert_eq!(AcquisitionParams::from(&cfg.acquisition), AcquisitionParams::default());
        assert_eq!(FilterWidths::from(&cfg), FilterWidths::default());
        assert_eq!(OutputParams::from(&cfg), OutputParams::default());
        assert_eq!(GainParams::from(&cfg.gain), GainParams::default());
        assert_eq!(LoopCfg::from(&cfg.servo), LoopCfg::default());
    }

    #[test]
    fn seeds_carry_channels_and_states() {
        let cfg = servo_config::load_toml(
            r#"
[[channel]]
index = 3
profile = 1
gain_code = 9

[[state]]
channel = 0
slot = "y1"
value = 0x1145
"#,
        )
        .unwrap();
        let seeds = Seeds::try_from(&cfg).unwrap();
        assert_eq!(seeds.profiles, vec![(3, 1)]);
        assert_eq!(seeds.gain_codes, vec![(3, 9)]);
        assert_eq!(seeds.states, vec![(0, 0, StateSlot::PreviousOutput, 0x1145)]);
    }
}
