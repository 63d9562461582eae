//! Loop timing derived from the configured parameters.

use crate::config::{AcquisitionParams, LoopCfg, OutputParams};

/// Cycle counts of one full pass. All figures are logical cycles unless the
/// name says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// `begin()` to valid data.
    pub acquisition_latency: u64,
    /// Cycles per channel on the output link.
    pub cycle_budget: u64,
    pub groups: usize,
    pub lanes: usize,
    pub channels: usize,
    /// Start to `done`, acquisitions strictly between output groups.
    pub pass_cycles: u64,
    /// Start to `done` when the next group is acquired during the current
    /// group's output.
    pub overlapped_pass_cycles: u64,
    pub clock_period_ns: u32,
    pub overlap: bool,
}

impl Timing {
    pub fn from_params(acq: &AcquisitionParams, out: &OutputParams, cfg: &LoopCfg) -> Self {
        let latency = acq.latency_cycles();
        let budget = out.cycle_budget();
        let groups = acq.groups() as u64;
        let group_output = acq.lane_count as u64 * budget;

        let pass_cycles = groups * latency + groups * group_output;
        let overlapped_pass_cycles = if groups == 0 {
            0
        } else {
            latency + (groups - 1) * group_output.max(latency) + group_output
        };

        Self {
            acquisition_latency: latency,
            cycle_budget: budget,
            groups: acq.groups(),
            lanes: acq.lane_count,
            channels: acq.channel_count,
            pass_cycles,
            overlapped_pass_cycles,
            clock_period_ns: cfg.clock_period_ns,
            overlap: cfg.overlap_acquisition,
        }
    }

    /// Start to `done` under the configured overlap setting.
    pub fn expected_pass_cycles(&self) -> u64 {
        if self.overlap {
            self.overlapped_pass_cycles
        } else {
            self.pass_cycles
        }
    }

    /// Start-to-start period with `start` held high (one idle cycle after
    /// `done`).
    pub fn pass_period(&self) -> u64 {
        self.expected_pass_cycles() + 1
    }

    pub fn pass_period_ns(&self) -> u64 {
        self.pass_period() * u64::from(self.clock_period_ns)
    }

    /// Cycles all channels spend on the output link per pass.
    pub fn output_cycles(&self) -> u64 {
        self.channels as u64 * self.cycle_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_configuration() {
        let t = Timing::from_params(
            &AcquisitionParams::default(),
            &OutputParams::default(),
            &LoopCfg::default(),
        );
        assert_eq!(t.acquisition_latency, 66);
        assert_eq!(t.cycle_budget, 102);
        assert_eq!(t.groups, 2);
        assert_eq!(t.pass_cycles, 2 * 66 + 8 * 102);
        assert_eq!(t.overlapped_pass_cycles, 66 + 4 * 102 + 4 * 102);
        assert_eq!(t.output_cycles(), 816);
        assert_eq!(t.pass_period_ns(), (948 + 1) * 8);
    }

    #[test]
    fn overlap_is_bounded_by_slow_acquisition() {
        let acq = AcquisitionParams {
            convert_cycles: 1000,
            ..AcquisitionParams::default()
        };
        let cfg = LoopCfg {
            overlap_acquisition: true,
            ..LoopCfg::default()
        };
        let t = Timing::from_params(&acq, &OutputParams::default(), &cfg);
        let l = t.acquisition_latency;
        assert_eq!(t.expected_pass_cycles(), l + l + 4 * 102);
        assert!(t.expected_pass_cycles() < t.pass_cycles);
    }
}
