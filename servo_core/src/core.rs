//! The servo loop orchestrator (`ServoCore`).
//!
//! Owns the acquisition handshake, filter bank, gain controller and write
//! engine and advances all of them in lockstep, one logical cycle per
//! [`ServoCore::tick`]. Components step first; the orchestrator then reacts to
//! what they reported, and anything it issues takes effect on the next tick.
//!
//! Per pass, for each group of `lane_count` channels: select gains and begin
//! the acquisition, wait for the capture, then compute and transmit every
//! channel of the group in index order, one word in flight at a time.

use eyre::WrapErr;
use servo_traits::{DacLink, GainSink, SampleSource};

use crate::acquisition::Acquisition;
use crate::config::{CoefficientSet, LoopCfg};
use crate::error::{ContractViolation, Result, ServoError};
use crate::gain::GainController;
use crate::iir::{FilterBank, FilterState, StateSlot};
use crate::output::SerialWriter;
use crate::status::{LoopIterationRecord, LoopState, Signals, TickStatus};
use crate::timing::Timing;

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
pub struct ServoCore<A: SampleSource, D: DacLink, G: GainSink> {
    pub(crate) source: A,
    pub(crate) link: D,
    pub(crate) gain_sink: G,
    pub(crate) acquisition: Acquisition,
    pub(crate) bank: FilterBank,
    pub(crate) writer: SerialWriter,
    pub(crate) gain: GainController,
    pub(crate) cfg: LoopCfg,

    pub(crate) profiles: Vec<usize>,
    pub(crate) gain_codes: Vec<u16>,
    /// Latest captured sample per channel.
    pub(crate) samples: Vec<i32>,

    pub(crate) state: LoopState,
    pub(crate) start_level: bool,
    pub(crate) start_once: bool,
    pub(crate) done: bool,
    pub(crate) current_channel: usize,
    pub(crate) transmitting: bool,
    /// Groups whose acquisition was issued / completed in the current pass.
    pub(crate) groups_begun: usize,
    pub(crate) groups_captured: usize,

    pub(crate) cycle: u64,
    pub(crate) pass_cycles: u64,
    pub(crate) last_pass_cycles: Option<u64>,
    pub(crate) passes: u64,
}

impl<A: SampleSource, D: DacLink, G: GainSink> core::fmt::Debug for ServoCore<A, D, G> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServoCore")
            .field("state", &self.state)
            .field("channel", &self.current_channel)
            .field("cycle", &self.cycle)
            .field("passes", &self.passes)
            .finish()
    }
}

impl<A: SampleSource, D: DacLink, G: GainSink> ServoCore<A, D, G> {
    pub(crate) fn from_parts(
        source: A,
        link: D,
        gain_sink: G,
        acquisition: Acquisition,
        bank: FilterBank,
        writer: SerialWriter,
        gain: GainController,
        cfg: LoopCfg,
    ) -> Self {
        let n = bank.channel_count();
        Self {
            source,
            link,
            gain_sink,
            acquisition,
            bank,
            writer,
            gain,
            cfg,
            profiles: vec![0; n],
            gain_codes: vec![0; n],
            samples: vec![0; n],
            state: LoopState::Idle,
            start_level: false,
            start_once: false,
            done: false,
            current_channel: 0,
            transmitting: false,
            groups_begun: 0,
            groups_captured: 0,
            cycle: 0,
            pass_cycles: 0,
            last_pass_cycles: None,
            passes: 0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.bank.channel_count()
    }

    pub fn loop_cfg(&self) -> &LoopCfg {
        &self.cfg
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// `done` as of the last tick.
    pub fn done(&self) -> bool {
        self.done
    }

    /// Logical cycles ticked since construction.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes
    }

    /// Cycles from start to `done` of the most recent pass.
    pub fn last_pass_cycles(&self) -> Option<u64> {
        self.last_pass_cycles
    }

    pub fn timing(&self) -> Timing {
        Timing::from_params(self.acquisition.params(), self.writer.params(), &self.cfg)
    }

    pub fn acquisition(&self) -> &Acquisition {
        &self.acquisition
    }

    pub fn writer(&self) -> &SerialWriter {
        &self.writer
    }

    pub fn gain(&self) -> &GainController {
        &self.gain
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.bank
    }

    pub fn filter_state(&self, channel: usize, profile: usize) -> Result<FilterState> {
        self.bank
            .state(channel, profile)
            .copied()
            .map_err(eyre::Report::new)
    }

    pub fn source_mut(&mut self) -> &mut A {
        &mut self.source
    }

    pub fn link(&self) -> &D {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut D {
        &mut self.link
    }

    pub fn gain_sink(&self) -> &G {
        &self.gain_sink
    }

    /// Level of the `start` input. While held high a new pass begins on the
    /// tick after `done`.
    pub fn set_start(&mut self, level: bool) {
        self.start_level = level;
    }

    /// Request a single pass.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            tracing::warn!(channel = self.current_channel, "start while running");
            return Err(ServoError::from(ContractViolation::StartWhileRunning).into());
        }
        self.start_once = true;
        Ok(())
    }

    fn ensure_idle(&self, violation: ContractViolation) -> Result<()> {
        if self.is_running() {
            tracing::warn!(%violation, "rejected while running");
            return Err(ServoError::from(violation).into());
        }
        Ok(())
    }

    /// Overwrite x1/y1 of one (channel, profile). Only between passes.
    pub fn set_state(&mut self, channel: usize, profile: usize, slot: StateSlot, value: i32) -> Result<()> {
        self.ensure_idle(ContractViolation::InjectWhileRunning)?;
        self.bank
            .inject(channel, profile, slot, value)
            .map_err(eyre::Report::new)
    }

    pub fn set_coefficients(&mut self, channel: usize, profile: usize, coefficients: CoefficientSet) -> Result<()> {
        self.ensure_idle(ContractViolation::ReconfigureWhileRunning)?;
        self.bank
            .set_coefficients(channel, profile, coefficients)
            .map_err(eyre::Report::new)
    }

    /// Profile used for `channel` from the next pass on.
    pub fn set_profile(&mut self, channel: usize, profile: usize) -> Result<()> {
        self.ensure_idle(ContractViolation::ReconfigureWhileRunning)?;
        let limit = self.bank.profile_count();
        if profile >= limit {
            return Err(ServoError::OutOfRange {
                what: "profile",
                index: profile,
                limit,
            }
            .into());
        }
        let n = self.profiles.len();
        let slot = self.profiles.get_mut(channel).ok_or(ServoError::OutOfRange {
            what: "channel",
            index: channel,
            limit: n,
        })?;
        *slot = profile;
        Ok(())
    }

    pub fn active_profile(&self, channel: usize) -> Option<usize> {
        self.profiles.get(channel).copied()
    }

    pub fn set_gain_code(&mut self, channel: usize, code: u16) -> Result<()> {
        self.ensure_idle(ContractViolation::ReconfigureWhileRunning)?;
        let n = self.gain_codes.len();
        let slot = self.gain_codes.get_mut(channel).ok_or(ServoError::OutOfRange {
            what: "channel",
            index: channel,
            limit: n,
        })?;
        *slot = code;
        Ok(())
    }

    /// Load every filter state from its set points.
    pub fn reset_filters(&mut self) -> Result<()> {
        self.ensure_idle(ContractViolation::ReconfigureWhileRunning)?;
        self.bank.reset_all();
        Ok(())
    }

    fn lane_count(&self) -> usize {
        self.acquisition.params().lane_count
    }

    fn group_of(&self, channel: usize) -> usize {
        channel / self.lane_count()
    }

    fn group_count(&self) -> usize {
        self.acquisition.params().groups()
    }

    /// Select gains for `group` and begin its acquisition.
    fn begin_group(&mut self, group: usize) -> Result<()> {
        let first = group * self.lane_count();
        let last = first + self.lane_count();
        let requests: Vec<(usize, u16)> = (first..last).map(|ch| (ch, self.gain_codes[ch])).collect();
        self.gain.select_group(requests).wrap_err("selecting gains")?;
        self.acquisition
            .begin(first)
            .wrap_err_with(|| format!("beginning acquisition of group {group}"))?;
        self.groups_begun = group + 1;
        Ok(())
    }

    fn begin_pass(&mut self) -> Result<()> {
        self.state = LoopState::Running;
        self.current_channel = 0;
        self.transmitting = false;
        self.groups_begun = 0;
        self.groups_captured = 0;
        self.pass_cycles = 0;
        tracing::trace!(pass = self.passes, "pass start");
        self.begin_group(0)
    }

    /// Compute and hand the current channel to the write engine.
    fn emit_current(&mut self) -> Result<LoopIterationRecord> {
        let channel = self.current_channel;
        let profile = self.profiles[channel];
        let sample = self.samples[channel];
        let output = self
            .bank
            .compute(channel, profile, sample)
            .wrap_err_with(|| format!("filtering channel {channel}"))?;
        self.writer
            .send(channel, output)
            .wrap_err_with(|| format!("writing channel {channel}"))?;
        self.transmitting = true;

        let group = self.group_of(channel);
        if self.cfg.overlap_acquisition
            && channel % self.lane_count() == 0
            && group + 1 < self.group_count()
            && self.groups_begun == group + 1
        {
            self.begin_group(group + 1)?;
        }

        let record = LoopIterationRecord {
            channel,
            active_profile: profile,
            acquired_sample: sample,
            computed_output: output,
            gain_code_used: self.gain.last_code(channel).unwrap_or(self.gain_codes[channel]),
        };
        tracing::trace!(
            channel,
            profile,
            sample,
            output,
            "channel computed"
        );
        Ok(record)
    }

    fn finish_pass(&mut self) {
        self.state = LoopState::Idle;
        self.done = true;
        self.passes += 1;
        self.last_pass_cycles = Some(self.pass_cycles);
        tracing::debug!(pass = self.passes, cycles = self.pass_cycles, "pass complete");
    }

    /// Advance the whole loop by one logical cycle.
    pub fn tick(&mut self) -> Result<TickStatus> {
        self.cycle += 1;
        self.done = false;

        let gain_latched = self
            .gain
            .tick(&mut self.gain_sink)
            .wrap_err("gain stage tick")?;
        let adc_ready = self
            .acquisition
            .tick(&mut self.source)
            .wrap_err("acquisition tick")?;
        if adc_ready {
            let first = self.acquisition.first_channel();
            let lanes = self.acquisition.lanes();
            self.samples[first..first + lanes.len()].copy_from_slice(lanes);
            self.groups_captured += 1;
        }
        let dac_ready = self.writer.tick(&mut self.link).wrap_err("output tick")?;

        let mut dac_start = false;
        let mut record = None;
        match self.state {
            LoopState::Idle => {
                if self.start_level || self.start_once {
                    self.start_once = false;
                    self.begin_pass()?;
                }
            }
            LoopState::Running => {
                self.pass_cycles += 1;
                if self.cfg.cycle_limit > 0 && self.pass_cycles > self.cfg.cycle_limit {
                    tracing::warn!(limit = self.cfg.cycle_limit, "pass exceeded cycle limit");
                    return Err(ServoError::CycleLimit(self.cfg.cycle_limit).into());
                }
                if dac_ready && self.transmitting {
                    self.transmitting = false;
                    self.current_channel += 1;
                    if self.current_channel == self.channel_count() {
                        self.finish_pass();
                    } else {
                        let group = self.group_of(self.current_channel);
                        if self.groups_begun <= group {
                            self.begin_group(group)?;
                        }
                    }
                }
                if self.is_running()
                    && !self.transmitting
                    && self.groups_captured > self.group_of(self.current_channel)
                {
                    record = Some(self.emit_current()?);
                    dac_start = true;
                }
            }
        }

        Ok(TickStatus {
            signals: Signals {
                done: self.done,
                running: self.is_running(),
                cnv: self.acquisition.cnv(),
                adc_ready,
                dac_start,
                dac_ready,
                gain_latched,
                channel: self.current_channel.min(self.channel_count().saturating_sub(1)),
            },
            record,
        })
    }

    /// Tick until the current pass completes. Starts one if idle.
    pub fn run_pass(&mut self) -> Result<Vec<LoopIterationRecord>> {
        if !self.is_running() {
            self.start()?;
        }
        let mut records = Vec::with_capacity(self.channel_count());
        loop {
            let status = self.tick()?;
            if let Some(r) = status.record {
                records.push(r);
            }
            if status.signals.done {
                return Ok(records);
            }
        }
    }
}
