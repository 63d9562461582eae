//! Per-channel, per-profile IIR filter bank.
//!
//! Single-pole/single-zero fixed-point section, one output per call:
//!
//! ```text
//! error  = sample - set_point_input
//! accum  = gain * error + zero * (x1 - set_point_input) + integrator * y1 + offset
//! output = saturate(saturate(accum, accumulator) >> shift, output_word)
//! x1 := sample, y1 := output
//! ```
//!
//! Products are formed at full width in `i128`; nothing wraps. State lives in a
//! flat arena indexed by `channel * profile_count + profile`.

use std::str::FromStr;

use crate::config::{CoefficientSet, FilterWidths};
use crate::error::ServoError;
use crate::fixed_point::{fits, saturate, saturate_i32, shift_right};

/// Retained state and coefficients of one (channel, profile) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    /// x1, sample-width signed.
    pub previous_input: i32,
    /// y1, state-width signed.
    pub previous_output: i32,
    pub coefficients: CoefficientSet,
}

/// Which retained value a state injection overwrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSlot {
    /// `"x1"`
    PreviousInput,
    /// `"y1"`
    PreviousOutput,
}

impl FromStr for StateSlot {
    type Err = ServoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x1" | "previous_input" => Ok(Self::PreviousInput),
            "y1" | "previous_output" => Ok(Self::PreviousOutput),
            other => Err(ServoError::Config(format!(
                "unknown state slot '{other}' (expected x1 or y1)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterBank {
    widths: FilterWidths,
    channel_count: usize,
    states: Vec<FilterState>,
}

impl FilterBank {
    /// All states zeroed, all coefficients zero.
    pub fn new(widths: FilterWidths, channel_count: usize) -> Self {
        let states = vec![FilterState::default(); channel_count * widths.profile_count];
        Self {
            widths,
            channel_count,
            states,
        }
    }

    pub fn widths(&self) -> &FilterWidths {
        &self.widths
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn profile_count(&self) -> usize {
        self.widths.profile_count
    }

    fn index(&self, channel: usize, profile: usize) -> Result<usize, ServoError> {
        if channel >= self.channel_count {
            return Err(ServoError::OutOfRange {
                what: "channel",
                index: channel,
                limit: self.channel_count,
            });
        }
        if profile >= self.widths.profile_count {
            return Err(ServoError::OutOfRange {
                what: "profile",
                index: profile,
                limit: self.widths.profile_count,
            });
        }
        Ok(channel * self.widths.profile_count + profile)
    }

    pub fn state(&self, channel: usize, profile: usize) -> Result<&FilterState, ServoError> {
        let i = self.index(channel, profile)?;
        Ok(&self.states[i])
    }

    /// Compute one output for `(channel, profile)` and retain `sample`/output.
    pub fn compute(&mut self, channel: usize, profile: usize, sample: i32) -> Result<i32, ServoError> {
        let i = self.index(channel, profile)?;
        let w = &self.widths;
        let state = &mut self.states[i];
        let c = &state.coefficients;

        let x0 = saturate_i32(i128::from(sample), w.sample);
        let spi = i128::from(c.set_point_input);
        let error = i128::from(x0) - spi;
        let error1 = i128::from(state.previous_input) - spi;

        let accum = i128::from(c.gain) * error
            + i128::from(c.zero) * error1
            + i128::from(c.integrator) * i128::from(state.previous_output)
            + i128::from(c.offset);
        let accum = saturate(accum, w.accumulator);
        let output = saturate_i32(shift_right(i128::from(accum), w.shift), w.output_word);

        state.previous_input = x0;
        state.previous_output = saturate_i32(i128::from(output), w.state);
        Ok(output)
    }

    /// Overwrite x1 or y1 of one pair. Initialization/testing only; the
    /// orchestrator refuses this while a pass is running.
    pub fn inject(
        &mut self,
        channel: usize,
        profile: usize,
        slot: StateSlot,
        value: i32,
    ) -> Result<(), ServoError> {
        let i = self.index(channel, profile)?;
        let (what, width) = match slot {
            StateSlot::PreviousInput => ("previous_input", self.widths.sample),
            StateSlot::PreviousOutput => ("previous_output", self.widths.state),
        };
        if !fits(i64::from(value), width) {
            return Err(ServoError::ValueWidth {
                what,
                value: i64::from(value),
                width,
            });
        }
        let state = &mut self.states[i];
        match slot {
            StateSlot::PreviousInput => state.previous_input = value,
            StateSlot::PreviousOutput => state.previous_output = value,
        }
        tracing::trace!(channel, profile, ?slot, value, "state injected");
        Ok(())
    }

    pub fn set_coefficients(
        &mut self,
        channel: usize,
        profile: usize,
        coefficients: CoefficientSet,
    ) -> Result<(), ServoError> {
        let i = self.index(channel, profile)?;
        let w = &self.widths;
        for (what, value) in [
            ("gain", coefficients.gain),
            ("integrator", coefficients.integrator),
            ("zero", coefficients.zero),
        ] {
            if !fits(i64::from(value), w.coefficient) {
                return Err(ServoError::ValueWidth {
                    what,
                    value: i64::from(value),
                    width: w.coefficient,
                });
            }
        }
        if !fits(coefficients.offset, w.accumulator) {
            return Err(ServoError::ValueWidth {
                what: "offset",
                value: coefficients.offset,
                width: w.accumulator,
            });
        }
        if !fits(i64::from(coefficients.set_point_input), w.sample) {
            return Err(ServoError::ValueWidth {
                what: "set_point_input",
                value: i64::from(coefficients.set_point_input),
                width: w.sample,
            });
        }
        if !fits(i64::from(coefficients.set_point_output), w.state) {
            return Err(ServoError::ValueWidth {
                what: "set_point_output",
                value: i64::from(coefficients.set_point_output),
                width: w.state,
            });
        }
        self.states[i].coefficients = coefficients;
        Ok(())
    }

    /// Load x1/y1 from the pair's set points.
    pub fn reset(&mut self, channel: usize, profile: usize) -> Result<(), ServoError> {
        let i = self.index(channel, profile)?;
        let state = &mut self.states[i];
        state.previous_input = state.coefficients.set_point_input;
        state.previous_output = state.coefficients.set_point_output;
        Ok(())
    }

    /// Reset every pair.
    pub fn reset_all(&mut self) {
        for state in &mut self.states {
            state.previous_input = state.coefficients.set_point_input;
            state.previous_output = state.coefficients.set_point_output;
        }
    }
}
