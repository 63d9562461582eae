//! Test and helper mocks for servo_core

use servo_traits::{DacLink, FrontendResult, GainSink, LinkLevels, SampleSource};

/// Source that returns the same value per channel on every capture.
#[derive(Debug, Clone, Default)]
pub struct ConstantSource {
    values: Vec<i32>,
}

impl ConstantSource {
    pub fn new(values: Vec<i32>) -> Self {
        Self { values }
    }

    pub fn set(&mut self, channel: usize, value: i32) {
        if let Some(v) = self.values.get_mut(channel) {
            *v = value;
        }
    }
}

impl SampleSource for ConstantSource {
    fn capture(&mut self, first_channel: usize, lanes: &mut [i32]) -> FrontendResult<()> {
        for (i, lane) in lanes.iter_mut().enumerate() {
            *lane = self.values.get(first_channel + i).copied().unwrap_or(0);
        }
        Ok(())
    }
}

/// Link that drops everything it is driven with.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLink;

impl DacLink for NullLink {
    fn drive(&mut self, _levels: LinkLevels) -> FrontendResult<()> {
        Ok(())
    }
}

/// Link that keeps every cycle's levels.
#[derive(Debug, Clone, Default)]
pub struct RecordingLink {
    pub levels: Vec<LinkLevels>,
}

impl DacLink for RecordingLink {
    fn drive(&mut self, levels: LinkLevels) -> FrontendResult<()> {
        self.levels.push(levels);
        Ok(())
    }
}

/// Gain sink that ignores latches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGain;

impl GainSink for NullGain {
    fn latch(&mut self, _channel: usize, _code: u16) -> FrontendResult<()> {
        Ok(())
    }
}

/// Gain sink that records `(channel, code)` in latch order.
#[derive(Debug, Clone, Default)]
pub struct RecordingGain {
    pub latched: Vec<(usize, u16)>,
}

impl GainSink for RecordingGain {
    fn latch(&mut self, channel: usize, code: u16) -> FrontendResult<()> {
        self.latched.push((channel, code));
        Ok(())
    }
}
