//! Simulated analog front-ends for the servo loop.
//!
//! Each simulator hands out a cheap clonable handle so a test or the CLI can
//! steer inputs and inspect outputs while the servo owns the device itself.

pub mod dac;
pub mod error;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use servo_traits::{FrontendResult, GainSink, SampleSource};

pub use dac::{DEFAULT_HISTORY, DacHandle, DacReceiver, DecodedWord, FrameLayout};
pub use error::FrontendError;

/// Multi-lane ADC returning a settable value per channel.
#[derive(Debug)]
pub struct SimulatedAdc {
    values: Rc<RefCell<Vec<i32>>>,
    captures: Rc<Cell<u64>>,
}

/// Steering handle for a [`SimulatedAdc`].
#[derive(Debug, Clone)]
pub struct AdcHandle {
    values: Rc<RefCell<Vec<i32>>>,
    captures: Rc<Cell<u64>>,
}

impl SimulatedAdc {
    pub fn new(channel_count: usize) -> Self {
        Self::with_values(vec![0; channel_count])
    }

    pub fn with_values(values: Vec<i32>) -> Self {
        Self {
            values: Rc::new(RefCell::new(values)),
            captures: Rc::new(Cell::new(0)),
        }
    }

    pub fn handle(&self) -> AdcHandle {
        AdcHandle {
            values: Rc::clone(&self.values),
            captures: Rc::clone(&self.captures),
        }
    }
}

impl AdcHandle {
    pub fn set(&self, channel: usize, value: i32) {
        if let Some(v) = self.values.borrow_mut().get_mut(channel) {
            *v = value;
        }
    }

    pub fn get(&self, channel: usize) -> Option<i32> {
        self.values.borrow().get(channel).copied()
    }

    /// Acquisitions served so far.
    pub fn captures(&self) -> u64 {
        self.captures.get()
    }
}

impl SampleSource for SimulatedAdc {
    fn capture(&mut self, first_channel: usize, lanes: &mut [i32]) -> FrontendResult<()> {
        let values = self.values.borrow();
        let group = values
            .get(first_channel..first_channel + lanes.len())
            .ok_or(FrontendError::Lanes {
                first_channel,
                lanes: lanes.len(),
                channels: values.len(),
            })?;
        lanes.copy_from_slice(group);
        self.captures.set(self.captures.get() + 1);
        tracing::trace!(first_channel, lanes = ?group, "adc capture (simulated)");
        Ok(())
    }
}

/// Gain stage that records every latched code.
#[derive(Debug)]
pub struct GainRecorder {
    codes: Rc<RefCell<Vec<Option<u16>>>>,
    log: Rc<RefCell<Vec<(usize, u16)>>>,
}

#[derive(Debug, Clone)]
pub struct GainHandle {
    codes: Rc<RefCell<Vec<Option<u16>>>>,
    log: Rc<RefCell<Vec<(usize, u16)>>>,
}

impl GainRecorder {
    pub fn new(channel_count: usize) -> Self {
        Self {
            codes: Rc::new(RefCell::new(vec![None; channel_count])),
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn handle(&self) -> GainHandle {
        GainHandle {
            codes: Rc::clone(&self.codes),
            log: Rc::clone(&self.log),
        }
    }
}

impl GainHandle {
    /// Code currently applied to `channel`.
    pub fn code(&self, channel: usize) -> Option<u16> {
        self.codes.borrow().get(channel).copied().flatten()
    }

    /// Every latch in order.
    pub fn log(&self) -> Vec<(usize, u16)> {
        self.log.borrow().clone()
    }
}

impl GainSink for GainRecorder {
    fn latch(&mut self, channel: usize, code: u16) -> FrontendResult<()> {
        let mut codes = self.codes.borrow_mut();
        let slot = codes
            .get_mut(channel)
            .ok_or(FrontendError::GainChannel(channel))?;
        *slot = Some(code);
        self.log.borrow_mut().push((channel, code));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adc_serves_requested_group() {
        let mut adc = SimulatedAdc::with_values(vec![10, 11, 12, 13, 14, 15, 16, 17]);
        let h = adc.handle();
        h.set(5, -3);
        let mut lanes = [0; 4];
        adc.capture(4, &mut lanes).unwrap();
        assert_eq!(lanes, [14, -3, 16, 17]);
        assert_eq!(h.captures(), 1);
    }

    #[test]
    fn adc_rejects_groups_past_the_end() {
        let mut adc = SimulatedAdc::new(8);
        let mut lanes = [0; 4];
        let err = adc.capture(6, &mut lanes).unwrap_err();
        assert!(err.to_string().contains("exceeds 8 channels"));
    }

    #[test]
    fn gain_recorder_tracks_codes() {
        let mut g = GainRecorder::new(2);
        let h = g.handle();
        g.latch(1, 3).unwrap();
        g.latch(1, 4).unwrap();
        assert_eq!(h.code(1), Some(4));
        assert_eq!(h.code(0), None);
        assert_eq!(h.log(), vec![(1, 3), (1, 4)]);
        assert!(g.latch(2, 0).is_err());
    }
}
