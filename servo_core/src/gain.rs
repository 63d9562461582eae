//! Gain-stage controller.
//!
//! Codes for one channel group are latched in parallel and take
//! `clock_divisor` cycles, which the builder bounds by the acquisition hold
//! window. Unchanged codes are not re-latched.

use servo_traits::GainSink;

use crate::config::GainParams;
use crate::error::{ContractViolation, ServoError};
use crate::fixed_point::mask;
use crate::hw_error::map_frontend_error;

#[derive(Debug)]
pub struct GainController {
    params: GainParams,
    last: Vec<Option<u16>>,
    pending: Vec<(usize, u16)>,
    remaining: u32,
    latched: bool,
    latch_count: u64,
}

impl GainController {
    pub fn new(params: GainParams, channel_count: usize) -> Self {
        Self {
            params,
            last: vec![None; channel_count],
            pending: Vec::new(),
            remaining: 0,
            latched: false,
            latch_count: 0,
        }
    }

    pub fn params(&self) -> &GainParams {
        &self.params
    }

    /// Request `code` for `channel`.
    pub fn select(&mut self, channel: usize, code: u16) -> Result<(), ServoError> {
        self.select_group([(channel, code)])
    }

    /// Request codes for several channels, latched together.
    pub fn select_group<I>(&mut self, requests: I) -> Result<(), ServoError>
    where
        I: IntoIterator<Item = (usize, u16)>,
    {
        if self.busy() {
            tracing::warn!(pending = self.pending.len(), "gain select while latch busy");
            return Err(ContractViolation::GainWhileBusy.into());
        }
        let code_mask = mask(self.params.word_width);
        for (channel, code) in requests {
            let Some(last) = self.last.get(channel) else {
                self.pending.clear();
                return Err(ServoError::OutOfRange {
                    what: "gain channel",
                    index: channel,
                    limit: self.last.len(),
                });
            };
            let code = (u64::from(code) & code_mask) as u16;
            if *last != Some(code) {
                self.pending.push((channel, code));
            }
        }
        if !self.pending.is_empty() {
            self.remaining = self.params.clock_divisor.max(1);
        }
        Ok(())
    }

    /// A latch is in progress.
    #[inline]
    pub fn busy(&self) -> bool {
        !self.pending.is_empty()
    }

    /// `true` only on the tick new codes reached the sink.
    #[inline]
    pub fn latched(&self) -> bool {
        self.latched
    }

    /// Code last latched for `channel`.
    pub fn last_code(&self, channel: usize) -> Option<u16> {
        self.last.get(channel).copied().flatten()
    }

    /// Codes actually written to the sink since construction.
    #[inline]
    pub fn latch_count(&self) -> u64 {
        self.latch_count
    }

    pub fn tick<G: GainSink + ?Sized>(&mut self, sink: &mut G) -> Result<bool, ServoError> {
        self.latched = false;
        if self.pending.is_empty() {
            return Ok(false);
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Ok(false);
        }
        for (channel, code) in self.pending.drain(..) {
            sink.latch(channel, code).map_err(|e| map_frontend_error(&*e))?;
            self.last[channel] = Some(code);
            self.latch_count += 1;
            tracing::trace!(channel, code, "gain latched");
        }
        self.latched = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingGain;

    #[test]
    fn latch_takes_clock_divisor_cycles() {
        let mut g = GainController::new(GainParams::default(), 8);
        let mut sink = RecordingGain::default();
        g.select_group([(0, 1), (1, 2)]).unwrap();
        assert!(!g.tick(&mut sink).unwrap());
        assert!(g.tick(&mut sink).unwrap());
        assert_eq!(sink.latched, vec![(0, 1), (1, 2)]);
        assert!(!g.busy());
    }

    #[test]
    fn unchanged_codes_are_skipped() {
        let mut g = GainController::new(GainParams::default(), 4);
        let mut sink = RecordingGain::default();
        g.select(2, 7).unwrap();
        while !g.tick(&mut sink).unwrap() {}
        g.select(2, 7).unwrap();
        assert!(!g.busy());
        assert_eq!(g.latch_count(), 1);
        assert_eq!(g.last_code(2), Some(7));
    }

    #[test]
    fn codes_are_masked_to_word_width() {
        let p = GainParams {
            word_width: 2,
            clock_divisor: 1,
        };
        let mut g = GainController::new(p, 1);
        let mut sink = RecordingGain::default();
        g.select(0, 0b111).unwrap();
        g.tick(&mut sink).unwrap();
        assert_eq!(sink.latched, vec![(0, 0b11)]);
    }

    #[test]
    fn select_while_busy_is_rejected() {
        let mut g = GainController::new(GainParams::default(), 4);
        g.select(0, 1).unwrap();
        assert_eq!(
            g.select(1, 1).unwrap_err(),
            ServoError::Contract(ContractViolation::GainWhileBusy)
        );
        assert!(matches!(g.select(9, 1), Err(ServoError::Contract(_))));
    }
}
