//! Input acquisition handshake.
//!
//! `Idle → Hold → Convert → Settle → Capture → Idle`, advanced one logical cycle
//! per [`Acquisition::tick`]. Data becomes valid exactly
//! `hold + convert + settle + 1` ticks after `begin()`.

use servo_traits::SampleSource;

use crate::config::AcquisitionParams;
use crate::error::{ContractViolation, ServoError};
use crate::fixed_point::saturate_i32;
use crate::hw_error::map_frontend_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqPhase {
    Idle,
    /// Conversion-start line asserted.
    Hold,
    Convert,
    Settle,
    /// All lanes latched this cycle.
    Capture,
}

impl AcqPhase {
    fn next(self) -> Self {
        match self {
            Self::Idle => Self::Hold,
            Self::Hold => Self::Convert,
            Self::Convert => Self::Settle,
            Self::Settle => Self::Capture,
            Self::Capture => Self::Idle,
        }
    }
}

#[derive(Debug)]
pub struct Acquisition {
    params: AcquisitionParams,
    phase: AcqPhase,
    remaining: u32,
    first_channel: usize,
    lanes: Vec<i32>,
    captured: bool,
}

impl Acquisition {
    pub fn new(params: AcquisitionParams) -> Self {
        let lanes = vec![0; params.lane_count];
        Self {
            params,
            phase: AcqPhase::Idle,
            remaining: 0,
            first_channel: 0,
            lanes,
            captured: false,
        }
    }

    pub fn params(&self) -> &AcquisitionParams {
        &self.params
    }

    /// Start an acquisition of the group beginning at `first_channel`.
    pub fn begin(&mut self, first_channel: usize) -> Result<(), ServoError> {
        if self.phase != AcqPhase::Idle {
            tracing::warn!(phase = ?self.phase, "begin() while acquisition busy");
            return Err(ContractViolation::BeginWhileBusy.into());
        }
        if first_channel >= self.params.channel_count
            || first_channel % self.params.lane_count != 0
        {
            return Err(ServoError::OutOfRange {
                what: "group start channel",
                index: first_channel,
                limit: self.params.channel_count,
            });
        }
        self.first_channel = first_channel;
        self.captured = false;
        self.enter(AcqPhase::Hold);
        tracing::trace!(first_channel, "acquisition begin");
        Ok(())
    }

    /// No acquisition in flight; `begin()` may be called.
    #[inline]
    pub fn ready(&self) -> bool {
        self.phase == AcqPhase::Idle
    }

    /// Level of the conversion-start line.
    #[inline]
    pub fn cnv(&self) -> bool {
        self.phase == AcqPhase::Hold
    }

    /// `true` only on the tick the lanes were latched.
    #[inline]
    pub fn captured(&self) -> bool {
        self.captured
    }

    #[inline]
    pub fn phase(&self) -> AcqPhase {
        self.phase
    }

    /// First channel of the group held in `lanes()`.
    #[inline]
    pub fn first_channel(&self) -> usize {
        self.first_channel
    }

    /// Samples of the last completed acquisition, lane `i` = channel
    /// `first_channel() + i`.
    #[inline]
    pub fn lanes(&self) -> &[i32] {
        &self.lanes
    }

    /// Advance one logical cycle. Returns `true` on the cycle data becomes valid.
    pub fn tick<S: SampleSource + ?Sized>(&mut self, source: &mut S) -> Result<bool, ServoError> {
        self.captured = false;
        match self.phase {
            AcqPhase::Idle => Ok(false),
            AcqPhase::Capture => {
                source
                    .capture(self.first_channel, &mut self.lanes)
                    .map_err(|e| map_frontend_error(&*e))?;
                let width = self.params.sample_width;
                for lane in &mut self.lanes {
                    *lane = saturate_i32(i128::from(*lane), width);
                }
                self.phase = AcqPhase::Idle;
                self.captured = true;
                tracing::trace!(first_channel = self.first_channel, lanes = ?self.lanes, "lanes captured");
                Ok(true)
            }
            phase => {
                self.remaining = self.remaining.saturating_sub(1);
                if self.remaining == 0 {
                    self.enter(phase.next());
                }
                Ok(false)
            }
        }
    }

    /// Move to `phase`, skipping timed phases configured with zero cycles.
    fn enter(&mut self, mut phase: AcqPhase) {
        loop {
            let cycles = match phase {
                AcqPhase::Hold => self.params.hold_cycles,
                AcqPhase::Convert => self.params.convert_cycles,
                AcqPhase::Settle => self.params.settle_cycles,
                AcqPhase::Idle | AcqPhase::Capture => 1,
            };
            if cycles > 0 {
                self.phase = phase;
                self.remaining = cycles;
                return;
            }
            phase = phase.next();
        }
    }
}
