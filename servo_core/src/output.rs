//! Serial write engine for the output words.
//!
//! One channel at a time: framing strobe high for `sync_high_cycles`, then low
//! while `word_width` bits are shifted MSB first (each bit spans
//! `2 * clock_divisor` cycles, clock low half then high half), then held low
//! for `sync_low_cycles`. `dac_ready` pulses on the last cycle of the frame.
//! Every frame costs exactly `OutputParams::cycle_budget()` cycles.

use servo_traits::{DacLink, LinkLevels};

use crate::config::OutputParams;
use crate::error::{ContractViolation, ServoError};
use crate::fixed_point::{mask, offset_binary};
use crate::hw_error::map_frontend_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Idle,
    SyncHigh,
    Shift,
    SyncLow,
}

/// Levels driven while no frame is in flight.
pub const IDLE_LEVELS: LinkLevels = LinkLevels {
    sync: true,
    sclk: false,
    sdi: false,
};

#[derive(Debug)]
pub struct SerialWriter {
    params: OutputParams,
    output_word: u32,
    phase: WritePhase,
    /// Cycle index within the current phase.
    cycle: u32,
    word: u32,
    channel: usize,
    dac_ready: bool,
    busy_cycles: u64,
}

impl SerialWriter {
    /// `output_word` is the filter output width packed into each frame.
    pub fn new(params: OutputParams, output_word: u32) -> Self {
        Self {
            params,
            output_word,
            phase: WritePhase::Idle,
            cycle: 0,
            word: 0,
            channel: 0,
            dac_ready: false,
            busy_cycles: 0,
        }
    }

    pub fn params(&self) -> &OutputParams {
        &self.params
    }

    /// Frame transmitted for `value` on `channel`.
    ///
    /// With `word_width == output_word` the frame is the offset-binary value.
    /// Wider frames carry `mode` in the top two bits and
    /// `channel + address_offset` between mode and data.
    pub fn encode(&self, channel: usize, value: i32) -> u32 {
        let p = &self.params;
        let data = offset_binary(i64::from(value), self.output_word);
        if p.word_width <= self.output_word {
            return (data & mask(p.word_width)) as u32;
        }
        let addr_bits = p.word_width - 2 - self.output_word;
        let addr = (channel as u64 + u64::from(p.address_offset)) & mask(addr_bits);
        let mode = u64::from(p.mode & 0b11);
        ((mode << (p.word_width - 2)) | (addr << self.output_word) | data) as u32
    }

    /// Begin shifting `value` for `channel`. Takes effect on the next tick.
    pub fn send(&mut self, channel: usize, value: i32) -> Result<(), ServoError> {
        let word = self.encode(channel, value);
        self.start_word(channel, word)
    }

    /// Begin shifting a raw, already framed word.
    pub fn start_word(&mut self, channel: usize, word: u32) -> Result<(), ServoError> {
        if self.phase != WritePhase::Idle {
            tracing::warn!(channel, in_flight = self.channel, "write while output busy");
            return Err(ContractViolation::WriteWhileBusy.into());
        }
        if channel >= self.params.channel_count {
            return Err(ServoError::OutOfRange {
                what: "output channel",
                index: channel,
                limit: self.params.channel_count,
            });
        }
        self.channel = channel;
        self.word = (u64::from(word) & mask(self.params.word_width)) as u32;
        self.phase = WritePhase::SyncHigh;
        self.cycle = 0;
        self.dac_ready = false;
        tracing::trace!(channel, word = format_args!("{:#x}", self.word), "frame start");
        Ok(())
    }

    #[inline]
    pub fn idle(&self) -> bool {
        self.phase == WritePhase::Idle
    }

    #[inline]
    pub fn phase(&self) -> WritePhase {
        self.phase
    }

    /// `true` only on the tick the in-flight word was fully accepted.
    #[inline]
    pub fn dac_ready(&self) -> bool {
        self.dac_ready
    }

    /// Channel of the frame in flight (or of the last frame).
    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Cycles spent with a frame in flight since construction.
    #[inline]
    pub fn busy_cycles(&self) -> u64 {
        self.busy_cycles
    }

    fn shift_cycles(&self) -> u32 {
        self.params.word_width * 2 * self.params.clock_divisor
    }

    fn levels(&self) -> LinkLevels {
        match self.phase {
            WritePhase::Idle | WritePhase::SyncHigh => IDLE_LEVELS,
            WritePhase::Shift => {
                let div = self.params.clock_divisor;
                let bit = self.cycle / (2 * div);
                let sclk = (self.cycle / div) % 2 == 1;
                let sdi = (self.word >> (self.params.word_width - 1 - bit)) & 1 == 1;
                LinkLevels {
                    sync: false,
                    sclk,
                    sdi,
                }
            }
            WritePhase::SyncLow => LinkLevels {
                sync: false,
                sclk: false,
                sdi: false,
            },
        }
    }

    /// Drive one cycle onto `link` and advance. Returns `true` on `dac_ready`.
    pub fn tick<L: DacLink + ?Sized>(&mut self, link: &mut L) -> Result<bool, ServoError> {
        self.dac_ready = false;
        link.drive(self.levels()).map_err(|e| map_frontend_error(&*e))?;
        if self.phase == WritePhase::Idle {
            return Ok(false);
        }
        self.busy_cycles += 1;
        self.cycle += 1;
        let len = match self.phase {
            WritePhase::SyncHigh => self.params.sync_high_cycles,
            WritePhase::Shift => self.shift_cycles(),
            WritePhase::SyncLow => self.params.sync_low_cycles,
            WritePhase::Idle => 0,
        };
        if self.cycle >= len {
            self.cycle = 0;
            self.phase = match self.phase {
                WritePhase::SyncHigh => WritePhase::Shift,
                WritePhase::Shift => WritePhase::SyncLow,
                WritePhase::SyncLow | WritePhase::Idle => {
                    self.dac_ready = true;
                    tracing::trace!(channel = self.channel, "frame accepted");
                    WritePhase::Idle
                }
            };
        }
        Ok(self.dac_ready)
    }

    /// Transmit one value per channel in index order, blocking (in logical
    /// cycles) until the last word is accepted. Returns the cycles consumed.
    pub fn write_all<L: DacLink + ?Sized>(
        &mut self,
        outputs: &[i32],
        link: &mut L,
    ) -> Result<u64, ServoError> {
        if outputs.len() != self.params.channel_count {
            return Err(ContractViolation::WordCount {
                expected: self.params.channel_count,
                got: outputs.len(),
            }
            .into());
        }
        let mut cycles = 0u64;
        for (channel, &value) in outputs.iter().enumerate() {
            self.send(channel, value)?;
            loop {
                cycles += 1;
                if self.tick(link)? {
                    break;
                }
            }
        }
        Ok(cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingLink;

    fn writer(word_width: u32, output_word: u32) -> SerialWriter {
        let p = OutputParams {
            word_width,
            channel_count: 4,
            ..OutputParams::default()
        };
        SerialWriter::new(p, output_word)
    }

    #[test]
    fn frame_takes_exactly_the_cycle_budget() {
        let mut w = writer(24, 16);
        let mut link = RecordingLink::default();
        w.send(1, -3).unwrap();
        let mut n = 0u64;
        while !w.tick(&mut link).unwrap() {
            n += 1;
        }
        assert_eq!(n + 1, w.params().cycle_budget());
        assert!(w.idle());
    }

    #[test]
    fn bits_are_shifted_msb_first_on_rising_edges() {
        let mut w = writer(16, 16);
        let mut link = RecordingLink::default();
        w.start_word(0, 0xA5C3).unwrap();
        while !w.tick(&mut link).unwrap() {}
        let mut bits = Vec::new();
        let mut prev = false;
        for lv in &link.levels {
            if !lv.sync && lv.sclk && !prev {
                bits.push(lv.sdi);
            }
            prev = lv.sclk;
        }
        let word = bits.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b));
        assert_eq!(bits.len(), 16);
        assert_eq!(word, 0xA5C3);
    }

    #[test]
    fn framing_windows_match_params() {
        let mut w = writer(16, 16);
        let mut link = RecordingLink::default();
        w.start_word(0, 0).unwrap();
        while !w.tick(&mut link).unwrap() {}
        let p = w.params().clone();
        let high = link.levels.iter().take_while(|l| l.sync).count();
        assert_eq!(high as u32, p.sync_high_cycles);
        let tail_low = link.levels.iter().rev().take_while(|l| !l.sync && !l.sclk).count();
        assert!(tail_low as u32 >= p.sync_low_cycles);
    }

    #[test]
    fn encode_places_mode_address_and_offset_binary_data() {
        let w = writer(24, 16);
        assert_eq!(w.encode(0, 0), (3 << 22) | (8 << 16) | 0x8000);
        assert_eq!(w.encode(3, -32_768), (3 << 22) | (11 << 16));
        let plain = writer(16, 16);
        assert_eq!(plain.encode(2, 32_767), 0xFFFF);
    }

    #[test]
    fn write_all_is_ordered_and_budgeted() {
        let mut w = writer(24, 16);
        let mut link = RecordingLink::default();
        let cycles = w.write_all(&[1, 2, 3, 4], &mut link).unwrap();
        assert_eq!(cycles, 4 * w.params().cycle_budget());
        assert_eq!(w.busy_cycles(), cycles);
        assert_eq!(w.channel(), 3);
    }

    #[test]
    fn write_while_busy_and_bad_lengths_rejected() {
        let mut w = writer(24, 16);
        let mut link = RecordingLink::default();
        assert!(matches!(
            w.write_all(&[1, 2], &mut link),
            Err(ServoError::Contract(ContractViolation::WordCount { expected: 4, got: 2 }))
        ));
        w.send(0, 0).unwrap();
        assert_eq!(
            w.send(1, 0).unwrap_err(),
            ServoError::Contract(ContractViolation::WriteWhileBusy)
        );
    }
}
