//! Bit-level receiver for the serial output link.
//!
//! Shifts `sdi` in on every rising `sclk` edge while `sync` is low and latches
//! the word on the rising edge of `sync`, the way an AD53xx-style converter
//! updates its input register.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use servo_traits::{DacLink, FrontendResult, LinkLevels};

use crate::error::FrontendError;

/// Frame layout expected by the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    /// Bits per frame.
    pub word_width: u32,
    /// Offset-binary data bits at the bottom of the frame.
    pub data_width: u32,
    /// Subtracted from the address field to recover the channel.
    pub address_offset: u32,
    pub channel_count: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            word_width: 24,
            data_width: 16,
            address_offset: 8,
            channel_count: 8,
        }
    }
}

impl FrameLayout {
    fn framed(&self) -> bool {
        self.word_width > self.data_width
    }
}

/// One latched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedWord {
    pub raw: u32,
    pub mode: u8,
    pub channel: usize,
    /// Data field converted back from offset binary.
    pub value: i32,
}

/// Frames kept by [`DacReceiver::new`].
pub const DEFAULT_HISTORY: usize = 4096;

#[derive(Debug, Default)]
struct ReceiverState {
    words: VecDeque<DecodedWord>,
    history: usize,
    frames: usize,
    latest: Vec<Option<i32>>,
    cycles: u64,
}

impl ReceiverState {
    fn record(&mut self, word: DecodedWord) {
        if let Some(slot) = self.latest.get_mut(word.channel) {
            *slot = Some(word.value);
        }
        if self.history > 0 {
            if self.words.len() == self.history {
                self.words.pop_front();
            }
            self.words.push_back(word);
        }
        self.frames += 1;
    }
}

/// Shared read-only view onto a [`DacReceiver`] owned elsewhere.
#[derive(Debug, Clone)]
pub struct DacHandle {
    state: Rc<RefCell<ReceiverState>>,
}

impl DacHandle {
    /// The most recent frames, oldest first, at most the receiver's history depth.
    pub fn words(&self) -> Vec<DecodedWord> {
        self.state.borrow().words.iter().copied().collect()
    }

    /// Frames latched since construction, including those dropped from the history.
    pub fn frame_count(&self) -> usize {
        self.state.borrow().frames
    }

    /// Last value written to `channel`.
    pub fn latest(&self, channel: usize) -> Option<i32> {
        self.state.borrow().latest.get(channel).copied().flatten()
    }

    /// Cycles the link has been driven.
    pub fn cycles(&self) -> u64 {
        self.state.borrow().cycles
    }

    /// Drop the retained frames and latest values. Counters keep running.
    pub fn clear(&self) {
        let mut s = self.state.borrow_mut();
        s.words.clear();
        s.latest.iter_mut().for_each(|v| *v = None);
    }
}

#[derive(Debug)]
pub struct DacReceiver {
    layout: FrameLayout,
    prev: LinkLevels,
    shift: u64,
    bits: u32,
    state: Rc<RefCell<ReceiverState>>,
}

impl DacReceiver {
    pub fn new(layout: FrameLayout) -> Self {
        Self::with_history(layout, DEFAULT_HISTORY)
    }

    /// Receiver retaining at most `history` decoded frames. Zero keeps only
    /// the latest value per channel.
    pub fn with_history(layout: FrameLayout, history: usize) -> Self {
        let state = ReceiverState {
            words: VecDeque::with_capacity(history.min(DEFAULT_HISTORY)),
            history,
            latest: vec![None; layout.channel_count],
            ..ReceiverState::default()
        };
        Self {
            layout,
            prev: LinkLevels::default(),
            shift: 0,
            bits: 0,
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn handle(&self) -> DacHandle {
        DacHandle {
            state: Rc::clone(&self.state),
        }
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    fn decode(&self, raw: u32, frame_index: usize) -> Result<DecodedWord, FrontendError> {
        let l = &self.layout;
        let data_mask = if l.data_width >= 32 { u32::MAX } else { (1u32 << l.data_width) - 1 };
        let data = i64::from(raw & data_mask) - (1i64 << (l.data_width - 1));
        let value = i32::try_from(data)
            .map_err(|_| FrontendError::Framing(format!("data field {data} exceeds 32 bits")))?;
        if !l.framed() {
            return Ok(DecodedWord {
                raw,
                mode: 0,
                channel: frame_index % l.channel_count.max(1),
                value,
            });
        }
        let addr_bits = l.word_width - 2 - l.data_width;
        let addr = (raw >> l.data_width) & ((1u32 << addr_bits) - 1);
        let channel = addr
            .checked_sub(l.address_offset)
            .map(|c| c as usize)
            .filter(|&c| c < l.channel_count)
            .ok_or_else(|| FrontendError::Framing(format!("address {addr} maps to no channel")))?;
        Ok(DecodedWord {
            raw,
            mode: (raw >> (l.word_width - 2)) as u8 & 0b11,
            channel,
            value,
        })
    }

    fn latch(&mut self) -> Result<(), FrontendError> {
        let bits = std::mem::take(&mut self.bits);
        let raw = std::mem::take(&mut self.shift) as u32;
        if bits == 0 {
            return Ok(());
        }
        if bits != self.layout.word_width {
            tracing::warn!(bits, expected = self.layout.word_width, "short or long frame");
            return Err(FrontendError::Framing(format!(
                "expected {} bits per frame, got {bits}",
                self.layout.word_width
            )));
        }
        let index = self.state.borrow().frames;
        let word = self.decode(raw, index)?;
        tracing::trace!(channel = word.channel, value = word.value, "dac frame latched");
        self.state.borrow_mut().record(word);
        Ok(())
    }
}

impl DacLink for DacReceiver {
    fn drive(&mut self, levels: LinkLevels) -> FrontendResult<()> {
        self.state.borrow_mut().cycles += 1;
        let prev = std::mem::replace(&mut self.prev, levels);
        if !levels.sync && levels.sclk && !prev.sclk {
            if self.bits >= 32 {
                return Err(Box::new(FrontendError::Framing(
                    "more than 32 bits without sync".into(),
                )));
            }
            self.shift = (self.shift << 1) | u64::from(levels.sdi);
            self.bits += 1;
        }
        if levels.sync && !prev.sync {
            self.latch()?;
        }
        Ok(())
    }
}
