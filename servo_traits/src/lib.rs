//! Physical-layer seams of the servo loop.
//!
//! The core never touches pins. It drives these traits once per logical cycle
//! (or once per capture/latch event) and leaves the electrical realization to
//! the implementor.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// Boxed error used at the trait boundary, mapped to a typed error by the core.
pub type FrontendResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Analog front-end feeding the acquisition lanes.
pub trait SampleSource {
    /// Latch one sample per lane for the channel group starting at
    /// `first_channel`. `lanes.len()` equals the configured lane count and lane
    /// `i` carries channel `first_channel + i`.
    fn capture(&mut self, first_channel: usize, lanes: &mut [i32]) -> FrontendResult<()>;
}

/// Levels driven onto the serial output link during one logical cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkLevels {
    /// Framing strobe (active low while a word is shifted).
    pub sync: bool,
    /// Serial clock.
    pub sclk: bool,
    /// Serial data, most significant bit first.
    pub sdi: bool,
}

/// Receiver side of the serial write link.
pub trait DacLink {
    /// Called once per logical cycle with the levels for that cycle.
    fn drive(&mut self, levels: LinkLevels) -> FrontendResult<()>;
}

/// Gain-range selector of the analog front-end.
pub trait GainSink {
    /// Latch `code` for `channel`. Called once per reselection, never for
    /// unchanged codes.
    fn latch(&mut self, channel: usize, code: u16) -> FrontendResult<()>;
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn capture(&mut self, first_channel: usize, lanes: &mut [i32]) -> FrontendResult<()> {
        (**self).capture(first_channel, lanes)
    }
}

impl<T: DacLink + ?Sized> DacLink for Box<T> {
    fn drive(&mut self, levels: LinkLevels) -> FrontendResult<()> {
        (**self).drive(levels)
    }
}

impl<T: GainSink + ?Sized> GainSink for Box<T> {
    fn latch(&mut self, channel: usize, code: u16) -> FrontendResult<()> {
        (**self).latch(channel, code)
    }
}
