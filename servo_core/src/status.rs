//! Observable outputs of one orchestrator tick.

/// Whether a pass is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Running,
}

/// Per-channel record emitted when a channel's output is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopIterationRecord {
    pub channel: usize,
    pub active_profile: usize,
    pub acquired_sample: i32,
    pub computed_output: i32,
    pub gain_code_used: u16,
}

/// Signal levels after a tick, as a test harness would probe them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    /// High for exactly one tick per completed pass.
    pub done: bool,
    pub running: bool,
    /// Conversion-start line of the acquisition handshake.
    pub cnv: bool,
    /// Lanes latched this tick.
    pub adc_ready: bool,
    /// A channel word was handed to the write engine this tick.
    pub dac_start: bool,
    /// The write engine finished a channel this tick.
    pub dac_ready: bool,
    /// New gain codes reached the gain stage this tick.
    pub gain_latched: bool,
    /// Channel being processed (or last processed).
    pub channel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickStatus {
    pub signals: Signals,
    pub record: Option<LoopIterationRecord>,
}
