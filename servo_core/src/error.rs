use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServoError {
    #[error("frontend error: {0}")]
    Hardware(String),
    #[error("frontend fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("contract violation: {0}")]
    Contract(ContractViolation),
    #[error("{what} index {index} out of range (limit {limit})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },
    #[error("{what} value {value} does not fit in {width} signed bits")]
    ValueWidth {
        what: &'static str,
        value: i64,
        width: u32,
    },
    #[error("cycle limit of {0} cycles exceeded")]
    CycleLimit(u64),
}

/// Sequencing rules a caller broke. Every one of them is a programmer error:
/// the protocol phases have fixed durations and cannot be aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractViolation {
    /// `begin()` issued while an acquisition was still in flight.
    BeginWhileBusy,
    /// A word was handed to the write engine while it was still shifting.
    WriteWhileBusy,
    /// A gain latch was requested while the previous one was still settling.
    GainWhileBusy,
    /// `start` asserted again while a pass was running.
    StartWhileRunning,
    /// Filter state injected while the loop was running.
    InjectWhileRunning,
    /// Coefficients, profiles or gain codes changed while the loop was running.
    ReconfigureWhileRunning,
    /// `write_all` called with a word count other than `channel_count`.
    WordCount { expected: usize, got: usize },
}

impl std::fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginWhileBusy => f.write_str("begin() while acquisition busy"),
            Self::WriteWhileBusy => f.write_str("write while output engine busy"),
            Self::GainWhileBusy => f.write_str("gain select while gain latch busy"),
            Self::StartWhileRunning => f.write_str("start while running"),
            Self::InjectWhileRunning => f.write_str("state injection while running"),
            Self::ReconfigureWhileRunning => f.write_str("reconfiguration while running"),
            Self::WordCount { expected, got } => {
                write!(f, "write_all expected {expected} words, got {got}")
            }
        }
    }
}

impl From<ContractViolation> for ServoError {
    fn from(v: ContractViolation) -> Self {
        Self::Contract(v)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing sample source")]
    MissingSource,
    #[error("missing output link")]
    MissingLink,
    #[error("missing gain sink")]
    MissingGainSink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
