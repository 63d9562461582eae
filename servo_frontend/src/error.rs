use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("framing error: {0}")]
    Framing(String),
    #[error("lane request {first_channel}+{lanes} exceeds {channels} channels")]
    Lanes {
        first_channel: usize,
        lanes: usize,
        channels: usize,
    },
    #[error("gain channel {0} out of range")]
    GainChannel(usize),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrontendError>;
