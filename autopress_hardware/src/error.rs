use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("adc channel {0} out of range (1..=8)")]
    InvalidChannel(u8),
    #[error("adc conversion-ready timeout")]
    DataReadyTimeout,
    #[error("instrument timeout")]
    Timeout,
    #[error("instrument protocol error: {0}")]
    Protocol(String),
    #[error("instrument rejected command (error {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl HwError {
    /// Classify a socket error, folding read/write timeouts into `Timeout`.
    pub fn from_socket(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => HwError::Timeout,
            _ => HwError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, HwError>;
