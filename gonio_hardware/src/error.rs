use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("channel {0} not connected")]
    NotConnected(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("axis {0} motion fault: {1}")]
    Motion(String, String),
}

pub type Result<T> = std::result::Result<T, HwError>;
