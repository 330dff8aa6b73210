use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GonioError {
    #[error("channel {0} not connected")]
    NotConnected(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("unsupported unit: {0}")]
    UnsupportedUnit(String),
    #[error("channel error: {0}")]
    Channel(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("signal {0} is read-only")]
    ReadOnly(String),
    #[error("coordinate domain error: {0}")]
    Domain(String),
    #[error("readback calculation failed: {0}")]
    Calc(String),
    #[error("move declined by operator")]
    Declined,
    #[error("a move is already in progress")]
    Busy,
    #[error("move interrupted")]
    Interrupted,
    #[error("axis error: {0}")]
    Axis(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing {0} axis")]
    MissingAxis(&'static str),
    #[error("missing approver")]
    MissingApprover,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
