//! Collaborator traits shared across the gonio workspace.
//!
//! Everything the core consumes from the outside world lives here: live
//! channels, axis motors, unit conversion and operator approval. Errors cross
//! these boundaries boxed so that any backend can plug in.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::time::Duration;

/// Error type returned across collaborator trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Handle returned by `subscribe*`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Value-change callback: `(channel name, new value)`.
pub type ChangeCallback = Box<dyn Fn(&str, f64) + Send + Sync>;

/// Connection/metadata callback: `(connected, metadata)`.
pub type MetadataCallback = Box<dyn Fn(bool, &ChannelMetadata) + Send + Sync>;

/// Descriptive control-system metadata reported by a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelMetadata {
    pub units: Option<String>,
    pub lower_ctrl_limit: Option<f64>,
    pub upper_ctrl_limit: Option<f64>,
    pub precision: Option<u8>,
}

/// A primitive, externally owned live value.
pub trait SourceChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Synchronous read; fails when the channel is not connected.
    fn read(&self) -> Result<f64, BoxError>;

    fn write(&self, value: f64) -> Result<(), BoxError>;

    fn subscribe(&self, on_change: ChangeCallback) -> SubscriptionId;

    /// Register for connection transitions. Implementations fire the callback
    /// on every connect/disconnect with the metadata known at that moment.
    fn subscribe_metadata(&self, on_meta: MetadataCallback) -> SubscriptionId;

    /// Remove a value or metadata subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    fn is_connected(&self) -> bool;

    /// Block until connected or `timeout` expires.
    fn wait_connected(&self, timeout: Duration) -> Result<(), BoxError>;

    fn metadata(&self) -> ChannelMetadata;
}

/// An axis motor. Its channel value is the readback position.
pub trait Axis: SourceChannel {
    /// Command a move and return without waiting for it to finish.
    fn move_to(&self, target: f64) -> Result<(), BoxError>;

    /// Halt immediately wherever the axis is.
    fn stop(&self) -> Result<(), BoxError>;

    fn is_moving(&self) -> bool;

    /// Block until the axis reports it has settled, or `timeout` expires.
    fn wait_settled(&self, timeout: Duration) -> Result<(), BoxError>;
}

/// Pure conversion between two named units.
pub trait UnitConverter: Send + Sync {
    fn convert(&self, value: f64, from_unit: &str, to_unit: &str) -> Result<f64, BoxError>;
}

/// Yes/no approval channel consulted before risky motion.
pub trait Approver: Send + Sync {
    fn request_approval(&self, summary: &str) -> bool;
}

impl<F> Approver for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn request_approval(&self, summary: &str) -> bool {
        self(summary)
    }
}
