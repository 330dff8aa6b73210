//! Simulated collaborators for the gonio workspace.
//!
//! `SimChannel` stands in for a monitored process variable and `SimAxis` for
//! a rotation motor. Both are thread-safe and intended for the CLI's
//! simulation backend and for tests.
pub mod axis;
pub mod channel;
pub mod error;
pub mod util;

pub use axis::{AxisCommand, SimAxis};
pub use channel::SimChannel;
