#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Derived signals and the kappa goniometer controller (hardware-agnostic).
//!
//! Every live value comes in through `gonio_traits::SourceChannel`, every
//! motor through `gonio_traits::Axis`.
//!
//! ## Architecture
//!
//! - **Aggregation**: cached multi-channel readbacks with change suppression (`aggregate`)
//! - **Averaging**: rolling mean fed by a background-subscribed channel (`rolling`)
//! - **Units**: offset + unit conversion in both directions (`unit_signal`, `units`)
//! - **Kappa**: native/spherical transform, step interlock, controller (`kappa`)
//! - **Configuration**: runtime config structs (`config`) built from `gonio_config`
//!
//! Observers are always invoked outside the owning signal's guard, in the
//! order the underlying updates were accepted.

pub mod access;
pub mod aggregate;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod kappa;
pub mod mocks;
pub mod observer;
pub mod rolling;
pub mod unit_signal;
pub mod units;
pub mod util;

pub use access::{AccessMode, ChannelSpec};
pub use aggregate::{AggregateCache, CacheView, FnReadback, NotifyPolicy, Readback};
pub use config::{AverageCfg, KappaCfg, StepLimits, UnitCfg};
pub use error::{BuildError, GonioError, Result};
pub use kappa::{
    ControllerState, KappaController, KappaGeometry, MotionInterlock, MoveOutcome, NativeCoords,
    SphericalAxis, SphericalCoords, SphericalTarget,
};
pub use rolling::{ConnectState, RollingAverage};
pub use unit_signal::{Description, UnitConvertingSignal};
pub use units::TableConverter;
