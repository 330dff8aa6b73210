//! Kappa goniometer: coordinate transform, step interlock and controller.
pub mod controller;
pub mod interlock;
pub mod transform;

pub use controller::{
    ControllerState, KappaBuilder, KappaController, MoveOutcome, SphericalReadback,
    SphericalTarget,
};
pub use interlock::{AxisStep, InterlockDecision, MotionInterlock, MoveSummary};
pub use transform::{
    KappaGeometry, NativeCoords, SphericalAxis, SphericalCoords, e_to_k, k_to_e,
};
