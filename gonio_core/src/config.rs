//! Runtime configuration structs.
//!
//! These are the values the signals and the kappa controller actually use.
//! They are separate from the TOML-deserialized schema in `gonio_config`;
//! see `conversions` for the `From` impls.
use std::time::Duration;

/// Fixed geometry and motion timing of a kappa stage.
#[derive(Debug, Clone, PartialEq)]
pub struct KappaCfg {
    /// Kappa axis tilt relative to eta, in degrees. Never a multiple of 180.
    pub kappa_angle_deg: f64,
    /// Upper bound on one move, from commanding the axes to all settled.
    pub settle_timeout: Duration,
    /// Settle-loop poll period.
    pub poll: Duration,
}

impl Default for KappaCfg {
    fn default() -> Self {
        Self {
            kappa_angle_deg: 50.0,
            settle_timeout: Duration::from_secs(30),
            poll: Duration::from_millis(10),
        }
    }
}

/// Largest per-axis move, in degrees, that proceeds without confirmation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLimits {
    pub eta: f64,
    pub kappa: f64,
    pub phi: f64,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            eta: 2.0,
            kappa: 2.0,
            phi: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AverageCfg {
    /// Window capacity, >= 1.
    pub averages: usize,
    /// Length of one bounded wait of the background connector.
    pub connect_attempt: Duration,
}

impl Default for AverageCfg {
    fn default() -> Self {
        Self {
            averages: 10,
            connect_attempt: Duration::from_millis(100),
        }
    }
}

/// Unit pair and offset of a `UnitConvertingSignal`.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCfg {
    pub derived: String,
    /// Learned from the source's first connection metadata when `None`.
    pub original: Option<String>,
    /// Conversions fail with `InvalidState` while unset.
    pub offset: Option<f64>,
}

impl Default for UnitCfg {
    fn default() -> Self {
        Self {
            derived: "um".to_string(),
            original: None,
            offset: Some(0.0),
        }
    }
}
