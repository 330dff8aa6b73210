//! `From` implementations bridging `gonio_config` sections to runtime config.

use std::time::Duration;

use crate::config::{AverageCfg, KappaCfg, StepLimits, UnitCfg};

impl From<&gonio_config::KappaSection> for KappaCfg {
    fn from(c: &gonio_config::KappaSection) -> Self {
        Self {
            kappa_angle_deg: c.kappa_angle_deg,
            settle_timeout: Duration::from_millis(c.settle_timeout_ms),
            poll: Duration::from_millis(c.poll_ms),
        }
    }
}

impl From<&gonio_config::KappaSection> for StepLimits {
    fn from(c: &gonio_config::KappaSection) -> Self {
        Self {
            eta: c.eta_max_step,
            kappa: c.kappa_max_step,
            phi: c.phi_max_step,
        }
    }
}

impl From<&gonio_config::AveragingSection> for AverageCfg {
    fn from(c: &gonio_config::AveragingSection) -> Self {
        Self {
            averages: c.averages,
            connect_attempt: Duration::from_millis(c.connect_timeout_ms),
        }
    }
}

impl From<&gonio_config::UnitsSection> for UnitCfg {
    fn from(c: &gonio_config::UnitsSection) -> Self {
        Self {
            derived: c.derived.clone(),
            original: c.original.clone(),
            offset: Some(c.offset),
        }
    }
}
