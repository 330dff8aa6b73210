//! Step-size interlock for kappa moves.
//!
//! A move proceeds immediately while every axis step is within its limit. A
//! step strictly above its limit holds the whole move until an `Approver`
//! says yes; a NaN step always counts as above.
use gonio_traits::Approver;
use std::fmt;

use super::transform::NativeCoords;
use crate::config::StepLimits;
use crate::error::GonioError;

/// One row of a held move.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisStep {
    pub motor: String,
    pub current: f64,
    pub target: f64,
    pub delta: f64,
    pub limit: f64,
}

/// The axes of a held move whose step exceeds the limit.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveSummary {
    pub steps: Vec<AxisStep>,
}

impl fmt::Display for MoveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .steps
            .iter()
            .map(|s| s.motor.len())
            .chain(std::iter::once("Motor".len()))
            .max()
            .unwrap_or(5);
        writeln!(f, "Do you really intend to do the following motions?")?;
        writeln!(
            f,
            "{:<width$} | {:>16} | {:^3} | {:>16}",
            "Motor", "Current position", "to", "Target position"
        )?;
        writeln!(f, "{:-<width$}-+-{:-<16}-+-{:-<3}-+-{:-<16}", "", "", "", "")?;
        for s in &self.steps {
            writeln!(
                f,
                "{:<width$} | {:>16.4} | {:^3} | {:>16.4}",
                s.motor, s.current, "-->", s.target
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InterlockDecision {
    Proceed,
    Confirm(MoveSummary),
}

#[derive(Debug, Clone)]
pub struct MotionInterlock {
    limits: StepLimits,
    names: [String; 3],
}

impl MotionInterlock {
    /// Limits must be finite and non-negative.
    pub fn new(limits: StepLimits) -> Result<Self, GonioError> {
        validate_limits(&limits)?;
        Ok(Self {
            limits,
            names: ["eta".into(), "kappa".into(), "phi".into()],
        })
    }

    /// Motor names used in the confirmation table.
    #[must_use]
    pub fn with_names(mut self, eta: &str, kappa: &str, phi: &str) -> Self {
        self.names = [eta.to_string(), kappa.to_string(), phi.to_string()];
        self
    }

    pub const fn limits(&self) -> StepLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: StepLimits) -> Result<(), GonioError> {
        validate_limits(&limits)?;
        self.limits = limits;
        Ok(())
    }

    pub fn check(&self, current: NativeCoords, target: NativeCoords) -> InterlockDecision {
        let limits = [self.limits.eta, self.limits.kappa, self.limits.phi];
        let steps: Vec<AxisStep> = self
            .names
            .iter()
            .zip(current.as_array())
            .zip(target.as_array())
            .zip(limits)
            .filter_map(|(((motor, current), target), limit)| {
                let delta = (target - current).abs();
                (delta.is_nan() || delta > limit).then(|| AxisStep {
                    motor: motor.clone(),
                    current,
                    target,
                    delta,
                    limit,
                })
            })
            .collect();
        if steps.is_empty() {
            InterlockDecision::Proceed
        } else {
            InterlockDecision::Confirm(MoveSummary { steps })
        }
    }

    /// `Ok` when the move may go ahead, `Declined` otherwise.
    pub fn authorize(
        &self,
        decision: &InterlockDecision,
        approver: &dyn Approver,
    ) -> Result<(), GonioError> {
        match decision {
            InterlockDecision::Proceed => Ok(()),
            InterlockDecision::Confirm(summary) => {
                tracing::info!(axes = summary.steps.len(), "large move needs confirmation");
                if approver.request_approval(&summary.to_string()) {
                    Ok(())
                } else {
                    tracing::warn!("move declined by operator");
                    Err(GonioError::Declined)
                }
            }
        }
    }
}

fn validate_limits(l: &StepLimits) -> Result<(), GonioError> {
    for (name, v) in [("eta", l.eta), ("kappa", l.kappa), ("phi", l.phi)] {
        if !v.is_finite() || v < 0.0 {
            return Err(GonioError::InvalidState(format!(
                "{name} max step must be finite and >= 0, got {v}"
            )));
        }
    }
    Ok(())
}
