#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the kappa stage and its derived signals.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! `Config::validate`. Every section has defaults, so an empty file is a
//! valid configuration for the simulated backend.
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KappaSection {
    /// Angle of the kappa rotation axis relative to eta, in degrees.
    pub kappa_angle_deg: f64,
    /// Largest eta move (degrees) allowed without operator confirmation.
    pub eta_max_step: f64,
    pub kappa_max_step: f64,
    pub phi_max_step: f64,
    /// Upper bound on waiting for all three axes to settle.
    pub settle_timeout_ms: u64,
    /// Poll period of the settle loop.
    pub poll_ms: u64,
}

impl Default for KappaSection {
    fn default() -> Self {
        Self {
            kappa_angle_deg: 50.0,
            eta_max_step: 2.0,
            kappa_max_step: 2.0,
            phi_max_step: 2.0,
            settle_timeout_ms: 30_000,
            poll_ms: 10,
        }
    }
}

/// Channel prefixes of the three rotation axes.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AxesSection {
    pub eta: String,
    pub kappa: String,
    pub phi: String,
}

impl Default for AxesSection {
    fn default() -> Self {
        Self {
            eta: "GON:KAPPA:ETA".to_string(),
            kappa: "GON:KAPPA:KAPPA".to_string(),
            phi: "GON:KAPPA:PHI".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AveragingSection {
    /// Rolling-average buffer size.
    pub averages: usize,
    /// Per-attempt wait of the background connector (ms).
    pub connect_timeout_ms: u64,
}

impl Default for AveragingSection {
    fn default() -> Self {
        Self {
            averages: 10,
            connect_timeout_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UnitsSection {
    /// User-facing units.
    pub derived: String,
    /// Units of the source channel; learned from channel metadata when absent.
    pub original: Option<String>,
    /// Offset in derived units, added on read and subtracted on write.
    pub offset: f64,
    /// Channel prefix of the converted signal; the readback is `prefix_RBV`.
    pub prefix: String,
    /// Access pragma: `i`/`ro` read-only, `o`/`io`/`rw` writable.
    pub io: String,
}

impl Default for UnitsSection {
    fn default() -> Self {
        Self {
            derived: "um".to_string(),
            original: None,
            offset: 0.0,
            prefix: "SIM:CONVERT".to_string(),
            io: "rw".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimSection {
    /// Simulated axis speed in degrees per second.
    pub speed_deg_per_s: f64,
    /// Delay before simulated channels report connected.
    pub connect_delay_ms: u64,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            speed_deg_per_s: 20.0,
            connect_delay_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub kappa: KappaSection,
    pub axes: AxesSection,
    pub averaging: AveragingSection,
    pub units: UnitsSection,
    pub sim: SimSection,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// True when `deg` is (numerically) an integer multiple of 180 degrees,
/// i.e. the kappa geometry would divide by `sin(kappa_angle)`.
fn is_multiple_of_180(deg: f64) -> bool {
    deg.to_radians().sin().abs() < 1e-12
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Kappa geometry
        let k = &self.kappa;
        if !k.kappa_angle_deg.is_finite() {
            eyre::bail!("kappa.kappa_angle_deg must be finite");
        }
        if is_multiple_of_180(k.kappa_angle_deg) {
            eyre::bail!("kappa.kappa_angle_deg must not be a multiple of 180");
        }
        for (name, step) in [
            ("eta_max_step", k.eta_max_step),
            ("kappa_max_step", k.kappa_max_step),
            ("phi_max_step", k.phi_max_step),
        ] {
            if !step.is_finite() || step < 0.0 {
                eyre::bail!("kappa.{name} must be finite and >= 0");
            }
        }
        if k.settle_timeout_ms == 0 {
            eyre::bail!("kappa.settle_timeout_ms must be >= 1");
        }
        if k.poll_ms == 0 {
            eyre::bail!("kappa.poll_ms must be >= 1");
        }

        // Axes
        for (name, prefix) in [
            ("eta", &self.axes.eta),
            ("kappa", &self.axes.kappa),
            ("phi", &self.axes.phi),
        ] {
            if prefix.trim().is_empty() {
                eyre::bail!("axes.{name} prefix must not be empty");
            }
        }

        // Averaging
        if self.averaging.averages == 0 {
            eyre::bail!("averaging.averages must be >= 1");
        }
        if self.averaging.connect_timeout_ms == 0 {
            eyre::bail!("averaging.connect_timeout_ms must be >= 1");
        }

        // Units
        if self.units.derived.trim().is_empty() {
            eyre::bail!("units.derived must not be empty");
        }
        if let Some(orig) = &self.units.original
            && orig.trim().is_empty()
        {
            eyre::bail!("units.original must not be empty when set");
        }
        if !self.units.offset.is_finite() {
            eyre::bail!("units.offset must be finite");
        }
        if self.units.prefix.trim().is_empty() {
            eyre::bail!("units.prefix must not be empty");
        }

        // Sim
        if self.sim.speed_deg_per_s.is_nan() || self.sim.speed_deg_per_s <= 0.0 {
            eyre::bail!("sim.speed_deg_per_s must be > 0");
        }

        // Logging
        if let Some(rot) = &self.logging.rotation
            && !matches!(rot.as_str(), "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_valid() {
        let cfg = load_toml("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.kappa.kappa_angle_deg, 50.0);
        assert_eq!(cfg.kappa.eta_max_step, 2.0);
    }

    #[test]
    fn multiples_of_180() {
        assert!(is_multiple_of_180(0.0));
        assert!(is_multiple_of_180(180.0));
        assert!(is_multiple_of_180(-360.0));
        assert!(!is_multiple_of_180(50.0));
        assert!(!is_multiple_of_180(90.0));
    }
}
