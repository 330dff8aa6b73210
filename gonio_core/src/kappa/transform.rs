//! Native (eta, kappa, phi) <-> spherical (e_eta, e_chi, e_phi) transform.
//!
//! Degrees at the boundary, radians inside. With `a` the kappa tilt:
//!
//! ```text
//! k_to_e:  d     = atan(tan(kappa/2) * cos(a))
//!          e_eta = -eta - d
//!          e_chi = 2 * asin(sin(kappa/2) * sin(a))
//!          e_phi = phi - d
//!
//! e_to_k:  d     = asin(-tan(e_chi/2) / tan(a))
//!          eta   = -(e_eta - d)
//!          kappa = 2 * asin(sin(e_chi/2) / sin(a))
//!          phi   = e_phi - d
//! ```
//!
//! `e_to_k` is only defined while `|sin(e_chi/2) / sin(a)| <= 1`. Outside
//! that, and for non-finite input, both directions fail with `Domain`
//! instead of returning NaN.
use crate::error::GonioError;

/// Arguments this close outside [-1, 1] are rounding noise and get clamped.
const ASIN_SLACK: f64 = 1e-12;

/// Motor positions in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeCoords {
    pub eta: f64,
    pub kappa: f64,
    pub phi: f64,
}

impl NativeCoords {
    pub const fn new(eta: f64, kappa: f64, phi: f64) -> Self {
        Self { eta, kappa, phi }
    }

    pub const fn as_array(self) -> [f64; 3] {
        [self.eta, self.kappa, self.phi]
    }
}

/// Euler-style spherical angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SphericalCoords {
    pub e_eta: f64,
    pub e_chi: f64,
    pub e_phi: f64,
}

impl SphericalCoords {
    pub const fn new(e_eta: f64, e_chi: f64, e_phi: f64) -> Self {
        Self {
            e_eta,
            e_chi,
            e_phi,
        }
    }
}

/// One spherical coordinate, for single-axis moves and readbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SphericalAxis {
    EEta,
    EChi,
    EPhi,
}

impl SphericalAxis {
    pub const ALL: [Self; 3] = [Self::EEta, Self::EChi, Self::EPhi];

    pub const fn name(self) -> &'static str {
        match self {
            Self::EEta => "e_eta",
            Self::EChi => "e_chi",
            Self::EPhi => "e_phi",
        }
    }

    pub const fn of(self, c: SphericalCoords) -> f64 {
        match self {
            Self::EEta => c.e_eta,
            Self::EChi => c.e_chi,
            Self::EPhi => c.e_phi,
        }
    }
}

/// Fixed mechanical geometry of one kappa assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KappaGeometry {
    kappa_angle_deg: f64,
}

impl Default for KappaGeometry {
    fn default() -> Self {
        Self {
            kappa_angle_deg: 50.0,
        }
    }
}

impl KappaGeometry {
    /// Fails with `Domain` for a non-finite angle or a multiple of 180 degrees.
    pub fn new(kappa_angle_deg: f64) -> Result<Self, GonioError> {
        if !kappa_angle_deg.is_finite() {
            return Err(GonioError::Domain(format!(
                "kappa angle {kappa_angle_deg} is not finite"
            )));
        }
        if kappa_angle_deg.to_radians().sin().abs() < 1e-12 {
            return Err(GonioError::Domain(format!(
                "kappa angle {kappa_angle_deg} is a multiple of 180 degrees"
            )));
        }
        Ok(Self { kappa_angle_deg })
    }

    pub const fn kappa_angle_deg(&self) -> f64 {
        self.kappa_angle_deg
    }

    pub fn k_to_e(&self, native: NativeCoords) -> Result<SphericalCoords, GonioError> {
        check_finite("eta/kappa/phi", &native.as_array())?;
        let a = self.kappa_angle_deg.to_radians();
        let half_kappa = native.kappa.to_radians() / 2.0;

        let delta = (half_kappa.tan() * a.cos()).atan();
        let e_eta = -native.eta.to_radians() - delta;
        let e_chi = 2.0 * asin_checked(half_kappa.sin() * a.sin(), "e_chi")?;
        let e_phi = native.phi.to_radians() - delta;

        Ok(SphericalCoords {
            e_eta: e_eta.to_degrees(),
            e_chi: e_chi.to_degrees(),
            e_phi: e_phi.to_degrees(),
        })
    }

    pub fn e_to_k(&self, spherical: SphericalCoords) -> Result<NativeCoords, GonioError> {
        check_finite(
            "e_eta/e_chi/e_phi",
            &[spherical.e_eta, spherical.e_chi, spherical.e_phi],
        )?;
        let a = self.kappa_angle_deg.to_radians();
        let half_chi = spherical.e_chi.to_radians() / 2.0;

        let kappa = 2.0 * asin_checked(half_chi.sin() / a.sin(), "kappa")?;
        let delta = asin_checked(-half_chi.tan() / a.tan(), "delta")?;
        let eta = -(spherical.e_eta.to_radians() - delta);
        let phi = spherical.e_phi.to_radians() - delta;

        Ok(NativeCoords {
            eta: eta.to_degrees(),
            kappa: kappa.to_degrees(),
            phi: phi.to_degrees(),
        })
    }
}

/// `KappaGeometry::k_to_e` for a one-off angle.
pub fn k_to_e(native: NativeCoords, kappa_angle_deg: f64) -> Result<SphericalCoords, GonioError> {
    KappaGeometry::new(kappa_angle_deg)?.k_to_e(native)
}

/// `KappaGeometry::e_to_k` for a one-off angle.
pub fn e_to_k(spherical: SphericalCoords, kappa_angle_deg: f64) -> Result<NativeCoords, GonioError> {
    KappaGeometry::new(kappa_angle_deg)?.e_to_k(spherical)
}

fn check_finite(what: &str, values: &[f64]) -> Result<(), GonioError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(GonioError::Domain(format!("{what} must be finite, got {values:?}")))
    }
}

fn asin_checked(x: f64, what: &str) -> Result<f64, GonioError> {
    if x.is_nan() || x.abs() > 1.0 + ASIN_SLACK {
        return Err(GonioError::Domain(format!(
            "{what}: asin argument {x} outside [-1, 1]"
        )));
    }
    Ok(x.clamp(-1.0, 1.0).asin())
}
