//! Table-driven `UnitConverter` for linear units.
//!
//! Each unit is a power of ten (times an optional factor) of a per-dimension
//! base unit. Decimal prefixes are applied as exact multiplications or
//! divisions by `10^n`, so `1 mm` is exactly `1000 um`. Converting between
//! different dimensions, or to a name not in the table, fails with
//! `UnsupportedUnit`.
use gonio_traits::{BoxError, UnitConverter};

use crate::error::GonioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Length,
    Angle,
    Energy,
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    dim: Dimension,
    decade: i32,
    factor: f64,
}

const fn unit(dim: Dimension, decade: i32) -> Unit {
    Unit {
        dim,
        decade,
        factor: 1.0,
    }
}

const TABLE: &[(&str, Unit)] = &[
    ("m", unit(Dimension::Length, 0)),
    ("mm", unit(Dimension::Length, -3)),
    ("um", unit(Dimension::Length, -6)),
    ("nm", unit(Dimension::Length, -9)),
    ("rad", unit(Dimension::Angle, 0)),
    ("mrad", unit(Dimension::Angle, -3)),
    ("urad", unit(Dimension::Angle, -6)),
    (
        "deg",
        Unit {
            dim: Dimension::Angle,
            decade: 0,
            factor: std::f64::consts::PI / 180.0,
        },
    ),
    ("eV", unit(Dimension::Energy, 0)),
    ("keV", unit(Dimension::Energy, 3)),
];

fn lookup(name: &str) -> Result<Unit, GonioError> {
    TABLE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, u)| *u)
        .ok_or_else(|| GonioError::UnsupportedUnit(name.to_string()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TableConverter;

impl TableConverter {
    pub fn convert_units(value: f64, from: &str, to: &str) -> Result<f64, GonioError> {
        let src = lookup(from)?;
        let dst = lookup(to)?;
        if src.dim != dst.dim {
            return Err(GonioError::UnsupportedUnit(format!("{from} -> {to}")));
        }
        if from == to {
            return Ok(value);
        }
        let v = value * src.factor / dst.factor;
        let shift = src.decade - dst.decade;
        let p = 10f64.powi(shift.abs());
        Ok(if shift >= 0 { v * p } else { v / p })
    }

    pub fn knows(unit: &str) -> bool {
        lookup(unit).is_ok()
    }
}

impl UnitConverter for TableConverter {
    fn convert(&self, value: f64, from_unit: &str, to_unit: &str) -> Result<f64, BoxError> {
        Self::convert_units(value, from_unit, to_unit).map_err(|e| Box::new(e) as BoxError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1.0, "mm", "um", 1000.0)]
    #[case(2500.0, "nm", "um", 2.5)]
    #[case(180.0, "deg", "rad", std::f64::consts::PI)]
    #[case(1.5, "keV", "eV", 1500.0)]
    #[case(7.0, "mrad", "mrad", 7.0)]
    fn converts(#[case] v: f64, #[case] from: &str, #[case] to: &str, #[case] want: f64) {
        let got = TableConverter::convert_units(v, from, to).unwrap();
        assert!((got - want).abs() <= 1e-9 * want.abs().max(1.0), "{got} != {want}");
    }

    #[rstest]
    #[case("mm", "deg")]
    #[case("furlong", "m")]
    #[case("m", "parsec")]
    fn unsupported(#[case] from: &str, #[case] to: &str) {
        assert!(matches!(
            TableConverter::convert_units(1.0, from, to),
            Err(GonioError::UnsupportedUnit(_))
        ));
    }

    #[test]
    fn trait_errors_carry_the_typed_error() {
        let e = TableConverter.convert(1.0, "m", "x").unwrap_err();
        assert!(e.downcast_ref::<GonioError>().is_some());
    }
}
