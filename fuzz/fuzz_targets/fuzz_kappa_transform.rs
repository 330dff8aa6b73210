#![no_main]
use gonio_core::{KappaGeometry, NativeCoords, SphericalCoords};
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    kappa_angle: f64,
    a: f64,
    b: f64,
    c: f64,
}

fuzz_target!(|input: Input| {
    let Ok(geometry) = KappaGeometry::new(input.kappa_angle) else {
        return;
    };

    // Either direction may refuse, but an accepted result never carries NaN.
    if let Ok(s) = geometry.k_to_e(NativeCoords::new(input.a, input.b, input.c)) {
        assert!(s.e_chi.abs() <= 180.0 + 1e-9, "e_chi out of range: {s:?}");
    }
    if let Ok(n) = geometry.e_to_k(SphericalCoords::new(input.a, input.b, input.c)) {
        assert!(n.kappa.abs() <= 180.0 + 1e-9, "kappa out of range: {n:?}");
    }
});
