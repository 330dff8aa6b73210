use gonio_core::kappa::{InterlockDecision, e_to_k, k_to_e};
use gonio_core::{GonioError, KappaGeometry, MotionInterlock, NativeCoords, SphericalCoords, StepLimits};
use proptest::prelude::*;
use rstest::rstest;

fn kappa_angle() -> impl Strategy<Value = f64> {
    (5.0f64..175.0, any::<bool>()).prop_map(|(a, neg)| if neg { -a } else { a })
}

proptest! {
    #[test]
    fn native_round_trips_through_spherical(
        a in kappa_angle(),
        eta in -360.0f64..360.0,
        kappa in -170.0f64..170.0,
        phi in -360.0f64..360.0,
    ) {
        let g = KappaGeometry::new(a).unwrap();
        let native = NativeCoords::new(eta, kappa, phi);
        let back = g.e_to_k(g.k_to_e(native).unwrap()).unwrap();
        prop_assert!((back.eta - eta).abs() < 1e-6, "eta {} -> {}", eta, back.eta);
        prop_assert!((back.kappa - kappa).abs() < 1e-6, "kappa {} -> {}", kappa, back.kappa);
        prop_assert!((back.phi - phi).abs() < 1e-6, "phi {} -> {}", phi, back.phi);
    }

    #[test]
    fn forward_transform_is_total_on_finite_input(
        a in kappa_angle(),
        eta in -1.0e4f64..1.0e4,
        kappa in -1.0e4f64..1.0e4,
        phi in -1.0e4f64..1.0e4,
    ) {
        let s = k_to_e(NativeCoords::new(eta, kappa, phi), a).unwrap();
        prop_assert!(s.e_eta.is_finite() && s.e_chi.is_finite() && s.e_phi.is_finite());
    }
}

#[rstest]
#[case(50.0, 120.0)]
#[case(50.0, -101.0)]
#[case(30.0, 61.0)]
#[case(-30.0, 61.0)]
fn unreachable_chi_is_a_domain_error(#[case] angle: f64, #[case] e_chi: f64) {
    let err = e_to_k(SphericalCoords::new(0.0, e_chi, 0.0), angle).unwrap_err();
    assert!(matches!(err, GonioError::Domain(_)), "{err:?}");
}

#[rstest]
#[case(50.0, 100.0)]
#[case(30.0, 60.0)]
fn chi_at_the_reach_limit_is_accepted(#[case] angle: f64, #[case] e_chi: f64) {
    let n = e_to_k(SphericalCoords::new(0.0, e_chi, 0.0), angle).unwrap();
    assert!((n.kappa.abs() - 180.0).abs() < 1e-4, "{n:?}");
}

#[rstest]
#[case(0.0)]
#[case(180.0)]
#[case(-540.0)]
#[case(f64::INFINITY)]
fn degenerate_kappa_angle(#[case] angle: f64) {
    assert!(matches!(
        k_to_e(NativeCoords::default(), angle),
        Err(GonioError::Domain(_))
    ));
}

fn interlock() -> MotionInterlock {
    MotionInterlock::new(StepLimits {
        eta: 2.0,
        kappa: 3.0,
        phi: 0.5,
    })
    .unwrap()
}

#[rstest]
#[case(NativeCoords::new(2.0, 0.0, 0.0))]
#[case(NativeCoords::new(-2.0, 3.0, -0.5))]
#[case(NativeCoords::new(0.0, -3.0, 0.5))]
fn step_equal_to_the_limit_proceeds(#[case] target: NativeCoords) {
    assert_eq!(
        interlock().check(NativeCoords::default(), target),
        InterlockDecision::Proceed
    );
}

#[rstest]
#[case(NativeCoords::new(2.0 + 1e-9, 0.0, 0.0), "eta")]
#[case(NativeCoords::new(0.0, -3.0 - 1e-9, 0.0), "kappa")]
#[case(NativeCoords::new(0.0, 0.0, 0.5 + 1e-9), "phi")]
fn step_just_above_the_limit_needs_confirmation(
    #[case] target: NativeCoords,
    #[case] motor: &str,
) {
    match interlock().check(NativeCoords::default(), target) {
        InterlockDecision::Confirm(summary) => {
            assert_eq!(summary.steps.len(), 1);
            assert_eq!(summary.steps[0].motor, motor);
        }
        InterlockDecision::Proceed => panic!("expected confirmation for {motor}"),
    }
}

#[test]
fn steps_are_measured_from_the_current_position() {
    let current = NativeCoords::new(10.5, -20.0, 7.25);
    let target = NativeCoords::new(12.5, -17.0, 6.75);
    assert_eq!(interlock().check(current, target), InterlockDecision::Proceed);
}
