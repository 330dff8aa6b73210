use gonio_core::error::Report;
use gonio_core::kappa::SphericalReadback;
use gonio_core::mocks::{RecordingApprover, SteppingClock};
use gonio_core::{
    AggregateCache, ControllerState, GonioError, KappaCfg, KappaController, MoveOutcome,
    SphericalAxis, SphericalTarget, StepLimits,
};
use gonio_hardware::{AxisCommand, SimAxis};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct Stage {
    eta: Arc<SimAxis>,
    kappa: Arc<SimAxis>,
    phi: Arc<SimAxis>,
}

impl Stage {
    fn new(speed: f64) -> Self {
        Self::at(0.0, 0.0, 0.0, speed)
    }

    fn at(eta: f64, kappa: f64, phi: f64, speed: f64) -> Self {
        Self {
            eta: Arc::new(SimAxis::new("GON:ETA", eta, speed)),
            kappa: Arc::new(SimAxis::new("GON:KAPPA", kappa, speed)),
            phi: Arc::new(SimAxis::new("GON:PHI", phi, speed)),
        }
    }

    fn logs(&self) -> [Vec<AxisCommand>; 3] {
        [
            self.eta.commands(),
            self.kappa.commands(),
            self.phi.commands(),
        ]
    }

    fn controller(&self, approver: &RecordingApprover, cfg: KappaCfg) -> KappaController {
        KappaController::builder()
            .with_axes(self.eta.clone(), self.kappa.clone(), self.phi.clone())
            .with_approver(approver.clone())
            .with_config(cfg)
            .build()
            .unwrap()
    }
}

fn gonio_err(e: &Report) -> Option<&GonioError> {
    e.downcast_ref::<GonioError>()
}

fn wait_for_state(ctrl: &KappaController, want: ControllerState) {
    let t0 = Instant::now();
    while ctrl.state() != want {
        assert!(t0.elapsed() < Duration::from_secs(5), "never reached {want:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn e_chi_move_commands_all_three_axes_together() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    let outcome = ctrl.move_e_chi(10.0).unwrap();
    let MoveOutcome::Completed(reached) = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert!((reached.eta + 4.2101).abs() < 1e-3);
    assert!((reached.kappa - 13.066).abs() < 1e-3);
    assert!((reached.phi - 4.2101).abs() < 1e-3);

    for log in stage.logs() {
        assert_eq!(log.len(), 1, "{log:?}");
        assert!(matches!(log[0], AxisCommand::Move(_)));
    }

    // Every axis step exceeded 2 degrees, so the operator saw all three.
    let requests = approver.requests();
    assert_eq!(requests.len(), 1);
    for motor in ["GON:ETA", "GON:KAPPA", "GON:PHI"] {
        assert!(requests[0].contains(motor), "{}", requests[0]);
    }

    let s = ctrl.spherical().unwrap();
    assert!(s.e_eta.abs() < 1e-9);
    assert!((s.e_chi - 10.0).abs() < 1e-9);
    assert!(s.e_phi.abs() < 1e-9);
    assert_eq!(ctrl.state(), ControllerState::Idle);
}

#[test]
fn declined_confirmation_commands_nothing() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(false);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    assert_eq!(ctrl.move_e_chi(10.0).unwrap(), MoveOutcome::Declined);
    assert_eq!(stage.logs(), [vec![], vec![], vec![]]);
    assert_eq!(approver.request_count(), 1);
    assert_eq!(ctrl.state(), ControllerState::Idle);
    assert_eq!(
        MoveOutcome::Declined.into_result(),
        Err(GonioError::Declined)
    );
}

#[test]
fn small_moves_skip_confirmation_and_hold_other_coordinates() {
    let stage = Stage::at(3.0, 20.0, -7.0, f64::INFINITY);
    let approver = RecordingApprover::new(false);
    let ctrl = stage.controller(&approver, KappaCfg::default());
    let before = ctrl.spherical().unwrap();

    let reached = ctrl
        .move_e_eta(before.e_eta + 1.0)
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(approver.request_count(), 0);
    assert!((reached.eta - 2.0).abs() < 1e-9, "{reached:?}");

    let after = ctrl.spherical().unwrap();
    assert!((after.e_eta - before.e_eta - 1.0).abs() < 1e-9);
    assert!((after.e_chi - before.e_chi).abs() < 1e-9);
    assert!((after.e_phi - before.e_phi).abs() < 1e-9);
}

#[test]
fn unreachable_target_is_rejected_before_motion() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    let err = ctrl.move_e_chi(120.0).unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::Domain(_))));
    assert_eq!(stage.logs(), [vec![], vec![], vec![]]);
    assert_eq!(approver.request_count(), 0);
    assert_eq!(ctrl.state(), ControllerState::Idle);
}

#[test]
fn stop_mid_move_halts_every_axis() {
    let stage = Stage::new(1.0);
    let approver = RecordingApprover::new(true);
    let ctrl = Arc::new(stage.controller(&approver, KappaCfg::default()));

    let mover = {
        let ctrl = ctrl.clone();
        std::thread::spawn(move || ctrl.move_e_chi(10.0))
    };
    wait_for_state(&ctrl, ControllerState::Moving);
    ctrl.stop().unwrap();
    let outcome = mover.join().unwrap().unwrap();
    assert_eq!(outcome, MoveOutcome::Interrupted);
    assert_eq!(ctrl.state(), ControllerState::Idle);

    let logs = stage.logs();
    for log in &logs {
        assert_eq!(log.len(), 2, "{log:?}");
        assert!(matches!(log[0], AxisCommand::Move(_)));
        assert_eq!(log[1], AxisCommand::Stop);
    }
    for axis in [&stage.eta, &stage.kappa, &stage.phi] {
        assert!(!gonio_traits::Axis::is_moving(axis.as_ref()));
    }
    // Left where it stopped, far from the 13 degree kappa target.
    assert!(stage.kappa.position() < 5.0);

    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(stage.logs(), logs, "commands issued after stop");
}

#[test]
fn second_move_while_moving_is_busy() {
    let stage = Stage::new(1.0);
    let approver = RecordingApprover::new(true);
    let ctrl = Arc::new(stage.controller(&approver, KappaCfg::default()));

    let mover = {
        let ctrl = ctrl.clone();
        std::thread::spawn(move || ctrl.move_e_chi(10.0))
    };
    wait_for_state(&ctrl, ControllerState::Moving);

    let err = ctrl.move_e_eta(1.0).unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::Busy)));
    // The rejected request never reached the axes.
    for log in stage.logs() {
        assert_eq!(log.len(), 1, "{log:?}");
    }

    ctrl.stop().unwrap();
    assert_eq!(mover.join().unwrap().unwrap(), MoveOutcome::Interrupted);
}

#[test]
fn settle_timeout_stops_the_axes() {
    let stage = Stage::new(1.0);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(
        &approver,
        KappaCfg {
            settle_timeout: Duration::from_millis(50),
            poll: Duration::from_millis(5),
            ..KappaCfg::default()
        },
    );

    let err = ctrl.move_e_chi(10.0).unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::Timeout(_))));
    for log in stage.logs() {
        assert_eq!(log.last(), Some(&AxisCommand::Stop), "{log:?}");
    }
    assert_eq!(ctrl.state(), ControllerState::Idle);
}

#[test]
fn settle_deadline_follows_the_injected_clock() {
    let stage = Stage::new(1.0);
    let approver = RecordingApprover::new(true);
    let clock = SteppingClock::new(Duration::from_secs(1));
    let ctrl = KappaController::builder()
        .with_axes(stage.eta.clone(), stage.kappa.clone(), stage.phi.clone())
        .with_approver(approver)
        .with_config(KappaCfg {
            settle_timeout: Duration::from_secs(60),
            poll: Duration::from_millis(2),
            ..KappaCfg::default()
        })
        .with_clock(Box::new(clock.clone()))
        .build()
        .unwrap();

    let t0 = Instant::now();
    let err = ctrl.move_e_chi(10.0).unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::Timeout(_))));
    // Sixty simulated seconds pass in roughly sixty polls.
    assert!(t0.elapsed() < Duration::from_secs(10));
    assert!(clock.calls() >= 60);
    for log in stage.logs() {
        assert_eq!(log.last(), Some(&AxisCommand::Stop), "{log:?}");
    }
}

#[test]
fn disconnected_axis_blocks_the_move() {
    let stage = Stage::new(f64::INFINITY);
    stage.phi.channel().set_connected(false);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    let err = ctrl.move_e_eta(1.0).unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::NotConnected(_))));
    assert_eq!(stage.logs(), [vec![], vec![], vec![]]);
}

#[test]
fn raised_limits_skip_confirmation() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(false);
    let ctrl = stage.controller(&approver, KappaCfg::default());
    assert_eq!(ctrl.limits(), StepLimits::default());

    ctrl.set_limits(StepLimits {
        eta: 20.0,
        kappa: 20.0,
        phi: 20.0,
    })
    .unwrap();
    ctrl.move_e_chi(10.0).unwrap().into_result().unwrap();
    assert_eq!(approver.request_count(), 0);

    let err = ctrl
        .set_limits(StepLimits {
            eta: f64::NAN,
            ..StepLimits::default()
        })
        .unwrap_err();
    assert!(matches!(gonio_err(&err), Some(GonioError::InvalidState(_))));
}

#[test]
fn full_target_moves_all_coordinates() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    let target = SphericalTarget::default()
        .with(SphericalAxis::EEta, 5.0)
        .with(SphericalAxis::EChi, -15.0)
        .with(SphericalAxis::EPhi, 30.0);
    ctrl.move_to(target).unwrap().into_result().unwrap();
    assert!((ctrl.e_eta_coord().unwrap() - 5.0).abs() < 1e-9);
    assert!((ctrl.e_chi_coord().unwrap() + 15.0).abs() < 1e-9);
    assert!((ctrl.e_phi_coord().unwrap() - 30.0).abs() < 1e-9);
    ctrl.wait().unwrap();
}

#[test]
fn coordinate_signal_follows_the_axes() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    let e_chi: AggregateCache<SphericalReadback> =
        ctrl.coordinate_signal(SphericalAxis::EChi).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    e_chi
        .subscribe(move |new, _| s.lock().unwrap().push(*new))
        .unwrap();
    assert_eq!(e_chi.readback(), Some(0.0));

    ctrl.move_e_chi(10.0).unwrap().into_result().unwrap();
    let last = e_chi.readback().unwrap();
    assert!((last - 10.0).abs() < 1e-9, "{last}");
    assert!(!seen.lock().unwrap().is_empty());
    assert!((e_chi.get().unwrap() - 10.0).abs() < 1e-9);
}

/// Controller whose approver reports each prompt on `asked` and then blocks
/// until an answer arrives.
fn gated_controller(
    stage: &Stage,
) -> (
    Arc<KappaController>,
    crossbeam_channel::Receiver<()>,
    crossbeam_channel::Sender<bool>,
) {
    let (asked_tx, asked_rx) = crossbeam_channel::bounded(1);
    let (answer_tx, answer_rx) = crossbeam_channel::bounded(1);
    let ctrl = KappaController::builder()
        .with_axes(stage.eta.clone(), stage.kappa.clone(), stage.phi.clone())
        .with_approver(move |_: &str| {
            let _ = asked_tx.send(());
            answer_rx.recv().unwrap_or(false)
        })
        .with_config(KappaCfg::default())
        .build()
        .unwrap();
    (Arc::new(ctrl), asked_rx, answer_tx)
}

#[test]
fn limits_stay_readable_while_the_operator_decides() {
    let stage = Stage::new(f64::INFINITY);
    let (ctrl, asked, answer) = gated_controller(&stage);

    let mover = {
        let ctrl = ctrl.clone();
        std::thread::spawn(move || ctrl.move_e_chi(10.0))
    };
    asked.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(ctrl.state(), ControllerState::AwaitingConfirmation);

    let (limits_tx, limits_rx) = crossbeam_channel::bounded(1);
    {
        let ctrl = ctrl.clone();
        std::thread::spawn(move || {
            let _ = limits_tx.send(ctrl.limits());
            ctrl.set_limits(StepLimits::default()).is_ok()
        });
    }
    let limits = limits_rx.recv_timeout(Duration::from_secs(1));
    answer.send(false).unwrap();

    assert_eq!(
        limits.expect("limits() waited for the prompt"),
        StepLimits::default()
    );
    assert_eq!(mover.join().unwrap().unwrap(), MoveOutcome::Declined);
}

#[test]
fn stop_during_confirmation_cancels_before_any_motion() {
    let stage = Stage::new(f64::INFINITY);
    let (ctrl, asked, answer) = gated_controller(&stage);

    let mover = {
        let ctrl = ctrl.clone();
        std::thread::spawn(move || ctrl.move_e_chi(10.0))
    };
    asked.recv_timeout(Duration::from_secs(5)).unwrap();
    ctrl.stop().unwrap();
    answer.send(true).unwrap();

    assert_eq!(mover.join().unwrap().unwrap(), MoveOutcome::Interrupted);
    for log in stage.logs() {
        assert!(
            log.iter().all(|c| *c == AxisCommand::Stop),
            "moved after stop: {log:?}"
        );
    }
}

#[test]
fn earlier_stop_does_not_cancel_the_next_move() {
    let stage = Stage::new(f64::INFINITY);
    let approver = RecordingApprover::new(true);
    let ctrl = stage.controller(&approver, KappaCfg::default());

    ctrl.stop().unwrap();
    let outcome = ctrl.move_e_eta(1.0).unwrap();
    assert!(matches!(outcome, MoveOutcome::Completed(_)), "{outcome:?}");
    assert!((ctrl.e_eta_coord().unwrap() - 1.0).abs() < 1e-9);
}
