//! Kappa stage controller: move in spherical coordinates.
//!
//! State machine per move:
//!
//! ```text
//! Idle -> Converting -> [AwaitingConfirmation] -> Moving -> Idle
//!                                                   |
//!                                       stop() -----+--> Idle
//! ```
//!
//! A move reads the live native positions, holds every spherical coordinate
//! that was not requested, converts the full triple back to native angles and
//! commands all three axes together under one command guard. `stop()` takes
//! the same guard, so it can never interleave with a half-issued set of move
//! commands. Only one move runs at a time; a second request fails with `Busy`.
use crossbeam_channel as xch;
use gonio_traits::{Approver, Axis, Clock, MonotonicClock, SourceChannel};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::interlock::{InterlockDecision, MotionInterlock};
use super::transform::{KappaGeometry, NativeCoords, SphericalAxis, SphericalCoords};
use crate::aggregate::{AggregateCache, CacheView, Readback};
use crate::config::{KappaCfg, StepLimits};
use crate::error::{BuildError, GonioError, Result};
use crate::hw_error::map_channel_error;
use crate::util::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Converting,
    AwaitingConfirmation,
    Moving,
}

/// How a move request ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// All axes settled; native positions read back afterwards.
    Completed(NativeCoords),
    /// The operator said no; nothing was commanded.
    Declined,
    /// `stop()` ended the move; axes halted where they were.
    Interrupted,
}

impl MoveOutcome {
    /// Treat `Declined` and `Interrupted` as errors.
    pub fn into_result(self) -> std::result::Result<NativeCoords, GonioError> {
        match self {
            Self::Completed(pos) => Ok(pos),
            Self::Declined => Err(GonioError::Declined),
            Self::Interrupted => Err(GonioError::Interrupted),
        }
    }
}

/// Requested spherical coordinates; `None` holds the current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SphericalTarget {
    pub e_eta: Option<f64>,
    pub e_chi: Option<f64>,
    pub e_phi: Option<f64>,
}

impl SphericalTarget {
    pub fn only(axis: SphericalAxis, value: f64) -> Self {
        Self::default().with(axis, value)
    }

    #[must_use]
    pub const fn with(mut self, axis: SphericalAxis, value: f64) -> Self {
        match axis {
            SphericalAxis::EEta => self.e_eta = Some(value),
            SphericalAxis::EChi => self.e_chi = Some(value),
            SphericalAxis::EPhi => self.e_phi = Some(value),
        }
        self
    }

    pub const fn is_empty(&self) -> bool {
        self.e_eta.is_none() && self.e_chi.is_none() && self.e_phi.is_none()
    }

    /// Fill unspecified coordinates from `current`.
    pub fn resolve(&self, current: SphericalCoords) -> SphericalCoords {
        SphericalCoords {
            e_eta: self.e_eta.unwrap_or(current.e_eta),
            e_chi: self.e_chi.unwrap_or(current.e_chi),
            e_phi: self.e_phi.unwrap_or(current.e_phi),
        }
    }
}

struct AxisHandle {
    motor: Arc<dyn Axis>,
    channel: Arc<dyn SourceChannel>,
}

impl AxisHandle {
    fn new<A: Axis + 'static>(axis: Arc<A>) -> Self {
        Self {
            motor: axis.clone(),
            channel: axis,
        }
    }

    fn name(&self) -> &str {
        self.channel.name()
    }

    fn read(&self) -> std::result::Result<f64, GonioError> {
        self.channel
            .read()
            .map_err(|e| map_channel_error(self.name(), e.as_ref()))
    }
}

/// Readback of one spherical coordinate from cached axis positions.
#[derive(Debug, Clone)]
pub struct SphericalReadback {
    geometry: KappaGeometry,
    names: [String; 3],
    axis: SphericalAxis,
}

impl Readback for SphericalReadback {
    type Output = f64;

    fn calc_readback(&self, cache: &CacheView<'_>) -> std::result::Result<f64, GonioError> {
        let [eta, kappa, phi] = &self.names;
        let native = NativeCoords::new(
            cache.require(eta)?,
            cache.require(kappa)?,
            cache.require(phi)?,
        );
        Ok(self.axis.of(self.geometry.k_to_e(native)?))
    }
}

pub struct KappaController {
    axes: [AxisHandle; 3],
    geometry: KappaGeometry,
    cfg: KappaCfg,
    interlock: Mutex<MotionInterlock>,
    approver: Arc<dyn Approver>,
    clock: Box<dyn Clock + Send + Sync>,
    state: Mutex<ControllerState>,
    busy: AtomicBool,
    /// Bumped by every `stop()`; a move is interrupted once it differs from
    /// the value seen when the move began.
    stop_gen: AtomicU64,
    /// Serializes issuing move commands against `stop()`.
    command_lock: Mutex<()>,
    wake_tx: xch::Sender<()>,
    wake_rx: xch::Receiver<()>,
}

impl std::fmt::Debug for KappaController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KappaController")
            .field("eta", &self.axes[0].name())
            .field("kappa", &self.axes[1].name())
            .field("phi", &self.axes[2].name())
            .field("geometry", &self.geometry)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Resets the controller to `Idle` and releases the busy flag when a move ends.
struct MoveGuard<'a>(&'a KappaController);

impl Drop for MoveGuard<'_> {
    fn drop(&mut self) {
        self.0.set_state(ControllerState::Idle);
        self.0.busy.store(false, Ordering::Release);
    }
}

impl KappaController {
    pub fn builder() -> KappaBuilder<Missing, Missing> {
        KappaBuilder::default()
    }

    pub fn state(&self) -> ControllerState {
        *lock(&self.state)
    }

    fn set_state(&self, next: ControllerState) {
        let mut st = lock(&self.state);
        let prev = *st;
        if prev != next {
            tracing::debug!(from = ?prev, to = ?next, "kappa state");
            *st = next;
        }
    }

    pub const fn geometry(&self) -> KappaGeometry {
        self.geometry
    }

    pub fn limits(&self) -> StepLimits {
        lock(&self.interlock).limits()
    }

    pub fn set_limits(&self, limits: StepLimits) -> Result<()> {
        lock(&self.interlock).set_limits(limits)?;
        tracing::info!(eta = limits.eta, kappa = limits.kappa, phi = limits.phi, "step limits updated");
        Ok(())
    }

    /// Axis channel names in eta, kappa, phi order.
    pub fn axis_names(&self) -> [&str; 3] {
        [self.axes[0].name(), self.axes[1].name(), self.axes[2].name()]
    }

    /// Live native positions.
    pub fn positions(&self) -> Result<NativeCoords> {
        Ok(NativeCoords::new(
            self.axes[0].read()?,
            self.axes[1].read()?,
            self.axes[2].read()?,
        ))
    }

    /// Live spherical coordinates.
    pub fn spherical(&self) -> Result<SphericalCoords> {
        Ok(self.geometry.k_to_e(self.positions()?)?)
    }

    pub fn e_eta_coord(&self) -> Result<f64> {
        Ok(self.spherical()?.e_eta)
    }

    pub fn e_chi_coord(&self) -> Result<f64> {
        Ok(self.spherical()?.e_chi)
    }

    pub fn e_phi_coord(&self) -> Result<f64> {
        Ok(self.spherical()?.e_phi)
    }

    /// Observable readback of one spherical coordinate over the three axis channels.
    pub fn coordinate_signal(&self, axis: SphericalAxis) -> Result<AggregateCache<SphericalReadback>> {
        let names = self.axis_names().map(str::to_string);
        let channels = self.axes.iter().map(|a| a.channel.clone()).collect();
        AggregateCache::new(
            axis.name(),
            channels,
            SphericalReadback {
                geometry: self.geometry,
                names,
                axis,
            },
        )
    }

    pub fn move_e_eta(&self, value: f64) -> Result<MoveOutcome> {
        self.move_to(SphericalTarget::only(SphericalAxis::EEta, value))
    }

    pub fn move_e_chi(&self, value: f64) -> Result<MoveOutcome> {
        self.move_to(SphericalTarget::only(SphericalAxis::EChi, value))
    }

    pub fn move_e_phi(&self, value: f64) -> Result<MoveOutcome> {
        self.move_to(SphericalTarget::only(SphericalAxis::EPhi, value))
    }

    /// Blocking spherical move. See the module docs for the sequence.
    ///
    /// Errors: `Busy` while another move runs, `Domain` for unreachable
    /// targets (nothing commanded), `Timeout` when the axes do not settle
    /// within `settle_timeout` (axes are stopped), channel errors otherwise.
    pub fn move_to(&self, target: SphericalTarget) -> Result<MoveOutcome> {
        let start = self.stop_gen.load(Ordering::SeqCst);
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(GonioError::Busy.into());
        }
        let _guard = MoveGuard(self);
        // Stale wakes only cost one extra poll; the generation decides.
        while self.wake_rx.try_recv().is_ok() {}

        self.set_state(ControllerState::Converting);
        let current = self.positions()?;
        let spherical = target.resolve(self.geometry.k_to_e(current)?);
        let native = self.geometry.e_to_k(spherical)?;
        tracing::info!(
            e_eta = spherical.e_eta,
            e_chi = spherical.e_chi,
            e_phi = spherical.e_phi,
            eta = native.eta,
            kappa = native.kappa,
            phi = native.phi,
            "kappa move requested"
        );

        let decision = lock(&self.interlock).check(current, native);
        if matches!(decision, InterlockDecision::Confirm(_)) {
            self.set_state(ControllerState::AwaitingConfirmation);
            // Not held across the prompt.
            let interlock = lock(&self.interlock).clone();
            match interlock.authorize(&decision, self.approver.as_ref()) {
                Ok(()) => {}
                Err(GonioError::Declined) => return Ok(MoveOutcome::Declined),
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(outcome) = self.issue(native, start)? {
            return Ok(outcome);
        }
        if let Some(outcome) = self.settle(start)? {
            return Ok(outcome);
        }
        let reached = self.positions()?;
        tracing::info!(eta = reached.eta, kappa = reached.kappa, phi = reached.phi, "kappa move complete");
        Ok(MoveOutcome::Completed(reached))
    }

    /// Command all three axes, or none.
    fn issue(&self, native: NativeCoords, start: u64) -> Result<Option<MoveOutcome>> {
        let _cmd = lock(&self.command_lock);
        if self.stopped_since(start) {
            tracing::warn!("kappa move interrupted before motion");
            return Ok(Some(MoveOutcome::Interrupted));
        }
        if let Some(off) = self.axes.iter().find(|a| !a.channel.is_connected()) {
            return Err(GonioError::NotConnected(off.name().to_string()).into());
        }
        self.set_state(ControllerState::Moving);
        for (axis, target) in self.axes.iter().zip(native.as_array()) {
            if let Err(e) = axis.motor.move_to(target) {
                let err = map_channel_error(axis.name(), e.as_ref());
                tracing::warn!(axis = %axis.name(), target, error = %err, "move command failed; halting all axes");
                self.halt_all();
                return Err(err.into());
            }
        }
        Ok(None)
    }

    /// Wait until every axis settled, a stop arrives, or the deadline passes.
    fn settle(&self, start: u64) -> Result<Option<MoveOutcome>> {
        let deadline = self.clock.deadline(self.cfg.settle_timeout);
        loop {
            // Woken early by stop(); otherwise one poll period.
            let _ = self.wake_rx.recv_timeout(self.cfg.poll);
            if self.stopped_since(start) {
                tracing::warn!("kappa move interrupted");
                return Ok(Some(MoveOutcome::Interrupted));
            }
            if self.axes.iter().all(|a| !a.motor.is_moving()) {
                return Ok(None);
            }
            if self.clock.expired(deadline) {
                let _cmd = lock(&self.command_lock);
                self.halt_all();
                return Err(GonioError::Timeout("kappa axes to settle".into()).into());
            }
        }
    }

    fn stopped_since(&self, start: u64) -> bool {
        self.stop_gen.load(Ordering::SeqCst) != start
    }

    /// Stop every axis; returns the first failure after trying all three.
    fn halt_all(&self) -> Option<GonioError> {
        let mut first = None;
        for axis in &self.axes {
            if let Err(e) = axis.motor.stop() {
                let err = map_channel_error(axis.name(), e.as_ref());
                tracing::warn!(axis = %axis.name(), error = %err, "stop failed");
                first.get_or_insert(err);
            }
        }
        first
    }

    /// Halt all three axes and end any move in progress.
    pub fn stop(&self) -> Result<()> {
        let failed = {
            let _cmd = lock(&self.command_lock);
            self.stop_gen.fetch_add(1, Ordering::SeqCst);
            self.halt_all()
        };
        let _ = self.wake_tx.try_send(());
        tracing::warn!("kappa stop requested");
        match failed {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Block until all three axes settle, bounded by `settle_timeout`.
    pub fn wait(&self) -> Result<()> {
        let deadline = self.clock.deadline(self.cfg.settle_timeout);
        for axis in &self.axes {
            let left = self.clock.remaining(deadline);
            axis.motor
                .wait_settled(left)
                .map_err(|e| map_channel_error(axis.name(), e.as_ref()))?;
        }
        Ok(())
    }
}

// ── Builder ──────────────────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `KappaController`. Axes and approver are required.
pub struct KappaBuilder<A, P> {
    axes: Option<[AxisHandle; 3]>,
    approver: Option<Arc<dyn Approver>>,
    cfg: Option<KappaCfg>,
    limits: Option<StepLimits>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _a: PhantomData<A>,
    _p: PhantomData<P>,
}

impl Default for KappaBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            axes: None,
            approver: None,
            cfg: None,
            limits: None,
            clock: None,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<A, P> KappaBuilder<A, P> {
    pub fn with_config(mut self, cfg: KappaCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_limits(mut self, limits: StepLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<KappaController> {
        let axes = self
            .axes
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAxis("eta/kappa/phi")))?;
        let approver = self
            .approver
            .ok_or_else(|| eyre::Report::new(BuildError::MissingApprover))?;
        let cfg = self.cfg.unwrap_or_default();
        if cfg.poll.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig("poll must be > 0")));
        }
        if cfg.settle_timeout.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "settle_timeout must be > 0",
            )));
        }
        let geometry = KappaGeometry::new(cfg.kappa_angle_deg)?;
        let interlock = MotionInterlock::new(self.limits.unwrap_or_default())?.with_names(
            axes[0].name(),
            axes[1].name(),
            axes[2].name(),
        );
        let (wake_tx, wake_rx) = xch::bounded(1);
        tracing::debug!(
            kappa_angle = cfg.kappa_angle_deg,
            eta = %axes[0].name(),
            kappa = %axes[1].name(),
            phi = %axes[2].name(),
            "kappa controller built"
        );
        Ok(KappaController {
            axes,
            geometry,
            cfg,
            interlock: Mutex::new(interlock),
            approver,
            clock: self.clock.unwrap_or_else(|| Box::new(MonotonicClock::new())),
            state: Mutex::new(ControllerState::Idle),
            busy: AtomicBool::new(false),
            stop_gen: AtomicU64::new(0),
            command_lock: Mutex::new(()),
            wake_tx,
            wake_rx,
        })
    }
}

impl<P> KappaBuilder<Missing, P> {
    pub fn with_axes<E, K, F>(self, eta: Arc<E>, kappa: Arc<K>, phi: Arc<F>) -> KappaBuilder<Set, P>
    where
        E: Axis + 'static,
        K: Axis + 'static,
        F: Axis + 'static,
    {
        KappaBuilder {
            axes: Some([
                AxisHandle::new(eta),
                AxisHandle::new(kappa),
                AxisHandle::new(phi),
            ]),
            approver: self.approver,
            cfg: self.cfg,
            limits: self.limits,
            clock: self.clock,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<A> KappaBuilder<A, Missing> {
    pub fn with_approver(self, approver: impl Approver + 'static) -> KappaBuilder<A, Set> {
        KappaBuilder {
            axes: self.axes,
            approver: Some(Arc::new(approver)),
            cfg: self.cfg,
            limits: self.limits,
            clock: self.clock,
            _a: PhantomData,
            _p: PhantomData,
        }
    }
}

impl KappaBuilder<Set, Set> {
    /// Validate and build. Only available once axes and approver are set.
    pub fn build(self) -> Result<KappaController> {
        self.try_build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gonio_hardware::SimAxis;

    fn stage() -> (Arc<SimAxis>, Arc<SimAxis>, Arc<SimAxis>) {
        (
            Arc::new(SimAxis::new("ETA", 0.0, f64::INFINITY)),
            Arc::new(SimAxis::new("KAPPA", 0.0, f64::INFINITY)),
            Arc::new(SimAxis::new("PHI", 0.0, f64::INFINITY)),
        )
    }

    #[test]
    fn try_build_reports_missing_pieces() {
        let err = KappaController::builder().try_build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingAxis(_))
        ));
        let (e, k, p) = stage();
        let err = KappaController::builder()
            .with_axes(e, k, p)
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingApprover)
        ));
    }

    #[test]
    fn degenerate_geometry_fails_build() {
        let (e, k, p) = stage();
        let err = KappaController::builder()
            .with_axes(e, k, p)
            .with_approver(|_: &str| true)
            .with_config(KappaCfg {
                kappa_angle_deg: 180.0,
                ..KappaCfg::default()
            })
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GonioError>(),
            Some(GonioError::Domain(_))
        ));
    }

    #[test]
    fn target_resolution_holds_unset_coordinates() {
        let t = SphericalTarget::only(SphericalAxis::EChi, 10.0);
        let s = t.resolve(SphericalCoords::new(1.0, 2.0, 3.0));
        assert_eq!(s, SphericalCoords::new(1.0, 10.0, 3.0));
    }

    #[test]
    fn small_move_completes_without_approval() {
        let (e, k, p) = stage();
        let ctrl = KappaController::builder()
            .with_axes(e.clone(), k, p)
            .with_approver(|_: &str| -> bool { panic!("no confirmation expected") })
            .build()
            .unwrap();
        let reached = ctrl.move_e_eta(-1.0).unwrap().into_result().unwrap();
        assert!((reached.eta - 1.0).abs() < 1e-9);
        assert!((e.position() - 1.0).abs() < 1e-9);
        assert_eq!(ctrl.state(), ControllerState::Idle);
    }
}
