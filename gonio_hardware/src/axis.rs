//! Simulated rotation axis.
//!
//! A worker thread ramps the readback position toward the commanded target
//! at a fixed speed, publishing every intermediate position through the
//! embedded `SimChannel`. The thread is owned by the `SimAxis` and joined on
//! drop.
use crossbeam_channel as xch;
use gonio_traits::{
    Axis, BoxError, ChangeCallback, ChannelMetadata, MetadataCallback, SourceChannel,
    SubscriptionId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::{SimChannel, lock};
use crate::error::HwError;
use crate::util::wait_until_with_timeout;

/// Motion worker period.
const TICK: Duration = Duration::from_millis(2);

/// Every command an axis received, in order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisCommand {
    Move(f64),
    Stop,
}

#[derive(Debug)]
struct Motion {
    target: Option<f64>,
    speed: f64,
}

struct Shared {
    channel: SimChannel,
    motion: Mutex<Motion>,
    log: Mutex<Vec<AxisCommand>>,
}

impl Shared {
    fn tick(&self) {
        let next = {
            let m = lock(&self.motion);
            let Some(target) = m.target else { return };
            let pos = self.channel.value();
            let max_step = m.speed * TICK.as_secs_f64();
            if (target - pos).abs() <= max_step {
                target
            } else {
                pos + max_step.copysign(target - pos)
            }
        };
        // Publish outside the motion guard so observers may query the axis.
        self.channel.push(next);
        let mut m = lock(&self.motion);
        if m.target == Some(next) {
            m.target = None;
            tracing::debug!(axis = %self.channel.name(), position = next, "axis settled");
        }
    }
}

pub struct SimAxis {
    shared: Arc<Shared>,
    shutdown: Option<xch::Sender<()>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl SimAxis {
    /// Axis at `position` degrees moving at `speed` degrees per second.
    /// An infinite speed arrives on the next worker tick.
    pub fn new(name: impl Into<String>, position: f64, speed: f64) -> Self {
        Self::from_channel(SimChannel::new(name, position).with_units("deg"), speed)
    }

    pub fn from_channel(channel: SimChannel, speed: f64) -> Self {
        let shared = Arc::new(Shared {
            channel,
            motion: Mutex::new(Motion {
                target: None,
                speed: speed.abs(),
            }),
            log: Mutex::new(Vec::new()),
        });
        let (tx, rx) = xch::bounded::<()>(0);
        let worker_shared = shared.clone();
        let worker = std::thread::spawn(move || {
            let ticker = xch::tick(TICK);
            loop {
                xch::select! {
                    recv(rx) -> _ => break,
                    recv(ticker) -> _ => worker_shared.tick(),
                }
            }
            tracing::trace!(axis = %worker_shared.channel.name(), "sim axis worker exiting");
        });
        Self {
            shared,
            shutdown: Some(tx),
            worker: Some(worker),
        }
    }

    /// The readback channel backing this axis.
    pub fn channel(&self) -> &SimChannel {
        &self.shared.channel
    }

    pub fn position(&self) -> f64 {
        self.shared.channel.value()
    }

    pub fn commands(&self) -> Vec<AxisCommand> {
        lock(&self.shared.log).clone()
    }

    pub fn clear_commands(&self) {
        lock(&self.shared.log).clear();
    }
}

impl Drop for SimAxis {
    fn drop(&mut self) {
        // Disconnecting the sender wakes the worker's select.
        drop(self.shutdown.take());
        if let Some(handle) = self.worker.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "sim axis worker panicked during shutdown");
        }
    }
}

impl SourceChannel for SimAxis {
    fn name(&self) -> &str {
        self.shared.channel.name()
    }

    fn read(&self) -> Result<f64, BoxError> {
        self.shared.channel.read()
    }

    /// Writing an axis position commands a move.
    fn write(&self, value: f64) -> Result<(), BoxError> {
        self.move_to(value)
    }

    fn subscribe(&self, on_change: ChangeCallback) -> SubscriptionId {
        self.shared.channel.subscribe(on_change)
    }

    fn subscribe_metadata(&self, on_meta: MetadataCallback) -> SubscriptionId {
        self.shared.channel.subscribe_metadata(on_meta)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.channel.unsubscribe(id);
    }

    fn is_connected(&self) -> bool {
        self.shared.channel.is_connected()
    }

    fn wait_connected(&self, timeout: Duration) -> Result<(), BoxError> {
        self.shared.channel.wait_connected(timeout)
    }

    fn metadata(&self) -> ChannelMetadata {
        self.shared.channel.metadata()
    }
}

impl Axis for SimAxis {
    fn move_to(&self, target: f64) -> Result<(), BoxError> {
        let name = self.shared.channel.name();
        if !self.shared.channel.is_connected() {
            return Err(Box::new(HwError::NotConnected(name.to_string())));
        }
        if !target.is_finite() {
            return Err(Box::new(HwError::Motion(
                name.to_string(),
                format!("non-finite target {target}"),
            )));
        }
        lock(&self.shared.log).push(AxisCommand::Move(target));
        lock(&self.shared.motion).target = Some(target);
        tracing::debug!(axis = %name, target, "sim axis move");
        Ok(())
    }

    fn stop(&self) -> Result<(), BoxError> {
        lock(&self.shared.log).push(AxisCommand::Stop);
        lock(&self.shared.motion).target = None;
        tracing::debug!(axis = %self.shared.channel.name(), "sim axis stop");
        Ok(())
    }

    fn is_moving(&self) -> bool {
        lock(&self.shared.motion).target.is_some()
    }

    fn wait_settled(&self, timeout: Duration) -> Result<(), BoxError> {
        wait_until_with_timeout(
            || !self.is_moving(),
            timeout,
            Duration::from_millis(1),
            self.shared.channel.name(),
        )
        .map_err(|e| Box::new(e) as BoxError)
    }
}
