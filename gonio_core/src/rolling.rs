//! Rolling average of one source channel.
//!
//! Construction never blocks: a connector thread waits for the source to
//! report connected (in bounded attempts so it can be cancelled), then
//! subscribes to its change stream. Each update lands in a fixed-size
//! circular window and the mean of all written slots is published.
//!
//! Safety: the connector thread is owned by the `RollingAverage`; dropping it
//! cancels the thread, joins it and removes the source subscription.
use gonio_traits::{SourceChannel, SubscriptionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::AverageCfg;
use crate::error::{GonioError, Result};
use crate::observer::{Observer, Observers, Sequencer, notify_all};
use crate::util::lock;

/// Progress of the background subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectState {
    Connecting,
    Connected,
    /// Dropped before the source ever connected.
    Cancelled,
}

/// Fixed-capacity circular buffer; unset slots are excluded from the mean.
#[derive(Debug, Clone)]
pub struct Window {
    slots: Vec<Option<f64>>,
    cursor: usize,
}

impl Window {
    /// Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Overwrite the slot under the cursor and advance it. NaN clears the slot.
    pub fn push(&mut self, sample: f64) {
        self.slots[self.cursor] = (!sample.is_nan()).then_some(sample);
        self.cursor = (self.cursor + 1) % self.slots.len();
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Mean of the set slots; `None` while nothing has been written.
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> Option<f64> {
        let (sum, n) = self
            .slots
            .iter()
            .flatten()
            .fold((0.0_f64, 0_usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

struct State {
    window: Window,
    last: Option<f64>,
    connect: ConnectState,
    source_sub: Option<SubscriptionId>,
}

struct Inner {
    name: String,
    source: Arc<dyn SourceChannel>,
    state: Mutex<State>,
    connected_cv: Condvar,
    observers: Mutex<Observers<f64>>,
    sequencer: Sequencer,
    shutdown: AtomicBool,
}

impl Inner {
    fn on_sample(&self, value: f64) {
        let pending = {
            let mut st = lock(&self.state);
            if st.connect != ConnectState::Connected {
                return;
            }
            st.window.push(value);
            let Some(mean) = st.window.mean() else {
                tracing::trace!(signal = %self.name, "window empty after update; nothing to publish");
                return;
            };
            let old = st.last.replace(mean);
            let observers = lock(&self.observers).snapshot();
            (self.sequencer.ticket(), mean, old, observers)
        };
        let (ticket, mean, old, observers) = pending;
        self.sequencer
            .deliver(ticket, || notify_all(&observers, &mean, old.as_ref()));
    }

    fn connect_loop(self: &Arc<Self>, attempt: Duration) {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                self.finish_cancelled();
                return;
            }
            match self.source.wait_connected(attempt) {
                Ok(()) => break,
                Err(e) => {
                    tracing::trace!(signal = %self.name, error = %e, "source not connected yet");
                }
            }
        }

        let mut st = lock(&self.state);
        // Checked under the guard so Drop never misses a subscription.
        if self.shutdown.load(Ordering::Relaxed) {
            st.connect = ConnectState::Cancelled;
            drop(st);
            self.connected_cv.notify_all();
            return;
        }
        let weak = Arc::downgrade(self);
        let sid = self.source.subscribe(Box::new(move |_, value| {
            if let Some(inner) = weak.upgrade() {
                inner.on_sample(value);
            }
        }));
        st.source_sub = Some(sid);
        st.connect = ConnectState::Connected;
        drop(st);
        self.connected_cv.notify_all();
        tracing::debug!(signal = %self.name, source = %self.source.name(), "rolling average subscribed");
    }

    fn finish_cancelled(&self) {
        lock(&self.state).connect = ConnectState::Cancelled;
        self.connected_cv.notify_all();
        tracing::trace!(signal = %self.name, "connector cancelled");
    }
}

/// Mean of the last `averages` updates of a source channel.
pub struct RollingAverage {
    inner: Arc<Inner>,
    connector: Option<std::thread::JoinHandle<()>>,
}

impl std::fmt::Debug for RollingAverage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.inner.state);
        f.debug_struct("RollingAverage")
            .field("name", &self.inner.name)
            .field("averages", &st.window.capacity())
            .field("connect", &st.connect)
            .field("last", &st.last)
            .finish()
    }
}

impl RollingAverage {
    /// Start averaging `source`; returns immediately.
    pub fn spawn(
        name: impl Into<String>,
        source: Arc<dyn SourceChannel>,
        cfg: AverageCfg,
    ) -> Result<Self> {
        let name = name.into();
        if cfg.averages == 0 {
            return Err(GonioError::InvalidState(format!("{name}: averages must be >= 1")).into());
        }
        let inner = Arc::new(Inner {
            name,
            source,
            state: Mutex::new(State {
                window: Window::new(cfg.averages),
                last: None,
                connect: ConnectState::Connecting,
                source_sub: None,
            }),
            connected_cv: Condvar::new(),
            observers: Mutex::new(Observers::default()),
            sequencer: Sequencer::default(),
            shutdown: AtomicBool::new(false),
        });
        let worker = inner.clone();
        let attempt = cfg.connect_attempt;
        let connector = std::thread::spawn(move || worker.connect_loop(attempt));
        Ok(Self {
            inner,
            connector: Some(connector),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn averages(&self) -> usize {
        lock(&self.inner.state).window.capacity()
    }

    /// Resize the window. Buffered samples are discarded and nothing is
    /// published; `get()` keeps returning the last published mean until the
    /// next sample arrives.
    pub fn set_averages(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(GonioError::InvalidState(format!(
                "{}: averages must be >= 1",
                self.inner.name
            ))
            .into());
        }
        lock(&self.inner.state).window = Window::new(n);
        tracing::debug!(signal = %self.inner.name, averages = n, "rolling window reset");
        Ok(())
    }

    pub fn connect_state(&self) -> ConnectState {
        lock(&self.inner.state).connect
    }

    /// Subscribed and the source currently reports connected.
    pub fn is_connected(&self) -> bool {
        self.connect_state() == ConnectState::Connected && self.inner.source.is_connected()
    }

    /// Block until the connector subscribed, or fail with `Timeout`.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now().checked_add(timeout);
        let mut st = lock(&self.inner.state);
        while st.connect == ConnectState::Connecting {
            let left = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
            if left.is_zero() {
                return Err(GonioError::Timeout(self.inner.name.clone()).into());
            }
            st = self
                .inner
                .connected_cv
                .wait_timeout(st, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        match st.connect {
            ConnectState::Connected => Ok(()),
            _ => Err(GonioError::NotConnected(self.inner.name.clone()).into()),
        }
    }

    /// Last published mean. Stays at the last known value if the source
    /// disconnects later; check `is_connected()` for freshness.
    pub fn get(&self) -> Result<f64> {
        let st = lock(&self.inner.state);
        match (st.connect, st.last) {
            (ConnectState::Connected, Some(v)) => Ok(v),
            _ => Err(GonioError::NotConnected(self.inner.name.clone()).into()),
        }
    }

    /// Number of written slots in the current window.
    pub fn samples(&self) -> usize {
        lock(&self.inner.state).window.filled()
    }

    /// Observer runs once per accepted sample, in arrival order.
    pub fn subscribe(
        &self,
        observer: impl Fn(&f64, Option<&f64>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let observer: Observer<f64> = Arc::new(observer);
        lock(&self.inner.observers).add(observer)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner.observers).remove(id)
    }
}

impl Drop for RollingAverage {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.connector.take() {
            match handle.join() {
                Ok(()) => tracing::trace!(signal = %self.inner.name, "connector joined"),
                Err(e) => tracing::warn!(?e, "rolling average connector panicked"),
            }
        }
        if let Some(sid) = lock(&self.inner.state).source_sub.take() {
            self.inner.source.unsubscribe(sid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_excludes_unset_slots() {
        let mut w = Window::new(4);
        assert_eq!(w.mean(), None);
        w.push(2.0);
        w.push(4.0);
        assert_eq!(w.filled(), 2);
        assert_eq!(w.mean(), Some(3.0));
    }

    #[test]
    fn window_overwrites_oldest() {
        let mut w = Window::new(2);
        for v in [1.0, 2.0, 3.0] {
            w.push(v);
        }
        assert_eq!(w.mean(), Some(2.5));
    }

    #[test]
    fn nan_sample_clears_its_slot() {
        let mut w = Window::new(2);
        w.push(1.0);
        w.push(f64::NAN);
        assert_eq!(w.filled(), 1);
        assert_eq!(w.mean(), Some(1.0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(Window::new(0).capacity(), 1);
    }
}
