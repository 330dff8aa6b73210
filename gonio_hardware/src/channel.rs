//! In-process `SourceChannel` used by the CLI and tests.
//!
//! Behaves like a monitored process variable: reads fail while disconnected,
//! every pushed value is delivered to subscribers (no change suppression), and
//! connection transitions are announced with the channel metadata.
use gonio_traits::{
    BoxError, ChangeCallback, ChannelMetadata, MetadataCallback, SourceChannel, SubscriptionId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::HwError;
use crate::util::wait_until_with_timeout;

type ValueSub = Arc<dyn Fn(&str, f64) + Send + Sync>;
type MetaSub = Arc<dyn Fn(bool, &ChannelMetadata) + Send + Sync>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct State {
    value: f64,
    connected: bool,
    metadata: ChannelMetadata,
}

#[derive(Default)]
struct Subscribers {
    values: Vec<(SubscriptionId, ValueSub)>,
    meta: Vec<(SubscriptionId, MetaSub)>,
}

struct Inner {
    name: String,
    state: Mutex<State>,
    subs: Mutex<Subscribers>,
    next_id: AtomicU64,
    reads: AtomicU64,
}

/// Simulated channel. Cloning shares the same underlying value.
#[derive(Clone)]
pub struct SimChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SimChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.inner.state);
        f.debug_struct("SimChannel")
            .field("name", &self.inner.name)
            .field("value", &st.value)
            .field("connected", &st.connected)
            .finish()
    }
}

impl SimChannel {
    /// A connected channel holding `value`.
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self::build(name.into(), value, true)
    }

    /// A channel that starts disconnected; see `set_connected` / `connect_after`.
    pub fn disconnected(name: impl Into<String>, value: f64) -> Self {
        Self::build(name.into(), value, false)
    }

    fn build(name: String, value: f64, connected: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: Mutex::new(State {
                    value,
                    connected,
                    metadata: ChannelMetadata::default(),
                }),
                subs: Mutex::new(Subscribers::default()),
                next_id: AtomicU64::new(1),
                reads: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_metadata(self, metadata: ChannelMetadata) -> Self {
        lock(&self.inner.state).metadata = metadata;
        self
    }

    pub fn with_units(self, units: &str) -> Self {
        lock(&self.inner.state).metadata.units = Some(units.to_string());
        self
    }

    /// Replace the metadata; subscribers see it on the next connection transition.
    pub fn set_metadata(&self, metadata: ChannelMetadata) {
        lock(&self.inner.state).metadata = metadata;
    }

    /// Flip the connection state, announcing the transition to metadata subscribers.
    pub fn set_connected(&self, connected: bool) {
        let meta = {
            let mut st = lock(&self.inner.state);
            if st.connected == connected {
                return;
            }
            st.connected = connected;
            st.metadata.clone()
        };
        tracing::debug!(channel = %self.inner.name, connected, "sim channel connection change");
        let subs: Vec<MetaSub> = lock(&self.inner.subs)
            .meta
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in subs {
            cb(connected, &meta);
        }
    }

    /// Connect from a helper thread after `delay`.
    pub fn connect_after(&self, delay: Duration) -> JoinHandle<()> {
        let me = self.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            me.set_connected(true);
        })
    }

    /// Simulate a monitor update. Ignored while disconnected.
    pub fn push(&self, value: f64) {
        {
            let mut st = lock(&self.inner.state);
            if !st.connected {
                tracing::trace!(channel = %self.inner.name, value, "dropping update while disconnected");
                return;
            }
            st.value = value;
        }
        let subs: Vec<ValueSub> = lock(&self.inner.subs)
            .values
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for cb in subs {
            cb(&self.inner.name, value);
        }
    }

    /// Current value without counting as a read.
    pub fn value(&self) -> f64 {
        lock(&self.inner.state).value
    }

    /// Number of synchronous `read()` calls served so far.
    pub fn reads(&self) -> u64 {
        self.inner.reads.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        let subs = lock(&self.inner.subs);
        subs.values.len() + subs.meta.len()
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl SourceChannel for SimChannel {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn read(&self) -> Result<f64, BoxError> {
        self.inner.reads.fetch_add(1, Ordering::Relaxed);
        let st = lock(&self.inner.state);
        if !st.connected {
            return Err(Box::new(HwError::NotConnected(self.inner.name.clone())));
        }
        Ok(st.value)
    }

    fn write(&self, value: f64) -> Result<(), BoxError> {
        if !self.is_connected() {
            return Err(Box::new(HwError::NotConnected(self.inner.name.clone())));
        }
        self.push(value);
        Ok(())
    }

    fn subscribe(&self, on_change: ChangeCallback) -> SubscriptionId {
        let id = self.next_id();
        lock(&self.inner.subs).values.push((id, Arc::from(on_change)));
        id
    }

    fn subscribe_metadata(&self, on_meta: MetadataCallback) -> SubscriptionId {
        let id = self.next_id();
        lock(&self.inner.subs).meta.push((id, Arc::from(on_meta)));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = lock(&self.inner.subs);
        subs.values.retain(|(sid, _)| *sid != id);
        subs.meta.retain(|(sid, _)| *sid != id);
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner.state).connected
    }

    fn wait_connected(&self, timeout: Duration) -> Result<(), BoxError> {
        wait_until_with_timeout(
            || self.is_connected(),
            timeout,
            Duration::from_millis(1),
            &self.inner.name,
        )
        .map_err(|e| Box::new(e) as BoxError)
    }

    fn metadata(&self) -> ChannelMetadata {
        lock(&self.inner.state).metadata.clone()
    }
}
