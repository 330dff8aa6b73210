//! Derived value computed from several source channels.
//!
//! `AggregateCache` keeps the last known value of every registered channel
//! and recomputes its readback through a `Readback` implementation whenever
//! one of them changes, so observers get updates without re-reading every
//! channel.
//!
//! Lifecycle:
//! - created empty; nothing is read or subscribed
//! - `get()` reads every channel synchronously and recomputes
//! - the first `subscribe()` attaches one change handler per channel, then
//!   warms the cache with a `get()` before returning
//! - afterwards each channel change updates exactly one slot
//!
//! Failure policy: a failing readback calculation leaves the raw slot
//! updated, clears the readback, records the error (`last_error`) and
//! suppresses that cycle's notification. `get()` returns the error.
use gonio_traits::{SourceChannel, SubscriptionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{GonioError, Result};
use crate::hw_error::map_channel_error;
use crate::observer::{Observer, Observers, Sequencer, notify_all};
use crate::util::lock;

/// When observers are told about a recomputed readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// Only when the readback differs from the previous one.
    #[default]
    OnChange,
    /// On every accepted channel update.
    Always,
}

/// Read-only view of the cached channel values handed to a `Readback`.
#[derive(Debug, Clone, Copy)]
pub struct CacheView<'a> {
    values: &'a HashMap<String, f64>,
}

impl<'a> CacheView<'a> {
    pub fn get(&self, channel: &str) -> Option<f64> {
        self.values.get(channel).copied()
    }

    /// Cached value of `channel`, or a `Calc` error naming the missing slot.
    pub fn require(&self, channel: &str) -> std::result::Result<f64, GonioError> {
        self.get(channel)
            .ok_or_else(|| GonioError::Calc(format!("no cached value for {channel}")))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Pure, deterministic function of the cached channel values.
pub trait Readback: Send + Sync + 'static {
    type Output: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static;

    fn calc_readback(&self, cache: &CacheView<'_>) -> std::result::Result<Self::Output, GonioError>;
}

/// `Readback` backed by a closure.
pub struct FnReadback<F>(pub F);

impl<F, T> FnReadback<F>
where
    F: Fn(&CacheView<'_>) -> std::result::Result<T, GonioError> + Send + Sync + 'static,
{
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, T> Readback for FnReadback<F>
where
    F: Fn(&CacheView<'_>) -> std::result::Result<T, GonioError> + Send + Sync + 'static,
    T: Clone + PartialEq + Send + Sync + std::fmt::Debug + 'static,
{
    type Output = T;

    fn calc_readback(&self, cache: &CacheView<'_>) -> std::result::Result<T, GonioError> {
        (self.0)(cache)
    }
}

struct CacheState<T> {
    values: HashMap<String, f64>,
    readback: Option<T>,
    last_error: Option<GonioError>,
    attached: bool,
    warmed: bool,
}

struct Inner<R: Readback> {
    name: String,
    readback: R,
    channels: Vec<Arc<dyn SourceChannel>>,
    policy: NotifyPolicy,
    state: Mutex<CacheState<R::Output>>,
    observers: Mutex<Observers<R::Output>>,
    sequencer: Sequencer,
    channel_subs: Mutex<Vec<(usize, SubscriptionId)>>,
}

impl<R: Readback> Drop for Inner<R> {
    fn drop(&mut self) {
        let subs = std::mem::take(&mut *lock(&self.channel_subs));
        for (idx, sid) in subs {
            if let Some(ch) = self.channels.get(idx) {
                ch.unsubscribe(sid);
            }
        }
    }
}

impl<R: Readback> Inner<R> {
    fn recompute(&self, st: &mut CacheState<R::Output>) -> std::result::Result<R::Output, GonioError> {
        match self.readback.calc_readback(&CacheView { values: &st.values }) {
            Ok(v) => {
                st.readback = Some(v.clone());
                st.last_error = None;
                Ok(v)
            }
            Err(e) => {
                st.readback = None;
                st.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Per-channel change handler.
    fn on_channel_change(&self, channel: &str, value: f64) {
        let pending = {
            let mut st = lock(&self.state);
            st.values.insert(channel.to_string(), value);
            let old = st.readback.clone();
            match self.recompute(&mut st) {
                Ok(new) => {
                    let changed = old.as_ref() != Some(&new);
                    if changed || self.policy == NotifyPolicy::Always {
                        let observers = lock(&self.observers).snapshot();
                        Some((self.sequencer.ticket(), new, old, observers))
                    } else {
                        tracing::trace!(signal = %self.name, channel, "readback unchanged; suppressed");
                        None
                    }
                }
                Err(e) => {
                    tracing::warn!(signal = %self.name, channel, error = %e, "readback failed; notification suppressed");
                    None
                }
            }
        };
        if let Some((ticket, new, old, observers)) = pending {
            self.sequencer
                .deliver(ticket, || notify_all(&observers, &new, old.as_ref()));
        }
    }
}

/// Cache-backed derived signal. Cloning shares the same cache.
pub struct AggregateCache<R: Readback> {
    inner: Arc<Inner<R>>,
}

impl<R: Readback> Clone for AggregateCache<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Readback> std::fmt::Debug for AggregateCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateCache")
            .field("name", &self.inner.name)
            .field("channels", &self.inner.channels.len())
            .field("policy", &self.inner.policy)
            .field("readback", &self.readback())
            .finish()
    }
}

impl<R: Readback> AggregateCache<R> {
    /// Aggregate that notifies only when the readback changes.
    pub fn new(
        name: impl Into<String>,
        channels: Vec<Arc<dyn SourceChannel>>,
        readback: R,
    ) -> Result<Self> {
        Self::with_policy(name, channels, readback, NotifyPolicy::OnChange)
    }

    pub fn with_policy(
        name: impl Into<String>,
        channels: Vec<Arc<dyn SourceChannel>>,
        readback: R,
        policy: NotifyPolicy,
    ) -> Result<Self> {
        let name = name.into();
        if channels.is_empty() {
            return Err(GonioError::InvalidState(format!("{name}: no source channels")).into());
        }
        for (i, ch) in channels.iter().enumerate() {
            if channels[..i].iter().any(|other| other.name() == ch.name()) {
                return Err(GonioError::InvalidState(format!(
                    "{name}: duplicate source channel {}",
                    ch.name()
                ))
                .into());
            }
        }
        Ok(Self {
            inner: Arc::new(Inner {
                name,
                readback,
                channels,
                policy,
                state: Mutex::new(CacheState {
                    values: HashMap::new(),
                    readback: None,
                    last_error: None,
                    attached: false,
                    warmed: false,
                }),
                observers: Mutex::new(Observers::default()),
                sequencer: Sequencer::default(),
                channel_subs: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn policy(&self) -> NotifyPolicy {
        self.inner.policy
    }

    /// Re-read every channel, refresh the cache and return the recomputed value.
    ///
    /// Blocks for as long as the slowest channel read. A failed read leaves
    /// the slots read so far updated.
    pub fn get(&self) -> Result<R::Output> {
        let mut st = lock(&self.inner.state);
        for ch in &self.inner.channels {
            let v = ch
                .read()
                .map_err(|e| map_channel_error(ch.name(), e.as_ref()))?;
            st.values.insert(ch.name().to_string(), v);
        }
        let value = self.inner.recompute(&mut st)?;
        st.warmed = st.attached;
        tracing::trace!(signal = %self.inner.name, readback = ?value, "aggregate refreshed");
        Ok(value)
    }

    /// Last computed readback without touching the channels.
    pub fn readback(&self) -> Option<R::Output> {
        lock(&self.inner.state).readback.clone()
    }

    /// Cached value of one channel.
    pub fn cached(&self, channel: &str) -> Option<f64> {
        lock(&self.inner.state).values.get(channel).copied()
    }

    /// Error of the most recent failed recomputation, cleared by the next success.
    pub fn last_error(&self) -> Option<GonioError> {
        lock(&self.inner.state).last_error.clone()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }

    /// Register `observer` for readback changes.
    ///
    /// The first call attaches the per-channel handlers and then warms the
    /// cache with `get()`. If warming fails the observer is not kept and the
    /// error is returned; the handlers stay attached and the next
    /// subscription retries the warm-up.
    pub fn subscribe(
        &self,
        observer: impl Fn(&R::Output, Option<&R::Output>) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let observer: Observer<R::Output> = Arc::new(observer);
        let id = lock(&self.inner.observers).add(observer);

        let (attach, warm) = {
            let mut st = lock(&self.inner.state);
            let attach = !st.attached;
            st.attached = true;
            (attach, !st.warmed)
        };
        if attach {
            self.attach_handlers();
        }
        if warm && let Err(e) = self.get() {
            lock(&self.inner.observers).remove(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Returns false when `id` was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.inner.observers).remove(id)
    }

    fn attach_handlers(&self) {
        let mut subs = lock(&self.inner.channel_subs);
        for (idx, ch) in self.inner.channels.iter().enumerate() {
            let weak: Weak<Inner<R>> = Arc::downgrade(&self.inner);
            let sid = ch.subscribe(Box::new(move |channel, value| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_channel_change(channel, value);
                }
            }));
            subs.push((idx, sid));
        }
        tracing::debug!(signal = %self.inner.name, channels = subs.len(), "aggregate attached to sources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gonio_hardware::SimChannel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Sum;

    impl Readback for Sum {
        type Output = f64;

        fn calc_readback(&self, c: &CacheView<'_>) -> std::result::Result<f64, GonioError> {
            Ok(c.iter().map(|(_, v)| v).sum())
        }
    }

    fn sum() -> Sum {
        Sum
    }

    #[test]
    fn rejects_duplicate_channels() {
        let a = SimChannel::new("A", 1.0);
        let chans: Vec<Arc<dyn SourceChannel>> = vec![Arc::new(a.clone()), Arc::new(a)];
        let err = AggregateCache::new("dup", chans, sum()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GonioError>(),
            Some(GonioError::InvalidState(_))
        ));
    }

    #[test]
    fn get_reads_every_channel() {
        let a = SimChannel::new("A", 1.0);
        let b = SimChannel::new("B", 2.5);
        let agg = AggregateCache::new(
            "sum",
            vec![Arc::new(a.clone()), Arc::new(b.clone())],
            sum(),
        )
        .unwrap();
        assert_eq!(agg.readback(), None);
        assert_eq!(agg.get().unwrap(), 3.5);
        assert_eq!((a.reads(), b.reads()), (1, 1));
        assert_eq!(agg.cached("B"), Some(2.5));
    }

    #[test]
    fn dropping_the_cache_detaches_from_channels() {
        let a = SimChannel::new("A", 1.0);
        let agg = AggregateCache::new("sum", vec![Arc::new(a.clone())], sum()).unwrap();
        agg.subscribe(|_, _| {}).unwrap();
        assert_eq!(a.subscriber_count(), 1);
        drop(agg);
        assert_eq!(a.subscriber_count(), 0);
    }

    #[test]
    fn observer_may_read_the_cache() {
        let a = SimChannel::new("A", 1.0);
        let agg = AggregateCache::new("sum", vec![Arc::new(a.clone())], sum()).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let (h, reader) = (hits.clone(), agg.clone());
        agg.subscribe(move |new, _| {
            assert_eq!(reader.readback().as_ref(), Some(new));
            h.fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();
        a.push(4.0);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }
}
