//! Pass-through signal with an offset and a unit conversion.
//!
//! Values flow `original -> derived` through `inverse` and
//! `derived -> original` through `forward`:
//!
//! ```text
//! forward(v) = convert(v - offset, derived, original)
//! inverse(v) = convert(v, original, derived) + offset
//! ```
//!
//! Both fail with `InvalidState` while the offset or the original units are
//! unset. Original units not given at construction are adopted from the
//! source's first connection metadata and never change afterwards.
use gonio_traits::{ChannelMetadata, SourceChannel, SubscriptionId, UnitConverter};
use std::sync::{Arc, Mutex, Weak};

use crate::access::AccessMode;
use crate::config::UnitCfg;
use crate::error::{GonioError, Result};
use crate::hw_error::map_channel_error;
use crate::observer::{Observer, Observers, Sequencer, notify_all};
use crate::util::lock;

/// What a unit signal reports about itself, in derived units.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub name: String,
    pub source: String,
    pub units: String,
    pub access: AccessMode,
    pub connected: bool,
    /// Current derived value; the last known one while disconnected.
    pub value: Option<f64>,
    pub lower_ctrl_limit: Option<f64>,
    pub upper_ctrl_limit: Option<f64>,
    pub precision: Option<u8>,
}

struct State {
    derived: String,
    original: Option<String>,
    offset: Option<f64>,
    last_raw: Option<f64>,
    last_value: Option<f64>,
    /// Latched by the first connected metadata callback.
    metadata_seen: bool,
}

struct Inner {
    name: String,
    source: Arc<dyn SourceChannel>,
    converter: Arc<dyn UnitConverter>,
    access: AccessMode,
    state: Mutex<State>,
    observers: Mutex<Observers<f64>>,
    sequencer: Sequencer,
    source_subs: Mutex<Vec<SubscriptionId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for sid in std::mem::take(&mut *lock(&self.source_subs)) {
            self.source.unsubscribe(sid);
        }
    }
}

impl Inner {
    fn convert(&self, value: f64, from: &str, to: &str) -> std::result::Result<f64, GonioError> {
        self.converter
            .convert(value, from, to)
            .map_err(|e| map_channel_error(&self.name, e.as_ref()))
    }

    fn units<'a>(&self, st: &'a State) -> std::result::Result<(f64, &'a str, &'a str), GonioError> {
        let offset = st
            .offset
            .ok_or_else(|| GonioError::InvalidState(format!("{}: offset is not set", self.name)))?;
        let original = st.original.as_deref().ok_or_else(|| {
            GonioError::InvalidState(format!("{}: original units are not known yet", self.name))
        })?;
        Ok((offset, st.derived.as_str(), original))
    }

    fn inverse_with(&self, st: &State, value: f64) -> std::result::Result<f64, GonioError> {
        let (offset, derived, original) = self.units(st)?;
        Ok(self.convert(value, original, derived)? + offset)
    }

    fn forward_with(&self, st: &State, value: f64) -> std::result::Result<f64, GonioError> {
        let (offset, derived, original) = self.units(st)?;
        self.convert(value - offset, derived, original)
    }

    /// Convert `raw` under the guard and deliver it to observers.
    fn publish(&self, mut st: std::sync::MutexGuard<'_, State>, raw: f64) {
        st.last_raw = Some(raw);
        let value = match self.inverse_with(&st, raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(signal = %self.name, raw, error = %e, "cannot convert source value");
                return;
            }
        };
        let old = st.last_value.replace(value);
        let ticket = self.sequencer.ticket();
        let observers = lock(&self.observers).snapshot();
        drop(st);
        self.sequencer
            .deliver(ticket, || notify_all(&observers, &value, old.as_ref()));
    }

    fn on_metadata(&self, connected: bool, meta: &ChannelMetadata) {
        if !connected {
            tracing::debug!(signal = %self.name, "source disconnected; holding last value");
            return;
        }
        let mut st = lock(&self.state);
        if std::mem::replace(&mut st.metadata_seen, true) {
            return;
        }
        if st.original.is_none()
            && let Some(units) = meta.units.as_deref().filter(|u| !u.trim().is_empty())
        {
            tracing::debug!(signal = %self.name, units, "adopted source units");
            st.original = Some(units.to_string());
        }
    }
}

/// Source channel seen through an offset and a unit pair.
#[derive(Clone)]
pub struct UnitConvertingSignal {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for UnitConvertingSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.inner.state);
        f.debug_struct("UnitConvertingSignal")
            .field("name", &self.inner.name)
            .field("derived", &st.derived)
            .field("original", &st.original)
            .field("offset", &st.offset)
            .field("access", &self.inner.access)
            .finish()
    }
}

impl UnitConvertingSignal {
    /// Wrap `source`. Subscribes to its values and connection metadata
    /// immediately; nothing is read synchronously.
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn SourceChannel>,
        converter: Arc<dyn UnitConverter>,
        cfg: UnitCfg,
        access: AccessMode,
    ) -> Result<Self> {
        let name = name.into();
        if cfg.derived.trim().is_empty() {
            return Err(GonioError::InvalidState(format!("{name}: derived units are empty")).into());
        }
        let inner = Arc::new(Inner {
            name,
            source,
            converter,
            access,
            state: Mutex::new(State {
                derived: cfg.derived,
                original: cfg.original,
                offset: cfg.offset,
                last_raw: None,
                last_value: None,
                metadata_seen: false,
            }),
            observers: Mutex::new(Observers::default()),
            sequencer: Sequencer::default(),
            source_subs: Mutex::new(Vec::new()),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let value_sub = inner.source.subscribe(Box::new(move |_, raw| {
            if let Some(inner) = weak.upgrade() {
                let st = lock(&inner.state);
                inner.publish(st, raw);
            }
        }));
        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let meta_sub = inner
            .source
            .subscribe_metadata(Box::new(move |connected, meta| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_metadata(connected, meta);
                }
            }));
        lock(&inner.source_subs).extend([value_sub, meta_sub]);

        if inner.source.is_connected() {
            inner.on_metadata(true, &inner.source.metadata());
        }
        Ok(Self { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn access(&self) -> AccessMode {
        self.inner.access
    }

    pub fn units(&self) -> String {
        lock(&self.inner.state).derived.clone()
    }

    pub fn original_units(&self) -> Option<String> {
        lock(&self.inner.state).original.clone()
    }

    pub fn offset(&self) -> Option<f64> {
        lock(&self.inner.state).offset
    }

    /// Change the offset. The derived value is recomputed from the last
    /// source value and redelivered only while the source is connected.
    pub fn set_offset(&self, offset: Option<f64>) -> Result<()> {
        if let Some(o) = offset
            && !o.is_finite()
        {
            return Err(GonioError::InvalidState(format!(
                "{}: offset must be finite",
                self.inner.name
            ))
            .into());
        }
        let mut st = lock(&self.inner.state);
        st.offset = offset;
        let last_raw = st.last_raw;
        tracing::debug!(signal = %self.inner.name, ?offset, "offset changed");
        if let Some(raw) = last_raw
            && offset.is_some()
            && self.inner.source.is_connected()
        {
            self.inner.publish(st, raw);
        }
        Ok(())
    }

    /// Derived-units value to original units.
    pub fn forward(&self, value: f64) -> std::result::Result<f64, GonioError> {
        let st = lock(&self.inner.state);
        self.inner.forward_with(&st, value)
    }

    /// Original-units value to derived units.
    pub fn inverse(&self, value: f64) -> std::result::Result<f64, GonioError> {
        let st = lock(&self.inner.state);
        self.inner.inverse_with(&st, value)
    }

    /// Synchronous read of the source, converted. While the source is
    /// disconnected this is the last known value (see `is_connected`);
    /// `NotConnected` only if no value was ever seen.
    pub fn get(&self) -> Result<f64> {
        let source = &self.inner.source;
        if !source.is_connected() {
            tracing::trace!(signal = %self.inner.name, "source disconnected; serving last value");
            return self
                .value()
                .ok_or_else(|| GonioError::NotConnected(source.name().to_string()).into());
        }
        let raw = source
            .read()
            .map_err(|e| map_channel_error(source.name(), e.as_ref()))?;
        let mut st = lock(&self.inner.state);
        let value = self.inner.inverse_with(&st, raw)?;
        st.last_raw = Some(raw);
        st.last_value = Some(value);
        Ok(value)
    }

    /// Last known derived value, from a source update or a `get`.
    pub fn value(&self) -> Option<f64> {
        lock(&self.inner.state).last_value
    }

    /// Write `value` (derived units) to the source as `forward(value)`.
    pub fn put(&self, value: f64) -> Result<()> {
        if !self.inner.access.is_writable() {
            return Err(GonioError::ReadOnly(self.inner.name.clone()).into());
        }
        let raw = self.forward(value)?;
        tracing::debug!(signal = %self.inner.name, value, raw, "unit signal put");
        self.inner
            .source
            .write(raw)
            .map_err(|e| map_channel_error(self.inner.source.name(), e.as_ref()))?;
        Ok(())
    }

    /// Units, current value and control limits, all in derived units.
    pub fn describe(&self) -> Result<Description> {
        let meta = self.inner.source.metadata();
        let connected = self.inner.source.is_connected();
        let value = if connected { Some(self.get()?) } else { self.value() };
        let map = |limit: Option<f64>| limit.map(|l| self.inverse(l)).transpose();
        Ok(Description {
            name: self.inner.name.clone(),
            source: self.inner.source.name().to_string(),
            units: self.units(),
            access: self.inner.access,
            connected,
            value,
            lower_ctrl_limit: map(meta.lower_ctrl_limit)?,
            upper_ctrl_limit: map(meta.upper_ctrl_limit)?,
            precision: meta.precision,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.inner.source.is_connected()
    }

    /// Observer runs on every source update, in arrival order.
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
