//! Observer registry and ordered out-of-guard delivery.
//!
//! Signals compute a new value under their own guard, take a delivery ticket
//! while still holding it, release the guard, and only then run observers.
//! `Sequencer` makes the out-of-guard deliveries happen in ticket order, so
//! observers see updates in the order they were accepted even when several
//! threads feed the same signal.
//!
//! An observer may read the signal it observes. It must not synchronously
//! feed that same signal a new update from inside the callback: the nested
//! delivery would wait on the outer one.

use gonio_traits::SubscriptionId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::util::lock;

/// Callback invoked with `(new_value, old_value)`.
pub type Observer<T> = Arc<dyn Fn(&T, Option<&T>) + Send + Sync>;

pub struct Observers<T> {
    next_id: u64,
    list: Vec<(SubscriptionId, Observer<T>)>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            list: Vec::new(),
        }
    }
}

impl<T> Observers<T> {
    pub fn add(&mut self, observer: Observer<T>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.list.push((id, observer));
        id
    }

    /// Returns false when `id` was not registered.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.list.len();
        self.list.retain(|(sid, _)| *sid != id);
        self.list.len() != before
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Point-in-time copy of the registered callbacks.
    pub fn snapshot(&self) -> Vec<Observer<T>> {
        self.list.iter().map(|(_, o)| o.clone()).collect()
    }
}

/// Hands out delivery tickets and runs deliveries strictly in ticket order.
#[derive(Default)]
pub(crate) struct Sequencer {
    next: AtomicU64,
    served: Mutex<u64>,
    turn: Condvar,
}

/// Advances the sequencer even if an observer panics.
struct Served<'a>(&'a Sequencer);

impl Drop for Served<'_> {
    fn drop(&mut self) {
        *lock(&self.0.served) += 1;
        self.0.turn.notify_all();
    }
}

impl Sequencer {
    /// Must be called while holding the owning signal's guard.
    pub(crate) fn ticket(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Wait for `ticket`'s turn, then run `f`.
    pub(crate) fn deliver(&self, ticket: u64, f: impl FnOnce()) {
        {
            let mut served = lock(&self.served);
            while *served != ticket {
                served = self
                    .turn
                    .wait(served)
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
            }
        }
        let _served = Served(self);
        f();
    }
}

/// Invoke every observer with the same `(new, old)` pair.
pub(crate) fn notify_all<T>(observers: &[Observer<T>], new: &T, old: Option<&T>) {
    for o in observers {
        o(new, old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove() {
        let mut obs: Observers<f64> = Observers::default();
        let a = obs.add(Arc::new(|_, _| {}));
        let b = obs.add(Arc::new(|_, _| {}));
        assert_ne!(a, b);
        assert_eq!(obs.len(), 2);
        assert!(obs.remove(a));
        assert!(!obs.remove(a));
        assert_eq!(obs.snapshot().len(), 1);
    }

    #[test]
    fn sequencer_orders_out_of_order_arrivals() {
        let seq = Arc::new(Sequencer::default());
        let t0 = seq.ticket();
        let t1 = seq.ticket();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (s, q) = (seen.clone(), seq.clone());
        let late = std::thread::spawn(move || q.deliver(t1, || s.lock().unwrap().push(1)));
        std::thread::sleep(std::time::Duration::from_millis(20));
        seq.deliver(t0, || seen.lock().unwrap().push(0));
        late.join().unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }
}
