//! Small shared helpers for gonio_core.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a guard, recovering the data if a previous holder panicked.
///
/// Every guarded section in this crate leaves its data consistent before
/// calling out, so a poisoned guard still holds a usable value.
#[inline]
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
