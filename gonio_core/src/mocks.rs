//! Test doubles for the collaborator traits: a recording approver and a
//! stepping clock.

use gonio_traits::{Approver, Clock};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::util::lock;

/// Approver with a fixed answer that keeps every summary it was shown.
/// Clones share the same record.
#[derive(Debug, Clone)]
pub struct RecordingApprover {
    answer: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl RecordingApprover {
    pub fn new(answer: bool) -> Self {
        Self {
            answer: Arc::new(AtomicBool::new(answer)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_answer(&self, answer: bool) {
        self.answer.store(answer, Ordering::Relaxed);
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.seen).len()
    }
}

impl Approver for RecordingApprover {
    fn request_approval(&self, summary: &str) -> bool {
        lock(&self.seen).push(summary.to_string());
        self.answer.load(Ordering::Relaxed)
    }
}

/// Clock that jumps forward by `step` on every `now()` call, so deadlines
/// expire after a fixed number of checks regardless of wall time.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    origin: Instant,
    step: Duration,
    calls: Arc<AtomicU32>,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            origin: Instant::now(),
            step,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Instant {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let elapsed = self.step.saturating_mul(n);
        self.origin.checked_add(elapsed).unwrap_or(self.origin)
    }
}
