use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until `done` returns true, or fail with `HwError::Timeout(what)` once
/// `timeout` expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_with_timeout(
    mut done: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
    what: &str,
) -> Result<()> {
    let deadline = Instant::now().checked_add(timeout);
    while !done() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(HwError::Timeout(what.to_string()));
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
