//! Maps `Box<dyn Error>` from collaborator traits to typed `GonioError`.
//!
//! The traits in `gonio_traits` use `Box<dyn Error + Send + Sync>` so any
//! backend can plug in; this module converts those to our typed error enum,
//! with an optional feature-gated path for `gonio_hardware::HwError`
//! downcasting.

use crate::error::GonioError;

/// Map a trait-boundary error raised by channel `name` to a typed `GonioError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_channel_error(name: &str, e: &(dyn std::error::Error + 'static)) -> GonioError {
    // Signals layered on other signals pass our own errors through unchanged.
    if let Some(g) = e.downcast_ref::<GonioError>() {
        return g.clone();
    }

    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<gonio_hardware::error::HwError>() {
            return match hw {
                gonio_hardware::error::HwError::NotConnected(ch) => {
                    GonioError::NotConnected(ch.clone())
                }
                gonio_hardware::error::HwError::Timeout(what) => GonioError::Timeout(what.clone()),
                gonio_hardware::error::HwError::Motion(axis, msg) => {
                    GonioError::Axis(format!("{axis}: {msg}"))
                }
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("not connected") || lower.contains("disconnected") {
        GonioError::NotConnected(name.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        GonioError::Timeout(name.to_string())
    } else if lower.contains("unsupported unit") || lower.contains("unknown unit") {
        GonioError::UnsupportedUnit(s)
    } else {
        GonioError::Channel(format!("{name}: {s}"))
    }
}
