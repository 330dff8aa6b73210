//! Human-readable error descriptions and structured JSON error formatting.

use gonio_core::error::{BuildError, GonioError};

/// Stable name of the error kind, used as the JSON `reason`.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ge) = err.downcast_ref::<GonioError>() {
        return match ge {
            GonioError::NotConnected(_) => "NotConnected",
            GonioError::InvalidState(_) => "InvalidState",
            GonioError::UnsupportedUnit(_) => "UnsupportedUnit",
            GonioError::Channel(_) => "Channel",
            GonioError::Timeout(_) => "Timeout",
            GonioError::ReadOnly(_) => "ReadOnly",
            GonioError::Domain(_) => "Domain",
            GonioError::Calc(_) => "Calc",
            GonioError::Declined => "Declined",
            GonioError::Busy => "Busy",
            GonioError::Interrupted => "Interrupted",
            GonioError::Axis(_) => "Axis",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    if is_config_error(err) {
        return "Config";
    }
    "Error"
}

fn is_config_error(err: &eyre::Report) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains("invalid configuration")
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAxis(which) => format!(
                "What happened: The {which} axis was not provided to the kappa controller.\nLikely causes: Stage assembly skipped an axis.\nHow to fix: Check the [axes] section of the config."
            ),
            BuildError::MissingApprover => {
                "What happened: No confirmation channel was wired into the kappa controller.\nLikely causes: Stage assembly bug.\nHow to fix: Report this together with the command line you used.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Zero or out-of-range values in [kappa].\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ge) = err.downcast_ref::<GonioError>() {
        return match ge {
            GonioError::Declined => "What happened: The move was declined at the confirmation prompt.\nLikely causes: One or more axis steps exceeded its step limit and the answer was not 'y'.\nHow to fix: Rerun and answer 'y', pass --yes, or raise [kappa] *_max_step.".to_string(),
            GonioError::Interrupted => "What happened: The move was interrupted and all axes were stopped where they were.\nLikely causes: Ctrl-C during the move.\nHow to fix: Check the stage position with `gonio where` before moving again.".to_string(),
            GonioError::Busy => "What happened: Another move is already in progress.\nLikely causes: A second move was requested before the first finished.\nHow to fix: Wait for the running move or stop it first.".to_string(),
            GonioError::Domain(msg) => format!(
                "What happened: The requested coordinates cannot be reached ({msg}).\nLikely causes: |e_chi| larger than twice the kappa angle allows.\nHow to fix: Request a smaller e_chi, or check [kappa] kappa_angle_deg."
            ),
            GonioError::Timeout(what) => format!(
                "What happened: Timed out waiting for {what}.\nLikely causes: Axes too slow for the settle timeout, or a channel never connected.\nHow to fix: Raise [kappa] settle_timeout_ms or check [sim] speed_deg_per_s / connect_delay_ms."
            ),
            GonioError::UnsupportedUnit(u) => format!(
                "What happened: Unsupported unit conversion ({u}).\nLikely causes: Unknown unit name or units of different dimensions.\nHow to fix: Use m/mm/um/nm, rad/mrad/urad/deg or eV/keV in [units]."
            ),
            GonioError::ReadOnly(name) => format!(
                "What happened: Signal {name} is read-only and cannot be written.\nLikely causes: [units] io is set to an input mode (i, input, ro).\nHow to fix: Set [units] io = \"rw\" or drop --write."
            ),
            GonioError::NotConnected(name) => format!(
                "What happened: Channel {name} is not connected.\nLikely causes: The device is offline or still connecting.\nHow to fix: Retry once the channel is up."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    if is_config_error(err) {
        return format!(
            "What happened: Configuration is invalid ({}).\nLikely causes: Malformed TOML or out-of-range values.\nHow to fix: Edit the config file and try again.",
            err.root_cause()
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: declined 3, interrupted 4, unreachable 5, busy 6, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<GonioError>() {
        Some(GonioError::Declined) => 3,
        Some(GonioError::Interrupted) => 4,
        Some(GonioError::Domain(_)) => 5,
        Some(GonioError::Busy) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
