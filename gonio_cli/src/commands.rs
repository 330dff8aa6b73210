//! Subcommand implementations. Results go to stdout, text or one JSON line.

use gonio_config::Config;
use gonio_core::hw_error::map_channel_error;
use gonio_core::units::TableConverter;
use gonio_core::{
    AverageCfg, ChannelSpec, GonioError, KappaGeometry, NativeCoords,
    RollingAverage, SphericalCoords, SphericalTarget, UnitCfg, UnitConvertingSignal,
};
use gonio_traits::SourceChannel;
use serde_json::json;
use std::sync::Arc;

use crate::cli::json_mode;
use crate::stage::{PromptApprover, assemble, connect_timeout, sim_channel};

/// Raw units of the simulated converter channel when `[units] original` is unset.
const SIM_RAW_UNITS: &str = "mm";

fn coords_json(native: NativeCoords, s: SphericalCoords) -> serde_json::Value {
    json!({
        "native": { "eta": native.eta, "kappa": native.kappa, "phi": native.phi },
        "spherical": { "e_eta": s.e_eta, "e_chi": s.e_chi, "e_phi": s.e_phi },
    })
}

fn print_coords(native: NativeCoords, s: SphericalCoords) {
    println!(
        "native     eta={:>10.4}  kappa={:>10.4}  phi={:>10.4}",
        native.eta, native.kappa, native.phi
    );
    println!(
        "spherical  e_eta={:>8.4}  e_chi={:>10.4}  e_phi={:>8.4}",
        s.e_eta, s.e_chi, s.e_phi
    );
}

pub fn run_where(cfg: &Config) -> eyre::Result<()> {
    let ctrl = assemble(cfg, |_: &str| false)?;
    let native = ctrl.positions()?;
    let s = ctrl.geometry().k_to_e(native)?;
    if json_mode() {
        println!("{}", coords_json(native, s));
    } else {
        print_coords(native, s);
    }
    Ok(())
}

pub fn run_mv(cfg: &Config, target: SphericalTarget, yes: bool) -> eyre::Result<()> {
    if target.is_empty() {
        return Err(GonioError::InvalidState(
            "mv needs at least one of --e-eta, --e-chi, --e-phi".into(),
        )
        .into());
    }
    let ctrl = if yes {
        assemble(cfg, |_: &str| true)?
    } else {
        assemble(cfg, PromptApprover)?
    };

    let weak = Arc::downgrade(&ctrl);
    ctrlc::set_handler(move || {
        if let Some(ctrl) = weak.upgrade()
            && let Err(e) = ctrl.stop()
        {
            tracing::error!(error = %e, "stop after Ctrl-C failed");
        }
    })?;

    let reached = ctrl.move_to(target)?.into_result()?;
    let s = ctrl.geometry().k_to_e(reached)?;
    if json_mode() {
        let mut v = coords_json(reached, s);
        v["outcome"] = json!("completed");
        println!("{v}");
    } else {
        println!("move complete");
        print_coords(reached, s);
    }
    Ok(())
}

pub fn run_convert(cfg: &Config, value: f64, offset: Option<f64>, write: bool) -> eyre::Result<()> {
    let spec = ChannelSpec::from_prefix(&cfg.units.prefix, &cfg.units.io)?;
    let mut units: UnitCfg = (&cfg.units).into();
    if let Some(o) = offset {
        units.offset = Some(o);
    }
    let raw_units = cfg.units.original.as_deref().unwrap_or(SIM_RAW_UNITS);
    let source = sim_channel(cfg, &spec.read_pv, 0.0, Some(raw_units));
    let channel = source.channel.clone();
    let signal = UnitConvertingSignal::new(
        "convert",
        Arc::new(channel.clone()),
        Arc::new(TableConverter),
        units,
        spec.access,
    )?;
    source.connect(cfg)?;

    let derived = signal.units();
    let original = signal.original_units().unwrap_or_default();
    let fwd = signal.forward(value)?;
    let inv = signal.inverse(value)?;
    let written = if write {
        signal.put(value)?;
        Some(channel.read().map_err(|e| map_channel_error(channel.name(), e.as_ref()))?)
    } else {
        None
    };

    if json_mode() {
        println!(
            "{}",
            json!({
                "read_pv": spec.read_pv,
                "write_pv": spec.write_pv,
                "value": value,
                "derived_units": derived,
                "original_units": original,
                "offset": signal.offset(),
                "forward": fwd,
                "inverse": inv,
                "written": written,
            })
        );
    } else {
        println!("forward  {value} {derived} -> {fwd} {original}");
        println!("inverse  {value} {original} -> {inv} {derived}");
        if let (Some(raw), Some(pv)) = (written, spec.write_pv.as_deref()) {
            println!("wrote    {raw} {original} to {pv}");
        }
    }
    Ok(())
}

pub fn run_average(cfg: &Config, samples: u32) -> eyre::Result<()> {
    let avg_cfg: AverageCfg = (&cfg.averaging).into();
    let source = sim_channel(cfg, "SIM:AVERAGE", 0.0, None);
    let channel = source.channel.clone();
    let avg = RollingAverage::spawn("average", Arc::new(channel.clone()), avg_cfg)?;
    avg.wait_connected(connect_timeout(cfg))?;
    source.connect(cfg)?;

    for i in 1..=samples {
        channel.push(f64::from(i));
    }
    let mean = avg.get()?;
    if json_mode() {
        println!(
            "{}",
            json!({ "averages": avg.averages(), "window": avg.samples(), "mean": mean })
        );
    } else {
        println!(
            "mean of last {} of {samples} samples: {mean}",
            avg.samples()
        );
    }
    Ok(())
}

/// Validate units against the converter table and round-trip the transform.
pub fn run_self_check(cfg: &Config) -> eyre::Result<()> {
    for unit in std::iter::once(cfg.units.derived.as_str()).chain(cfg.units.original.as_deref()) {
        if !TableConverter::knows(unit) {
            return Err(GonioError::UnsupportedUnit(unit.to_string()).into());
        }
    }

    let geometry = KappaGeometry::new(cfg.kappa.kappa_angle_deg)?;
    let mut worst = 0.0f64;
    for native in [NativeCoords::default(), NativeCoords::new(10.0, 30.0, -20.0)] {
        let back = geometry.e_to_k(geometry.k_to_e(native)?)?;
        worst = worst
            .max((back.eta - native.eta).abs())
            .max((back.kappa - native.kappa).abs())
            .max((back.phi - native.phi).abs());
    }
    if worst > 1e-9 {
        return Err(GonioError::InvalidState(format!("transform round trip drifted by {worst}")).into());
    }

    if json_mode() {
        println!(
            "{}",
            json!({ "status": "ok", "kappa_angle_deg": cfg.kappa.kappa_angle_deg, "round_trip_error": worst })
        );
    } else {
        println!(
            "self-check ok: kappa_angle={} round_trip_error={worst:e}",
            cfg.kappa.kappa_angle_deg
        );
    }
    Ok(())
}
