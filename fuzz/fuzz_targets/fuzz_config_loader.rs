#![no_main]
use gonio_core::{AverageCfg, KappaCfg, KappaGeometry, StepLimits, UnitCfg};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = gonio_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }

    // A config that validates must convert and yield a usable geometry.
    let kappa = KappaCfg::from(&cfg.kappa);
    let _ = StepLimits::from(&cfg.kappa);
    let _ = AverageCfg::from(&cfg.averaging);
    let _ = UnitCfg::from(&cfg.units);
    assert!(
        KappaGeometry::new(kappa.kappa_angle_deg).is_ok(),
        "validated kappa angle rejected: {}",
        cfg.kappa.kappa_angle_deg
    );
});
