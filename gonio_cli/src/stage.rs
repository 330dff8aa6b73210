//! Simulated kappa stage assembly and the operator prompt.

use gonio_config::Config;
use gonio_core::hw_error::map_channel_error;
use gonio_core::{KappaCfg, KappaController, StepLimits};
use gonio_hardware::{SimAxis, SimChannel};
use gonio_traits::{Approver, SourceChannel};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Extra time granted on top of `[sim] connect_delay_ms` before giving up.
const CONNECT_GRACE: Duration = Duration::from_secs(2);

/// Asks on stderr and reads a `y/n` answer from stdin. EOF counts as no.
pub struct PromptApprover;

impl Approver for PromptApprover {
    fn request_approval(&self, summary: &str) -> bool {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{summary}");
        let _ = write!(err, "Proceed? [y/N] ");
        let _ = err.flush();
        drop(err);

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }
}

fn connect_delay(cfg: &Config) -> Duration {
    Duration::from_millis(cfg.sim.connect_delay_ms)
}

pub fn connect_timeout(cfg: &Config) -> Duration {
    connect_delay(cfg) + CONNECT_GRACE
}

/// A sim channel plus the helper thread that connects it after
/// `[sim] connect_delay_ms`. `connect` reaps the helper.
pub struct SimSource {
    pub channel: SimChannel,
    connector: Option<JoinHandle<()>>,
}

impl SimSource {
    /// Join the helper (it exits right after connecting), then confirm the
    /// channel is up.
    pub fn connect(mut self, cfg: &Config) -> eyre::Result<SimChannel> {
        if let Some(helper) = self.connector.take()
            && helper.join().is_err()
        {
            eyre::bail!("connect helper for {} panicked", self.channel.name());
        }
        wait_connected(cfg, &self.channel)?;
        Ok(self.channel)
    }
}

pub fn sim_channel(cfg: &Config, name: &str, value: f64, units: Option<&str>) -> SimSource {
    let delay = connect_delay(cfg);
    let mut channel = if delay.is_zero() {
        SimChannel::new(name, value)
    } else {
        SimChannel::disconnected(name, value)
    };
    if let Some(u) = units {
        channel = channel.with_units(u);
    }
    let connector = (!delay.is_zero()).then(|| channel.connect_after(delay));
    SimSource { channel, connector }
}

fn wait_connected(cfg: &Config, channel: &dyn SourceChannel) -> eyre::Result<()> {
    channel
        .wait_connected(connect_timeout(cfg))
        .map_err(|e| map_channel_error(channel.name(), e.as_ref()))?;
    Ok(())
}

/// Three simulated axes at the origin, named after `[axes]`, behind a
/// `KappaController` configured from `[kappa]`.
pub fn assemble(cfg: &Config, approver: impl Approver + 'static) -> eyre::Result<Arc<KappaController>> {
    let speed = cfg.sim.speed_deg_per_s;
    let sources = [&cfg.axes.eta, &cfg.axes.kappa, &cfg.axes.phi]
        .map(|name| sim_channel(cfg, name, 0.0, Some("deg")));
    let mut axes = Vec::with_capacity(sources.len());
    for source in sources {
        axes.push(Arc::new(SimAxis::from_channel(source.connect(cfg)?, speed)));
    }

    let kappa: KappaCfg = (&cfg.kappa).into();
    let limits: StepLimits = (&cfg.kappa).into();
    let controller = KappaController::builder()
        .with_axes(axes[0].clone(), axes[1].clone(), axes[2].clone())
        .with_approver(approver)
        .with_config(kappa)
        .with_limits(limits)
        .build()?;
    tracing::debug!(?controller, "sim stage assembled");
    Ok(Arc::new(controller))
}
