mod cli;
mod commands;
mod error_fmt;
mod logging;
mod stage;

use clap::Parser;
use eyre::WrapErr;
use std::path::Path;

use cli::{Cli, Commands, JSON_MODE, json_mode};
use error_fmt::{exit_code_for_error, format_error_json, humanize};
use gonio_core::SphericalTarget;

fn load_config(path: Option<&Path>) -> eyre::Result<gonio_config::Config> {
    let Some(path) = path else {
        return Ok(gonio_config::Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
    gonio_config::load_toml(&text).wrap_err("invalid configuration")
}

fn run(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    logging::init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    cfg.validate().wrap_err("invalid configuration")?;
    tracing::debug!(command = ?cli.cmd, "starting");

    match cli.cmd {
        Commands::Where => commands::run_where(&cfg),
        Commands::Mv {
            e_eta,
            e_chi,
            e_phi,
            yes,
        } => commands::run_mv(
            &cfg,
            SphericalTarget {
                e_eta,
                e_chi,
                e_phi,
            },
            yes,
        ),
        Commands::Convert {
            value,
            offset,
            write,
        } => commands::run_convert(&cfg, value, offset, write),
        Commands::Average { samples } => commands::run_average(&cfg, samples),
        Commands::SelfCheck => commands::run_self_check(&cfg),
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = run(cli) {
        tracing::error!(error = %err, "command failed");
        if json_mode() {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        std::process::exit(exit_code_for_error(&err));
    }
}
