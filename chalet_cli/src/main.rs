//! `chalet`: run the battery and water monitor, inspect its records, or
//! decode telemetry frames.

mod cli;
mod decode;
mod error_fmt;
mod logging;
mod monitor;
mod show;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;

use crate::cli::{Cli, Commands, JSON_MODE};
use crate::monitor::{MonitorOpts, run_monitor};

fn load_config(path: &Path) -> eyre::Result<chalet_config::Config> {
    let cfg = if path.exists() {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("read config {}", path.display()))?;
        chalet_config::load_toml(&text)
            .map_err(|e| eyre::eyre!("parse config {}: {e}", path.display()))?
    } else {
        tracing::debug!(path = %path.display(), "config not found; using defaults");
        chalet_config::Config::default()
    };
    cfg.validate().wrap_err("invalid configuration")?;
    Ok(cfg)
}

fn run(cli: Cli) -> eyre::Result<()> {
    match cli.cmd {
        Commands::Decode { kind, ref frame } => decode::run_decode(kind, frame),
        Commands::Show => {
            let cfg = load_config(&cli.config)?;
            let dir = cli.records.clone().unwrap_or(cfg.storage.dir);
            show::run_show(&dir)
        }
        Commands::Monitor {
            ticks,
            sim,
            chalet_counts,
            ctek_counts,
            fill_hz,
            drain_hz,
            telemetry,
        } => {
            let mut cfg = load_config(&cli.config)?;
            if let Some(dir) = cli.records.clone() {
                cfg.storage.dir = dir;
            }
            logging::init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                .wrap_err("install Ctrl-C handler")?;

            let opts = MonitorOpts {
                ticks,
                sim,
                chalet_counts,
                ctek_counts,
                fill_hz,
                drain_hz,
                telemetry,
            };
            let summary = run_monitor(&cfg, &opts, &shutdown)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "ticks": summary.ticks,
                        "battery_archives": summary.battery_archives,
                        "tank_archives": summary.tank_archives,
                        "remaining_ah": summary.remaining_ah,
                        "remaining_litres": summary.remaining_litres,
                    })
                );
            } else {
                println!(
                    "{} ticks, {:.2} Ah remaining, {:.1} L in tank",
                    summary.ticks, summary.remaining_ah, summary.remaining_litres
                );
            }
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if !cli.json {
        let _ = color_eyre::install();
    }

    if let Err(err) = run(cli) {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}
