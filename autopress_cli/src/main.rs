//! Command-line front end for the pressure-gated trigger.

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use autopress_config::Config;
use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RunArgs};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    if let Err(e) = real_main() {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // Best-effort; a second install only happens in tests.
    let _ = color_eyre::install();

    let mut cfg = load_config(cli.config.as_deref())?;
    if let Some(path) = cli.calibration.as_deref() {
        let fit = autopress_config::load_calibration_csv(path)?;
        cfg.gauge.offset_v = fit.offset_v;
        cfg.gauge.slope_v_per_decade = fit.slope_v_per_decade;
    }

    init_tracing(cli.json, cli.log_level.as_deref(), &cfg.logging)?;

    match cli.cmd {
        Commands::Run { args, max_cycles } => {
            run::apply_overrides(&mut cfg, &args);
            cfg.validate()?;
            let stop = Arc::new(AtomicBool::new(false));
            {
                let stop = Arc::clone(&stop);
                ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
                    .wrap_err("install Ctrl-C handler")?;
            }
            let sensor = run::make_sensor(&cfg)?;
            tracing::info!(
                setpoints_mbar = ?cfg.band.all_setpoints(),
                tolerance_pct = cfg.band.tolerance_pct,
                interval_ms = cfg.cadence.interval_ms,
                "starting trigger loop"
            );
            let summary = run::run_loop(&cfg, sensor, max_cycles, stop)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "cycles": summary.cycles,
                        "saves": summary.saves,
                        "dropped": summary.dropped,
                        "errors": summary.errors,
                        "overruns": summary.overruns,
                    })
                );
            } else {
                println!(
                    "cycles: {}  saves: {}  dropped: {}  errors: {}  overruns: {}",
                    summary.cycles, summary.saves, summary.dropped, summary.errors, summary.overruns
                );
            }
        }
        Commands::Read { samples, channel } => {
            let args = RunArgs {
                channel,
                ..RunArgs::default()
            };
            run::apply_overrides(&mut cfg, &args);
            cfg.validate()?;
            let sensor = run::make_sensor(&cfg)?;
            let readings = run::read_samples(&cfg, sensor, cfg.sensor.channel, samples)?;
            for r in readings {
                if cli.json {
                    println!(
                        "{}",
                        serde_json::json!({
                            "raw_v": r.raw_v,
                            "voltage": r.voltage,
                            "pressure_mbar": r.pressure_mbar,
                        })
                    );
                } else {
                    match r.pressure_mbar {
                        Some(p) => println!("{:.4} V  {:.4} V  {p:.3e} mbar", r.raw_v, r.voltage),
                        None => println!("{:.4} V  {:.4} V  n/a", r.raw_v, r.voltage),
                    }
                }
            }
        }
        Commands::Check { address } => {
            let args = RunArgs {
                address,
                ..RunArgs::default()
            };
            run::apply_overrides(&mut cfg, &args);
            cfg.validate()?;
            let idn = run::check_instrument(&cfg)?;
            if cli.json {
                println!("{}", serde_json::json!({ "idn": idn }));
            } else {
                println!("{idn}");
            }
        }
        Commands::SelfCheck => {
            cfg.validate()?;
            let sensor = run::make_sensor(&cfg)?;
            run::read_samples(&cfg, sensor, cfg.sensor.channel, 1)?;
            println!("self-check ok");
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> eyre::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&text).wrap_err_with(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

fn init_tracing(
    json: bool,
    cli_level: Option<&str>,
    logging: &autopress_config::Logging,
) -> eyre::Result<()> {
    let level = cli_level
        .or(logging.level.as_deref())
        .unwrap_or("info")
        .to_string();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    let console = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file"))?;
            let rotation = match logging.rotation.as_deref() {
                Some("daily") => tracing_appender::rolling::Rotation::DAILY,
                Some("hourly") => tracing_appender::rolling::Rotation::HOURLY,
                _ => tracing_appender::rolling::Rotation::NEVER,
            };
            let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(filter)
        .try_init()
        .wrap_err("install tracing subscriber")?;
    Ok(())
}
