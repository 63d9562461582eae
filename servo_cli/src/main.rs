mod cli;
mod error_fmt;
mod run;

use std::path::Path;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = real_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::error!(error = %format!("{err:#}"), "servo failed");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn load_config(cli: &Cli) -> eyre::Result<servo_config::Config> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config file {}", cli.config.display()))?;
    let mut cfg = servo_config::load_toml(&text).wrap_err("parse config TOML")?;
    if let Some(path) = &cli.coefficients {
        let rows = servo_config::load_coefficients_csv(path)?;
        cfg.merge_coefficients(rows);
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Console layer on stderr (pretty or JSON), plus an optional JSON file sink.
fn init_tracing(json: bool, level: &str, logging: &servo_config::Logging) -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level '{level}'"))?;

    let console_json = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let console_pretty = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    let file_layer = match logging.file.as_deref() {
        Some(file) => {
            let path = Path::new(file);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| eyre::eyre!("logging.file must name a file, got '{file}'"))?;
            let appender = match logging.rotation.as_deref() {
                Some("hourly") => tracing_appender::rolling::hourly(dir, name),
                Some("daily") => tracing_appender::rolling::daily(dir, name),
                _ => tracing_appender::rolling::never(dir, name),
            };
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_json)
        .with(console_pretty)
        .with(file_layer)
        .try_init()
        .wrap_err("initialize logging")
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let cfg = load_config(&cli)?;
    let level = cli
        .log_level
        .as_deref()
        .or(cfg.logging.level.as_deref())
        .unwrap_or("warn");
    init_tracing(cli.json, level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");

    match cli.cmd {
        Commands::Run {
            passes,
            max_cycles,
            overlap,
            set_state,
            pace,
            stats,
        } => {
            let opts = run::RunOpts {
                passes,
                max_cycles,
                overlap,
                set_state,
                pace,
                stats,
                json: cli.json,
            };
            run::run_servo(&cfg, &opts).map(|_| ())
        }
        Commands::Timing => {
            run::print_timing(&cfg, cli.json);
            Ok(())
        }
        Commands::SelfCheck => run::self_check(&cfg),
    }
}
