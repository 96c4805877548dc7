use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rchess_engines::{EngineFactory, EnginesConfig};

/// Probe every configured engine with a depth-1 search of the starting
/// position and report per-engine status. Exits nonzero if any engine is
/// down, so it slots into cron or a container healthcheck.
#[derive(Parser, Debug)]
#[command(author, version, about = "health-check all configured UCI engines")]
struct Cli {
    /// Path to the engines TOML config
    #[arg(long, default_value = "engines.toml")]
    config: PathBuf,

    /// Emit the status map as JSON instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn run(cli: &Cli) -> Result<bool> {
    let config = EnginesConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if config.configured_kinds().is_empty() {
        bail!("no engines configured in {}", cli.config.display());
    }

    let factory = EngineFactory::from_config(&config);
    let health = factory.health_check();
    factory.quit_all();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        for (kind, up) in &health {
            println!("{kind}: {}", if *up { "ok" } else { "DOWN" });
        }
    }
    Ok(health.values().all(|up| *up))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
