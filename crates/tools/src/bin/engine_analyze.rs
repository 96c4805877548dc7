use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rchess_engines::{
    AnalysisCache, EngineFactory, EngineKind, EngineManager, EngineOptions, EnginesConfig,
    STARTPOS_FEN,
};

/// Analyze one position with a configured engine, or with every engine at
/// once for a cross-engine comparison.
///
/// # Examples
///
/// - Default-depth best move from the classical engine:
///   `cargo run -p tools --bin engine_analyze -- --config engines.toml`
///
/// - Deep MultiPV analysis of a given position with the neural engine:
///   `cargo run -p tools --bin engine_analyze -- --config engines.toml --engine neural --depth 25 --multipv 3 --fen "<FEN>"`
///
/// - Fan the position out to all configured engines:
///   `cargo run -p tools --bin engine_analyze -- --config engines.toml --all --out comparison.json`
#[derive(Parser, Debug)]
#[command(author, version, about = "analyze a chess position with configured UCI engines")]
struct Cli {
    /// Path to the engines TOML config
    #[arg(long, default_value = "engines.toml")]
    config: PathBuf,

    /// Position to analyze (FEN); the starting position if omitted
    #[arg(long)]
    fen: Option<String>,

    /// Engine to use (classical | neural | hybrid)
    #[arg(long, default_value = "classical")]
    engine: EngineKind,

    /// Search depth; the configured default if omitted
    #[arg(long)]
    depth: Option<u8>,

    /// Number of principal variations to report
    #[arg(long)]
    multipv: Option<u8>,

    /// Query every configured engine and report the consensus
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Write the JSON report here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    let cli = Cli::parse();

    let config = EnginesConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if config.configured_kinds().is_empty() {
        bail!("no engines configured in {}", cli.config.display());
    }

    let fen = cli.fen.as_deref().unwrap_or(STARTPOS_FEN);
    let options = EngineOptions {
        depth: cli.depth,
        multi_pv: cli.multipv,
        ..Default::default()
    };

    let factory = EngineFactory::from_config(&config);
    let report = if cli.all {
        let comparison = factory.analyze_with_all_engines(fen, &options);
        serde_json::to_value(&comparison)?
    } else {
        let client = factory
            .client(cli.engine)
            .with_context(|| format!("engine '{}' is not configured", cli.engine))?;
        let manager = EngineManager::new(
            client.clone(),
            AnalysisCache::from_settings(&config.cache),
            config.search.clone(),
        );
        let result = manager.analyze_position(fen, options)?;
        serde_json::to_value(&result)?
    };
    factory.quit_all();

    let json = serde_json::to_string_pretty(&report)?;
    match &cli.out {
        Some(path) => {
            let mut writer = BufWriter::new(
                File::create(path).with_context(|| format!("creating {}", path.display()))?,
            );
            writeln!(writer, "{json}")?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
