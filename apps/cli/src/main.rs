#![deny(warnings)]

//! Headless match runner: builds a match from flags and an optional YAML
//! config, simulates it and prints a summary.

use anyhow::{bail, Context, Result};
use orbit_core::{Difficulty, MapId, PlayerId, SimConfig};
use orbit_runtime::Match;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    map: Option<MapId>,
    enemy_ai: Option<Difficulty>,
    player_ai: Option<Difficulty>,
    seed: Option<u64>,
    seconds: f64,
    json: bool,
    version: bool,
}

fn value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    it.next().with_context(|| format!("{flag} needs a value"))
}

fn parse_args(raw: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut args = Args {
        seconds: 120.0,
        ..Args::default()
    };
    let mut it = raw.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = Some(value(&mut it, &arg)?.into()),
            "--map" => args.map = Some(value(&mut it, &arg)?.parse()?),
            "--difficulty" => args.enemy_ai = Some(value(&mut it, &arg)?.parse()?),
            "--player-ai" => args.player_ai = Some(value(&mut it, &arg)?.parse()?),
            "--seed" => args.seed = Some(value(&mut it, &arg)?.parse()?),
            "--seconds" => args.seconds = value(&mut it, &arg)?.parse()?,
            "--json" => args.json = true,
            "--version" => args.version = true,
            other => bail!("unknown argument {other}"),
        }
    }
    if !(args.seconds.is_finite() && args.seconds >= 0.0) {
        bail!("--seconds must be a non-negative number");
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(map) = args.map {
        config.map = map;
    }
    if let Some(difficulty) = args.enemy_ai {
        config.enemy_ai = difficulty;
    }
    if args.player_ai.is_some() {
        config.player_ai = args.player_ai;
    }
    if let Some(seed) = args.seed {
        config.rng_seed = seed;
    }
    Ok(config)
}

/// `RUST_LOG` directives when set and parseable, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    // Logging setup; the env filter alone decides verbosity.
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!("orbit-cli {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
        return Ok(());
    }
    let config = load_config(&args)?;
    info!(?config, seconds = args.seconds, "starting match");

    let mut game = Match::new(&config)?;
    game.run_for(args.seconds);
    let summary = game.summary();
    info!(time = summary.time, "match finished");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "Match | map: {:?} | time: {:.1}s | neutral ships: {}",
        config.map, summary.time, summary.neutral_ships
    );
    for p in &summary.players {
        println!(
            "{:?} | ai: {:?} | ships: {} | built: {} | lost: {} | kills: {} | capital: {:.1} | spending: {:.2}",
            p.player, p.ai, p.ships, p.built, p.lost, p.kills, p.capital, p.spending
        );
    }
    for line in game.telemetry(PlayerId::Enemy) {
        println!("  enemy ai: {line}");
    }
    Ok(())
}
