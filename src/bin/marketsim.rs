//! CLI entry point for the market simulator.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use marketsim::{JsonLinesSink, Market, NullSink, ObservationSink, SimConfig, Simulation, Tick};

#[derive(Parser)]
#[command(name = "marketsim")]
#[command(about = "Discrete-event securities market simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one simulation and print a summary
    Run {
        /// Path to the simulation TOML file
        #[arg(long)]
        config: PathBuf,

        /// Override the configured seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured length in ticks
        #[arg(long)]
        length: Option<i64>,

        /// Write every observation to this JSON Lines file
        #[arg(long)]
        observations: Option<PathBuf>,
    },

    /// Validate a configuration without running it
    Check {
        /// Path to the simulation TOML file
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            config,
            seed,
            length,
            observations,
        } => run(&config, seed, length, observations.as_deref()),
        Command::Check { config } => check(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn check(path: &Path) -> marketsim::Result<()> {
    let config = SimConfig::load(path)?;
    let agents = config.agents.zi.as_ref().map_or(0, |zi| zi.count);
    println!(
        "{}: OK ({} markets, {agents} agents, {} ticks)",
        path.display(),
        config.markets.len(),
        config.length()
    );
    Ok(())
}

fn run(
    path: &Path,
    seed: Option<u64>,
    length: Option<i64>,
    observations: Option<&Path>,
) -> marketsim::Result<()> {
    let mut config = SimConfig::load(path)?;
    if let Some(seed) = seed {
        config.set_seed(seed);
    }
    if let Some(length) = length {
        config.simulation.length = length;
    }

    match observations {
        Some(out) => {
            let sink = JsonLinesSink::new(File::create(out)?);
            let mut sim = config.build(sink)?;
            simulate(&mut sim, config.length())?;
            let written = sim.sink().written();
            sim.into_sink().finish()?;
            println!("Wrote {written} observations to {}", out.display());
        }
        None => {
            let mut sim = config.build(NullSink)?;
            simulate(&mut sim, config.length())?;
        }
    }
    Ok(())
}

fn simulate<S: ObservationSink>(sim: &mut Simulation<S>, length: Tick) -> marketsim::Result<()> {
    sim.run_until(length)?;
    print_summary(sim);
    Ok(())
}

fn print_summary<S: ObservationSink>(sim: &Simulation<S>) {
    println!(
        "Simulated {} ticks (seed {}, {} agents)",
        sim.now().ticks(),
        sim.seed(),
        sim.agent_count()
    );
    println!();
    println!(
        "{:<6} {:>8} {:>10} {:>12}  Quote",
        "Market", "Trades", "Volume", "Last"
    );
    for market in sim.markets() {
        print_market(market);
    }
    println!();
    println!("SIP {}", sim.best_bid_offer());
}

fn print_market(market: &Market) {
    let trades = market.transactions();
    let volume: u64 = trades.iter().map(|t| t.quantity).sum();
    let last = trades
        .last()
        .map_or_else(|| "-".to_string(), |t| t.price.to_string());
    println!(
        "{:<6} {:>8} {:>10} {:>12}  {}",
        market.id().to_string(),
        trades.len(),
        volume,
        last,
        market.quote()
    );
}
