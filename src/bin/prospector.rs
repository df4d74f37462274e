//! Command-line entry point for the mining agent.

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use prospector::{logging, ui, Actuator, Agent, AgentConfig, SimBackend, Task};

/// Autonomous mine-smelt-forge agent, run against the scripted backend.
#[derive(Parser, Debug)]
#[command(name = "prospector", version, about)]
struct Cli {
    /// Task to start in: mine, smelt, or forge.
    #[arg(default_value = "mine")]
    task: String,

    /// TOML config file; the built-in simulation profile when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run log path, overriding the config.
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Seed for target-selection draws; random when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many activations instead of running until a fatal
    /// error.
    #[arg(long)]
    cycles: Option<u64>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let task: Task = cli
        .task
        .parse()
        .map_err(|message: String| anyhow::anyhow!(message))?;
    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::simulation(),
    };
    if let Some(log) = cli.log {
        config.log_path = log;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    logging::init(&config.log_path)
        .with_context(|| format!("opening log file {}", config.log_path.display()))?;

    let mut backend = SimBackend::new(&config);
    backend.seed_standard_world();
    let library = backend.signature_library();
    let catalog = backend.ui_catalog();
    catalog.ensure(&[
        ui::BLACKSMITH_MENU,
        ui::COLD_FURNACE,
        ui::NOTHING_TO_MINE,
        ui::CANNOT_MINE_THERE,
        &config.tasks.forge_item,
    ])?;

    let mut agent = Agent::new(config, backend, library, catalog);
    agent.set_task(task);
    match agent.run(cli.cycles) {
        Ok(()) => {
            info!("run complete");
            Ok(())
        }
        Err(fatal) => {
            error!(%fatal, "fatal error, shutting the application down");
            agent.backend_mut().quit_application();
            Err(fatal.into())
        }
    }
}
