//! distrun - Distributed training job launcher
//!
//! Resolves cluster parameters from the process environment (`RANK`,
//! `WORLD_SIZE`, `MASTER_ADDR`, `MASTER_PORT`, `TASK_TAG`, `BS`, `SEQLEN`),
//! combines them with a TOML training recipe, and launches the external
//! distributed-process launcher (e.g. `torchrun`) with the assembled flags.
//! Combined child output is duplicated to the terminal and to a log file
//! named deterministically from the resolved parameters; the child's exit
//! code is propagated unchanged.
//!
//! ## Commands
//!
//! - `run` - Resolve the environment and launch the distributed job
//! - `show-config` - Print the resolved cluster parameters and recipe
//! - `init` - Write a default training recipe and exit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use distrun::{ClusterConfig, Invocation, Launcher, TrainingConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

/// Distributed training job launcher
#[derive(Parser, Debug)]
#[command(name = "distrun")]
#[command(about = "Launch distributed training jobs from environment-derived configuration")]
#[command(version)]
struct Cli {
    /// Training recipe path
    #[arg(short, long, default_value = "~/.distrun/train.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the environment and launch the distributed job
    Run {
        /// Print the generated command line without spawning anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved cluster configuration and training recipe
    ShowConfig,

    /// Write a default training recipe and exit
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = distrun::logging::init(&cli.log_level) {
        eprintln!("distrun: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("distrun: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = expand_path(&cli.config);

    match cli.command {
        Commands::Init => {
            let config = TrainingConfig::default();
            config.save(&config_path)?;

            println!("Generated default training recipe at: {}", config_path.display());
            println!("\nEdit the recipe and then launch a job with:");
            println!("  distrun --config {} run", cli.config);

            Ok(ExitCode::SUCCESS)
        }

        Commands::ShowConfig => {
            let cluster =
                ClusterConfig::from_env().context("resolving cluster configuration")?;
            let training = load_recipe(&config_path, true)?;

            println!("# Cluster (resolved from environment)");
            println!("{}", toml::to_string_pretty(&cluster)?);
            println!("# Training recipe ({})", config_path.display());
            println!("{}", toml::to_string_pretty(&training)?);

            Ok(ExitCode::SUCCESS)
        }

        Commands::Run { dry_run } => {
            let cluster =
                ClusterConfig::from_env().context("resolving cluster configuration")?;
            // A dry run prints the command line without touching anything,
            // including the first-run recipe generation.
            let training = load_recipe(&config_path, !dry_run)?;

            let invocation = Invocation::build(&cluster, &training);

            info!(
                job = invocation.job_name(),
                rank = cluster.rank,
                world_size = cluster.world_size,
                master = format!("{}:{}", cluster.master_addr, cluster.master_port),
                "Assembled invocation"
            );

            if dry_run {
                println!("{}", invocation.command_line());
                return Ok(ExitCode::SUCCESS);
            }

            let log_dir = std::env::current_dir().context("determining working directory")?;
            let launcher = Launcher::new(log_dir);

            let outcome = launcher.launch(&invocation).await?;

            println!(
                "\nJob {} finished with exit code {} (log: {})",
                invocation.job_name(),
                outcome.exit_code,
                outcome.log_path.display()
            );

            Ok(ExitCode::from(
                u8::try_from(outcome.exit_code).unwrap_or(1),
            ))
        }
    }
}

/// Load the training recipe.
///
/// With `persist_default` set, a missing recipe is auto-generated on first
/// run; otherwise the in-memory default is used and nothing is written.
fn load_recipe(path: &Path, persist_default: bool) -> Result<TrainingConfig> {
    if path.exists() {
        Ok(TrainingConfig::load(path)?)
    } else if persist_default {
        let config = TrainingConfig::default();
        config.save(path)?;

        println!(
            "First run detected - created default training recipe at: {}",
            path.display()
        );
        println!("Edit {} to customize the training flags\n", path.display());

        Ok(config)
    } else {
        Ok(TrainingConfig::default())
    }
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
