use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod reference_brain;

use config::Config;
use falken_learner::brain_cache::BrainCache;
use falken_learner::driver::LearnerDriver;
use falken_learner::processor::ProcessorConfig;
use falken_learner::scratch::ScratchLayout;
use falken_learner::storage::Storage;
use falken_monitor::{AssignmentMonitor, LeaseManager};
use falken_store::{LocalFileSystem, ResourceStore, SharedFileSystem};
use reference_brain::ReferenceBrainFactory;

#[derive(Parser)]
#[command(name = "falken-learner")]
#[command(about = "Training coordination core: discovers assignments, drives the training loop, exports models")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file path (TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the learner: queue-driven normal mode, or manual-assignment
    /// mode when `--assignment` is given (spec.md §4.7).
    Run {
        /// `project/brain/session/assignment` to process once and exit,
        /// bypassing the assignment queue (spec.md §4.7 "manual-assignment
        /// mode").
        #[arg(long)]
        assignment: Option<String>,
    },
    /// Validates and prints the resolved configuration without starting
    /// the learner.
    CheckConfig,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Commands::Run { assignment: Some(assignment) } = &cli.command {
        config.assignment_path = Some(assignment.clone());
    }
    config.validate()?;

    match cli.command {
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Run { .. } => run(config).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let fs: SharedFileSystem = Arc::new(LocalFileSystem::new(&config.store_root)?);
    let store = ResourceStore::new(fs.clone());
    let lease = Arc::new(LeaseManager::new(fs.clone(), config.stale_seconds()));
    let (monitor, events_rx) = AssignmentMonitor::new(fs, lease);
    monitor.start().await?;

    let storage = Arc::new(Storage::new(store, monitor, events_rx, config.stale_seconds()));
    let brain_cache = Arc::new(BrainCache::new(Arc::new(ReferenceBrainFactory)));
    let scratch = ScratchLayout::new(
        config.checkpoints_root.clone(),
        config.tmp_models_root.clone(),
        config.summaries_root.clone(),
    );
    let processor_config = ProcessorConfig {
        max_assignment_work_time: config.max_assignment_work_time(),
        wait_for_data_brain: config.wait_for_data_brain(),
        fetch_poll_interval: config.fetch_poll_interval(),
        manual_mode: config.assignment_path.is_some(),
    };
    let driver = LearnerDriver::new(storage, brain_cache, scratch, config.models_root.clone(), processor_config);

    let result = match config.parsed_assignment_path() {
        Some((project, brain, session, assignment)) => {
            info!(%project, %brain, %session, %assignment, "running manual assignment");
            driver.run_manual_assignment(&project, &brain, &session, &assignment).await
        }
        None => {
            info!("entering normal queue-driven loop");
            let timeout = Some(config.receive_assignment_timeout());
            loop {
                if !driver.run_once(timeout).await? {
                    info!("no pending assignment within timeout, waiting again");
                }
            }
        }
    };

    match result {
        Ok(()) => Ok(()),
        Err(error) => {
            error!(%error, "falken-learner exiting with error");
            Err(error.into())
        }
    }
}
