//! dbtune: a single binary exposing the tuning core behind two
//! subcommands, the honest minimal replacement for the out-of-scope
//! shell wrapper (§10.4).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dbtune::config::Config;
use dbtune::db_adapter::{DbAdapter, DbOps};
use dbtune::error::Result;
use dbtune::knob_space::KnobSpace;
use dbtune::orchestrator;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "dbtune", about = "Automatic knob-tuning for PostgreSQL-family databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the tuning loop once for one workload.
    Tune {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        workload: Option<PathBuf>,
        #[arg(long, default_value_t = num_cpus::get())]
        workers: usize,
    },
    /// Resets the database to default knob values and restarts it.
    Reset {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Tune { config, workload, workers } => run_tune(config, workload, workers).await,
        Command::Reset { config } => run_reset(config).await,
    }
}

async fn run_tune(config_path: PathBuf, workload_override: Option<PathBuf>, workers: usize) -> Result<()> {
    let mut config = Config::load_strict(&config_path)?;
    if let Some(workload) = workload_override {
        config.benchmark.workload_path = workload.to_string_lossy().to_string();
    }

    let space = KnobSpace::load(std::path::Path::new(&config.tuning.knob_config))?;
    let adapter = DbAdapter::new(config.database.clone());

    info!(benchmark = %config.benchmark.benchmark, "starting tuning run");
    match orchestrator::tune_workload(adapter, space, config, workers).await {
        Ok(outcome) if outcome.skipped => {
            info!(workload = %outcome.workload, "workload already complete, resumed past it");
        }
        Ok(outcome) => {
            info!(
                workload = %outcome.workload,
                iterations = outcome.iterations,
                best_performance = outcome.best_performance,
                early_stopped = outcome.early_stopped,
                "tuning run complete"
            );
        }
        Err(e) => {
            error!(error = %e, "tuning run failed");
            return Err(e);
        }
    }
    Ok(())
}

async fn run_reset(config_path: PathBuf) -> Result<()> {
    let config = Config::load_strict(&config_path)?;
    let adapter = DbAdapter::new(config.database);
    adapter.reset_to_defaults().await?;
    adapter.restart().await?;
    info!("database reset to defaults and restarted");
    Ok(())
}
