//! Orchestrator: the per-workload entry point (§4.6).

use std::path::PathBuf;

use tracing::info;

use crate::config::{Config, TuningMethod};
use crate::db_adapter::DbOps;
use crate::error::Result;
use crate::knob_space::KnobSpace;
use crate::optimizer::{BoASequential, BoBAskTell, Optimizer};
use crate::recorder::{self, Observation, RunHistory};
use crate::tuning_driver::TuningDriver;

pub struct TuningOutcome {
    pub workload: String,
    pub iterations: u32,
    pub best_performance: Option<f64>,
    pub early_stopped: Option<bool>,
    pub skipped: bool,
}

/// Runs the default-configuration baseline for `workload`, persisting
/// InternalMetrics for later comparison (§4.6 step 1).
pub async fn run_baseline<D: DbOps>(adapter: &D, config: &Config, workload: &str) -> Result<()> {
    adapter.reset_to_defaults().await?;
    adapter.reset_counters().await;
    adapter.restart().await?;
    adapter.run_default_workload(std::path::Path::new(&config.benchmark.workload_path)).await?;
    let metrics = adapter.fetch_counters().await;
    recorder::persist_internal_metrics(
        &PathBuf::from(&config.tuning.log_path),
        &config.benchmark.benchmark,
        workload,
        &metrics,
    )?;
    info!(workload, "baseline recorded");
    Ok(())
}

/// Runs the full tuning loop for one workload: baseline, optimisation,
/// persistence, and resume support (§4.6).
pub async fn tune_workload<D: DbOps>(
    adapter: D,
    space: KnobSpace,
    config: Config,
    worker_count: usize,
) -> Result<TuningOutcome> {
    let workload = std::path::Path::new(&config.benchmark.workload_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| config.benchmark.benchmark.clone());

    let perf_dir = PathBuf::from(&config.benchmark.performance_record_path);
    if recorder::is_workload_complete(&perf_dir, &workload) {
        info!(workload, "already completed, skipping (resume)");
        return Ok(TuningOutcome {
            workload,
            iterations: 0,
            best_performance: None,
            early_stopped: None,
            skipped: true,
        });
    }

    run_baseline(&adapter, &config, &workload).await?;

    let output_dir = PathBuf::from(&config.tuning.log_path)
        .join(&config.benchmark.benchmark)
        .join(format!("{workload}_{}_output", method_tag(config.tuning.tuning_method)));
    let runhistory_path = output_dir.join("runhistory.jsonl");
    let best_config_path = output_dir.join("best_config.json");

    let mut driver = TuningDriver::new(
        adapter,
        space.clone(),
        config.benchmark.clone(),
        config.tuning.clone(),
        PathBuf::from(&config.tuning.log_path),
        worker_count,
    )?;

    let mut history = RunHistory::new();
    let mut early_stopped = None;

    match config.tuning.tuning_method {
        TuningMethod::BoA => {
            let mut optimizer = BoASequential::new(&space, config.tuning.suggest_num, config.tuning.early_stop_plateau);
            run_loop(&mut optimizer, &mut driver, &space, &mut history, &runhistory_path).await?;
            early_stopped = Some(optimizer.early_stopped());
        }
        TuningMethod::BoB => {
            let mut optimizer = BoBAskTell::new(&space, config.tuning.suggest_num);
            run_loop(&mut optimizer, &mut driver, &space, &mut history, &runhistory_path).await?;
        }
    }

    let best_performance = history.incumbent().map(|obs| obs.raw_performance);
    if !history.is_empty() {
        recorder::write_best_config(&best_config_path, &workload, &history, early_stopped)?;
    }

    Ok(TuningOutcome {
        workload,
        iterations: history.len() as u32,
        best_performance,
        early_stopped,
        skipped: false,
    })
}

fn method_tag(method: TuningMethod) -> &'static str {
    match method {
        TuningMethod::BoA => "smac",
        TuningMethod::BoB => "hebo",
    }
}

async fn run_loop<D: DbOps>(
    optimizer: &mut dyn Optimizer,
    driver: &mut TuningDriver<D>,
    space: &KnobSpace,
    history: &mut RunHistory,
    runhistory_path: &std::path::Path,
) -> Result<()> {
    while let Some(suggestion) = optimizer.suggest() {
        let complete = suggestion.config.completed_over(space);
        let performance = driver.evaluate(&complete).await?;
        let objective = if performance > 0.0 { -performance } else { performance };
        optimizer.observe(suggestion.config.clone(), objective);

        let observation = Observation::new(history.len() as u32, complete, performance, suggestion.note.clone());
        RunHistory::append_line(runhistory_path, &observation)?;
        history.push(observation);
    }
    Ok(())
}
