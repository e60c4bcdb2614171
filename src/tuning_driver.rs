//! TuningDriver: wraps one Executor + DBAdapter, exposing
//! `evaluate(config) -> performance` and performing all side-effects
//! (§4.4).

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::{BenchmarkConfig, BenchmarkTool, TuningConfig};
use crate::db_adapter::DbOps;
use crate::error::Result;
use crate::executor::olap::OlapExecutor;
use crate::executor::oltp::OltpExecutor;
use crate::knob_space::{Configuration, KnobSpace};
use crate::recorder;

fn workload_name_of(benchmark: &BenchmarkConfig) -> String {
    std::path::Path::new(&benchmark.workload_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| benchmark.benchmark.clone())
}

/// The live executor for one tuning session, built once so that
/// per-session state survives across iterations: `OlapExecutor`'s fixed
/// query partition (§3, §5) and `OltpExecutor`'s load-once flag (§4.3
/// step 3) both depend on this.
enum ExecutorState {
    Olap(OlapExecutor),
    Oltp(OltpExecutor),
    Surrogate,
}

/// Wraps one `DbOps` implementation + executor choice. Generic over
/// `DbOps` so tests can drive the loop against an in-process fake
/// instead of a live cluster (§10.7).
pub struct TuningDriver<D: DbOps> {
    adapter: D,
    space: KnobSpace,
    benchmark: BenchmarkConfig,
    tuning: TuningConfig,
    iteration: u32,
    executor: ExecutorState,
}

impl<D: DbOps> TuningDriver<D> {
    pub fn new(
        adapter: D,
        space: KnobSpace,
        benchmark: BenchmarkConfig,
        tuning: TuningConfig,
        output_root: PathBuf,
        worker_count: usize,
    ) -> Result<Self> {
        let database = adapter.config_snapshot();
        let executor = match benchmark.tool {
            BenchmarkTool::Dwg => {
                let text = std::fs::read_to_string(&benchmark.workload_path)?;
                ExecutorState::Olap(OlapExecutor::new(database, &text, worker_count))
            }
            BenchmarkTool::Benchbase => {
                let results_dir = output_root.join(&benchmark.benchmark).join(workload_name_of(&benchmark));
                ExecutorState::Oltp(OltpExecutor::new(database, benchmark.clone(), results_dir))
            }
            BenchmarkTool::Surrogate => ExecutorState::Surrogate,
        };
        Ok(Self { adapter, space, benchmark, tuning, iteration: 0, executor })
    }

    fn workload_name(&self) -> String {
        workload_name_of(&self.benchmark)
    }

    /// Applies `configuration`, fetches metrics, runs the workload, and
    /// logs three records. Returns the scalar performance (§4.4). A
    /// configuration that fails to apply fully (knob rejected, or the
    /// restart it triggers fails) never reaches the workload: the
    /// iteration is recorded with zero performance (§4.1, §7, §8
    /// scenario 3).
    pub async fn evaluate(&mut self, configuration: &Configuration) -> Result<f64> {
        self.iteration += 1;
        let iteration = self.iteration;
        let workload = self.workload_name();

        let applied = self.adapter.apply(&self.space, configuration).await?;
        if !applied {
            warn!(iteration, workload = %workload, "configuration failed to apply fully");
        }

        let metrics = self.adapter.fetch_counters().await;

        let performance = if !applied {
            0.0
        } else {
            match &mut self.executor {
                ExecutorState::Olap(executor) => executor.run().await.throughput_qps,
                ExecutorState::Oltp(executor) => executor.run().await,
                ExecutorState::Surrogate => normalized_cost(&self.space, configuration),
            }
        };

        let training_log = PathBuf::from(&self.tuning.log_path).join("training.jsonl");
        recorder::append_training_log(&training_log, iteration, &workload, configuration, performance)?;

        if !matches!(self.benchmark.tool, BenchmarkTool::Surrogate) {
            let offline_log = PathBuf::from(&self.tuning.log_path).join("offline_sample.jsonl");
            recorder::append_offline_sample(&offline_log, configuration, performance, &metrics)?;
        }

        let perf_dir = PathBuf::from(&self.benchmark.performance_record_path);
        recorder::append_perf_line(&perf_dir, &workload, iteration, performance)?;

        info!(iteration, workload = %workload, performance, "evaluation complete");
        Ok(performance)
    }
}

/// A placeholder cost function for the `surrogate` tool, used only when
/// no live executor is available: normalises each tunable knob to
/// `[0, 1]` and returns the mean (lower-is-worse by convention here,
/// matching the original's normalised-knob surrogate input shape).
fn normalized_cost(space: &KnobSpace, configuration: &Configuration) -> f64 {
    let mut sum = 0.0;
    let mut count = 0;
    for (name, value) in configuration.iter() {
        if let Some(knob) = space.get(name) {
            if knob.is_tunable() {
                let span = knob.max - knob.min;
                let normalized = if span.abs() < f64::EPSILON { 0.0 } else { (value.as_f64() - knob.min) / span };
                sum += normalized;
                count += 1;
            }
        }
    }
    if count > 0 { sum / count as f64 } else { 0.0 }
}
