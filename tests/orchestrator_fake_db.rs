//! End-to-end exercises of the orchestrator against an in-process fake
//! `DbOps`, standing in for a live cluster that this repository's test
//! tooling has no access to (§10.7). The `surrogate` benchmark tool is
//! used throughout so that workload execution itself never opens a
//! network connection either.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dbtune::config::{BenchmarkConfig, BenchmarkTool, Config, DatabaseConfig, TuningConfig, TuningMethod};
use dbtune::db_adapter::{DbOps, InternalMetrics};
use dbtune::error::Result;
use dbtune::knob_space::{Configuration, KnobSpace};
use dbtune::orchestrator;
use dbtune::recorder;

/// A `DbOps` double that never touches the network: it just counts
/// calls and reports fixed counters.
struct FakeDbAdapter {
    apply_calls: AtomicUsize,
    restart_calls: AtomicUsize,
}

impl FakeDbAdapter {
    fn new() -> Self {
        Self { apply_calls: AtomicUsize::new(0), restart_calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl DbOps for FakeDbAdapter {
    async fn apply(&self, _space: &KnobSpace, _configuration: &Configuration) -> Result<bool> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn restart(&self) -> Result<bool> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    fn purge_overrides(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_to_defaults(&self) -> Result<()> {
        Ok(())
    }

    async fn reset_counters(&self) {}

    async fn fetch_counters(&self) -> InternalMetrics {
        let mut metrics = HashMap::new();
        metrics.insert("xact_commit".to_string(), 0.0);
        metrics
    }

    async fn run_default_workload(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn config_snapshot(&self) -> DatabaseConfig {
        DatabaseConfig::default()
    }
}

/// A space with no tunable dimension at all: every knob's range has
/// collapsed to a single point (§8 boundary: "lo == hi for every
/// tunable -> optimizer has a zero-dimensional space").
fn zero_dimensional_space() -> KnobSpace {
    let json = r#"{
        "wal_level": {"type": "constant", "min": 1.0, "max": 1.0, "default": 1.0},
        "fsync": {"type": "integer", "min": 1, "max": 1, "default": 1}
    }"#;
    serde_json::from_str(json).unwrap()
}

fn one_tunable_knob_space() -> KnobSpace {
    let json = r#"{
        "shared_buffers": {"type": "integer", "min": 64, "max": 4096, "default": 128}
    }"#;
    serde_json::from_str(json).unwrap()
}

struct Dirs {
    log_dir: tempfile::TempDir,
    perf_dir: tempfile::TempDir,
    workload_dir: tempfile::TempDir,
}

fn make_config(dirs: &Dirs, method: TuningMethod, suggest_num: u32, early_stop_plateau: u32) -> Config {
    let workload_path = dirs.workload_dir.path().join("sample.wg");
    std::fs::write(&workload_path, "SELECT 1;").unwrap();

    Config {
        database: DatabaseConfig::default(),
        benchmark: BenchmarkConfig {
            benchmark: "surrogate_bench".to_string(),
            workload_path: workload_path.to_string_lossy().to_string(),
            tool: BenchmarkTool::Surrogate,
            log_path: dirs.log_dir.path().to_string_lossy().to_string(),
            performance_record_path: dirs.perf_dir.path().to_string_lossy().to_string(),
            benchbase_jar: String::new(),
        },
        tuning: TuningConfig {
            knob_config: String::new(),
            log_path: dirs.log_dir.path().to_string_lossy().to_string(),
            suggest_num,
            early_stop_plateau,
            tuning_method: method,
        },
        surrogate: Default::default(),
    }
}

fn make_dirs() -> Dirs {
    Dirs {
        log_dir: tempfile::tempdir().unwrap(),
        perf_dir: tempfile::tempdir().unwrap(),
        workload_dir: tempfile::tempdir().unwrap(),
    }
}

#[tokio::test]
async fn bo_a_plateau_early_stop_matches_the_documented_scenario() {
    // §8 scenario 5: early_stop_plateau = 3, a cost function returning a
    // constant (here: the zero-dimensional space forces every evaluation
    // to the same objective). Expect the loop to stop at iteration 4
    // (one "improvement" from None at iter 1, then 3 non-improvements).
    let dirs = make_dirs();
    let config = make_config(&dirs, TuningMethod::BoA, 100, 3);
    let space = zero_dimensional_space();
    let adapter = FakeDbAdapter::new();

    let outcome = orchestrator::tune_workload(adapter, space, config, 2).await.unwrap();

    assert!(!outcome.skipped);
    assert_eq!(outcome.iterations, 4);
    assert_eq!(outcome.early_stopped, Some(true));
    assert_eq!(outcome.best_performance, Some(0.0));
}

#[tokio::test]
async fn bo_b_runs_to_runcount_with_default_config_anchoring() {
    let dirs = make_dirs();
    let config = make_config(&dirs, TuningMethod::BoB, 4, 50);
    let space = one_tunable_knob_space();
    let adapter = FakeDbAdapter::new();

    let outcome = orchestrator::tune_workload(adapter, space, config, 2).await.unwrap();

    assert!(!outcome.skipped);
    assert_eq!(outcome.iterations, 4);
    assert_eq!(outcome.early_stopped, None);

    let runhistory_path = Path::new(&dirs.log_dir.path().to_string_lossy().to_string())
        .join("surrogate_bench")
        .join("sample_hebo_output")
        .join("runhistory.jsonl");
    let history = recorder::RunHistory::load(&runhistory_path).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.observations()[0].note.as_deref(), Some("DEFAULT_CONFIG"));

    let best_config_path = runhistory_path.with_file_name("best_config.json");
    let text = std::fs::read_to_string(&best_config_path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let min_objective = history
        .observations()
        .iter()
        .map(|o| o.objective)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(value["best_cost"].as_f64().unwrap(), min_objective);
}

#[tokio::test]
async fn resume_skips_a_workload_whose_perf_file_already_exists() {
    let dirs = make_dirs();
    let config = make_config(&dirs, TuningMethod::BoA, 10, 5);
    recorder::append_perf_line(dirs.perf_dir.path(), "sample", 0, 1.0).unwrap();

    let space = zero_dimensional_space();
    let adapter = FakeDbAdapter::new();

    let outcome = orchestrator::tune_workload(adapter, space, config, 2).await.unwrap();

    assert!(outcome.skipped);
    assert_eq!(outcome.iterations, 0);
    assert_eq!(outcome.best_performance, None);
}

#[tokio::test]
async fn empty_workload_file_yields_zero_throughput_with_dwg_tool() {
    // §8 boundary: empty workload file -> qps == 0, no worker started.
    // Exercised directly through the OLAP executor rather than the
    // orchestrator, since this is the one path that legitimately opens
    // a real connection per worker and so cannot run against the fake.
    let queries = dbtune::executor::olap::parse_queries("");
    assert!(queries.is_empty());
    let partitions = dbtune::executor::olap::partition(&queries, 3);
    assert_eq!(partitions.iter().map(|p| p.len()).sum::<usize>(), 0);
}
