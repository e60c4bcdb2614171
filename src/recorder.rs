//! Recorder: append-only RunHistory, incumbent tracking, and the various
//! per-workload output files (§4.4, §4.6, §6).

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_adapter::InternalMetrics;
use crate::error::{DbTuneError, Result};
use crate::knob_space::Configuration;

/// One evaluated configuration, persisted as a line in RunHistory (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub iteration: u32,
    pub config: Configuration,
    pub raw_performance: f64,
    pub objective: f64,
    #[serde(default)]
    pub note: Option<String>,
}

impl Observation {
    /// `objective = -raw_performance` when positive, else `raw` itself,
    /// since the optimizer always minimises (§3).
    pub fn new(iteration: u32, config: Configuration, raw_performance: f64, note: Option<String>) -> Self {
        let objective = if raw_performance > 0.0 { -raw_performance } else { raw_performance };
        Self { iteration, config, raw_performance, objective, note }
    }
}

/// An ordered, append-only sequence of Observations for one workload.
/// The JSON-lines file on disk is ground truth; in-memory state may
/// always be rebuilt from it (§3).
#[derive(Debug, Default)]
pub struct RunHistory {
    observations: Vec<Observation>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self { observations: Vec::new() }
    }

    pub fn push(&mut self, observation: Observation) {
        self.observations.push(observation);
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// The observation with the minimum objective seen so far (§3
    /// Incumbent), or `None` if no observations exist yet.
    pub fn incumbent(&self) -> Option<&Observation> {
        self.observations
            .iter()
            .min_by(|a, b| a.objective.partial_cmp(&b.objective).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Appends exactly one JSON line to `path`, creating it if absent.
    pub fn append_line(path: &Path, observation: &Observation) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(observation)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Loads a RunHistory from a JSON-lines file, skipping any
    /// malformed line rather than aborting (§7 Parse policy).
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(DbTuneError::Io(e)),
        };
        let mut history = Self::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(obs) => history.push(obs),
                Err(e) => tracing::warn!(error = %e, "skipping malformed runhistory line"),
            }
        }
        Ok(history)
    }
}

/// Writes `best_config.json` reflecting the current incumbent (§6).
pub fn write_best_config(
    path: &Path,
    workload: &str,
    history: &RunHistory,
    early_stopped: Option<bool>,
) -> Result<()> {
    let Some(incumbent) = history.incumbent() else {
        return Err(DbTuneError::Optimizer("no observations to derive best_config from".to_string()));
    };
    let mut body = serde_json::json!({
        "workload": workload,
        "iterations": history.len(),
        "best_cost": incumbent.objective,
        "best_performance": incumbent.raw_performance,
        "configuration": incumbent.config,
    });
    if let Some(stopped) = early_stopped {
        body["early_stopped"] = Value::Bool(stopped);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&body)?)?;
    Ok(())
}

/// Appends one line to the training log: the full configuration,
/// performance, and iteration number (§4.4 step 5a).
pub fn append_training_log(path: &Path, iteration: u32, workload: &str, config: &Configuration, performance: f64) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let entry = serde_json::json!({
        "iteration": iteration,
        "workload": workload,
        "performance": performance,
        "config": config,
    });
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;
    Ok(())
}

/// Appends one line to the offline-sample log: the evaluation plus
/// InternalMetrics and the `y = [-p, 1/(-p)]` encoding (§4.4 step 5b,
/// preserved bit-for-bit per §9).
pub fn append_offline_sample(
    path: &Path,
    config: &Configuration,
    performance: f64,
    metrics: &InternalMetrics,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let y = if performance != 0.0 { vec![-performance, 1.0 / -performance] } else { vec![0.0, 0.0] };
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let entry = serde_json::json!({
        "config": config,
        "performance": performance,
        "y": y,
        "inner_metrics": metrics,
    });
    writeln!(file, "{}", serde_json::to_string(&entry)?)?;
    Ok(())
}

/// Appends one human-readable line to `<perf_dir>/<workload>.txt`.
/// Presence of this file marks a workload complete for resume (§4.6).
pub fn append_perf_line(perf_dir: &Path, workload: &str, iteration: u32, performance: f64) -> Result<PathBuf> {
    std::fs::create_dir_all(perf_dir)?;
    let path = perf_dir.join(format!("{workload}.txt"));
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "[Iteration {iteration}] Performance: {performance:.4}")?;
    Ok(path)
}

/// A workload is already complete, for resume purposes, iff its
/// perf-record file exists (§4.6 step 4, §8 Resume idempotence).
pub fn is_workload_complete(perf_dir: &Path, workload: &str) -> bool {
    perf_dir.join(format!("{workload}.txt")).exists()
}

/// Persists an InternalMetrics snapshot at
/// `internal_metrics/<benchmark>/<workload>_internal_metrics.json` (§6).
pub fn persist_internal_metrics(root: &Path, benchmark: &str, workload: &str, metrics: &InternalMetrics) -> Result<()> {
    let dir = root.join("internal_metrics").join(benchmark);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{workload}_internal_metrics.json"));
    std::fs::write(&path, serde_json::to_string_pretty(metrics)?)?;
    Ok(())
}

/// Timestamped log file name for one benchmark execute-phase run.
pub fn timestamped_log_name(prefix: &str) -> String {
    format!("{prefix}_{}.log", Utc::now().format("%Y%m%dT%H%M%S"))
}
