//! OLTPExecutor: edits an external benchmark harness's XML profile,
//! invokes it as a subprocess, and parses its summary output (§4.3).

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{BenchmarkConfig, DatabaseConfig};
use crate::error::{DbTuneError, Result};

const BENCHMARK_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DURATION_SECS: u32 = 60;
const TERMINALS: u32 = 16;

struct BenchmarkProfile {
    scale_factor: u32,
    rate: Option<u32>,
}

fn profile_for(benchmark: &str) -> BenchmarkProfile {
    match benchmark {
        "ycsb" => BenchmarkProfile { scale_factor: 3600, rate: Some(70_000) },
        "wikipedia" => BenchmarkProfile { scale_factor: 22, rate: None },
        "twitter" => BenchmarkProfile { scale_factor: 80, rate: None },
        "smallbank" => BenchmarkProfile { scale_factor: 45, rate: None },
        _ => BenchmarkProfile { scale_factor: 1, rate: None },
    }
}

/// Replaces the content of a single XML tag, preserving everything else
/// (including comments) in the document (§4.3 Profile preparation).
fn replace_tag(xml: &str, tag: &str, value: &str) -> String {
    let pattern = format!(r"<{tag}>[^<]*</{tag}>");
    let re = Regex::new(&pattern).expect("static regex pattern is valid");
    let replacement = format!("<{tag}>{value}</{tag}>");
    re.replace(xml, replacement.as_str()).into_owned()
}

/// Edits a benchmark profile in place: connection URL, credentials, and
/// the per-benchmark scale/rate/duration/terminals table.
pub fn edit_profile(xml: &str, database: &DatabaseConfig, benchmark: &str) -> String {
    let url = format!("jdbc:postgresql://{}:{}/{}", database.host, database.port, database.database);
    let profile = profile_for(benchmark);

    let mut edited = xml.to_string();
    edited = replace_tag(&edited, "url", &url);
    edited = replace_tag(&edited, "username", &database.user);
    edited = replace_tag(&edited, "password", &database.password);
    edited = replace_tag(&edited, "scalefactor", &profile.scale_factor.to_string());
    edited = replace_tag(&edited, "time", &DURATION_SECS.to_string());
    edited = replace_tag(&edited, "terminals", &TERMINALS.to_string());
    if let Some(rate) = profile.rate {
        edited = replace_tag(&edited, "rate", &rate.to_string());
    } else {
        edited = replace_tag(&edited, "rate", "unlimited");
    }
    edited
}

/// Drives `java -jar <harness>.jar` against a staged profile, one
/// benchmark workload at a time.
pub struct OltpExecutor {
    database: DatabaseConfig,
    benchmark: BenchmarkConfig,
    results_dir: PathBuf,
    loaded: bool,
}

impl OltpExecutor {
    pub fn new(database: DatabaseConfig, benchmark: BenchmarkConfig, results_dir: PathBuf) -> Self {
        Self { database, benchmark, results_dir, loaded: false }
    }

    fn profile_path(&self) -> PathBuf {
        PathBuf::from(&self.benchmark.workload_path)
    }

    /// Stages the edited profile and, the first time only, loads the
    /// benchmark's schema and data before executing (§4.3 steps 1-3).
    pub async fn prepare(&mut self) -> Result<PathBuf> {
        let raw = std::fs::read_to_string(self.profile_path())?;
        let edited = edit_profile(&raw, &self.database, &self.benchmark.benchmark);
        let staged = self.results_dir.join("profile.xml");
        std::fs::create_dir_all(&self.results_dir)?;
        std::fs::write(&staged, edited)?;

        if !self.loaded {
            self.run_harness(&staged, &["--create=true", "--load=true", "--execute=false"]).await?;
            self.loaded = true;
        }
        Ok(staged)
    }

    /// Runs the execute phase, discovers and parses the summary, and
    /// returns throughput (§4.3 steps 4-6). Never fails the iteration:
    /// any error yields 0 throughput.
    pub async fn run(&mut self) -> f64 {
        match self.run_inner().await {
            Ok(throughput) => throughput,
            Err(e) => {
                warn!(error = %e, "oltp run failed, reporting zero throughput");
                0.0
            }
        }
    }

    async fn run_inner(&mut self) -> Result<f64> {
        let profile = self.prepare().await?;
        self.run_harness(
            &profile,
            &["--execute=true", &format!("--directory={}", self.results_dir.display())],
        )
        .await?;
        let summary_path = self.discover_summary()?;
        parse_summary(&summary_path)
    }

    async fn run_harness(&self, profile: &Path, extra_args: &[&str]) -> Result<()> {
        let jar = &self.benchmark.benchmark_jar_or_default();
        let mut command = Command::new("java");
        command.arg("-jar").arg(jar).arg("-b").arg(&self.benchmark.benchmark).arg("-c").arg(profile);
        for arg in extra_args {
            command.arg(arg);
        }
        info!(?command, "invoking benchmark harness");
        let status = tokio::time::timeout(BENCHMARK_TIMEOUT, command.status())
            .await
            .map_err(|_| DbTuneError::Subprocess("benchmark harness timed out".to_string()))??;
        if !status.success() {
            warn!(%status, "benchmark harness exited non-zero");
        }
        Ok(())
    }

    /// Finds the `*.summary.json` produced by the harness, archives the
    /// original, copies it as `summary.json`, and clears other artefacts.
    fn discover_summary(&self) -> Result<PathBuf> {
        let entries = std::fs::read_dir(&self.results_dir)?;
        let mut found = None;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".summary.json") {
                found = Some(entry.path());
                break;
            }
        }
        let Some(original) = found else {
            return Err(DbTuneError::Parse("no summary.json produced by benchmark harness".to_string()));
        };

        let archive_dir = self.results_dir.join("summary");
        std::fs::create_dir_all(&archive_dir)?;
        let archived = archive_dir.join(original.file_name().expect("summary path has a file name"));
        std::fs::copy(&original, &archived)?;

        let summary_path = self.results_dir.join("summary.json");
        std::fs::copy(&original, &summary_path)?;

        for entry in std::fs::read_dir(&self.results_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path == summary_path || path == archive_dir {
                continue;
            }
            if path.is_file() {
                let _ = std::fs::remove_file(&path);
            }
        }

        Ok(summary_path)
    }
}

/// Reads `Throughput (requests/second)` from a summary file. Any failure
/// (missing file, malformed JSON, missing key) yields 0 (§4.3 step 6).
fn parse_summary(path: &Path) -> Result<f64> {
    let text = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text)?;
    Ok(value
        .get("Throughput (requests/second)")
        .and_then(Value::as_f64)
        .unwrap_or(0.0))
}

impl BenchmarkConfig {
    fn benchmark_jar_or_default(&self) -> String {
        if self.benchbase_jar.is_empty() {
            "benchbase.jar".to_string()
        } else {
            self.benchbase_jar.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_database() -> DatabaseConfig {
        DatabaseConfig {
            host: "db.internal".to_string(),
            port: 5432,
            database: "bench".to_string(),
            user: "tuner".to_string(),
            password: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn replace_tag_preserves_surrounding_xml_and_comments() {
        let xml = "<config>\n  <!-- db url -->\n  <url>old</url>\n  <time>30</time>\n</config>";
        let edited = replace_tag(xml, "url", "new");
        assert!(edited.contains("<url>new</url>"));
        assert!(edited.contains("<!-- db url -->"));
        assert!(edited.contains("<time>30</time>"));
    }

    #[test]
    fn edit_profile_sets_ycsb_scale_and_rate() {
        let xml = "<parameters><url></url><username></username><password></password>\
                   <scalefactor>1</scalefactor><time>10</time><terminals>1</terminals>\
                   <rate>1</rate></parameters>";
        let edited = edit_profile(xml, &sample_database(), "ycsb");
        assert!(edited.contains("<scalefactor>3600</scalefactor>"));
        assert!(edited.contains("<rate>70000</rate>"));
        assert!(edited.contains("<time>60</time>"));
        assert!(edited.contains("<terminals>16</terminals>"));
        assert!(edited.contains("jdbc:postgresql://db.internal:5432/bench"));
    }

    #[test]
    fn edit_profile_uses_unlimited_rate_for_wikipedia() {
        let xml = "<parameters><url></url><username></username><password></password>\
                   <scalefactor>1</scalefactor><time>10</time><terminals>1</terminals>\
                   <rate>1</rate></parameters>";
        let edited = edit_profile(xml, &sample_database(), "wikipedia");
        assert!(edited.contains("<scalefactor>22</scalefactor>"));
        assert!(edited.contains("<rate>unlimited</rate>"));
    }

    #[test]
    fn parse_summary_reads_throughput_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, r#"{"Throughput (requests/second)": 1234.5}"#).unwrap();
        assert_eq!(parse_summary(&path).unwrap(), 1234.5);
    }

    #[test]
    fn parse_summary_missing_key_yields_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        std::fs::write(&path, r#"{"other": 1}"#).unwrap();
        assert_eq!(parse_summary(&path).unwrap(), 0.0);
    }
}
