//! Process-wide configuration: database, benchmark, tuning and surrogate
//! sections, loaded from a TOML file (§10.2).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn default_pg_version() -> String {
    "12".to_string()
}

fn default_cluster_name() -> String {
    "main".to_string()
}

fn default_port() -> u16 {
    5432
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub data_path: String,
    #[serde(default = "default_pg_version")]
    pub pg_version: String,
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: default_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            data_path: String::new(),
            pg_version: default_pg_version(),
            cluster_name: default_cluster_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkTool {
    Dwg,
    Benchbase,
    Surrogate,
}

impl Default for BenchmarkTool {
    fn default() -> Self {
        BenchmarkTool::Dwg
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub benchmark: String,
    pub workload_path: String,
    pub tool: BenchmarkTool,
    pub log_path: String,
    pub performance_record_path: String,
    pub benchbase_jar: String,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            benchmark: String::new(),
            workload_path: String::new(),
            tool: BenchmarkTool::default(),
            log_path: "logs".to_string(),
            performance_record_path: "perf".to_string(),
            benchbase_jar: "benchbase.jar".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TuningMethod {
    BoA,
    BoB,
}

impl Default for TuningMethod {
    fn default() -> Self {
        TuningMethod::BoB
    }
}

fn default_suggest_num() -> u32 {
    100
}

fn default_early_stop_plateau() -> u32 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub knob_config: String,
    pub log_path: String,
    #[serde(default = "default_suggest_num")]
    pub suggest_num: u32,
    #[serde(default = "default_early_stop_plateau")]
    pub early_stop_plateau: u32,
    pub tuning_method: TuningMethod,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            knob_config: String::new(),
            log_path: "logs".to_string(),
            suggest_num: default_suggest_num(),
            early_stop_plateau: default_early_stop_plateau(),
            tuning_method: TuningMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurrogateConfig {
    pub model_path: String,
    pub offline_sample_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub benchmark: BenchmarkConfig,
    pub tuning: TuningConfig,
    pub surrogate: SurrogateConfig,
}

impl Config {
    /// Tolerant load: unknown keys are ignored, every field has a default.
    /// Mirrors the original free-form configuration dictionary (§9).
    pub fn load_loose(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }

    /// Strict load: rejects any key not declared in the four sections.
    /// This is the mode the CLI uses by default (§10.2).
    pub fn load_strict(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StrictConfig = toml::from_str(&text)?;
        Ok(config.into())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct StrictConfig {
    database: StrictDatabaseConfig,
    benchmark: BenchmarkConfig,
    tuning: TuningConfig,
    surrogate: SurrogateConfig,
}

impl Default for StrictConfig {
    fn default() -> Self {
        Self {
            database: StrictDatabaseConfig::default(),
            benchmark: BenchmarkConfig::default(),
            tuning: TuningConfig::default(),
            surrogate: SurrogateConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct StrictDatabaseConfig {
    host: String,
    port: u16,
    database: String,
    user: String,
    password: String,
    data_path: String,
    pg_version: String,
    cluster_name: String,
}

impl Default for StrictDatabaseConfig {
    fn default() -> Self {
        let d = DatabaseConfig::default();
        Self {
            host: d.host,
            port: d.port,
            database: d.database,
            user: d.user,
            password: d.password,
            data_path: d.data_path,
            pg_version: d.pg_version,
            cluster_name: d.cluster_name,
        }
    }
}

impl From<StrictConfig> for Config {
    fn from(s: StrictConfig) -> Self {
        Config {
            database: DatabaseConfig {
                host: s.database.host,
                port: s.database.port,
                database: s.database.database,
                user: s.database.user,
                password: s.database.password,
                data_path: s.database.data_path,
                pg_version: s.database.pg_version,
                cluster_name: s.database.cluster_name,
            },
            benchmark: s.benchmark,
            tuning: s.tuning,
            surrogate: s.surrogate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loose_load_ignores_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            host = "db.example.com"
            database = "bench"
            user = "tuner"
            password = "secret"
            data_path = "/var/lib/postgresql/12/main"
            totally_unknown_field = "ignored"

            [benchmark]
            benchmark = "ycsb"
            workload_path = "workloads/ycsb.wg"
            tool = "dwg"
            log_path = "logs"
            performance_record_path = "perf"
            benchbase_jar = "benchbase.jar"

            [tuning]
            knob_config = "knobs.json"
            log_path = "logs"
            tuning_method = "bo-b"
            "#,
        )
        .unwrap();

        let config = Config::load_loose(&path).unwrap();
        assert_eq!(config.database.host, "db.example.com");
        assert_eq!(config.database.pg_version, "12");
        assert_eq!(config.tuning.suggest_num, 100);
    }

    #[test]
    fn strict_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            host = "localhost"
            database = "bench"
            user = "tuner"
            password = "secret"
            data_path = "/data"
            bogus_key = 1
            "#,
        )
        .unwrap();

        assert!(Config::load_strict(&path).is_err());
    }

    #[test]
    fn defaults_fill_tuning_section() {
        let config = Config::default();
        assert_eq!(config.tuning.suggest_num, 100);
        assert_eq!(config.tuning.early_stop_plateau, 50);
        assert_eq!(config.database.pg_version, "12");
        assert_eq!(config.database.cluster_name, "main");
    }
}
