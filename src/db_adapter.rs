//! DBAdapter: the single stateful owner of one database instance (§4.1, §5).
//!
//! All side-effects against the target database and its cluster-control
//! tooling flow through here. Knob values are cast to their declared
//! type before being formatted into `ALTER SYSTEM SET`, which Postgres
//! requires as a literal rather than a bind parameter (§4.1).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{DbTuneError, Result};
use crate::knob_space::{Configuration, KnobKind, KnobSpace, KnobValue};

/// Postgres stores page/block sizes in units of this many bytes; used to
/// derive byte counters from the block counters exposed by pg_statio.
const BLOCK_SIZE_BYTES: f64 = 8192.0;

const CONNECT_MAX_RETRIES: u32 = 3;
const CONNECT_RETRY_BACKOFF: Duration = Duration::from_secs(2);
const RESTART_STOP_TIMEOUT: Duration = Duration::from_secs(30);
const RESTART_START_TIMEOUT: Duration = Duration::from_secs(30);

/// A flat counter-name -> value snapshot, sampled once per iteration (§3).
pub type InternalMetrics = HashMap<String, f64>;

fn zeroed_metrics() -> InternalMetrics {
    let names = [
        "xact_commit",
        "xact_rollback",
        "blks_read",
        "blks_hit",
        "tup_returned",
        "tup_fetched",
        "tup_inserted",
        "tup_updated",
        "tup_deleted",
        "conflicts",
        "disk_read_count",
        "disk_write_count",
        "disk_read_bytes",
        "disk_write_bytes",
    ];
    names.iter().map(|n| (n.to_string(), 0.0)).collect()
}

/// The side-effecting surface the TuningDriver and Orchestrator depend
/// on, factored out so tests can exercise the tuning loop against an
/// in-process fake instead of a live cluster (§10.7). `DbAdapter` is the
/// only production implementation.
#[async_trait]
pub trait DbOps: Send + Sync {
    async fn apply(&self, space: &KnobSpace, configuration: &Configuration) -> Result<bool>;
    async fn restart(&self) -> Result<bool>;
    fn purge_overrides(&self) -> Result<()>;
    async fn reset_to_defaults(&self) -> Result<()>;
    async fn reset_counters(&self);
    async fn fetch_counters(&self) -> InternalMetrics;
    async fn run_default_workload(&self, path: &Path) -> Result<()>;
    fn config_snapshot(&self) -> DatabaseConfig;
}

/// Single owner of one data directory's worth of live-database state.
/// Never construct more than one `DbAdapter` against the same
/// `data_path` concurrently within a process (§5).
pub struct DbAdapter {
    config: DatabaseConfig,
}

impl DbAdapter {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn auto_conf_path(&self) -> PathBuf {
        PathBuf::from(&self.config.data_path).join("postgresql.auto.conf")
    }

    /// Opens a connection with retry. On exhausting retries, purges the
    /// persisted-override file once and makes a final attempt (§4.1).
    pub async fn connect(&self) -> Result<tokio_postgres::Client> {
        let mut last_err = None;
        for attempt in 0..CONNECT_MAX_RETRIES {
            match self.try_connect().await {
                Ok(client) => return Ok(client),
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt failed");
                    last_err = Some(e);
                    sleep(CONNECT_RETRY_BACKOFF).await;
                }
            }
        }
        self.purge_overrides()?;
        self.try_connect().await.map_err(|e| {
            let _ = &last_err;
            e
        })
    }

    async fn try_connect(&self) -> Result<tokio_postgres::Client> {
        let conn_str = format!(
            "host={} port={} dbname={} user={} password={}",
            self.config.host, self.config.port, self.config.database, self.config.user, self.config.password
        );
        let connect = tokio_postgres::connect(&conn_str, tokio_postgres::NoTls);
        let (client, connection) = tokio::time::timeout(Duration::from_secs(10), connect)
            .await
            .map_err(|_| DbTuneError::Connection("connection timed out".to_string()))??;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "connection task ended");
            }
        });
        Ok(client)
    }

    /// `ALTER SYSTEM SET` does not accept a server-side bind parameter
    /// for its value (it must be a literal parsed at parse time), so the
    /// already-typed numeric value is formatted directly into the
    /// statement text. `name` comes from the trusted `KnobSpace`
    /// catalogue and `value` is a validated `i64`/`f64`, never raw user
    /// input, so this is not a string-injection surface.
    async fn set_knob(
        &self,
        client: &tokio_postgres::Client,
        name: &str,
        kind: KnobKind,
        value: KnobValue,
    ) -> Result<()> {
        let literal = match (kind, value) {
            (KnobKind::Integer, KnobValue::Integer(v)) => v.to_string(),
            (KnobKind::Real, KnobValue::Real(v)) | (KnobKind::Constant, KnobValue::Real(v)) => v.to_string(),
            _ => {
                return Err(DbTuneError::KnobApply(format!(
                    "knob {name}: value type mismatch with declared kind"
                )))
            }
        };
        let stmt = format!("ALTER SYSTEM SET {name} = {literal}");
        client.batch_execute(&stmt).await?;
        Ok(())
    }

    async fn run_cluster_ctl(&self, action: &str, timeout: Duration) -> Result<()> {
        let fut = Command::new("pg_ctlcluster")
            .arg(&self.config.pg_version)
            .arg(&self.config.cluster_name)
            .arg(action)
            .status();
        let status = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| DbTuneError::Restart(format!("cluster {action} timed out")))??;
        if !status.success() {
            return Err(DbTuneError::Restart(format!("cluster {action} exited with {status}")));
        }
        Ok(())
    }

    async fn fetch_counters_inner(&self) -> Result<InternalMetrics> {
        let client = self.connect().await?;
        let mut metrics = InternalMetrics::new();

        let row = client
            .query_one(
                "SELECT xact_commit, xact_rollback, blks_read, blks_hit, \
                 tup_returned, tup_fetched, tup_inserted, tup_updated, tup_deleted, conflicts \
                 FROM pg_stat_database WHERE datname = $1",
                &[&self.config.database],
            )
            .await?;
        metrics.insert("xact_commit".to_string(), row.get::<_, i64>(0) as f64);
        metrics.insert("xact_rollback".to_string(), row.get::<_, i64>(1) as f64);
        metrics.insert("blks_read".to_string(), row.get::<_, i64>(2) as f64);
        metrics.insert("blks_hit".to_string(), row.get::<_, i64>(3) as f64);
        metrics.insert("tup_returned".to_string(), row.get::<_, i64>(4) as f64);
        metrics.insert("tup_fetched".to_string(), row.get::<_, i64>(5) as f64);
        metrics.insert("tup_inserted".to_string(), row.get::<_, i64>(6) as f64);
        metrics.insert("tup_updated".to_string(), row.get::<_, i64>(7) as f64);
        metrics.insert("tup_deleted".to_string(), row.get::<_, i64>(8) as f64);
        metrics.insert("conflicts".to_string(), row.get::<_, i64>(9) as f64);

        let io_row = client
            .query_one(
                "SELECT COALESCE(SUM(heap_blks_read + idx_blks_read + toast_blks_read + tidx_blks_read), 0) \
                 FROM pg_statio_all_tables",
                &[],
            )
            .await?;
        let disk_read_count: i64 = io_row.get(0);

        let bgwriter_row = client
            .query_one("SELECT buffers_checkpoint + buffers_clean + buffers_backend FROM pg_stat_bgwriter", &[])
            .await?;
        let disk_write_count: i64 = bgwriter_row.get(0);

        metrics.insert("disk_read_count".to_string(), disk_read_count as f64);
        metrics.insert("disk_write_count".to_string(), disk_write_count as f64);
        metrics.insert("disk_read_bytes".to_string(), disk_read_count as f64 * BLOCK_SIZE_BYTES);
        metrics.insert("disk_write_bytes".to_string(), disk_write_count as f64 * BLOCK_SIZE_BYTES);

        Ok(metrics)
    }

}

#[async_trait]
impl DbOps for DbAdapter {
    /// Applies every knob in `configuration` via `ALTER SYSTEM SET`, then
    /// restarts. Returns `false` without restarting if any knob failed to
    /// apply (§4.1, §7).
    async fn apply(&self, space: &KnobSpace, configuration: &Configuration) -> Result<bool> {
        let client = self.connect().await?;
        let mut all_ok = true;
        for (name, value) in configuration.iter() {
            let Some(knob) = space.get(name) else {
                warn!(knob = name, "unknown knob in configuration, skipping");
                all_ok = false;
                continue;
            };
            if let Err(e) = self.set_knob(&client, name, knob.kind, value).await {
                warn!(knob = name, error = %e, "failed to apply knob");
                all_ok = false;
            }
        }
        if !all_ok {
            return Ok(false);
        }
        Ok(DbOps::restart(self).await?)
    }

    /// Stops then starts the cluster via the platform control tool. On a
    /// failed start, purges overrides and retries once (§4.1, §7).
    async fn restart(&self) -> Result<bool> {
        self.run_cluster_ctl("stop", RESTART_STOP_TIMEOUT).await?;
        if self.run_cluster_ctl("start", RESTART_START_TIMEOUT).await.is_ok() {
            return Ok(true);
        }
        warn!("cluster failed to start, purging overrides and retrying once");
        DbOps::purge_overrides(self)?;
        Ok(self.run_cluster_ctl("start", RESTART_START_TIMEOUT).await.is_ok())
    }

    /// Deletes the persisted-override file if present. Safe if absent.
    fn purge_overrides(&self) -> Result<()> {
        let path = self.auto_conf_path();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "purged persisted overrides");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DbTuneError::Io(e)),
        }
    }

    /// Resets all knobs to server defaults and reloads configuration,
    /// without restarting. Used before every baseline run (§4.1).
    async fn reset_to_defaults(&self) -> Result<()> {
        let client = self.connect().await?;
        client.batch_execute("ALTER SYSTEM RESET ALL;").await?;
        client.execute("SELECT pg_reload_conf()", &[]).await?;
        Ok(())
    }

    /// Resets server-internal statistics counters, including the
    /// shared bgwriter counters `fetch_counters` reads back. Tolerates
    /// errors silently, matching the original's non-fatal reset (§4.1).
    async fn reset_counters(&self) {
        let Ok(client) = self.connect().await else {
            return;
        };
        let _ = client.execute("SELECT pg_stat_reset()", &[]).await;
        let _ = client.execute("SELECT pg_stat_reset_shared('bgwriter')", &[]).await;
    }

    /// Samples database and block-I/O counters. On any query error,
    /// returns a zero-filled map rather than propagating (§4.1, §7).
    async fn fetch_counters(&self) -> InternalMetrics {
        match self.fetch_counters_inner().await {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "fetch_counters failed, returning zeroed metrics");
                zeroed_metrics()
            }
        }
    }

    /// Runs a workload file as one batch, for the baseline record only.
    async fn run_default_workload(&self, path: &Path) -> Result<()> {
        let client = self.connect().await?;
        let sql = std::fs::read_to_string(path)?;
        client.batch_execute(&sql).await?;
        Ok(())
    }

    /// A cheap clone of the underlying connection config, for executors
    /// that need to open their own connections (§4.2).
    fn config_snapshot(&self) -> DatabaseConfig {
        self.config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_metrics_has_every_expected_counter() {
        let metrics = zeroed_metrics();
        for key in [
            "xact_commit",
            "disk_read_bytes",
            "disk_write_bytes",
            "tup_inserted",
            "conflicts",
        ] {
            assert_eq!(metrics.get(key), Some(&0.0));
        }
    }

    #[test]
    fn auto_conf_path_is_under_data_path() {
        let config = DatabaseConfig {
            data_path: "/var/lib/postgresql/12/main".to_string(),
            ..Default::default()
        };
        let adapter = DbAdapter::new(config);
        assert_eq!(
            adapter.auto_conf_path(),
            PathBuf::from("/var/lib/postgresql/12/main/postgresql.auto.conf")
        );
    }

    #[test]
    fn purge_overrides_is_safe_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            data_path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let adapter = DbAdapter::new(config);
        assert!(adapter.purge_overrides().is_ok());
    }

    #[test]
    fn purge_overrides_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let auto_conf = dir.path().join("postgresql.auto.conf");
        std::fs::write(&auto_conf, "shared_buffers = '999MB'\n").unwrap();
        let config = DatabaseConfig {
            data_path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        };
        let adapter = DbAdapter::new(config);
        adapter.purge_overrides().unwrap();
        assert!(!auto_conf.exists());
    }
}
