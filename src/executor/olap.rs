//! OLAPExecutor: partitions a query file across N workers, each with its
//! own connection, and computes exact wall-clock throughput/latency
//! (§4.2).

use std::time::Instant;

use tracing::warn;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::executor::{WorkloadResult, INVALID_LATENCY_SECS};

const MAX_QUERIES: usize = 3000;

/// Splits a workload file into individual statements. Either `;` or a
/// newline may terminate a statement; each fragment is stripped and
/// re-suffixed with `;`; a trailing empty fragment is dropped; the list
/// is truncated to `MAX_QUERIES` (§4.2 Parsing).
pub fn parse_queries(text: &str) -> Vec<String> {
    let mut queries: Vec<String> = text
        .split(|c| c == ';' || c == '\n')
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .map(|q| format!("{q};"))
        .collect();
    queries.truncate(MAX_QUERIES);
    queries
}

/// Assigns query `i` to worker `i mod worker_count`, stable across
/// iterations (§3 WorkloadPartition, §4.2 Partitioning).
pub fn partition(queries: &[String], worker_count: usize) -> Vec<Vec<String>> {
    let mut partitions = vec![Vec::new(); worker_count.max(1)];
    for (i, query) in queries.iter().enumerate() {
        partitions[i % worker_count.max(1)].push(query.clone());
    }
    partitions
}

struct WorkerStats {
    successful_queries: usize,
    latency_sum_secs: f64,
    error_count: usize,
}

async fn run_worker(config: DatabaseConfig, queries: Vec<String>) -> Result<WorkerStats> {
    let conn_str = format!(
        "host={} port={} dbname={} user={} password={}",
        config.host, config.port, config.database, config.user, config.password
    );
    let (client, connection) = tokio_postgres::connect(&conn_str, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let mut stats = WorkerStats {
        successful_queries: 0,
        latency_sum_secs: 0.0,
        error_count: 0,
    };

    for query in &queries {
        let start = Instant::now();
        let result = client.simple_query(query).await;
        match result {
            Ok(_) => {
                // autocommit: the simple-query protocol commits each
                // statement implicitly, matching per-query commit timing.
                stats.latency_sum_secs += start.elapsed().as_secs_f64();
                stats.successful_queries += 1;
            }
            Err(e) => {
                warn!(query, error = %e, "query failed");
                stats.error_count += 1;
            }
        }
    }

    Ok(stats)
}

/// A fixed query partition bound to a worker count, run once per
/// tuning iteration (§5: the partition never changes across iterations).
pub struct OlapExecutor {
    database: DatabaseConfig,
    partitions: Vec<Vec<String>>,
}

impl OlapExecutor {
    pub fn new(database: DatabaseConfig, workload_text: &str, worker_count: usize) -> Self {
        let queries = parse_queries(workload_text);
        let partitions = partition(&queries, worker_count);
        Self { database, partitions }
    }

    pub fn total_queries(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Runs all workers concurrently, joins, and computes qps/avg_latency.
    /// Any worker error or join failure invalidates the iteration (§4.2).
    pub async fn run(&self) -> WorkloadResult {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(self.partitions.len());
        for partition in &self.partitions {
            let database = self.database.clone();
            let queries = partition.clone();
            handles.push(tokio::spawn(run_worker(database, queries)));
        }

        let mut total_queries = 0usize;
        let mut total_latency_sum = 0.0f64;
        let mut invalid = false;

        for handle in handles {
            match handle.await {
                Ok(Ok(stats)) => {
                    if stats.error_count > 0 {
                        invalid = true;
                    }
                    total_queries += stats.successful_queries;
                    total_latency_sum += stats.latency_sum_secs;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "worker failed to connect");
                    invalid = true;
                }
                Err(e) => {
                    warn!(error = %e, "worker task panicked or was cancelled");
                    invalid = true;
                }
            }
        }

        let wall_time = start.elapsed().as_secs_f64();

        if invalid {
            return WorkloadResult {
                avg_time_per_query: INVALID_LATENCY_SECS,
                throughput_qps: 0.0,
            };
        }

        let qps = if wall_time > 0.0 { total_queries as f64 / wall_time } else { 0.0 };
        let avg_latency = if total_queries > 0 { total_latency_sum / total_queries as f64 } else { 0.0 };

        WorkloadResult {
            avg_time_per_query: avg_latency,
            throughput_qps: qps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_semicolon_and_newline() {
        let text = "SELECT 1;\nSELECT 2\nSELECT 3;";
        let queries = parse_queries(text);
        assert_eq!(queries, vec!["SELECT 1;", "SELECT 2;", "SELECT 3;"]);
    }

    #[test]
    fn parse_drops_trailing_empty_fragment() {
        let text = "SELECT 1;\n\n";
        let queries = parse_queries(text);
        assert_eq!(queries, vec!["SELECT 1;"]);
    }

    #[test]
    fn parse_truncates_to_max_queries() {
        let text = "SELECT 1;\n".repeat(MAX_QUERIES + 50);
        let queries = parse_queries(&text);
        assert_eq!(queries.len(), MAX_QUERIES);
    }

    #[test]
    fn partition_is_round_robin_and_covers_every_query() {
        let queries: Vec<String> = (0..7).map(|i| format!("Q{i};")).collect();
        let parts = partition(&queries, 3);
        assert_eq!(parts.len(), 3);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        assert_eq!(total, 7);
        for p in &parts {
            assert!(p.len() == 2 || p.len() == 3);
        }
    }

    #[test]
    fn partition_with_one_query_and_many_workers() {
        let queries = vec!["SELECT 1;".to_string()];
        let parts = partition(&queries, 4);
        assert_eq!(parts[0].len(), 1);
        for p in &parts[1..] {
            assert!(p.is_empty());
        }
    }

    #[test]
    fn empty_workload_produces_no_partitions_with_queries() {
        let queries = parse_queries("");
        let parts = partition(&queries, 2);
        assert_eq!(parts.iter().map(|p| p.len()).sum::<usize>(), 0);
    }
}
