//! Workload executors: OLAP (in-process multi-worker query runner) and
//! OLTP (external benchmark harness driver), §4.2/§4.3.

pub mod olap;
pub mod oltp;

pub use olap::OlapExecutor;
pub use oltp::OltpExecutor;

/// Result of running one iteration's workload, regardless of executor
/// kind (§4.2 result shape, reused verbatim by OLTP per §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkloadResult {
    pub avg_time_per_query: f64,
    pub throughput_qps: f64,
}

/// Sentinel latency assigned to an invalidated iteration (§9).
pub const INVALID_LATENCY_SECS: f64 = 1e9;
