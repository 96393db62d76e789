use fct_common::{Bytes, FlowData};
use thiserror::Error;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid workload parameters: {0}")]
    Parse(String),
    #[error("mean arrival time must be greater than zero")]
    ZeroMeanArrival,
    #[error("arrival rate must be a positive number, got {0}")]
    ArrivalRate(f64),
    #[error("flow length percentiles must satisfy 0 < p5 <= p95 (p5={p5}, p95={p95})")]
    Percentiles { p5: Bytes, p95: Bytes },
}

/// Failure of a single flow's request/response cycle.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("client received: {0}")]
    Status(reqwest::StatusCode),
    #[error("flow cancelled")]
    Cancelled,
}

/// A run that stopped on a flow failure.
///
/// `partial` holds every flow that completed before all tasks joined.
#[derive(Debug, Error)]
#[error("workload aborted after {} completed flows: {source}", .partial.len())]
pub struct RunError {
    #[source]
    pub source: FlowError,
    pub partial: FlowData,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}
