//! Flow records and the concurrent flow log.
//!
//! Flow tasks append completed measurements to a shared [`FlowLog`]. Once
//! every task has joined, the log is consumed into a [`FlowData`] document,
//! the only type that exposes the records for reading. This keeps reads
//! strictly behind the join barrier.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::units::Bytes;

/// Initial log capacity, sized so bursty completion does not reallocate.
pub const FLOW_INIT_CAP: usize = 16_384;

/// One completed flow.
///
/// `start` and `end` are monotonic offsets from the start of the test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub start: Duration,
    pub end: Duration,
    pub length: Bytes,
}

impl FlowRecord {
    /// Flow completion time.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Append-only, thread-safe store of flow records.
#[derive(Debug)]
pub struct FlowLog {
    flows: Mutex<Vec<FlowRecord>>,
}

impl Default for FlowLog {
    fn default() -> Self {
        Self::with_capacity(FLOW_INIT_CAP)
    }
}

impl FlowLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flows: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Append a record. Records land in completion order.
    pub fn append(&self, record: FlowRecord) {
        // A panic while holding the lock cannot leave the Vec half-written,
        // so a poisoned lock is still safe to use.
        let mut flows = self.flows.lock().unwrap_or_else(|e| e.into_inner());
        flows.push(record);
    }

    pub fn len(&self) -> usize {
        self.flows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the log into a run document.
    pub fn into_data(self, start: DateTime<Utc>, end: DateTime<Utc>) -> FlowData {
        let flows = self.flows.into_inner().unwrap_or_else(|e| e.into_inner());
        FlowData { start, end, flows }
    }
}

/// Everything gathered during one test run.
///
/// This is the document exchanged between a generator process and an
/// external analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub flows: Vec<FlowRecord>,
}

impl FlowData {
    /// Per-flow completion times, in log order.
    pub fn durations(&self) -> Vec<Duration> {
        self.flows.iter().map(FlowRecord::duration).collect()
    }

    /// Sum of all received lengths.
    pub fn total_length(&self) -> Bytes {
        self.flows.iter().map(|f| f.length).sum()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
