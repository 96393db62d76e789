//! Workload parameters and the immutable plan derived from them.
//!
//! [`WorkloadParams`] is the user-facing input: every field is optional and
//! it deserializes from JSON or TOML. [`WorkloadParams::resolve`] applies the
//! defaults, validates, and computes a [`WorkloadPlan`] that is never mutated
//! while a test runs.

use std::time::Duration;

use fct_common::{Bitrate, Bytes, ProtocolConfig};
use serde::{Deserialize, Serialize};

use crate::dist::{Exponential, LogNormal};
use crate::error::ConfigError;

pub const DEFAULT_ADDR: &str = "localhost";
pub const DEFAULT_CCA: &str = "cubic";
pub const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_MEAN_ARRIVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_ARRIVAL_RATE: f64 = 1.0;
pub const DEFAULT_LEN_P5: Bytes = Bytes::kib(64);
pub const DEFAULT_LEN_P95: Bytes = Bytes::mib(2);

/// Test parameters. Unset fields take the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadParams {
    /// Server `host[:port]`.
    pub addr: Option<String>,
    /// CCA requested from the server. An empty string sends no CCA header.
    pub cca: Option<String>,
    pub duration_ms: Option<u64>,
    /// Mean time between flow arrivals.
    pub mean_arrival_ms: Option<u64>,
    /// Rate parameter of the unit exponential arrival distribution.
    pub arrival_rate: Option<f64>,
    /// 5th percentile of the lognormal flow length distribution.
    pub len_p5: Option<Bytes>,
    /// 95th percentile of the lognormal flow length distribution.
    pub len_p95: Option<Bytes>,
    /// Pre-sample the whole run and reserve log capacity before timing starts.
    pub low_noise: bool,
    /// Seed for the arrival and length samplers.
    pub seed: Option<u64>,
}

impl WorkloadParams {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as u64);
        self
    }

    pub fn with_mean_arrival(mut self, mean_arrival: Duration) -> Self {
        self.mean_arrival_ms = Some(mean_arrival.as_millis() as u64);
        self
    }

    /// Apply defaults and derive the run plan.
    pub fn resolve(&self, protocol: &ProtocolConfig) -> Result<WorkloadPlan, ConfigError> {
        let addr = self
            .addr
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ADDR);
        let addr = protocol.normalize_addr(addr);
        let url = format!("http://{addr}{}", protocol.path);

        let cca = match self.cca.as_deref().map(str::trim) {
            None => Some(DEFAULT_CCA.to_string()),
            Some("") => None,
            Some(c) => Some(c.to_string()),
        };

        let duration = self
            .duration_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_DURATION);
        let mean_arrival = self
            .mean_arrival_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_MEAN_ARRIVAL);
        if mean_arrival.is_zero() {
            return Err(ConfigError::ZeroMeanArrival);
        }

        let arrival_rate = self.arrival_rate.unwrap_or(DEFAULT_ARRIVAL_RATE);
        if !(arrival_rate.is_finite() && arrival_rate > 0.0) {
            return Err(ConfigError::ArrivalRate(arrival_rate));
        }

        let len_p5 = self.len_p5.unwrap_or(DEFAULT_LEN_P5);
        let len_p95 = self.len_p95.unwrap_or(DEFAULT_LEN_P95);
        if len_p5.get() == 0 || len_p5 > len_p95 {
            return Err(ConfigError::Percentiles {
                p5: len_p5,
                p95: len_p95,
            });
        }

        let flows = flow_count(duration, mean_arrival);
        let length = LogNormal::from_percentiles(len_p5.get() as f64, len_p95.get() as f64);
        let mean_len = length.mean();
        let bandwidth = if duration.is_zero() {
            Bitrate(0)
        } else {
            Bitrate::from_bps_f64(flows as f64 / duration.as_secs_f64() * mean_len * 8.0)
        };

        if arrival_rate != 1.0 {
            tracing::warn!(
                arrival_rate,
                mean_arrival_ms = mean_arrival.as_millis() as u64,
                realized_mean_ms = mean_arrival.as_secs_f64() * 1000.0 / arrival_rate,
                "arrival rate != 1.0, realized mean arrival differs from configured mean"
            );
        }

        Ok(WorkloadPlan {
            addr,
            url,
            cca,
            duration,
            mean_arrival,
            len_p5,
            len_p95,
            low_noise: self.low_noise,
            seed: self.seed,
            flows,
            arrival: Exponential::new(arrival_rate),
            length,
            mean_flow_len: Bytes(mean_len as u64),
            bandwidth,
        })
    }
}

/// `floor(duration / mean_arrival)`.
pub fn flow_count(duration: Duration, mean_arrival: Duration) -> usize {
    (duration.as_nanos() / mean_arrival.as_nanos()) as usize
}

/// Fully resolved, immutable test plan.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadPlan {
    /// Server `host:port`.
    pub addr: String,
    pub url: String,
    pub cca: Option<String>,
    pub duration: Duration,
    pub mean_arrival: Duration,
    pub len_p5: Bytes,
    pub len_p95: Bytes,
    pub low_noise: bool,
    pub seed: Option<u64>,
    /// Number of flows that will be issued.
    pub flows: usize,
    /// Unit-scale inter-arrival distribution, multiplied by `mean_arrival`.
    pub arrival: Exponential,
    pub length: LogNormal,
    pub mean_flow_len: Bytes,
    /// Estimated offered load.
    pub bandwidth: Bitrate,
}

impl WorkloadPlan {
    /// Wait before the next arrival, given a unit-scale sample.
    pub fn scale_wait(&self, unit_sample: f64) -> Duration {
        Duration::from_secs_f64(unit_sample * self.mean_arrival.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_resolve() {
        let plan = WorkloadParams::default()
            .resolve(&ProtocolConfig::default())
            .unwrap();
        assert_eq!(plan.addr, "localhost:8188");
        assert_eq!(plan.url, "http://localhost:8188/fct");
        assert_eq!(plan.cca.as_deref(), Some("cubic"));
        assert_eq!(plan.duration, Duration::from_secs(10));
        assert_eq!(plan.flows, 50);
        assert_eq!(plan.arrival.rate, 1.0);
        assert!(plan.mean_flow_len > DEFAULT_LEN_P5 && plan.mean_flow_len < DEFAULT_LEN_P95);
    }

    #[test]
    fn bandwidth_is_rate_times_mean_len() {
        let plan = WorkloadParams::default()
            .with_duration(Duration::from_secs(10))
            .with_mean_arrival(Duration::from_secs(1))
            .resolve(&ProtocolConfig::default())
            .unwrap();
        let expected = 10.0 / 10.0 * plan.length.mean() * 8.0;
        assert_eq!(plan.bandwidth, Bitrate::from_bps_f64(expected));
    }

    #[test]
    fn empty_cca_disables_header() {
        let params = WorkloadParams {
            cca: Some(String::new()),
            ..Default::default()
        };
        let plan = params.resolve(&ProtocolConfig::default()).unwrap();
        assert!(plan.cca.is_none());
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let p = ProtocolConfig::default();
        let zero_arrival = WorkloadParams {
            mean_arrival_ms: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero_arrival.resolve(&p), Err(ConfigError::ZeroMeanArrival)));

        let inverted = WorkloadParams {
            len_p5: Some(Bytes(1000)),
            len_p95: Some(Bytes(10)),
            ..Default::default()
        };
        assert!(matches!(inverted.resolve(&p), Err(ConfigError::Percentiles { .. })));

        let bad_rate = WorkloadParams {
            arrival_rate: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(bad_rate.resolve(&p), Err(ConfigError::ArrivalRate(_))));
    }

    #[test]
    fn parses_json_and_toml() {
        let json = r#"{"addr":"10.12.1.2","duration_ms":5000,"len_p5":1000,"len_p95":5000}"#;
        let params = WorkloadParams::from_json_str(json).unwrap();
        assert_eq!(params.addr.as_deref(), Some("10.12.1.2"));
        assert_eq!(params.len_p95, Some(Bytes(5000)));

        let toml = r#"
            addr = "server"
            mean_arrival_ms = 100
            low_noise = true
        "#;
        let params = WorkloadParams::from_toml_str(toml).unwrap();
        assert_eq!(params.mean_arrival_ms, Some(100));
        assert!(params.low_noise);
    }

    proptest! {
        #[test]
        fn flow_count_is_floor(d_ms in 0u64..1_000_000, a_ms in 1u64..10_000) {
            let n = flow_count(Duration::from_millis(d_ms), Duration::from_millis(a_ms));
            prop_assert_eq!(n as u64, d_ms / a_ms);
        }
    }
}
