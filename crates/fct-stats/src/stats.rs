//! Summary statistics over a run's flow completion times.

use fct_common::FlowData;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metric::Fct;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("unable to analyze empty flow durations")]
    Empty,
}

/// FCT statistics for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub geomean: Fct,
    pub median: Fct,
    pub p95: Fct,
}

impl Stats {
    /// Set each statistic's harm against the same statistic from a solo run.
    pub fn set_harm(&mut self, solo: &Stats) {
        self.geomean.set_harm(&solo.geomean);
        self.median.set_harm(&solo.median);
        self.p95.set_harm(&solo.p95);
    }

    /// Labelled statistics in display order.
    pub fn rows(&self) -> [(&'static str, Fct); 3] {
        [
            ("GeoMean", self.geomean),
            ("Median", self.median),
            ("P95", self.p95),
        ]
    }
}

/// Compute [`Stats`] over the completed flows. Harm is left unset.
pub fn analyze(data: &FlowData) -> Result<Stats, StatsError> {
    let mut nanos: Vec<f64> = data
        .durations()
        .iter()
        .map(|d| d.as_nanos() as f64)
        .collect();
    if nanos.is_empty() {
        return Err(StatsError::Empty);
    }
    nanos.sort_by(f64::total_cmp);

    let stats = Stats {
        geomean: Fct::from_nanos_f64(geometric_mean(&nanos)),
        median: Fct::from_nanos_f64(empirical_quantile(0.5, &nanos)),
        p95: Fct::from_nanos_f64(empirical_quantile(0.95, &nanos)),
    };
    tracing::debug!(
        flows = nanos.len(),
        geomean = %stats.geomean,
        median = %stats.median,
        p95 = %stats.p95,
        "analyzed flows"
    );
    Ok(stats)
}

/// `exp(mean(ln x))`. A zero sample makes the result zero.
fn geometric_mean(x: &[f64]) -> f64 {
    let sum: f64 = x.iter().map(|v| v.ln()).sum();
    (sum / x.len() as f64).exp()
}

/// Empirical quantile of a sorted, non-empty sample: the first value whose
/// cumulative share of the sample reaches `p`.
fn empirical_quantile(p: f64, sorted: &[f64]) -> f64 {
    let n = sorted.len() as f64;
    sorted
        .iter()
        .enumerate()
        .find(|(i, _)| (*i as f64 + 1.0) / n >= p)
        .map(|(_, v)| *v)
        .unwrap_or(sorted[sorted.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fct_common::{Bytes, FlowRecord};
    use std::time::Duration;

    fn data(durations_ms: &[u64]) -> FlowData {
        let now = Utc::now();
        FlowData {
            start: now,
            end: now,
            flows: durations_ms
                .iter()
                .map(|&ms| FlowRecord {
                    start: Duration::from_millis(1),
                    end: Duration::from_millis(1 + ms),
                    length: Bytes(1000),
                })
                .collect(),
        }
    }

    #[test]
    fn empty_is_an_error() {
        assert_eq!(analyze(&data(&[])), Err(StatsError::Empty));
    }

    #[test]
    fn single_flow() {
        let stats = analyze(&data(&[42])).unwrap();
        for (_, fct) in stats.rows() {
            assert_eq!(fct.duration, Duration::from_millis(42));
            assert_eq!(fct.harm, None);
        }
    }

    #[test]
    fn quantiles_are_sample_values() {
        // unsorted input, log order is completion order
        let stats = analyze(&data(&[40, 10, 30, 20])).unwrap();
        assert_eq!(stats.median.duration, Duration::from_millis(20));
        assert_eq!(stats.p95.duration, Duration::from_millis(40));
    }

    #[test]
    fn p95_of_twenty() {
        let ms: Vec<u64> = (1..=20).collect();
        let stats = analyze(&data(&ms)).unwrap();
        assert_eq!(stats.median.duration, Duration::from_millis(10));
        assert_eq!(stats.p95.duration, Duration::from_millis(19));
    }

    #[test]
    fn geomean_of_powers() {
        let stats = analyze(&data(&[10, 1000])).unwrap();
        let got = stats.geomean.duration.as_secs_f64() * 1000.0;
        assert!((got - 100.0).abs() < 1e-3, "geomean {got}");
    }

    #[test]
    fn set_harm_per_channel() {
        let solo = analyze(&data(&[10, 10, 10])).unwrap();
        let mut loaded = analyze(&data(&[20, 20, 20])).unwrap();
        loaded.set_harm(&solo);
        for (_, fct) in loaded.rows() {
            let h = fct.harm.unwrap();
            assert!((h.get() - 0.5).abs() < 1e-9);
        }
    }
}
