//! # Arrival and flow-size distributions
//!
//! Inter-arrival waits are exponential and flow sizes are lognormal,
//! calibrated from a pair of percentiles. Both samplers only need a uniform
//! source, so they work with any `rand` generator.

use rand::Rng;
use rand::RngExt;

/// One-sided 95% quantile of the standard normal distribution.
pub const Z_95: f64 = 1.645;

/// Exponential distribution with the given rate (λ).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Exponential {
    pub rate: f64,
}

impl Exponential {
    pub fn new(rate: f64) -> Self {
        Exponential { rate }
    }

    pub fn mean(&self) -> f64 {
        1.0 / self.rate
    }

    /// Inverse-CDF sample.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        // `random` is in [0, 1); flip it so ln never sees zero.
        let u: f64 = 1.0 - rng.random::<f64>();
        -u.ln() / self.rate
    }
}

/// Lognormal distribution: `ln X ~ N(mu, sigma²)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormal {
    pub mu: f64,
    pub sigma: f64,
}

impl LogNormal {
    /// Calibrate so that the 5th and 95th percentiles equal `p5` and `p95`.
    ///
    /// Both inputs must be positive with `p5 <= p95`.
    pub fn from_percentiles(p5: f64, p95: f64) -> Self {
        let l5 = p5.ln();
        let l95 = p95.ln();
        LogNormal {
            mu: (l5 + l95) / 2.0,
            sigma: (l95 - l5) / (2.0 * Z_95),
        }
    }

    /// `exp(mu + sigma²/2)`.
    pub fn mean(&self) -> f64 {
        (self.mu + 0.5 * self.sigma.powi(2)).exp()
    }

    /// Value at `z` standard deviations of the underlying normal.
    pub fn at_z(&self, z: f64) -> f64 {
        (self.mu + z * self.sigma).exp()
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        (self.mu + self.sigma * standard_normal(rng)).exp()
    }
}

/// Box-Muller standard normal.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random();
    (-2.0_f64 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    proptest! {
        #[test]
        fn lognormal_hits_percentiles(p5 in 1.0f64..1e6, ratio in 1.0f64..1e4) {
            let p95 = p5 * ratio;
            let d = LogNormal::from_percentiles(p5, p95);
            prop_assert!((d.at_z(-Z_95) - p5).abs() <= p5 * 1e-9);
            prop_assert!((d.at_z(Z_95) - p95).abs() <= p95 * 1e-9);
        }
    }

    #[test]
    fn lognormal_default_mean() {
        // 64 KiB / 2 MiB is the stock workload
        let d = LogNormal::from_percentiles(65_536.0, 2_097_152.0);
        let expected = (d.mu + d.sigma * d.sigma / 2.0).exp();
        assert!((d.mean() - expected).abs() < 1e-6);
        assert!(d.mean() > 65_536.0 && d.mean() < 2_097_152.0);
    }

    #[test]
    fn exponential_sample_mean_converges() {
        let mut rng = StdRng::seed_from_u64(7);
        let d = Exponential::new(1.0);
        let n = 200_000;
        let mean: f64 = (0..n).map(|_| d.sample(&mut rng)).sum::<f64>() / n as f64;
        assert!((mean - 1.0).abs() < 0.02, "mean {mean}");
    }

    #[test]
    fn lognormal_sample_median_near_exp_mu() {
        let mut rng = StdRng::seed_from_u64(11);
        let d = LogNormal::from_percentiles(100.0, 10_000.0);
        let mut s: Vec<f64> = (0..50_001).map(|_| d.sample(&mut rng)).collect();
        s.sort_by(f64::total_cmp);
        let median = s[s.len() / 2];
        let expected = d.mu.exp();
        assert!((median / expected - 1.0).abs() < 0.05, "median {median} vs {expected}");
    }
}
