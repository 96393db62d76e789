//! Harm of a competing flow on a measured metric.
//!
//! Harm compares a metric measured alone (`solo`) with the same metric
//! measured under competition (`workload`). Valid harm lies in `[0, 1]`;
//! improvements clamp to zero. Inputs for which harm is undefined yield
//! [`Harm::INFINITY`], which is reported as invalid rather than as zero.
//!
//! Reference: Ware et al., "Beyond Jain's Fairness Index: Setting the Bar
//! for the Deployment of Congestion Control Algorithms", HotNets 2019.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Harm(pub f64);

impl Harm {
    pub const ZERO: Harm = Harm(0.0);

    /// Sentinel for undefined harm.
    pub const INFINITY: Harm = Harm(f64::INFINITY);

    /// Harm for a metric where smaller values are better (FCT, RTT).
    pub fn less_is_better(solo: f64, workload: f64) -> Harm {
        if workload == 0.0 {
            return Harm::INFINITY;
        }
        if workload < solo {
            return Harm::ZERO;
        }
        Harm((workload - solo) / workload)
    }

    /// Harm for a metric where larger values are better (throughput).
    pub fn more_is_better(solo: f64, workload: f64) -> Harm {
        if solo == 0.0 {
            return Harm::INFINITY;
        }
        if workload > solo {
            return Harm::ZERO;
        }
        Harm((solo - workload) / solo)
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn is_invalid(self) -> bool {
        !(0.0..=1.0).contains(&self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0.0
    }

    pub fn is_nonzero(self) -> bool {
        self.0 > 0.0 && !self.is_invalid()
    }
}

impl fmt::Display for Harm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "!({:.3})", self.0)
        } else {
            write!(f, "{:.3}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn less_is_better_reference_points() {
        assert_eq!(Harm::less_is_better(100.0, 100.0), Harm::ZERO);
        let h = Harm::less_is_better(100.0, 150.0);
        assert!((h.get() - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(Harm::less_is_better(100.0, 50.0), Harm::ZERO);
        assert_eq!(Harm::less_is_better(100.0, 0.0), Harm::INFINITY);
        assert!(Harm::less_is_better(100.0, 0.0).is_invalid());
    }

    #[test]
    fn more_is_better_reference_points() {
        assert_eq!(Harm::more_is_better(100.0, 100.0), Harm::ZERO);
        assert_eq!(Harm::more_is_better(100.0, 150.0), Harm::ZERO);
        assert_eq!(Harm::more_is_better(100.0, 25.0), Harm(0.75));
        assert_eq!(Harm::more_is_better(0.0, 10.0), Harm::INFINITY);
        // total starvation is maximal but still valid
        assert_eq!(Harm::more_is_better(100.0, 0.0), Harm(1.0));
    }

    #[test]
    fn display() {
        assert_eq!(Harm(1.0 / 3.0).to_string(), "0.333");
        assert_eq!(Harm::ZERO.to_string(), "0.000");
        assert_eq!(Harm::INFINITY.to_string(), "!(inf)");
    }

    #[test]
    fn predicates() {
        assert!(Harm::ZERO.is_zero());
        assert!(!Harm::ZERO.is_nonzero());
        assert!(Harm(0.5).is_nonzero());
        assert!(!Harm::INFINITY.is_nonzero());
        assert!(Harm(-0.1).is_invalid());
    }

    proptest! {
        #[test]
        fn less_is_better_stays_in_unit_range(solo in 0.0f64..1e12, workload in 1e-9f64..1e12) {
            let h = Harm::less_is_better(solo, workload);
            prop_assert!(!h.is_invalid());
            if workload < solo {
                prop_assert!(h.is_zero());
            }
        }

        #[test]
        fn more_is_better_stays_in_unit_range(solo in 1e-9f64..1e12, workload in 0.0f64..1e12) {
            let h = Harm::more_is_better(solo, workload);
            prop_assert!(!h.is_invalid());
        }
    }
}
