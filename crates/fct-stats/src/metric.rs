use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::harm::Harm;

/// Milliseconds with `prec` decimals, e.g. `12.3ms`.
pub fn format_millis(d: Duration, prec: usize) -> String {
    format!("{:.prec$}ms", d.as_secs_f64() * 1000.0)
}

/// A flow completion time statistic, with its harm once a baseline is
/// known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fct {
    pub duration: Duration,
    pub harm: Option<Harm>,
}

impl Fct {
    pub fn new(duration: Duration) -> Self {
        Fct {
            duration,
            harm: None,
        }
    }

    /// From a duration in fractional nanoseconds, rounded to the nearest
    /// nanosecond.
    pub fn from_nanos_f64(nanos: f64) -> Self {
        Fct::new(Duration::from_nanos(nanos.max(0.0).round() as u64))
    }

    /// Set harm relative to the same statistic measured solo.
    pub fn set_harm(&mut self, solo: &Fct) {
        self.harm = Some(Harm::less_is_better(
            solo.duration.as_secs_f64(),
            self.duration.as_secs_f64(),
        ));
    }
}

impl fmt::Display for Fct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = format_millis(self.duration, 1);
        match self.harm {
            Some(h) if !h.is_zero() => write!(f, "{ms} ({h})"),
            _ => f.write_str(&ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_without_harm() {
        let fct = Fct::new(Duration::from_micros(12_345));
        assert_eq!(fct.to_string(), "12.3ms");
    }

    #[test]
    fn display_with_harm() {
        let solo = Fct::new(Duration::from_millis(100));
        let mut fct = Fct::new(Duration::from_millis(150));
        fct.set_harm(&solo);
        assert_eq!(fct.to_string(), "150.0ms (0.333)");

        // an improvement clamps to zero harm and is not shown
        let mut faster = Fct::new(Duration::from_millis(50));
        faster.set_harm(&solo);
        assert_eq!(faster.harm, Some(Harm::ZERO));
        assert_eq!(faster.to_string(), "50.0ms");
    }

    #[test]
    fn zero_duration_is_invalid_harm() {
        let solo = Fct::new(Duration::from_millis(100));
        let mut fct = Fct::new(Duration::ZERO);
        fct.set_harm(&solo);
        assert_eq!(fct.to_string(), "0.0ms (!(inf))");
    }
}
