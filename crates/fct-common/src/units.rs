//! Byte counts and bitrates.

use std::fmt;

use serde::{Deserialize, Serialize};

// ─── Bytes ──────────────────────────────────────────────────────────────────

/// A number of bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytes(pub u64);

impl Bytes {
    pub const BYTE: Bytes = Bytes(1);
    pub const KIB: Bytes = Bytes(1024);
    pub const MIB: Bytes = Bytes(1024 * 1024);
    pub const GIB: Bytes = Bytes(1024 * 1024 * 1024);

    pub const fn kib(n: u64) -> Bytes {
        Bytes(n * 1024)
    }

    pub const fn mib(n: u64) -> Bytes {
        Bytes(n * 1024 * 1024)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Bytes {
    type Output = Bytes;

    fn add(self, rhs: Bytes) -> Bytes {
        Bytes(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Bytes {
    fn sum<I: Iterator<Item = Bytes>>(iter: I) -> Bytes {
        Bytes(iter.map(|b| b.0).sum())
    }
}

// ─── Bitrate ────────────────────────────────────────────────────────────────

/// A bitrate in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitrate(pub u64);

const STD_UNITS: [&str; 4] = ["Kbps", "Mbps", "Gbps", "Tbps"];
const QDISC_UNITS: [&str; 4] = ["Kbit", "Mbit", "Gbit", "Tbit"];

impl Bitrate {
    pub const BPS: Bitrate = Bitrate(1);
    pub const KBPS: Bitrate = Bitrate(1_000);
    pub const MBPS: Bitrate = Bitrate(1_000_000);
    pub const GBPS: Bitrate = Bitrate(1_000_000_000);
    pub const TBPS: Bitrate = Bitrate(1_000_000_000_000);

    pub const fn mbps(n: u64) -> Bitrate {
        Bitrate(n * 1_000_000)
    }

    pub fn from_bps_f64(bps: f64) -> Bitrate {
        Bitrate(bps.max(0.0) as u64)
    }

    pub fn as_kbps(self) -> f64 {
        self.0 as f64 / Self::KBPS.0 as f64
    }

    pub fn as_mbps(self) -> f64 {
        self.0 as f64 / Self::MBPS.0 as f64
    }

    pub fn as_gbps(self) -> f64 {
        self.0 as f64 / Self::GBPS.0 as f64
    }

    pub fn as_tbps(self) -> f64 {
        self.0 as f64 / Self::TBPS.0 as f64
    }

    /// Format for Linux qdisc parameters, e.g. `50Mbit`.
    pub fn qdisc(self) -> String {
        self.format(&QDISC_UNITS)
    }

    fn format(self, units: &[&str; 4]) -> String {
        let b = self.0;
        let (value, prec, unit) = match b {
            _ if b < Self::KBPS.0 => return format!("{b}bps"),
            _ if b < 10 * Self::KBPS.0 => (self.as_kbps(), 3, units[0]),
            _ if b < 100 * Self::KBPS.0 => (self.as_kbps(), 2, units[0]),
            _ if b < Self::MBPS.0 => (self.as_kbps(), 1, units[0]),
            _ if b < 10 * Self::MBPS.0 => (self.as_mbps(), 3, units[1]),
            _ if b < 100 * Self::MBPS.0 => (self.as_mbps(), 2, units[1]),
            _ if b < Self::GBPS.0 => (self.as_mbps(), 1, units[1]),
            _ if b < 10 * Self::GBPS.0 => (self.as_gbps(), 3, units[2]),
            _ if b < 100 * Self::GBPS.0 => (self.as_gbps(), 2, units[2]),
            _ if b < Self::TBPS.0 => (self.as_gbps(), 1, units[2]),
            _ => (self.as_tbps(), 3, units[3]),
        };
        format!("{}{unit}", trim_float(value, prec))
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(&STD_UNITS))
    }
}

/// Format `value` with `prec` decimals, dropping trailing zeros and a
/// trailing decimal point.
pub fn trim_float(value: f64, prec: usize) -> String {
    let s = format!("{value:.prec$}");
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_formats() {
        assert_eq!(Bitrate(500).to_string(), "500bps");
        assert_eq!(Bitrate(1_500).to_string(), "1.5Kbps");
        assert_eq!(Bitrate::mbps(50).to_string(), "50Mbps");
        assert_eq!(Bitrate::mbps(50).qdisc(), "50Mbit");
        assert_eq!(Bitrate(12_345_678).to_string(), "12.35Mbps");
        assert_eq!(Bitrate(2_500_000_000).qdisc(), "2.5Gbit");
    }

    #[test]
    fn trim_float_drops_zeros() {
        assert_eq!(trim_float(10.0, 1), "10");
        assert_eq!(trim_float(10.26, 1), "10.3");
        assert_eq!(trim_float(0.5, 3), "0.5");
    }

    #[test]
    fn byte_constants() {
        assert_eq!(Bytes::kib(64).get(), 65_536);
        assert_eq!(Bytes::mib(2), Bytes(2 * 1024 * 1024));
        let total: Bytes = [Bytes(1), Bytes(2), Bytes(3)].into_iter().sum();
        assert_eq!(total, Bytes(6));
    }
}
