//! Statistics over completed flows, and the harm metric used to compare a
//! run against its solo baseline.

pub mod harm;
pub mod metric;
pub mod stats;

pub use harm::Harm;
pub use metric::Fct;
pub use stats::{Stats, StatsError, analyze};
