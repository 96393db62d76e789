//! Command-line front ends for the FCT toolkit.
//!
//! - `fct`: workload client, FCT server, and a JSON mode that reads workload
//!   parameters on stdin and writes the flow data document to stdout
//! - `ccafct`: measures the harm a competing CCA does to FCT across a set of
//!   path RTTs, using a network namespace rig

pub mod harness;
pub mod report;
pub mod settings;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Logs go to stderr so stdout carries only
/// program output.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
