//! Congestion control algorithm flow completion time test.
//!
//! Needs root (network namespaces, qdiscs, sysctls), `iperf3`, and the `fct`
//! binary next to this one or at `fct_bin` in the settings file.

use std::path::PathBuf;

use clap::Parser;
use fct_cli::harness::{DESCRIPTION, Harness, intro};
use fct_cli::init_tracing;
use fct_cli::report::results_table;
use fct_cli::settings::{DEFAULT_COMPETITOR_CCA, HarnessSettings};
use fct_common::Cancel;

#[derive(Parser, Debug)]
#[command(
    name = "ccafct",
    about = "Measures the harm a competing CCA does to flow completion time",
    after_help = DESCRIPTION
)]
struct Cli {
    /// Comma separated list of CCAs to test for the competition flow.
    #[arg(long, default_value = DEFAULT_COMPETITOR_CCA)]
    cca: String,

    /// Perform a quick test to verify the setup.
    #[arg(short = 't', long = "test", default_value_t = false)]
    test_mode: bool,

    /// Harness settings file (TOML). Its `ccas` are replaced by --cca when
    /// that is given explicitly.
    #[arg(long, env = "CCAFCT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    // ── Settings ───────────────────────────────────────────────────
    let mut settings = match &cli.config {
        Some(path) => HarnessSettings::load(path)?,
        None => HarnessSettings::default(),
    };
    if cli.config.is_none() || cli.cca != DEFAULT_COMPETITOR_CCA {
        settings = settings.with_ccas(&cli.cca);
    }
    if cli.test_mode {
        settings = settings.test_mode();
    }

    print!("{}", intro(&settings)?);

    // ── Shutdown handling ──────────────────────────────────────────
    let cancel = Cancel::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, stopping after rig teardown");
            signal.cancel();
        }
    });

    // ── Run ────────────────────────────────────────────────────────
    let harness = Harness::new(settings, cancel)?;
    let results = harness.run().await?;

    println!();
    print!("{}", results_table(&results));
    Ok(())
}
