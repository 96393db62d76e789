//! FCT workload client and server.
//!
//! - `fct client <addr>` runs a workload and prints FCT statistics
//! - `fct server` answers workload requests
//! - `fct json` reads workload parameters as JSON on stdin, runs the
//!   workload, and writes the flow data document as JSON to stdout

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fct_cli::init_tracing;
use fct_cli::report::{plan_summary, stats_summary};
use fct_common::protocol::DEFAULT_BUF_LEN;
use fct_common::{Cancel, FlowData, ProtocolConfig};
use fct_workload::{Server, ServerConfig, Workload, WorkloadParams};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Parser, Debug)]
#[command(name = "fct", about = "Flow completion time workload client and server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a workload against a server and print FCT statistics.
    Client {
        /// Server address, host[:port].
        addr: String,

        /// Workload parameters file (TOML).
        #[arg(long, env = "FCT_PARAMS")]
        params: Option<PathBuf>,

        /// CCA requested for the workload flows. Empty for the server default.
        #[arg(long)]
        cca: Option<String>,

        /// Workload duration in seconds.
        #[arg(long)]
        duration: Option<u64>,

        /// Sampler seed, for a reproducible workload.
        #[arg(long)]
        seed: Option<u64>,

        /// Pre-sample the workload before timing starts.
        #[arg(long, default_value_t = false)]
        low_noise: bool,
    },

    /// Serve workload requests until interrupted.
    Server {
        #[arg(long, default_value = "0.0.0.0:8188")]
        listen: SocketAddr,

        /// Response body chunk size in bytes.
        #[arg(long, default_value_t = DEFAULT_BUF_LEN)]
        buf_len: usize,
    },

    /// Read parameters as JSON on stdin, write flow data as JSON to stdout.
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let protocol = ProtocolConfig::default();

    match cli.command {
        Command::Client {
            addr,
            params,
            cca,
            duration,
            seed,
            low_noise,
        } => {
            let mut p = match params {
                Some(path) => {
                    let input = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    WorkloadParams::from_toml_str(&input)?
                }
                None => WorkloadParams::default(),
            };
            p.addr = Some(addr);
            if cca.is_some() {
                p.cca = cca;
            }
            if let Some(secs) = duration {
                p.duration_ms = Some(secs * 1000);
            }
            if seed.is_some() {
                p.seed = seed;
            }
            p.low_noise |= low_noise;
            run_client(p, &protocol).await
        }
        Command::Server { listen, buf_len } => {
            run_server(ServerConfig { listen, buf_len }, &protocol).await
        }
        Command::Json => run_json(&protocol).await,
    }
}

async fn run_client(params: WorkloadParams, protocol: &ProtocolConfig) -> anyhow::Result<()> {
    let plan = params.resolve(protocol)?;
    print!("{}", plan_summary(&plan));

    let workload = Workload::new(plan, protocol)?;
    let data = run_until_interrupted(&workload).await?;
    let stats = fct_stats::analyze(&data)?;
    print!("{}", stats_summary(&stats));
    Ok(())
}

async fn run_server(config: ServerConfig, protocol: &ProtocolConfig) -> anyhow::Result<()> {
    let server = Server::bind(&config, protocol).await?;
    tracing::info!(addr = %server.local_addr()?, "fct server listening");

    let shutdown = Cancel::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, shutting down");
            signal.cancel();
        }
    });

    server.serve(shutdown).await?;
    tracing::info!("fct server stopped");
    Ok(())
}

async fn run_json(protocol: &ProtocolConfig) -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading parameters from stdin")?;
    let plan = WorkloadParams::from_json_str(&input)?.resolve(protocol)?;
    tracing::info!(url = %plan.url, flows = plan.flows, "running workload");

    let workload = Workload::new(plan, protocol)?;
    let data = run_until_interrupted(&workload).await?;

    let mut out = serde_json::to_vec(&data)?;
    out.push(b'\n');
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&out).await?;
    stdout.flush().await?;
    Ok(())
}

/// Run the workload, cancelling outstanding flows on Ctrl-C.
async fn run_until_interrupted(workload: &Workload) -> anyhow::Result<FlowData> {
    let cancel = Cancel::new();
    let signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received SIGINT, cancelling workload");
            signal.cancel();
        }
    });

    let result = workload.run(&cancel).await;
    watcher.abort();
    Ok(result?)
}
