//! The `ccafct` test: harm done to flow completion time by one competing
//! flow of a given CCA, across path RTTs.
//!
//! Per RTT a fresh 2+2+2 namespace rig is built. The workload runs from
//! left endpoint 1 against an `fct server` on right endpoint 1; competitor
//! flows run from left endpoint 0 against `iperf3 -s` on right endpoint 0.
//! Both paths share the bottleneck in the middleboxes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use fct_common::{Cancel, FlowData, ProtocolConfig};
use fct_exec::{Executor, Spec};
use fct_sim::impairment::delay_qdisc;
use fct_sim::{Rig, RigConfig};
use fct_stats::analyze;

use crate::report::{
    ResultRow, TableWriter, format_duration, join_durations, plan_summary, underline,
    underline_double,
};
use crate::settings::HarnessSettings;

/// Stands in for the competitor CCA in the solo run.
pub const SOLO_ID: &str = "-";

pub const TITLE: &str = "Congestion Control Algorithm Flow Completion Time Test";

pub const DESCRIPTION: &str = "\
This tests FCT (flow completion time) for a baseline CCA (congestion
control algorithm) through a single AQM queue, with and without the
competition of a single flow from a selected competing CCA, and
measures the resulting harm to FCT. Network namespaces are used to
simulate path delay.

The test process is as follows:

1. Run a test FCT workload with the baseline CCA. This gives the solo
   performance, without competition. No harm is calculated for this
   step.
2. Run the same FCT workload in competition with a single flow from
   one of the competitor CCAs:
   * Start one flow for the competing CCA, giving it enough time to
     exit slow start.
   * Start the FCT workload for the baseline CCA.
   * Wait for the workload to complete, or a timeout to expire.
   * Terminate the competing flow.
   * Calculate the FCT statistics and the harm to FCT.
3. Repeat step 2 for each additional competitor CCA.

Flows arrive with exponentially distributed gaps and have lognormally
distributed lengths. FCT is a less-is-better metric, so harm is:

(workload - solo) / workload

where workload is the FCT in competition with the CCA under test, and
solo is the baseline, without competition.";

pub struct Harness {
    settings: HarnessSettings,
    fct_bin: PathBuf,
    cancel: Cancel,
}

impl Harness {
    /// `cancel` aborts the run: running workloads are killed and the current
    /// rig is torn down before [`run`](Harness::run) returns an error.
    pub fn new(settings: HarnessSettings, cancel: Cancel) -> anyhow::Result<Self> {
        settings.validate()?;
        let fct_bin = match &settings.fct_bin {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .context("locating the running executable")?
                .with_file_name("fct"),
        };
        if !fct_bin.exists() {
            bail!("fct binary not found at {}", fct_bin.display());
        }
        Ok(Self {
            settings,
            fct_bin,
            cancel,
        })
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Every RTT in turn, solo first, then each competitor.
    pub async fn run(&self) -> anyhow::Result<Vec<ResultRow>> {
        let mut results = Vec::new();
        for rtt in self.settings.rtts() {
            results.extend(self.run_rtt(rtt).await?);
        }
        Ok(results)
    }

    async fn run_rtt(&self, rtt: Duration) -> anyhow::Result<Vec<ResultRow>> {
        let mut rig = self.setup_rig(rtt).await?;
        let mut servers = Executor::default();
        servers.trace = true;
        let result = self.run_rtt_on(&rig, &mut servers, rtt).await;
        servers.kill();
        rig.teardown().await;
        result
    }

    async fn run_rtt_on(
        &self,
        rig: &Rig,
        servers: &mut Executor,
        rtt: Duration,
    ) -> anyhow::Result<Vec<ResultRow>> {
        let fct_bin = self.fct_bin.to_string_lossy();
        servers
            .run_spec(Spec::daemon(), "ip", ["netns", "exec", rig.right_ns(0).as_str(), "iperf3", "-s"])
            .await;
        servers
            .run_spec(
                Spec::daemon(),
                "ip",
                ["netns", "exec", rig.right_ns(1).as_str(), fct_bin.as_ref(), "server"],
            )
            .await;
        servers.err().context("starting servers")?;
        tokio::time::sleep(self.settings.server_startup()).await;

        let params = self.settings.workload_params(Some(rig.right_ip(1)));
        let params = serde_json::to_vec(&params)?;

        let rtt_label = format_duration(rtt);
        tracing::info!(rtt = %rtt_label, "running solo");
        let data = self.run_test(rig, &params, SOLO_ID).await?;
        let solo = analyze(&data).with_context(|| format!("{rtt_label} solo"))?;

        let mut results = vec![ResultRow {
            rtt,
            cca: SOLO_ID.to_string(),
            stats: solo,
        }];
        for cca in &self.settings.ccas {
            tracing::info!(rtt = %rtt_label, cca = %cca, "running against competitor");
            let data = self.run_test(rig, &params, cca).await?;
            let mut stats = analyze(&data).with_context(|| format!("{rtt_label} {cca}"))?;
            stats.set_harm(&solo);
            results.push(ResultRow {
                rtt,
                cca: cca.clone(),
                stats,
            });
        }
        Ok(results)
    }

    async fn setup_rig(&self, rtt: Duration) -> anyhow::Result<Rig> {
        let mut rig = Rig::new(RigConfig {
            left_endpoints: 2,
            middleboxes: 2,
            right_endpoints: 2,
        });
        rig.trace = true;
        rig.setup().await.context("rig setup")?;
        if let Err(e) = self.configure_rig(&rig, rtt).await {
            rig.teardown().await;
            return Err(e);
        }
        Ok(rig)
    }

    /// Delay and bottleneck in each direction, ECN, and a ping to warm ARP.
    async fn configure_rig(&self, rig: &Rig, rtt: Duration) -> anyhow::Result<()> {
        let delay = delay_qdisc(rtt);
        let qdisc = self.settings.qdisc.as_str();
        let bandwidth = self.settings.bandwidth;
        let m0 = rig.mid_ns(0);
        let m1 = rig.mid_ns(1);

        // egress only: delay on the link between the middleboxes, the
        // bottleneck on the links toward the endpoints
        rig.add_root_qdisc(&m0, &rig.right_dev(&m0)?, &delay).await?;
        rig.add_htb_qdisc(&m1, &rig.right_dev(&m1)?, qdisc, bandwidth)
            .await?;
        rig.add_root_qdisc(&m1, &rig.left_dev(&m1)?, &delay).await?;
        rig.add_htb_qdisc(&m0, &rig.left_dev(&m0)?, qdisc, bandwidth)
            .await?;

        let mut ex = Executor::default();
        ex.trace = true;
        for line in ecn_commands(rig) {
            ex.run_line(&line).await;
        }
        let spec = Spec {
            log: true,
            ..Default::default()
        };
        for line in ping_commands(rig) {
            ex.run_spec_line(spec.clone(), &line).await;
        }
        ex.err().context("configuring endpoints")?;
        Ok(())
    }

    /// One workload run, with a competitor flow unless `cca` is
    /// [`SOLO_ID`].
    async fn run_test(&self, rig: &Rig, params: &[u8], cca: &str) -> anyhow::Result<FlowData> {
        let mut ex = Executor::default();
        ex.trace = true;

        if cca != SOLO_ID {
            let spec = Spec {
                background: true,
                log: true,
                ignore_errors: true,
                ..Default::default()
            };
            let args = competitor_args(rig, cca, self.settings.competitor_runtime());
            ex.run_spec(spec, "ip", args).await;
            tokio::select! {
                _ = tokio::time::sleep(self.settings.slow_start_delay()) => {}
                _ = self.cancel.cancelled() => {}
            }
        }
        if self.cancel.is_cancelled() {
            ex.kill();
            bail!("interrupted");
        }

        let deadline = self.cancel.with_timeout(self.settings.workload_deadline());
        let spec = Spec::default()
            .with_stdin(params)
            .with_cancel(deadline.clone());
        let stdout = ex
            .run_spec(spec, "ip", workload_args(rig, &self.fct_bin))
            .await
            .map(|job| job.stdout().to_vec());
        // Stops the deadline timer.
        deadline.cancel();

        ex.interrupt();
        ex.wait().await;
        ex.err().with_context(|| format!("workload with competitor '{cca}'"))?;

        let stdout = stdout.context("workload did not run")?;
        let data: FlowData =
            serde_json::from_slice(&stdout).context("parsing workload output")?;
        Ok(data)
    }
}

/// Arguments to `ip` for the competitor flow: a reverse iperf3 so the
/// bulk data flows right to left, alongside the workload responses.
fn competitor_args(rig: &Rig, cca: &str, runtime: Duration) -> Vec<String> {
    [
        "netns",
        "exec",
        rig.left_ns(0).as_str(),
        "iperf3",
        "-R",
        "-C",
        cca,
        "-t",
        runtime.as_secs().to_string().as_str(),
        "-c",
        rig.right_ip(0).as_str(),
    ]
    .map(str::to_string)
    .to_vec()
}

fn workload_args(rig: &Rig, fct_bin: &Path) -> Vec<String> {
    vec![
        "netns".to_string(),
        "exec".to_string(),
        rig.left_ns(1),
        fct_bin.to_string_lossy().into_owned(),
        "json".to_string(),
    ]
}

/// ECN on the competitor endpoints, passive ECN on the workload endpoints.
fn ecn_commands(rig: &Rig) -> Vec<String> {
    [
        (rig.left_ns(0), 3),
        (rig.right_ns(0), 3),
        (rig.left_ns(1), 2),
        (rig.right_ns(1), 2),
    ]
    .into_iter()
    .map(|(ns, ecn)| format!("ip netns exec {ns} sysctl -w net.ipv4.tcp_ecn={ecn}"))
    .collect()
}

fn ping_commands(rig: &Rig) -> Vec<String> {
    (0..2)
        .map(|n| {
            format!(
                "ip netns exec {} ping -c 2 -i 0.1 {}",
                rig.left_ns(n),
                rig.right_ip(n)
            )
        })
        .collect()
}

/// Title, description and parameters printed before the run.
pub fn intro(settings: &HarnessSettings) -> anyhow::Result<String> {
    let mut out = underline_double(TITLE);
    out.push('\n');
    out.push_str(DESCRIPTION);
    out.push_str("\n\n");

    out.push_str(&underline("Test Parameters:"));
    let mut tw = TableWriter::default();
    tw.row(["CCAs under test:".to_string(), settings.ccas.join(", ")]);
    tw.line(&format!("RTTs:\t{}", join_durations(&settings.rtts(), ", ")));
    tw.row(["Bandwidth:".to_string(), settings.bandwidth.to_string()]);
    tw.row(["Qdisc:", settings.qdisc.as_str()]);
    tw.row([
        "Slow start delay:".to_string(),
        format_duration(settings.slow_start_delay()),
    ]);
    out.push_str(&tw.render());

    out.push('\n');
    out.push_str(&underline("FCT Workload Parameters:"));
    let plan = settings
        .workload_params(None)
        .resolve(&ProtocolConfig::default())?;
    out.push_str(&plan_summary(&plan));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> Rig {
        Rig::with_suffix(
            RigConfig {
                left_endpoints: 2,
                middleboxes: 2,
                right_endpoints: 2,
            },
            "test",
        )
    }

    #[test]
    fn competitor_runs_reverse_iperf_from_left_0() {
        let args = competitor_args(&rig(), "bbr", Duration::from_secs(260));
        assert_eq!(
            args.join(" "),
            "netns exec l.test0 iperf3 -R -C bbr -t 260 -c 10.12.1.1"
        );
    }

    #[test]
    fn workload_runs_fct_json_from_left_1() {
        let args = workload_args(&rig(), Path::new("/usr/local/bin/fct"));
        assert_eq!(args.join(" "), "netns exec l.test1 /usr/local/bin/fct json");
    }

    #[test]
    fn endpoint_commands() {
        let rig = rig();
        assert_eq!(
            ecn_commands(&rig),
            vec![
                "ip netns exec l.test0 sysctl -w net.ipv4.tcp_ecn=3",
                "ip netns exec r.test0 sysctl -w net.ipv4.tcp_ecn=3",
                "ip netns exec l.test1 sysctl -w net.ipv4.tcp_ecn=2",
                "ip netns exec r.test1 sysctl -w net.ipv4.tcp_ecn=2",
            ]
        );
        assert_eq!(
            ping_commands(&rig),
            vec![
                "ip netns exec l.test0 ping -c 2 -i 0.1 10.12.1.1",
                "ip netns exec l.test1 ping -c 2 -i 0.1 10.12.1.2",
            ]
        );
    }

    #[test]
    fn intro_lists_parameters() {
        let out = intro(&HarnessSettings::default().test_mode()).unwrap();
        assert!(out.starts_with(TITLE));
        assert!(out.contains("CCAs under test:  cubic\n"));
        assert!(out.contains("RTTs:             10ms, 20ms\n"));
        assert!(out.contains("Bandwidth:        50Mbps\n"));
        assert!(out.contains("Slow start delay: 0s\n"));
        assert!(out.contains("FCT Workload Parameters:\n"));
        assert!(out.contains("Duration:          5s\n"));
    }

    #[test]
    fn missing_fct_binary_is_reported() {
        let settings = HarnessSettings {
            fct_bin: Some(PathBuf::from("/nonexistent/fct")),
            ..Default::default()
        };
        let err = Harness::new(settings, Cancel::new()).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/fct"));
    }
}
