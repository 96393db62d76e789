//! `ccafct` harness settings.
//!
//! Loaded from an optional TOML file; every key is optional and falls back
//! to the defaults below. [`HarnessSettings::test_mode`] shrinks a run to a
//! quick setup check.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use fct_common::{Bitrate, Bytes};
use fct_workload::WorkloadParams;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RTTS_MS: [u64; 5] = [10, 20, 40, 80, 160];
pub const DEFAULT_BANDWIDTH: Bitrate = Bitrate::mbps(50);
pub const DEFAULT_QDISC: &str = "fq_codel flows 1";
pub const DEFAULT_COMPETITOR_CCA: &str = "cubic";
pub const DEFAULT_FCT_CCA: &str = "cubic";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Path RTTs, each tested on a fresh rig.
    pub rtts_ms: Vec<u64>,
    /// Bottleneck rate.
    pub bandwidth: Bitrate,
    /// Leaf qdisc at the bottleneck.
    pub qdisc: String,
    /// Competitor CCAs, run one at a time after the solo workload.
    pub ccas: Vec<String>,
    /// CCA of the workload flows.
    pub fct_cca: String,
    pub duration_secs: u64,
    pub mean_arrival_ms: u64,
    pub len_p5: Bytes,
    pub len_p95: Bytes,
    /// Grace period after the workload duration for its flows to finish.
    pub fct_timeout_secs: u64,
    /// Extra slack before the workload process is killed.
    pub context_timeout_secs: u64,
    /// Head start given to the competitor so it leaves slow start.
    pub slow_start_delay_secs: u64,
    /// Pause after starting the servers.
    pub server_startup_ms: u64,
    /// `fct` binary run inside the namespaces. Defaults to the one next to
    /// the running executable.
    pub fct_bin: Option<PathBuf>,
    pub seed: Option<u64>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            rtts_ms: DEFAULT_RTTS_MS.to_vec(),
            bandwidth: DEFAULT_BANDWIDTH,
            qdisc: DEFAULT_QDISC.to_string(),
            ccas: vec![DEFAULT_COMPETITOR_CCA.to_string()],
            fct_cca: DEFAULT_FCT_CCA.to_string(),
            duration_secs: 180,
            mean_arrival_ms: 200,
            len_p5: Bytes::kib(64),
            len_p95: Bytes::mib(2),
            fct_timeout_secs: 60,
            context_timeout_secs: 30,
            slow_start_delay_secs: 20,
            server_startup_ms: 200,
            fct_bin: None,
            seed: None,
        }
    }
}

impl HarnessSettings {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(input).context("invalid harness settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&input).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rtts_ms.is_empty() {
            bail!("no RTTs to test");
        }
        if self.mean_arrival_ms == 0 {
            bail!("mean arrival must be nonzero");
        }
        if self.bandwidth.0 == 0 {
            bail!("bandwidth must be nonzero");
        }
        Ok(())
    }

    /// Quick run to verify the setup.
    pub fn test_mode(mut self) -> Self {
        self.rtts_ms = vec![10, 20];
        self.duration_secs = 5;
        self.slow_start_delay_secs = 0;
        self
    }

    /// Replace the competitor list from a comma separated string.
    pub fn with_ccas(mut self, list: &str) -> Self {
        self.ccas = list
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        self
    }

    pub fn rtts(&self) -> Vec<Duration> {
        self.rtts_ms.iter().copied().map(Duration::from_millis).collect()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn slow_start_delay(&self) -> Duration {
        Duration::from_secs(self.slow_start_delay_secs)
    }

    pub fn server_startup(&self) -> Duration {
        Duration::from_millis(self.server_startup_ms)
    }

    /// How long the competitor flow runs: it must outlast the workload.
    pub fn competitor_runtime(&self) -> Duration {
        self.slow_start_delay() + self.duration() + Duration::from_secs(self.fct_timeout_secs)
    }

    /// After this long the workload process is killed.
    pub fn workload_deadline(&self) -> Duration {
        self.duration()
            + Duration::from_secs(self.fct_timeout_secs)
            + Duration::from_secs(self.context_timeout_secs)
    }

    /// Workload parameters for a server at `addr`.
    pub fn workload_params(&self, addr: Option<String>) -> WorkloadParams {
        WorkloadParams {
            addr,
            cca: Some(self.fct_cca.clone()),
            len_p5: Some(self.len_p5),
            len_p95: Some(self.len_p95),
            seed: self.seed,
            ..Default::default()
        }
        .with_duration(self.duration())
        .with_mean_arrival(Duration::from_millis(self.mean_arrival_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fct_common::ProtocolConfig;

    #[test]
    fn defaults() {
        let s = HarnessSettings::default();
        assert_eq!(s.rtts().len(), 5);
        assert_eq!(s.ccas, vec!["cubic"]);
        assert_eq!(s.bandwidth.qdisc(), "50Mbit");
        assert_eq!(s.competitor_runtime(), Duration::from_secs(20 + 180 + 60));
        assert_eq!(s.workload_deadline(), Duration::from_secs(180 + 60 + 30));
        s.validate().unwrap();
    }

    #[test]
    fn test_mode_shrinks_the_run() {
        let s = HarnessSettings::default().test_mode();
        assert_eq!(
            s.rtts(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(s.duration(), Duration::from_secs(5));
        assert_eq!(s.slow_start_delay(), Duration::ZERO);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = HarnessSettings::from_toml_str(
            r#"
            rtts_ms = [40]
            qdisc = "cake"
            ccas = ["bbr", "reno"]
            "#,
        )
        .unwrap();
        assert_eq!(s.rtts_ms, vec![40]);
        assert_eq!(s.qdisc, "cake");
        assert_eq!(s.ccas, vec!["bbr", "reno"]);
        assert_eq!(s.duration_secs, 180);
        assert_eq!(s.len_p95, Bytes::mib(2));
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(HarnessSettings::from_toml_str("rtts_ms = []").is_err());
        assert!(HarnessSettings::from_toml_str("mean_arrival_ms = 0").is_err());
        assert!(HarnessSettings::from_toml_str("rtts_ms = \"10\"").is_err());
    }

    #[test]
    fn cca_list_is_split_and_trimmed() {
        let s = HarnessSettings::default().with_ccas(" bbr, cubic ,,reno");
        assert_eq!(s.ccas, vec!["bbr", "cubic", "reno"]);
    }

    #[test]
    fn workload_params_resolve_to_the_harness_plan() {
        let s = HarnessSettings::default();
        let plan = s
            .workload_params(Some("10.0.2.2".to_string()))
            .resolve(&ProtocolConfig::default())
            .unwrap();
        assert_eq!(plan.url, "http://10.0.2.2:8188/fct");
        assert_eq!(plan.cca.as_deref(), Some("cubic"));
        assert_eq!(plan.duration, Duration::from_secs(180));
        assert_eq!(plan.flows, 900);
    }
}
