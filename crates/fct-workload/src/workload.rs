//! # Open-loop workload generator
//!
//! Issues `plan.flows` HTTP flows with exponentially distributed gaps and
//! lognormal lengths. Every flow runs as its own task; arrival pacing is the
//! only throttle, so very short mean arrivals can build up many concurrent
//! tasks.
//!
//! The first flow failure stops issuance and cancels the in-flight flows
//! through the run's cancel token. The error reaches the caller only after
//! every task has joined, together with the flows that did complete.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fct_common::flow::FLOW_INIT_CAP;
use fct_common::{Bytes, Cancel, FlowData, FlowLog, FlowRecord, ProtocolConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::WorkloadPlan;
use crate::error::{FlowError, RunError};

/// Runs a [`WorkloadPlan`] against an FCT server.
pub struct Workload {
    plan: WorkloadPlan,
    request: Arc<RequestTemplate>,
    client: reqwest::Client,
}

/// Per-run constants every flow task needs.
#[derive(Debug)]
struct RequestTemplate {
    url: String,
    cca: Option<String>,
    flow_length_header: String,
    cca_header: String,
}

impl Workload {
    pub fn new(plan: WorkloadPlan, protocol: &ProtocolConfig) -> Result<Self, FlowError> {
        // No idle pooling: each flow opens its own connection, so each gets
        // its own slow start and its own server-side CCA.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;
        let request = Arc::new(RequestTemplate {
            url: plan.url.clone(),
            cca: plan.cca.clone(),
            flow_length_header: protocol.flow_length_header.clone(),
            cca_header: protocol.cca_header.clone(),
        });
        Ok(Self {
            plan,
            request,
            client,
        })
    }

    pub fn plan(&self) -> &WorkloadPlan {
        &self.plan
    }

    /// Run the workload to completion, cancellation, or first failure.
    pub async fn run(&self, cancel: &Cancel) -> Result<FlowData, RunError> {
        let plan = &self.plan;
        let mut rng = match plan.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };

        let schedule = plan.low_noise.then(|| presample(plan, &mut rng));
        let capacity = if plan.low_noise {
            plan.flows.max(FLOW_INIT_CAP)
        } else {
            FLOW_INIT_CAP
        };

        let log = Arc::new(FlowLog::with_capacity(capacity));
        let cancel = cancel.child();
        // One slot per flow, so a failing task never blocks on send.
        let (fail_tx, mut fail_rx) = mpsc::channel::<FlowError>(plan.flows.max(1));
        let mut tasks = JoinSet::new();
        let mut failure = None;

        tracing::info!(
            url = %plan.url,
            cca = plan.cca.as_deref().unwrap_or("-"),
            flows = plan.flows,
            mean_arrival_ms = plan.mean_arrival.as_millis() as u64,
            low_noise = plan.low_noise,
            "starting workload"
        );

        let started_at = Utc::now();
        let epoch = Instant::now();

        for i in 0..plan.flows {
            let (wait, length) = match &schedule {
                Some(s) => s[i],
                None => next_flow(plan, i, &mut rng),
            };

            if i > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(issued = i, "workload cancelled, no further flows");
                        break;
                    }
                    Some(err) = fail_rx.recv() => {
                        tracing::warn!(issued = i, error = %err, "flow failed, stopping issuance");
                        failure = Some(err);
                        cancel.cancel();
                        break;
                    }
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            let client = self.client.clone();
            let request = self.request.clone();
            let log = log.clone();
            let fail_tx = fail_tx.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let result = tokio::select! {
                    r = fetch(&client, &request, length, epoch) => r,
                    _ = cancel.cancelled() => Err(FlowError::Cancelled),
                };
                match result {
                    Ok(record) => log.append(record),
                    Err(err) => {
                        tracing::debug!(index = i, error = %err, "flow failed");
                        let _ = fail_tx.try_send(err);
                    }
                }
            });
        }
        drop(fail_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "flow task panicked");
            }
        }
        // Releases the link to the caller's token.
        cancel.cancel();

        let ended_at = Utc::now();
        let elapsed = epoch.elapsed();

        // A flow may have failed after issuance finished.
        if failure.is_none() {
            failure = fail_rx.try_recv().ok();
        }

        let Some(log) = Arc::into_inner(log) else {
            unreachable!("every flow task has joined and dropped its log handle");
        };
        let data = log.into_data(started_at, ended_at);

        tracing::info!(
            completed = data.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "workload finished"
        );

        match failure {
            Some(source) => Err(RunError {
                source,
                partial: data,
            }),
            None => Ok(data),
        }
    }
}

fn sample_length(plan: &WorkloadPlan, rng: &mut StdRng) -> Bytes {
    Bytes(plan.length.sample(rng).round() as u64)
}

/// Wait before flow `i` and its length. The first flow goes out at once,
/// so no wait is drawn for it.
fn next_flow(plan: &WorkloadPlan, i: usize, rng: &mut StdRng) -> (Duration, Bytes) {
    let wait = if i > 0 {
        plan.scale_wait(plan.arrival.sample(rng))
    } else {
        Duration::ZERO
    };
    (wait, sample_length(plan, rng))
}

/// Sample every wait and length up front.
fn presample(plan: &WorkloadPlan, rng: &mut StdRng) -> Vec<(Duration, Bytes)> {
    (0..plan.flows).map(|i| next_flow(plan, i, rng)).collect()
}

/// One request/response cycle. Timing covers the request through the last
/// body byte.
async fn fetch(
    client: &reqwest::Client,
    request: &RequestTemplate,
    length: Bytes,
    epoch: Instant,
) -> Result<FlowRecord, FlowError> {
    let mut builder = client
        .get(&request.url)
        .header(request.flow_length_header.as_str(), length.get());
    if let Some(cca) = &request.cca {
        builder = builder.header(request.cca_header.as_str(), cca.as_str());
    }

    let start = epoch.elapsed();
    let mut resp = builder.send().await?;
    if resp.status() != StatusCode::OK {
        return Err(FlowError::Status(resp.status()));
    }

    let mut received = 0u64;
    while let Some(chunk) = resp.chunk().await? {
        received += chunk.len() as u64;
    }
    let end = epoch.elapsed();

    Ok(FlowRecord {
        start,
        end,
        length: Bytes(received),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadParams;

    fn plan(flows_secs: u64, seed: u64, low_noise: bool) -> WorkloadPlan {
        WorkloadParams {
            duration_ms: Some(flows_secs * 1000),
            mean_arrival_ms: Some(1000),
            seed: Some(seed),
            low_noise,
            ..Default::default()
        }
        .resolve(&ProtocolConfig::default())
        .unwrap()
    }

    #[test]
    fn presample_covers_every_flow() {
        let plan = plan(25, 3, true);
        let mut rng = StdRng::seed_from_u64(3);
        let schedule = presample(&plan, &mut rng);
        assert_eq!(schedule.len(), 25);
        assert!(schedule.iter().all(|(_, len)| len.get() > 0));
    }

    #[test]
    fn presample_is_deterministic_for_seed() {
        let plan = plan(10, 9, true);
        let a = presample(&plan, &mut StdRng::seed_from_u64(9));
        let b = presample(&plan, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn first_flow_draws_no_wait() {
        let plan = plan(10, 5, false);
        let schedule = presample(&plan, &mut StdRng::seed_from_u64(5));
        assert_eq!(schedule[0].0, Duration::ZERO);
        assert!(schedule[1..].iter().all(|(wait, _)| *wait > Duration::ZERO));

        // the streaming path consumes the stream in the same order
        let mut rng = StdRng::seed_from_u64(5);
        let streamed: Vec<_> = (0..plan.flows)
            .map(|i| next_flow(&plan, i, &mut rng))
            .collect();
        assert_eq!(streamed, schedule);

        // the first length is the first draw from the seed
        let first = sample_length(&plan, &mut StdRng::seed_from_u64(5));
        assert_eq!(schedule[0].1, first);
    }

    #[tokio::test]
    async fn cancelled_before_start_issues_one_flow_then_stops() {
        // Port 9 (discard) on loopback is almost never listening; the single
        // issued flow fails or is cancelled, and issuance stops.
        let params = WorkloadParams {
            addr: Some("127.0.0.1:9".into()),
            cca: Some(String::new()),
            ..Default::default()
        };
        let plan = params.resolve(&ProtocolConfig::default()).unwrap();
        let workload = Workload::new(plan, &ProtocolConfig::default()).unwrap();
        let cancel = Cancel::new();
        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), workload.run(&cancel))
            .await
            .expect("run must not hang");
        let err = result.expect_err("the only issued flow cannot succeed");
        assert!(err.partial.is_empty());
    }
}
