//! `tc` qdisc helpers for the rig.
//!
//! The command builders are pure, so the exact `tc` invocations can be
//! checked without privileges; the [`Rig`] methods run them inside a rig
//! namespace.

use std::time::Duration;

use fct_common::Bitrate;
use fct_common::units::trim_float;

use crate::topology::{Rig, RigError, idev};

/// Packet limit for the delay emulator, large enough never to drop.
pub const DELAY_LIMIT: u32 = 1_000_000;

/// `netem` qdisc adding half of `rtt` in one direction.
///
/// Installing it on both directions of a path yields the full RTT.
pub fn delay_qdisc(rtt: Duration) -> String {
    let one_way_ms = rtt.as_secs_f64() * 1000.0 / 2.0;
    format!(
        "netem delay {}ms limit {DELAY_LIMIT}",
        trim_float(one_way_ms, 3)
    )
}

pub fn root_qdisc_commands(ns: &str, dev: &str, qdisc: &str) -> Vec<String> {
    vec![format!("ip netns exec {ns} tc qdisc add dev {dev} root {qdisc}")]
}

/// HTB root shaping to `rate`, with `qdisc` as the leaf.
pub fn htb_qdisc_commands(ns: &str, dev: &str, qdisc: &str, rate: Bitrate) -> Vec<String> {
    let rate = rate.qdisc();
    vec![
        format!("ip netns exec {ns} tc qdisc add dev {dev} root handle 1: htb default 1"),
        format!(
            "ip netns exec {ns} tc class add dev {dev} parent 1: classid 1:1 htb rate {rate} ceil {rate}"
        ),
        format!("ip netns exec {ns} tc qdisc add dev {dev} parent 1:1 {qdisc}"),
    ]
}

/// Redirect `dev`'s ingress through an IFB device carrying `qdisc`.
pub fn ingress_qdisc_commands(ns: &str, dev: &str, qdisc: &str) -> Vec<String> {
    let ifb = idev(dev);
    vec![
        format!("ip netns exec {ns} ip link add dev {ifb} type ifb"),
        format!("ip netns exec {ns} tc qdisc add dev {ifb} root handle 1: {qdisc}"),
        format!("ip netns exec {ns} tc qdisc add dev {dev} handle ffff: ingress"),
        format!("ip netns exec {ns} ip link set {ifb} up"),
        format!(
            "ip netns exec {ns} tc filter add dev {dev} parent ffff: protocol all prio 0 u32 match u32 0 0 flowid 1:1 action mirred egress redirect dev {ifb}"
        ),
    ]
}

impl Rig {
    pub async fn add_root_qdisc(&self, ns: &str, dev: &str, qdisc: &str) -> Result<(), RigError> {
        self.run_all(root_qdisc_commands(ns, dev, qdisc)).await
    }

    pub async fn add_htb_qdisc(
        &self,
        ns: &str,
        dev: &str,
        qdisc: &str,
        rate: Bitrate,
    ) -> Result<(), RigError> {
        self.run_all(htb_qdisc_commands(ns, dev, qdisc, rate)).await
    }

    pub async fn add_root_ingress_qdisc(
        &self,
        ns: &str,
        dev: &str,
        qdisc: &str,
    ) -> Result<(), RigError> {
        self.run_all(ingress_qdisc_commands(ns, dev, qdisc)).await
    }

    async fn run_all(&self, commands: Vec<String>) -> Result<(), RigError> {
        let mut ex = self.executor();
        for command in &commands {
            ex.run_line(command).await;
        }
        Ok(ex.err()?)
    }
}
