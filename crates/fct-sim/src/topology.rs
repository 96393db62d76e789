//! Namespace rig: E left endpoints, M bridged middleboxes and E' right
//! endpoints, joined by veth pairs.
//!
//! ```text
//!  l0 ─┐                                   ┌─ r0
//!      ├─ [lb] m0 ── m1 ── … ── m(M-1) [rb] ┤
//!  l1 ─┘                                   └─ r1
//! ```
//!
//! Left endpoints sit on 10.12.0.0/24 behind gateway 10.12.0.254, right
//! endpoints on 10.12.1.0/24 behind 10.12.1.254. With more than one
//! middlebox the outer two are routed over a 10.12.2.0/24 backhaul and any
//! middleboxes in between are plain bridges.
//!
//! Namespace names carry a random suffix so concurrent rigs do not collide.
//! The namespaces are deleted by [`Rig::teardown`], or on drop.

use fct_exec::{ExecError, Executor};
use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

const ALPHA_NUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RANDOM_SUFFIX_LEN: usize = 7;
const NET_PREFIX_LEN: u8 = 24;

const LEFT_NAME_PREFIX: &str = "l";
const MID_NAME_PREFIX: &str = "m";
const RIGHT_NAME_PREFIX: &str = "r";
const LEFT_IP_PREFIX: &str = "10.12.0.";
const RIGHT_IP_PREFIX: &str = "10.12.1.";
const LEFT_BACKHAUL_IP: &str = "10.12.2.1";
const RIGHT_BACKHAUL_IP: &str = "10.12.2.2";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RigError {
    #[error("rig commands failed: {0}")]
    Exec(#[from] ExecError),
    #[error("invalid rig namespace: {0}")]
    InvalidNamespace(String),
}

/// Shape of the rig. Zero counts are treated as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RigConfig {
    pub left_endpoints: usize,
    pub middleboxes: usize,
    pub right_endpoints: usize,
}

impl Default for RigConfig {
    /// A dumbbell: one endpoint on each side of one middlebox.
    fn default() -> Self {
        Self {
            left_endpoints: 1,
            middleboxes: 1,
            right_endpoints: 1,
        }
    }
}

impl RigConfig {
    fn resolve(self) -> Self {
        Self {
            left_endpoints: self.left_endpoints.max(1),
            middleboxes: self.middleboxes.max(1),
            right_endpoints: self.right_endpoints.max(1),
        }
    }
}

/// Which part of the rig a namespace belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Left,
    Mid,
    Right,
}

pub struct Rig {
    config: RigConfig,
    left_prefix: String,
    mid_prefix: String,
    right_prefix: String,
    /// Namespaces that may exist and must be deleted.
    namespaces: Vec<String>,
    /// Log rig commands at `info`.
    pub trace: bool,
}

impl Rig {
    /// A rig with a random name suffix. Nothing is created until
    /// [`setup`](Rig::setup).
    pub fn new(config: RigConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(rand::random());
        let suffix: String = (0..RANDOM_SUFFIX_LEN)
            .map(|_| ALPHA_NUM[rng.random_range(0..ALPHA_NUM.len())] as char)
            .collect();
        Self::with_suffix(config, &suffix)
    }

    pub fn with_suffix(config: RigConfig, suffix: &str) -> Self {
        Self {
            config: config.resolve(),
            left_prefix: format!("{LEFT_NAME_PREFIX}.{suffix}"),
            mid_prefix: format!("{MID_NAME_PREFIX}.{suffix}"),
            right_prefix: format!("{RIGHT_NAME_PREFIX}.{suffix}"),
            namespaces: Vec::new(),
            trace: false,
        }
    }

    pub fn config(&self) -> RigConfig {
        self.config
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    // ─── Names and addresses ────────────────────────────────────────

    pub fn left_ns(&self, num: usize) -> String {
        format!("{}{num}", self.left_prefix)
    }

    pub fn mid_ns(&self, num: usize) -> String {
        format!("{}{num}", self.mid_prefix)
    }

    pub fn right_ns(&self, num: usize) -> String {
        format!("{}{num}", self.right_prefix)
    }

    /// The interface of namespace `name` that faces right.
    pub fn right_dev(&self, name: &str) -> Result<String, RigError> {
        let (role, num) = self.split_name(name)?;
        if role == Role::Mid && num == self.config.middleboxes - 1 {
            return Ok(rbdev(name));
        }
        Ok(rdev(name, 0))
    }

    /// The interface of namespace `name` that faces left.
    pub fn left_dev(&self, name: &str) -> Result<String, RigError> {
        let (role, num) = self.split_name(name)?;
        if role == Role::Mid && num == 0 {
            return Ok(lbdev(name));
        }
        Ok(ldev(name, 0))
    }

    pub fn left_ip(&self, num: usize) -> String {
        format!("{LEFT_IP_PREFIX}{}", num + 1)
    }

    pub fn right_ip(&self, num: usize) -> String {
        format!("{RIGHT_IP_PREFIX}{}", num + 1)
    }

    pub fn left_gateway_ip(&self) -> String {
        format!("{LEFT_IP_PREFIX}254")
    }

    pub fn right_gateway_ip(&self) -> String {
        format!("{RIGHT_IP_PREFIX}254")
    }

    fn left_net(&self) -> String {
        format!("{LEFT_IP_PREFIX}0/{NET_PREFIX_LEN}")
    }

    fn right_net(&self) -> String {
        format!("{RIGHT_IP_PREFIX}0/{NET_PREFIX_LEN}")
    }

    fn split_name(&self, name: &str) -> Result<(Role, usize), RigError> {
        let (role, rest) = if let Some(rest) = name.strip_prefix(&self.left_prefix) {
            (Role::Left, rest)
        } else if let Some(rest) = name.strip_prefix(&self.mid_prefix) {
            (Role::Mid, rest)
        } else if let Some(rest) = name.strip_prefix(&self.right_prefix) {
            (Role::Right, rest)
        } else {
            return Err(RigError::InvalidNamespace(name.to_string()));
        };
        let num = rest
            .parse()
            .map_err(|_| RigError::InvalidNamespace(name.to_string()))?;
        Ok((role, num))
    }

    // ─── Setup and teardown ─────────────────────────────────────────

    pub(crate) fn executor(&self) -> Executor {
        let mut ex = Executor::default();
        ex.trace = self.trace;
        ex
    }

    /// Create the namespaces and links. On failure, whatever was created is
    /// torn down again.
    pub async fn setup(&mut self) -> Result<(), RigError> {
        let (commands, namespaces) = self.setup_plan();
        tracing::info!(
            namespaces = namespaces.len(),
            commands = commands.len(),
            "setting up netns rig"
        );
        self.namespaces = namespaces;

        let mut ex = self.executor();
        for command in &commands {
            ex.run_line(command).await;
        }
        if let Err(e) = ex.err() {
            self.teardown().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete every namespace of the rig. Deletion failures are ignored.
    pub async fn teardown(&mut self) {
        if self.namespaces.is_empty() {
            return;
        }
        tracing::info!(namespaces = self.namespaces.len(), "tearing down netns rig");
        let mut ex = Executor::default();
        ex.trace = self.trace;
        ex.ignore_errors = true;
        ex.no_log_errors = true;
        for name in self.namespaces.drain(..) {
            ex.run("ip", ["netns", "del", name.as_str()]).await;
        }
    }

    /// Every command needed to build the rig, in order, and the namespaces
    /// they create.
    pub fn setup_plan(&self) -> (Vec<String>, Vec<String>) {
        let mut plan = Plan::default();
        self.plan_right(&mut plan);
        self.plan_mid(&mut plan);
        self.plan_left(&mut plan);
        (plan.commands, plan.namespaces)
    }

    fn plan_right(&self, plan: &mut Plan) {
        let mid = self.mid_ns(self.config.middleboxes - 1);
        for i in 0..self.config.right_endpoints {
            let name = self.right_ns(i);
            let dev = ldev(&name, 0);
            let peer = rdev(&mid, i);
            let ip_net = format!("{}/{NET_PREFIX_LEN}", self.right_ip(i));

            plan.add_ns(&name);
            plan.run(format!("ip link add dev {dev} type veth peer name {peer}"));
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(&name, format!("ip addr add {ip_net} dev {dev}"));
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(
                &name,
                format!(
                    "ip route add {} via {} dev {dev}",
                    self.left_net(),
                    self.right_gateway_ip()
                ),
            );
        }
    }

    fn plan_mid(&self, plan: &mut Plan) {
        let m = self.config.middleboxes;

        // rightmost: bridge the right endpoints, route left over the backhaul
        let name = self.mid_ns(m - 1);
        let bridge = rbdev(&name);
        plan.add_ns(&name);
        plan.exec(&name, format!("ip link add name {bridge} type bridge"));
        plan.exec(
            &name,
            format!(
                "ip addr add {}/{NET_PREFIX_LEN} dev {bridge}",
                self.right_gateway_ip()
            ),
        );
        plan.exec(&name, format!("ip link set dev {bridge} up"));
        for i in 0..self.config.right_endpoints {
            let dev = rdev(&name, i);
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(&name, format!("ip link set dev {dev} master {bridge}"));
        }
        if m > 1 {
            let dev = ldev(&name, 0);
            let peer = rdev(&self.mid_ns(m - 2), 0);
            plan.run(format!("ip link add dev {dev} type veth peer name {peer}"));
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(
                &name,
                format!("ip addr add {RIGHT_BACKHAUL_IP}/{NET_PREFIX_LEN} dev {dev}"),
            );
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(
                &name,
                format!(
                    "ip route add {} via {LEFT_BACKHAUL_IP} dev {dev}",
                    self.left_net()
                ),
            );
        }
        plan.enable_forwarding(&name);

        // intermediaries: a bridge between the left and right links
        for num in (1..m.saturating_sub(1)).rev() {
            let name = self.mid_ns(num);
            let left = ldev(&name, 0);
            let peer = rdev(&self.mid_ns(num - 1), 0);
            let right = rdev(&name, 0);
            let bridge = bdev(&name);

            plan.add_ns(&name);
            plan.run(format!("ip link set dev {right} netns {name}"));
            plan.exec(&name, format!("ip link set {right} up"));
            plan.run(format!("ip link add dev {left} type veth peer name {peer}"));
            plan.run(format!("ip link set dev {left} netns {name}"));
            plan.exec(&name, format!("ip link set {left} up"));
            plan.exec(&name, format!("ip link add name {bridge} type bridge"));
            plan.exec(&name, format!("ip link set dev {right} master {bridge}"));
            plan.exec(&name, format!("ip link set dev {left} master {bridge}"));
            plan.exec(&name, format!("ip link set dev {bridge} up"));
        }

        // leftmost: bridge the left endpoints, route right over the backhaul
        let name = self.mid_ns(0);
        let bridge = lbdev(&name);
        if m > 1 {
            let dev = rdev(&name, 0);
            plan.add_ns(&name);
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(
                &name,
                format!("ip addr add {LEFT_BACKHAUL_IP}/{NET_PREFIX_LEN} dev {dev}"),
            );
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(
                &name,
                format!(
                    "ip route add {} via {RIGHT_BACKHAUL_IP} dev {dev}",
                    self.right_net()
                ),
            );
        }
        plan.exec(&name, format!("ip link add name {bridge} type bridge"));
        plan.exec(
            &name,
            format!(
                "ip addr add {}/{NET_PREFIX_LEN} dev {bridge}",
                self.left_gateway_ip()
            ),
        );
        plan.exec(&name, format!("ip link set dev {bridge} up"));
        for i in 0..self.config.left_endpoints {
            let dev = ldev(&name, i);
            let peer = rdev(&self.left_ns(i), 0);
            plan.run(format!("ip link add dev {dev} type veth peer name {peer}"));
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(&name, format!("ip link set dev {dev} master {bridge}"));
        }
        if m > 1 {
            plan.enable_forwarding(&name);
        }
    }

    fn plan_left(&self, plan: &mut Plan) {
        for i in 0..self.config.left_endpoints {
            let name = self.left_ns(i);
            let dev = rdev(&name, 0);
            let ip_net = format!("{}/{NET_PREFIX_LEN}", self.left_ip(i));

            plan.add_ns(&name);
            plan.run(format!("ip link set dev {dev} netns {name}"));
            plan.exec(&name, format!("ip addr add {ip_net} dev {dev}"));
            plan.exec(&name, format!("ip link set {dev} up"));
            plan.exec(
                &name,
                format!(
                    "ip route add {} via {} dev {dev}",
                    self.right_net(),
                    self.left_gateway_ip()
                ),
            );
        }
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        // async teardown was skipped; fall back to blocking deletes
        for name in self.namespaces.drain(..) {
            let _ = std::process::Command::new("ip")
                .args(["netns", "del", &name])
                .output();
        }
    }
}

/// Command builder for [`Rig::setup_plan`].
#[derive(Default)]
struct Plan {
    commands: Vec<String>,
    namespaces: Vec<String>,
}

impl Plan {
    fn add_ns(&mut self, name: &str) {
        self.namespaces.push(name.to_string());
        self.run(format!("ip netns add {name}"));
    }

    fn run(&mut self, command: String) {
        self.commands.push(command);
    }

    fn exec(&mut self, ns: &str, command: String) {
        self.commands.push(format!("ip netns exec {ns} {command}"));
    }

    fn enable_forwarding(&mut self, ns: &str) {
        self.exec(ns, "sysctl -w net.ipv4.ip_forward=1".into());
        self.exec(ns, "sysctl -w net.ipv6.conf.all.forwarding=1".into());
    }
}

fn rdev(name: &str, num: usize) -> String {
    format!("{name}.r{num}")
}

fn ldev(name: &str, num: usize) -> String {
    format!("{name}.l{num}")
}

fn rbdev(name: &str) -> String {
    format!("{name}.rb")
}

fn lbdev(name: &str) -> String {
    format!("{name}.lb")
}

fn bdev(name: &str) -> String {
    format!("{name}.b")
}

/// Name of the IFB device that carries `dev`'s ingress traffic.
pub(crate) fn idev(dev: &str) -> String {
    format!("i{dev}")
}
