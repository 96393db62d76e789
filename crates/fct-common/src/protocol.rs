//! Wire protocol between the workload generator and the FCT server.
//!
//! One flow is one `GET` on [`ProtocolConfig::path`]. The request names the
//! response length in the flow-length header and optionally a congestion
//! control algorithm in the CCA header; the server answers `200` with exactly
//! that many filler bytes.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8188;
pub const DEFAULT_PATH: &str = "/fct";
pub const DEFAULT_FLOW_LENGTH_HEADER: &str = "FCT-Flow-Length";
pub const DEFAULT_CCA_HEADER: &str = "FCT-CCA";
/// Size of the chunks the server streams response bodies in.
pub const DEFAULT_BUF_LEN: usize = 32 * 1024;

/// Immutable protocol settings threaded through the client and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub port: u16,
    pub path: String,
    pub flow_length_header: String,
    pub cca_header: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            flow_length_header: DEFAULT_FLOW_LENGTH_HEADER.to_string(),
            cca_header: DEFAULT_CCA_HEADER.to_string(),
        }
    }
}

impl ProtocolConfig {
    /// Append the default port to `addr` when it has none.
    ///
    /// Accepts `host`, `host:port`, bare IPv6 (`::1`) and bracketed IPv6
    /// (`[::1]:8188`).
    pub fn normalize_addr(&self, addr: &str) -> String {
        let addr = addr.trim();
        if addr.starts_with('[') {
            if addr.contains("]:") {
                return addr.to_string();
            }
            return format!("{addr}:{}", self.port);
        }
        if let Ok(IpAddr::V6(v6)) = addr.parse::<IpAddr>() {
            return format!("[{v6}]:{}", self.port);
        }
        if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{addr}:{}", self.port)
        }
    }

    /// Full request URL for a server at `addr`.
    pub fn url(&self, addr: &str) -> String {
        format!("http://{}{}", self.normalize_addr(addr), self.path)
    }
}
