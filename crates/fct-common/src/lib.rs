//! Shared types for the FCT harm toolkit.
//!
//! This crate contains:
//! - **Cancellation**: a cloneable, hierarchical cancel token for async tasks
//! - **Units**: byte counts and bitrates with human-readable formatting
//! - **Protocol**: HTTP path, header names and default port of the FCT server
//! - **Flow records**: the concurrent flow log and the serializable run document

pub mod cancel;
pub mod flow;
pub mod protocol;
pub mod units;

pub use cancel::Cancel;
pub use flow::{FlowData, FlowLog, FlowRecord};
pub use protocol::ProtocolConfig;
pub use units::{Bitrate, Bytes};
