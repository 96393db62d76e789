//! Open-loop flow workload generator and the FCT server it talks to.
//!
//! A test resolves [`WorkloadParams`] into a [`WorkloadPlan`], then
//! [`Workload::run`] issues the planned flows against a [`Server`] and
//! returns the completed [`FlowData`](fct_common::FlowData).

pub mod config;
pub mod dist;
pub mod error;
pub mod server;
pub mod workload;

pub use config::{WorkloadParams, WorkloadPlan};
pub use error::{ConfigError, FlowError, RunError, ServerError};
pub use server::{Server, ServerConfig};
pub use workload::Workload;
