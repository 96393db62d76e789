//! Network simulation toolkit for FCT harm tests.
//!
//! Builds a chain of Linux network namespaces (left endpoints, bridged
//! middleboxes, right endpoints) and installs `tc` qdiscs on it: `netem` for
//! path delay, HTB for the bottleneck rate and an AQM underneath. All
//! commands run through an [`fct_exec::Executor`].

pub mod impairment;
pub mod topology;

pub mod test_util;

pub use topology::{Rig, RigConfig, RigError};
