//! Job orchestration for multi-step command sequences.
//!
//! An [`Executor`] starts external commands described by a [`Spec`], drains
//! their output while they run, and counts failures. Once a failure has been
//! counted, later submissions are skipped unless the executor ignores errors,
//! so a long setup sequence can be written as straight-line calls followed by
//! a single [`Executor::err`] check.

mod executor;
mod job;

pub use executor::{ExecError, Executor};
pub use job::{Job, JobError, Spec};
