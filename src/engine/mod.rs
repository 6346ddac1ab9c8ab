// src/engine/mod.rs

//! Job lifecycle engine.
//!
//! This module ties together:
//! - the submission builders
//! - the scheduler client
//! - the message transport
//!
//! [`Coordinator`] turns each inbound delivery into scheduler calls, status
//! updates and an ack/reject decision. [`HeldJobReaper`] is the timer-driven
//! task that feeds held jobs back into the coordinator's stop path.

pub mod coordinator;
pub mod reaper;

pub use coordinator::Coordinator;
pub use reaper::{HeldJobReaper, SweepReport};

/// Message of the update published after a successful submit.
pub fn launched_message(cluster_id: &str) -> String {
    format!("Launched Condor ID {cluster_id}")
}

/// Message of the update published when a launch fails.
pub fn launch_failed_message(err: &impl std::fmt::Display) -> String {
    format!("condor-launcher failed to launch job:\n {err}")
}

pub const KILLED_MESSAGE: &str = "Job was killed";

/// Reason recorded when the reaper stops a job.
pub const HELD_REASON: &str = "Job was in held state";
