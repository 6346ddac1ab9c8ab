// src/scheduler/mod.rs

//! Access to the HTCondor scheduler.
//!
//! The coordinator talks to a [`SchedulerClient`] instead of spawning
//! processes itself. [`CondorClient`] is the production implementation that
//! shells out to `condor_submit`, `condor_rm` and `condor_q`; tests provide
//! scripted ones.

use std::fmt::Debug;
use std::path::Path;

use futures::future::BoxFuture;

use crate::errors::Result;

pub mod condor;
pub mod queue;

pub use condor::{CondorBinaries, CondorClient};
pub use queue::QueueEntry;

/// Result of a kill that the scheduler did not reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOutcome {
    /// At least one job matched and was removed. Carries the tool output.
    Removed(String),
    /// No job carried the invocation id. Carries the tool output.
    NotFound(String),
}

pub trait SchedulerClient: Send + Sync + Debug {
    /// Submit the description at `submit_file` and return the cluster id.
    fn submit<'a>(&'a self, submit_file: &'a Path) -> BoxFuture<'a, Result<String>>;

    /// Remove every job whose `IpcUuid` equals `invocation_id`.
    fn kill<'a>(&'a self, invocation_id: &'a str) -> BoxFuture<'a, Result<KillOutcome>>;

    /// Invocation ids of all held jobs.
    fn held_invocation_ids(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Full queue listing.
    fn queue_entries(&self) -> BoxFuture<'_, Result<Vec<QueueEntry>>>;
}
