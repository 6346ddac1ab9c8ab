// src/credentials/mod.rs

//! Credential-lease provider used while building a submission.
//!
//! A build asks for a child token limited to a number of uses, then stores the
//! job's iRODS config under the invocation id with that token. The token is
//! also written into the job config so the job itself can read the secret back.

use std::fmt::Debug;

use futures::future::BoxFuture;

use crate::errors::Result;

pub mod vault;

pub use vault::VaultClient;

pub trait CredentialStore: Send + Sync + Debug {
    /// Issue a child token that expires after `num_uses` uses.
    fn child_token(&self, num_uses: u32) -> BoxFuture<'_, Result<String>>;

    /// Store `config` at `<mount>/<invocation_id>`, authenticating with `token`.
    fn store_config<'a>(
        &'a self,
        token: &'a str,
        invocation_id: &'a str,
        config: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Base URL handed to jobs that need to reach the store.
    fn url(&self) -> &str;
}

/// Uses granted to the lease of one job: one per distinct input, plus one
/// for the config write and one for the job's read of it.
pub fn lease_uses(distinct_inputs: usize) -> u32 {
    u32::try_from(distinct_inputs)
        .unwrap_or(u32::MAX - 2)
        .saturating_add(2)
}
