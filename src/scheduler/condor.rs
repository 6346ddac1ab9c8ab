// src/scheduler/condor.rs

//! `SchedulerClient` backed by the HTCondor command-line tools.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use futures::future::BoxFuture;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::CondorSection;
use crate::errors::{LauncherError, Result};
use crate::scheduler::queue::{
    parse_invocation_id_listing, parse_queue_entries, HELD_STATUS, INVOCATION_ID_KEY, STATUS_KEY,
};
use crate::scheduler::{KillOutcome, QueueEntry, SchedulerClient};

static CLUSTER_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"submitted to cluster \(?(\d+)").expect("cluster id pattern is valid")
});

/// Messages `condor_rm` prints when a constraint matched nothing.
const NOT_FOUND_MARKERS: [&str; 3] = ["couldn't find", "no jobs matching", "no jobs found"];

/// Pull the cluster id out of `condor_submit` output.
pub fn extract_cluster_id(output: &str) -> Option<String> {
    CLUSTER_ID
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// ClassAd constraint selecting the jobs of one invocation.
pub fn invocation_constraint(invocation_id: &str) -> String {
    let escaped = invocation_id.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{INVOCATION_ID_KEY} =?= \"{escaped}\"")
}

fn reports_no_match(output: &str) -> bool {
    let lower = output.to_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

/// Absolute paths of the three tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondorBinaries {
    pub submit: PathBuf,
    pub remove: PathBuf,
    pub queue: PathBuf,
}

/// Find `name` the way a shell would: names with a `/` are taken as given,
/// others are looked up in each directory of `search_path`. The result is
/// made absolute.
pub fn find_binary(name: &str, search_path: &OsStr) -> Result<PathBuf> {
    let candidate = if name.contains('/') {
        Some(PathBuf::from(name)).filter(|p| p.is_file())
    } else {
        env::split_paths(search_path)
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
    };

    let found = candidate.ok_or_else(|| LauncherError::BinaryNotFound(name.to_string()))?;
    if found.is_absolute() {
        Ok(found)
    } else {
        Ok(env::current_dir()?.join(found))
    }
}

#[derive(Debug, Clone)]
pub struct CondorClient {
    binaries: CondorBinaries,
    path_env: String,
    condor_config: String,
}

impl CondorClient {
    /// Resolve the configured tools. The process `PATH` is searched first,
    /// then `[condor].path_env_var`. A missing tool is fatal to startup.
    pub fn locate(cfg: &CondorSection) -> Result<Self> {
        let mut dirs: Vec<PathBuf> = env::var_os("PATH")
            .map(|p| env::split_paths(&p).collect())
            .unwrap_or_default();
        dirs.extend(env::split_paths(&cfg.path_env_var));
        let search = env::join_paths(dirs)
            .map_err(|e| LauncherError::ConfigError(format!("invalid search path: {e}")))?;

        let binaries = CondorBinaries {
            submit: find_binary(&cfg.submit_command, &search)?,
            remove: find_binary(&cfg.remove_command, &search)?,
            queue: find_binary(&cfg.queue_command, &search)?,
        };
        info!(?binaries, "located HTCondor tools");

        Ok(Self::with_binaries(
            binaries,
            cfg.path_env_var.clone(),
            cfg.condor_config.clone(),
        ))
    }

    pub fn with_binaries(binaries: CondorBinaries, path_env: String, condor_config: String) -> Self {
        Self {
            binaries,
            path_env,
            condor_config,
        }
    }

    pub fn binaries(&self) -> &CondorBinaries {
        &self.binaries
    }

    /// A command that sees exactly `PATH` and `CONDOR_CONFIG`.
    fn command(&self, program: &Path) -> Command {
        let mut cmd = Command::new(program);
        cmd.env_clear()
            .env("PATH", &self.path_env)
            .env("CONDOR_CONFIG", &self.condor_config)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Run to completion and return the exit status with stdout followed by
    /// stderr. The output is always logged.
    async fn run(&self, mut cmd: Command, label: &str) -> Result<(ExitStatus, String)> {
        let output = cmd.output().await?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        info!(
            command = label,
            exit_code = output.status.code().unwrap_or(-1),
            success = output.status.success(),
            output = %combined,
            "HTCondor command finished"
        );
        Ok((output.status, combined))
    }

    async fn submit_inner(&self, submit_file: &Path) -> Result<String> {
        let mut cmd = self.command(&self.binaries.submit);
        cmd.arg(submit_file);
        if let Some(dir) = submit_file.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let (status, output) = self.run(cmd, "condor_submit").await?;
        if !status.success() {
            return Err(LauncherError::SubmitFailed {
                status: status.to_string(),
                output,
            });
        }

        let id = extract_cluster_id(&output).ok_or(LauncherError::JobIdMissing(output))?;
        info!(cluster_id = %id, submit_file = %submit_file.display(), "extracted cluster id");
        Ok(id)
    }

    async fn kill_inner(&self, invocation_id: &str) -> Result<KillOutcome> {
        let mut cmd = self.command(&self.binaries.remove);
        cmd.arg("-constraint").arg(invocation_constraint(invocation_id));

        let (status, output) = self.run(cmd, "condor_rm").await?;
        if status.success() {
            return Ok(KillOutcome::Removed(output));
        }
        if reports_no_match(&output) {
            warn!(%invocation_id, "condor_rm found no job for invocation");
            return Ok(KillOutcome::NotFound(output));
        }
        Err(LauncherError::KillFailed {
            invocation_id: invocation_id.to_string(),
            status: status.to_string(),
            output,
        })
    }

    async fn query(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(&self.binaries.queue);
        cmd.args(args);
        let (status, output) = self.run(cmd, "condor_q").await?;
        if !status.success() {
            return Err(LauncherError::QueryFailed {
                status: status.to_string(),
                output,
            });
        }
        Ok(output)
    }

    async fn held_inner(&self) -> Result<Vec<String>> {
        let constraint = format!("{STATUS_KEY} =?= {HELD_STATUS}");
        let output = self
            .query(&["-constraint", &constraint, "-format", "%s\n", INVOCATION_ID_KEY])
            .await?;
        let ids = parse_invocation_id_listing(output.as_bytes());
        debug!(count = ids.len(), "queried held jobs");
        Ok(ids)
    }

    async fn entries_inner(&self) -> Result<Vec<QueueEntry>> {
        let output = self.query(&["-long"]).await?;
        Ok(parse_queue_entries(output.as_bytes()))
    }
}

impl SchedulerClient for CondorClient {
    fn submit<'a>(&'a self, submit_file: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.submit_inner(submit_file))
    }

    fn kill<'a>(&'a self, invocation_id: &'a str) -> BoxFuture<'a, Result<KillOutcome>> {
        Box::pin(self.kill_inner(invocation_id))
    }

    fn held_invocation_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(self.held_inner())
    }

    fn queue_entries(&self) -> BoxFuture<'_, Result<Vec<QueueEntry>>> {
        Box::pin(self.entries_inner())
    }
}
