// src/submit/mod.rs

//! Submission artifact builders.
//!
//! A builder turns a [`JobDescription`] into the files HTCondor transfers to
//! the execute node and returns the path of the submit file, together with
//! the job as written to the workspace. Which builder
//! runs is decided by the job's `execution_target`:
//!
//! - `condor` (or empty): the road-runner layout, see [`condor`].
//! - `osg`: the Open Science Grid wrapper layout, see [`osg`].

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use crate::config::ConfigFile;
use crate::credentials::CredentialStore;
use crate::errors::{LauncherError, Result};
use crate::fs::{FileSystem, FILE_MODE};
use crate::model::JobDescription;

pub mod condor;
pub mod osg;
pub mod templates;
pub mod tickets;

pub use condor::CondorSubmissionBuilder;
pub use osg::OsgSubmissionBuilder;
pub use templates::Templates;

/// Name of the submit file in every workspace.
pub const SUBMIT_FILE: &str = "iplant.cmd";
/// Serialized job description.
pub const JOB_FILE: &str = "job";

pub const CONDOR_TARGET: &str = "condor";
pub const OSG_TARGET: &str = "osg";

/// What a builder leaves behind in a workspace.
#[derive(Debug, Clone)]
pub struct BuiltSubmission {
    pub submit_file: PathBuf,
    /// The job with the list and config file names filled in, as stored in
    /// the workspace's `job` file.
    pub job: JobDescription,
}

pub trait SubmissionBuilder: Send + Sync + Debug {
    /// Write every artifact of `job` into `dir` (created if missing).
    fn build<'a>(
        &'a self,
        job: &'a JobDescription,
        dir: &'a Path,
    ) -> BoxFuture<'a, Result<BuiltSubmission>>;
}

/// Builders keyed by execution target.
#[derive(Debug, Clone)]
pub struct Builders {
    condor: Arc<dyn SubmissionBuilder>,
    osg: Arc<dyn SubmissionBuilder>,
}

impl Builders {
    pub fn new(
        cfg: Arc<ConfigFile>,
        templates: Arc<Templates>,
        fs: Arc<dyn FileSystem>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        let condor = CondorSubmissionBuilder::new(
            Arc::clone(&cfg),
            Arc::clone(&templates),
            Arc::clone(&fs),
            credentials,
        );
        let osg = OsgSubmissionBuilder::new(cfg, templates, fs);
        Self::from_parts(Arc::new(condor), Arc::new(osg))
    }

    pub fn from_parts(
        condor: Arc<dyn SubmissionBuilder>,
        osg: Arc<dyn SubmissionBuilder>,
    ) -> Self {
        Self { condor, osg }
    }

    pub fn for_target(&self, target: &str) -> Result<&dyn SubmissionBuilder> {
        match target {
            "" | CONDOR_TARGET => Ok(self.condor.as_ref()),
            OSG_TARGET => Ok(self.osg.as_ref()),
            other => Err(LauncherError::UnknownTarget(other.to_string())),
        }
    }
}

/// Checks shared by every builder.
pub(crate) fn validate_job(job: &JobDescription) -> Result<()> {
    if job.invocation_id.is_empty() {
        return Err(LauncherError::MissingField("uuid"));
    }
    if job.submitter.is_empty() {
        return Err(LauncherError::MissingField("username"));
    }
    if job.steps.is_empty() {
        return Err(LauncherError::MissingField("steps"));
    }
    Ok(())
}

pub(crate) fn write_artifact(
    fs: &dyn FileSystem,
    dir: &Path,
    name: &str,
    contents: &[u8],
) -> Result<PathBuf> {
    let path = dir.join(name);
    fs.write_file(&path, contents, FILE_MODE)?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote submission artifact");
    Ok(path)
}

/// The `job` file: the job description as JSON, newline-terminated.
pub(crate) fn write_job_file(fs: &dyn FileSystem, dir: &Path, job: &JobDescription) -> Result<PathBuf> {
    let mut contents = serde_json::to_vec(job)?;
    contents.push(b'\n');
    write_artifact(fs, dir, JOB_FILE, &contents)
}
