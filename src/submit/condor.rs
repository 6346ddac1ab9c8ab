// src/submit/condor.rs

//! Builder for jobs run by road-runner on the local HTCondor pool.
//!
//! Files written into the workspace:
//!
//! | file | contents |
//! |------|----------|
//! | `iplant.cmd` | HTCondor submit description |
//! | `config` | road-runner config, including the Vault lease token |
//! | `irods-config` | porklock iRODS settings |
//! | `job` | the job description as JSON |
//! | `*.list` | ticket and path lists, see [`crate::submit::tickets`] |

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::credentials::{lease_uses, CredentialStore};
use crate::errors::{LauncherError, Result};
use crate::fs::{FileSystem, DIR_MODE};
use crate::model::{condor_bytes, format_list, JobDescription};
use crate::submit::templates::{CondorSubmitContext, JobConfigContext, Templates};
use crate::submit::tickets::{write_ticket_lists, TicketListKinds};
use crate::submit::{
    validate_job, write_artifact, write_job_file, BuiltSubmission, SubmissionBuilder, JOB_FILE,
    SUBMIT_FILE,
};

pub const JOB_CONFIG_FILE: &str = "config";
pub const IRODS_CONFIG_FILE: &str = "irods-config";

#[derive(Debug)]
pub struct CondorSubmissionBuilder {
    cfg: Arc<ConfigFile>,
    templates: Arc<Templates>,
    fs: Arc<dyn FileSystem>,
    credentials: Arc<dyn CredentialStore>,
}

impl CondorSubmissionBuilder {
    pub fn new(
        cfg: Arc<ConfigFile>,
        templates: Arc<Templates>,
        fs: Arc<dyn FileSystem>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            cfg,
            templates,
            fs,
            credentials,
        }
    }

    /// Render the submit file for a job whose ticket lists are already known.
    pub fn render_submit(&self, job: &JobDescription) -> Result<String> {
        let first = &job
            .steps
            .first()
            .ok_or(LauncherError::MissingField("steps"))?
            .component;
        let cpus = job.cpu_request();
        let memory = job.memory_request();

        let ctx = CondorSubmitContext {
            uses_volumes: job.uses_volumes(),
            accounting_group: job.accounting_group(),
            submitter: &job.submitter,
            request_cpus: if cpus > 0.0 { cpus.to_string() } else { String::new() },
            request_memory: if memory > 0 { condor_bytes(memory) } else { String::new() },
            request_disk: if job.request_disk.is_empty() { "0" } else { &job.request_disk },
            invocation_id: &job.invocation_id,
            user_groups: format_list(&job.user_groups),
            concurrency_limits: job.user_id_for_submission(),
            exe: &first.name,
            exe_path: &first.location,
            transfer_input_files: transfer_input_files(job),
        };
        self.templates.condor_submit(&ctx)
    }

    pub fn render_job_config(&self, vault_token: &str) -> Result<String> {
        let cfg = &self.cfg;
        let ctx = JobConfigContext {
            amqp_uri: &cfg.amqp.uri,
            exchange_name: &cfg.amqp.exchange.name,
            exchange_type: &cfg.amqp.exchange.kind,
            irods_base: &cfg.irods.base,
            porklock_image: &cfg.porklock.image,
            porklock_tag: &cfg.porklock.tag,
            filter_files: &cfg.condor.filter_files,
            vault_token,
            vault_url: self.credentials.url(),
        };
        self.templates.job_config(&ctx)
    }

    async fn build_inner(&self, job: &JobDescription, dir: &Path) -> Result<BuiltSubmission> {
        validate_job(job)?;
        let fs = self.fs.as_ref();
        fs.create_dir_all(dir, DIR_MODE)?;

        let mut job = job.clone();
        write_ticket_lists(
            &mut job,
            TicketListKinds { path_list: true },
            &self.cfg,
            &self.templates,
            fs,
            dir,
        )?;

        let uses = lease_uses(job.distinct_input_count());
        let token = self.credentials.child_token(uses).await?;
        let irods_config = self.templates.irods_config(&self.cfg.irods)?;
        self.credentials
            .store_config(&token, &job.invocation_id, &irods_config)
            .await?;
        debug!(invocation_id = %job.invocation_id, uses, "leased credentials for job");

        job.config_file = JOB_CONFIG_FILE.to_string();
        let job_config = self.render_job_config(&token)?;
        let submit = self.render_submit(&job)?;

        write_artifact(fs, dir, JOB_CONFIG_FILE, job_config.as_bytes())?;
        write_artifact(fs, dir, IRODS_CONFIG_FILE, irods_config.as_bytes())?;
        let submit_path = write_artifact(fs, dir, SUBMIT_FILE, submit.as_bytes())?;
        write_job_file(fs, dir, &job)?;

        info!(
            invocation_id = %job.invocation_id,
            dir = %dir.display(),
            "wrote condor submission files"
        );
        Ok(BuiltSubmission {
            submit_file: submit_path,
            job,
        })
    }
}

/// `irods-config,iplant.cmd,config,job` followed by whichever lists exist.
pub fn transfer_input_files(job: &JobDescription) -> String {
    let mut files = vec![IRODS_CONFIG_FILE, SUBMIT_FILE, JOB_CONFIG_FILE, JOB_FILE];
    for list in [
        &job.output_ticket_list,
        &job.input_ticket_list,
        &job.input_path_list,
    ] {
        if !list.is_empty() {
            files.push(list.as_str());
        }
    }
    files.join(",")
}

impl SubmissionBuilder for CondorSubmissionBuilder {
    fn build<'a>(
        &'a self,
        job: &'a JobDescription,
        dir: &'a Path,
    ) -> BoxFuture<'a, Result<BuiltSubmission>> {
        Box::pin(self.build_inner(job, dir))
    }
}
