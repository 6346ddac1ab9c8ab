// src/submit/osg.rs

//! Builder for jobs sent to the Open Science Grid.
//!
//! OSG jobs run a single container step under a wrapper script. Instead of a
//! road-runner config the wrapper reads `config.json`, and it reaches iRODS
//! through tickets only, so no Vault lease is taken.

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Url;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::info;

use crate::config::ConfigFile;
use crate::errors::{LauncherError, Result};
use crate::fs::{FileSystem, DIR_MODE};
use crate::model::JobDescription;
use crate::submit::templates::{OsgSubmitContext, Templates};
use crate::submit::tickets::{write_ticket_lists, TicketListKinds};
use crate::submit::{
    validate_job, write_artifact, write_job_file, BuiltSubmission, SubmissionBuilder, SUBMIT_FILE,
};

pub const OSG_CONFIG_FILE: &str = "config.json";

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OsgJobConfig {
    pub arguments: Vec<String>,
    pub irods_host: String,
    pub irods_port: u16,
    pub irods_job_user: String,
    pub irods_user_name: String,
    pub irods_zone_name: String,
    pub input_ticket_list: String,
    pub output_ticket_list: String,
    pub status_update_url: String,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug)]
pub struct OsgSubmissionBuilder {
    cfg: Arc<ConfigFile>,
    templates: Arc<Templates>,
    fs: Arc<dyn FileSystem>,
}

impl OsgSubmissionBuilder {
    pub fn new(cfg: Arc<ConfigFile>, templates: Arc<Templates>, fs: Arc<dyn FileSystem>) -> Self {
        Self { cfg, templates, fs }
    }

    /// `<status_listener_url>/<invocation id>/status`, with the id escaped.
    pub fn status_update_url(&self, invocation_id: &str) -> Result<String> {
        let base = &self.cfg.osg.status_listener_url;
        let mut url = Url::parse(base).map_err(|e| {
            LauncherError::ConfigError(format!("invalid [osg].status_listener_url '{base}': {e}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                LauncherError::ConfigError(format!(
                    "[osg].status_listener_url '{base}' cannot take a path"
                ))
            })?
            .pop_if_empty()
            .push(invocation_id)
            .push("status");
        Ok(url.to_string())
    }

    pub fn job_config(&self, job: &JobDescription) -> Result<OsgJobConfig> {
        let step = single_step(job)?;
        let osg = &self.cfg.osg;
        Ok(OsgJobConfig {
            arguments: step.arguments(),
            irods_host: osg.irods_host.clone(),
            irods_port: osg.irods_port,
            irods_job_user: osg.irods_job_user.clone(),
            irods_user_name: job.submitter.clone(),
            irods_zone_name: String::new(),
            input_ticket_list: job.input_ticket_list.clone(),
            output_ticket_list: job.output_ticket_list.clone(),
            status_update_url: self.status_update_url(&job.invocation_id)?,
            stdout: "out.txt".to_string(),
            stderr: "err.txt".to_string(),
        })
    }

    pub fn render_submit(&self, job: &JobDescription) -> Result<String> {
        let step = single_step(job)?;
        let mut files = vec![SUBMIT_FILE];
        for name in [&job.config_file, &job.output_ticket_list, &job.input_ticket_list] {
            if !name.is_empty() {
                files.push(name.as_str());
            }
        }

        let ctx = OsgSubmitContext {
            image_path: &step.component.container.image.osg_image_path,
            invocation_id: &job.invocation_id,
            submitter: &job.submitter,
            project_name: &self.cfg.osg.project_name,
            transfer_input_files: files.join(","),
        };
        self.templates.osg_submit(&ctx)
    }

    async fn build_inner(&self, job: &JobDescription, dir: &Path) -> Result<BuiltSubmission> {
        validate_job(job)?;
        single_step(job)?;
        let fs = self.fs.as_ref();
        fs.create_dir_all(dir, DIR_MODE)?;

        let mut job = job.clone();
        write_ticket_lists(
            &mut job,
            TicketListKinds { path_list: false },
            &self.cfg,
            &self.templates,
            fs,
            dir,
        )?;

        let config = self.job_config(&job)?;
        write_artifact(fs, dir, OSG_CONFIG_FILE, &to_pretty_json(&config)?)?;
        job.config_file = OSG_CONFIG_FILE.to_string();

        let submit = self.render_submit(&job)?;
        let submit_path = write_artifact(fs, dir, SUBMIT_FILE, submit.as_bytes())?;
        write_job_file(fs, dir, &job)?;

        info!(
            invocation_id = %job.invocation_id,
            dir = %dir.display(),
            "wrote osg submission files"
        );
        Ok(BuiltSubmission {
            submit_file: submit_path,
            job,
        })
    }
}

fn single_step(job: &JobDescription) -> Result<&crate::model::Step> {
    match job.steps.as_slice() {
        [step] => Ok(step),
        steps => Err(LauncherError::Other(anyhow::anyhow!(
            "OSG jobs must have exactly one step (got {})",
            steps.len()
        ))),
    }
}

/// JSON indented by four spaces, newline-terminated.
pub fn to_pretty_json(value: &impl Serialize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    out.push(b'\n');
    Ok(out)
}

impl SubmissionBuilder for OsgSubmissionBuilder {
    fn build<'a>(
        &'a self,
        job: &'a JobDescription,
        dir: &'a Path,
    ) -> BoxFuture<'a, Result<BuiltSubmission>> {
        Box::pin(self.build_inner(job, dir))
    }
}
