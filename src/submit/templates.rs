// src/submit/templates.rs

//! Compiled templates for every file a submission writes.
//!
//! One [`Templates`] value is built at startup and shared by the builders.
//! Each template has a matching context struct; values that need logic
//! (transfer lists, list literals, byte units) are computed by the builders
//! and reach the templates as plain strings.

use serde::Serialize;
use tera::{Context, Tera};

use crate::errors::Result;

const CONDOR_SUBMIT: &str = "condor_submit";
const JOB_CONFIG: &str = "job_config";
const IRODS_CONFIG: &str = "irods_config";
const OSG_SUBMIT: &str = "osg_submit";
const INPUT_TICKET_LIST: &str = "input_ticket_list";
const OUTPUT_TICKET_LIST: &str = "output_ticket_list";
const INPUT_PATH_LIST: &str = "input_path_list";

const CONDOR_SUBMIT_TEXT: &str = r#"universe = vanilla
executable = /usr/local/bin/road-runner
rank = mips
{% if uses_volumes %}requirements = (HAS_HOST_MOUNTS == True)
{% endif %}arguments = --config config --job job
output = script-output.log
error = script-error.log
log = condor.log
accounting_group = {{ accounting_group }}
accounting_group_user = {{ submitter }}
{% if request_cpus %}request_cpus = {{ request_cpus }}
{% endif %}{% if request_memory %}request_memory = {{ request_memory }}
{% endif %}request_disk = {{ request_disk }}
+IpcUuid = "{{ invocation_id }}"
+IpcJobId = "generated_script"
+IpcUsername = "{{ submitter }}"
+IpcUserGroups = {{ user_groups }}
concurrency_limits = {{ concurrency_limits }}
+IpcExe = "{{ exe }}"
+IpcExePath = "{{ exe_path }}"
should_transfer_files = YES
transfer_input_files = {{ transfer_input_files }}
transfer_output_files = workingvolume/logs/logs-stdout-output,workingvolume/logs/logs-stderr-output
when_to_transfer_output = ON_EXIT_OR_EVICT
notification = NEVER
queue
"#;

const JOB_CONFIG_TEXT: &str = r#"amqp:
    uri: {{ amqp_uri }}
    exchange:
        name: {{ exchange_name }}
        type: {{ exchange_type }}
irods:
    base: "{{ irods_base }}"
porklock:
    image: "{{ porklock_image }}"
    tag: "{{ porklock_tag }}"
condor:
    filter_files: "{{ filter_files }}"
vault:
    token: "{{ vault_token }}"
    url: "{{ vault_url }}"
"#;

const IRODS_CONFIG_TEXT: &str = r#"porklock.irods-host = {{ host }}
porklock.irods-port = {{ port }}
porklock.irods-user = {{ user }}
porklock.irods-pass = {{ pass }}
porklock.irods-home = {{ base }}
porklock.irods-zone = {{ zone }}
porklock.irods-resc = {{ resc }}
"#;

const OSG_SUBMIT_TEXT: &str = r#"universe = vanilla
executable = /usr/bin/wrapper
requirements = HAS_SINGULARITY == TRUE

output = script-output.log
error = script-error.log
log = condor.log

+SingularityImage = "{{ image_path }}"
+SingularityBindCVMFS = True

+IpcUuid = "{{ invocation_id }}"
+IpcJobId = "generated_script"
+IpcUsername = "{{ submitter }}"
+ProjectName = "{{ project_name }}"

should_transfer_files = YES
transfer_executable = False
transfer_input_files = {{ transfer_input_files }}
when_to_transfer_output = ON_EXIT_OR_EVICT
notification = NEVER

queue
"#;

const INPUT_TICKET_LIST_TEXT: &str = "{{ header }}
{% for entry in entries %}{{ entry.ticket }},{{ entry.path }}
{% endfor %}";

const OUTPUT_TICKET_LIST_TEXT: &str = "{{ header }}
{{ ticket }},{{ path }}
";

const INPUT_PATH_LIST_TEXT: &str = "{{ header }}
{% for path in paths %}{{ path }}
{% endfor %}";

#[derive(Debug, Serialize)]
pub struct CondorSubmitContext<'a> {
    pub uses_volumes: bool,
    pub accounting_group: &'a str,
    pub submitter: &'a str,
    /// Empty when the job does not ask for cores.
    pub request_cpus: String,
    /// Empty when the job does not ask for memory.
    pub request_memory: String,
    pub request_disk: &'a str,
    pub invocation_id: &'a str,
    pub user_groups: String,
    pub concurrency_limits: String,
    pub exe: &'a str,
    pub exe_path: &'a str,
    pub transfer_input_files: String,
}

#[derive(Debug, Serialize)]
pub struct JobConfigContext<'a> {
    pub amqp_uri: &'a str,
    pub exchange_name: &'a str,
    pub exchange_type: &'a str,
    pub irods_base: &'a str,
    pub porklock_image: &'a str,
    pub porklock_tag: &'a str,
    pub filter_files: &'a str,
    pub vault_token: &'a str,
    pub vault_url: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OsgSubmitContext<'a> {
    pub image_path: &'a str,
    pub invocation_id: &'a str,
    pub submitter: &'a str,
    pub project_name: &'a str,
    pub transfer_input_files: String,
}

#[derive(Debug, Serialize)]
pub struct TicketEntry {
    pub ticket: String,
    pub path: String,
}

#[derive(Debug)]
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        // None of these files are markup.
        tera.autoescape_on(vec![]);
        tera.add_raw_templates(vec![
            (CONDOR_SUBMIT, CONDOR_SUBMIT_TEXT),
            (JOB_CONFIG, JOB_CONFIG_TEXT),
            (IRODS_CONFIG, IRODS_CONFIG_TEXT),
            (OSG_SUBMIT, OSG_SUBMIT_TEXT),
            (INPUT_TICKET_LIST, INPUT_TICKET_LIST_TEXT),
            (OUTPUT_TICKET_LIST, OUTPUT_TICKET_LIST_TEXT),
            (INPUT_PATH_LIST, INPUT_PATH_LIST_TEXT),
        ])?;
        Ok(Self { tera })
    }

    fn render(&self, name: &str, data: &impl Serialize) -> Result<String> {
        let ctx = Context::from_serialize(data)?;
        Ok(self.tera.render(name, &ctx)?)
    }

    pub fn condor_submit(&self, ctx: &CondorSubmitContext<'_>) -> Result<String> {
        self.render(CONDOR_SUBMIT, ctx)
    }

    pub fn job_config(&self, ctx: &JobConfigContext<'_>) -> Result<String> {
        self.render(JOB_CONFIG, ctx)
    }

    pub fn irods_config(&self, irods: &crate::config::IrodsSection) -> Result<String> {
        self.render(IRODS_CONFIG, irods)
    }

    pub fn osg_submit(&self, ctx: &OsgSubmitContext<'_>) -> Result<String> {
        self.render(OSG_SUBMIT, ctx)
    }

    pub fn input_ticket_list(&self, header: &str, entries: &[TicketEntry]) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("header", header);
        ctx.insert("entries", entries);
        Ok(self.tera.render(INPUT_TICKET_LIST, &ctx)?)
    }

    pub fn output_ticket_list(&self, header: &str, ticket: &str, path: &str) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("header", header);
        ctx.insert("ticket", ticket);
        ctx.insert("path", path);
        Ok(self.tera.render(OUTPUT_TICKET_LIST, &ctx)?)
    }

    pub fn input_path_list(&self, header: &str, paths: &[String]) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("header", header);
        ctx.insert("paths", paths);
        Ok(self.tera.render(INPUT_PATH_LIST, &ctx)?)
    }
}
