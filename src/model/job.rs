// src/model/job.rs

//! The job description carried by launch requests.
//!
//! Field names follow the JSON produced by the upstream apps service. Fields
//! this crate does not interpret are kept in `extra` so the `job` file written
//! next to the submission carries everything upstream sent.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::config::ConfigFile;

/// Format of `now_date`; it ends up in directory names.
pub const NOW_DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S%.3f";

/// Accounting group used when the job does not name one.
pub const DEFAULT_ACCOUNTING_GROUP: &str = "de";

static TIMESTAMPED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-\d{4}(?:-\d{2}){5}\.\d+$").expect("timestamped name pattern is valid")
});

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDescription {
    #[serde(rename = "uuid", default, deserialize_with = "nullable")]
    pub invocation_id: String,

    #[serde(rename = "username", default, deserialize_with = "nullable")]
    pub submitter: String,

    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub execution_target: String,

    #[serde(default, deserialize_with = "nullable")]
    pub group: String,

    #[serde(default, deserialize_with = "nullable")]
    pub request_disk: String,

    #[serde(default, deserialize_with = "nullable")]
    pub user_id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub user_groups: Vec<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub now_date: String,

    #[serde(default, deserialize_with = "nullable")]
    pub steps: Vec<Step>,

    #[serde(default, deserialize_with = "nullable")]
    pub output_dir: String,

    /// Write ticket for `output_dir`.
    #[serde(default, deserialize_with = "nullable")]
    pub output_dir_ticket: String,

    #[serde(default)]
    pub create_output_subdir: bool,

    // The next three come from configuration, not upstream.
    #[serde(default, deserialize_with = "nullable")]
    pub condor_log_path: String,

    #[serde(default, deserialize_with = "nullable")]
    pub irods_base: String,

    #[serde(default, deserialize_with = "nullable")]
    pub filter_files: Vec<String>,

    // Names of generated files inside the workspace, filled in by the builders.
    #[serde(default, deserialize_with = "nullable")]
    pub input_ticket_list: String,

    #[serde(default, deserialize_with = "nullable")]
    pub output_ticket_list: String,

    #[serde(default, deserialize_with = "nullable")]
    pub input_path_list: String,

    #[serde(default, deserialize_with = "nullable")]
    pub config_file: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub component: StepComponent,

    #[serde(default)]
    pub config: StepConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepComponent {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub location: String,

    #[serde(default)]
    pub container: Container,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default)]
    pub image: ContainerImage,

    #[serde(default, deserialize_with = "nullable")]
    pub container_volumes: Vec<Volume>,

    /// Bytes.
    #[serde(default, deserialize_with = "nullable")]
    pub memory_limit: i64,

    #[serde(default, deserialize_with = "nullable")]
    pub max_cpu_cores: f32,

    /// Bytes.
    #[serde(default, deserialize_with = "nullable")]
    pub min_disk_space: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerImage {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub tag: String,

    #[serde(default, deserialize_with = "nullable")]
    pub osg_image_path: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, deserialize_with = "nullable")]
    pub host_path: String,

    #[serde(default, deserialize_with = "nullable")]
    pub container_path: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default, deserialize_with = "nullable")]
    pub inputs: Vec<StepInput>,

    #[serde(default, deserialize_with = "nullable")]
    pub outputs: Vec<Value>,

    #[serde(default, deserialize_with = "nullable")]
    pub params: Vec<StepParam>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInput {
    /// Pre-issued read ticket for `value`, if any.
    #[serde(default, deserialize_with = "nullable")]
    pub ticket: String,

    /// `"collection"` for directories.
    #[serde(default, deserialize_with = "nullable")]
    pub multiplicity: String,

    /// iRODS path of the input.
    #[serde(default, deserialize_with = "nullable")]
    pub value: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepParam {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, deserialize_with = "nullable")]
    pub value: String,

    #[serde(default, deserialize_with = "nullable")]
    pub order: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StepInput {
    /// iRODS path of the input; collections always end with `/`.
    pub fn irods_path(&self) -> String {
        if self.multiplicity == "collection" && !self.value.ends_with('/') {
            format!("{}/", self.value)
        } else {
            self.value.clone()
        }
    }
}

impl Step {
    pub fn uses_volumes(&self) -> bool {
        !self.component.container.container_volumes.is_empty()
    }

    /// Command-line arguments of the step, ordered by `order`.
    pub fn arguments(&self) -> Vec<String> {
        let mut params: Vec<&StepParam> = self.config.params.iter().collect();
        params.sort_by_key(|p| p.order);

        let mut args = Vec::new();
        for p in params {
            if !p.name.is_empty() {
                args.push(p.name.clone());
            }
            if !p.value.is_empty() {
                args.push(p.value.clone());
            }
        }
        args
    }
}

fn sanitize(s: &str) -> String {
    s.replace(['@', ' '], "_")
}

impl JobDescription {
    /// Minimal record used when reporting on a job this process never saw,
    /// e.g. one being killed.
    pub fn stub(invocation_id: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            ..Self::default()
        }
    }

    /// Make the fields that end up in paths safe to use there.
    pub fn sanitize(&mut self) {
        self.submitter = sanitize(&self.submitter);
        self.name = sanitize(&self.name);

        for step in self.steps.iter_mut() {
            let image = &mut step.component.container.image;
            image.name = image.name.trim().to_string();
            image.tag = image.tag.trim().to_string();
            image.osg_image_path = image.osg_image_path.trim().to_string();
        }
    }

    /// Fill in everything a launch request leaves to the launcher.
    ///
    /// Only unset values are touched, apart from sanitization.
    pub fn apply_launcher_defaults(&mut self, cfg: &ConfigFile) {
        if self.request_disk.is_empty() {
            self.request_disk = if !cfg.condor.request_disk.is_empty() {
                cfg.condor.request_disk.clone()
            } else {
                "0".to_string()
            };
        }

        if self.now_date.is_empty() {
            self.now_date = chrono::Local::now().format(NOW_DATE_FORMAT).to_string();
        }

        if self.condor_log_path.is_empty() {
            self.condor_log_path = cfg.condor.log_path.clone();
        }

        if self.irods_base.is_empty() {
            self.irods_base = cfg.irods.base.clone();
        }

        if self.filter_files.is_empty() && !cfg.condor.filter_files.is_empty() {
            self.filter_files = cfg
                .condor
                .filter_files
                .split(',')
                .map(|s| s.to_string())
                .collect();
        }

        self.sanitize();
    }

    /// Directory name for this run: the job name when it already ends in a
    /// timestamp, otherwise the name with `now_date` appended.
    pub fn directory_name(&self) -> String {
        if TIMESTAMPED_NAME.is_match(&self.name) {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.now_date)
        }
    }

    /// `<condor_log_path>/<submitter>/<directory_name>/logs`
    pub fn workspace_dir(&self) -> PathBuf {
        PathBuf::from(&self.condor_log_path)
            .join(&self.submitter)
            .join(self.directory_name())
            .join("logs")
    }

    /// Value of `concurrency_limits`: the user id without dashes, or the hex
    /// SHA-256 of the submitter when no user id was sent.
    pub fn user_id_for_submission(&self) -> String {
        let id = if self.user_id.is_empty() {
            hex::encode(Sha256::digest(self.submitter.as_bytes()))
        } else {
            self.user_id.clone()
        };
        format!("_{}", id.replace('-', ""))
    }

    pub fn accounting_group(&self) -> &str {
        if self.group.is_empty() {
            DEFAULT_ACCOUNTING_GROUP
        } else {
            &self.group
        }
    }

    pub fn uses_volumes(&self) -> bool {
        self.steps.iter().any(Step::uses_volumes)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &StepInput> {
        self.steps.iter().flat_map(|s| s.config.inputs.iter())
    }

    pub fn inputs_with_tickets(&self) -> Vec<&StepInput> {
        self.inputs().filter(|i| !i.ticket.is_empty()).collect()
    }

    pub fn inputs_without_tickets(&self) -> Vec<&StepInput> {
        self.inputs().filter(|i| i.ticket.is_empty()).collect()
    }

    /// Number of distinct iRODS paths read by the job.
    pub fn distinct_input_count(&self) -> usize {
        self.inputs()
            .map(StepInput::irods_path)
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Largest `max_cpu_cores` across the steps, `0.0` if none set one.
    pub fn cpu_request(&self) -> f32 {
        self.steps
            .iter()
            .map(|s| s.component.container.max_cpu_cores)
            .fold(0.0, f32::max)
    }

    /// Largest `memory_limit` across the steps, in bytes.
    pub fn memory_request(&self) -> i64 {
        self.steps
            .iter()
            .map(|s| s.component.container.memory_limit)
            .max()
            .unwrap_or(0)
            .max(0)
    }

    /// Largest `min_disk_space` across the steps, in bytes.
    pub fn disk_request(&self) -> i64 {
        self.steps
            .iter()
            .map(|s| s.component.container.min_disk_space)
            .max()
            .unwrap_or(0)
            .max(0)
    }
}
