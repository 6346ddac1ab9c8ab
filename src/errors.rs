// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    TemplateError(#[from] tera::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("AMQP error: {0}")]
    AmqpError(#[from] lapin::Error),

    #[error("Job is missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown execution target: {0}")]
    UnknownTarget(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("Could not find '{0}' on the search path")]
    BinaryNotFound(String),

    #[error("condor_submit failed ({status}):\n{output}")]
    SubmitFailed { status: String, output: String },

    #[error("condor_submit output did not contain a cluster id:\n{0}")]
    JobIdMissing(String),

    #[error("condor_rm failed for invocation {invocation_id} ({status}):\n{output}")]
    KillFailed {
        invocation_id: String,
        status: String,
        output: String,
    },

    #[error("condor_q failed ({status}):\n{output}")]
    QueryFailed { status: String, output: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, LauncherError>;
