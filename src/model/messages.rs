// src/model/messages.rs

//! Message bodies exchanged over the bus, plus the routing keys and queue
//! names the launcher uses.

use serde::{Deserialize, Serialize};

use crate::model::job::JobDescription;

/// Routing key of launch requests.
pub const LAUNCHES_KEY: &str = "jobs.launches";
/// Binding key for stop requests, one routing key per invocation id.
pub const STOPS_BINDING_KEY: &str = "jobs.stops.*";
pub const STOPS_KEY_PREFIX: &str = "jobs.stops.";
/// Routing key for job status updates.
pub const UPDATES_KEY: &str = "jobs.updates";
pub const EVENTS_BINDING_KEY: &str = "events.condor-launcher.*";
pub const PING_KEY: &str = "events.condor-launcher.ping";
pub const PONG_KEY: &str = "events.condor-launcher.pong";

pub const LAUNCHES_QUEUE: &str = "condor_launches";
pub const STOPS_QUEUE: &str = "condor-launcher-stops";
pub const EVENTS_QUEUE: &str = "condor_launcher_events";

/// `command` value that asks for a launch.
pub const LAUNCH_COMMAND: &str = "LAUNCH";

/// Name reported in the `sender` field of updates.
pub const SENDER: &str = "condor-launcher";

/// Version stamped on outgoing messages.
pub const MESSAGE_VERSION: i32 = 0;

/// Routing key that targets the stop consumers for one invocation.
pub fn stop_request_key(invocation_id: &str) -> String {
    format!("{STOPS_KEY_PREFIX}{invocation_id}")
}

/// Dedicated stop queue a job runner declares for its invocation.
pub fn stop_queue_name(invocation_id: &str) -> String {
    format!("road-runner-{invocation_id}-stops")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job: JobDescription,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub version: i32,
}

impl JobRequest {
    pub fn is_launch(&self) -> bool {
        self.command == LAUNCH_COMMAND
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub invocation_id: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub version: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub job: JobDescription,
    pub version: i32,
    #[serde(rename = "status")]
    pub state: JobState,
    pub message: String,
    /// Milliseconds since the epoch, as a string.
    pub sent_on: String,
    pub sender: String,
}

impl UpdateMessage {
    pub fn new(job: JobDescription, state: JobState, message: impl Into<String>) -> Self {
        Self {
            job,
            version: MESSAGE_VERSION,
            state,
            message: message.into(),
            sent_on: chrono::Utc::now().timestamp_millis().to_string(),
            sender: SENDER.to_string(),
        }
    }
}

/// Reply to a ping event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pong {}
