use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use condor_launcher::credentials::CredentialStore;
use condor_launcher::errors::{LauncherError, Result};
use condor_launcher::messaging::{Acknowledger, Disposition, Messenger};
use condor_launcher::model::messages::UPDATES_KEY;
use condor_launcher::scheduler::{KillOutcome, QueueEntry, SchedulerClient};
use futures::future::BoxFuture;

/// A messenger that:
/// - records every publish and queue deletion
/// - optionally fails every publish
#[derive(Debug, Default)]
pub struct RecordingMessenger {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    deleted_queues: Mutex<Vec<String>>,
    fail_publish: Mutex<Option<String>>,
}

impl RecordingMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_publishes(&self, message: &str) {
        *self.fail_publish.lock().unwrap() = Some(message.to_string());
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_on(&self, routing_key: &str) -> Vec<Vec<u8>> {
        self.published()
            .into_iter()
            .filter(|(k, _)| k == routing_key)
            .map(|(_, body)| body)
            .collect()
    }

    /// Status updates, decoded as JSON.
    pub fn updates(&self) -> Vec<serde_json::Value> {
        self.published_on(UPDATES_KEY)
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect()
    }

    pub fn deleted_queues(&self) -> Vec<String> {
        self.deleted_queues.lock().unwrap().clone()
    }
}

impl Messenger for RecordingMessenger {
    fn publish<'a>(&'a self, routing_key: &'a str, body: &'a [u8]) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(msg) = self.fail_publish.lock().unwrap().clone() {
                return Err(LauncherError::Other(anyhow::anyhow!(msg)));
            }
            self.published
                .lock()
                .unwrap()
                .push((routing_key.to_string(), body.to_vec()));
            Ok(())
        })
    }

    fn delete_queue<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.deleted_queues.lock().unwrap().push(name.to_string());
            Ok(())
        })
    }
}

/// How a scripted kill should go.
#[derive(Debug, Clone)]
pub enum KillScript {
    Removed,
    NotFound,
    Fail(String),
}

/// A scheduler that:
/// - returns a fixed cluster id (or error) for every submit
/// - optionally takes a while to do so
/// - answers kills per invocation id, `Removed` by default
/// - records every submit and kill call in order
#[derive(Debug, Default)]
pub struct ScriptedScheduler {
    submit_result: Mutex<Option<std::result::Result<String, String>>>,
    submit_delay: Mutex<Option<Duration>>,
    kills: Mutex<HashMap<String, VecDeque<KillScript>>>,
    held: Mutex<Vec<String>>,
    held_query_error: Mutex<Option<String>>,
    submitted: Mutex<Vec<PathBuf>>,
    kill_calls: Mutex<Vec<String>>,
}

impl ScriptedScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn submit_returns(&self, cluster_id: &str) {
        *self.submit_result.lock().unwrap() = Some(Ok(cluster_id.to_string()));
    }

    pub fn submit_fails(&self, message: &str) {
        *self.submit_result.lock().unwrap() = Some(Err(message.to_string()));
    }

    /// Make every submit sleep for `delay` before it answers.
    pub fn submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = Some(delay);
    }

    pub fn on_kill(&self, invocation_id: &str, script: KillScript) {
        self.kills
            .lock()
            .unwrap()
            .entry(invocation_id.to_string())
            .or_default()
            .push_back(script);
    }

    pub fn held_ids(&self, ids: &[&str]) {
        *self.held.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn held_query_fails(&self, message: &str) {
        *self.held_query_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn submitted(&self) -> Vec<PathBuf> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn kill_calls(&self) -> Vec<String> {
        self.kill_calls.lock().unwrap().clone()
    }
}

impl SchedulerClient for ScriptedScheduler {
    fn submit<'a>(&'a self, submit_file: &'a Path) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let delay = *self.submit_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.submitted.lock().unwrap().push(submit_file.to_path_buf());
            match self.submit_result.lock().unwrap().clone() {
                Some(Ok(id)) => Ok(id),
                Some(Err(output)) => Err(LauncherError::SubmitFailed {
                    status: "exit status: 1".to_string(),
                    output,
                }),
                None => Ok("1".to_string()),
            }
        })
    }

    fn kill<'a>(&'a self, invocation_id: &'a str) -> BoxFuture<'a, Result<KillOutcome>> {
        Box::pin(async move {
            self.kill_calls.lock().unwrap().push(invocation_id.to_string());
            let script = self
                .kills
                .lock()
                .unwrap()
                .get_mut(invocation_id)
                .and_then(VecDeque::pop_front)
                .unwrap_or(KillScript::Removed);
            match script {
                KillScript::Removed => Ok(KillOutcome::Removed(format!(
                    "IpcUuid =?= \"{invocation_id}\" was stopped"
                ))),
                KillScript::NotFound => Ok(KillOutcome::NotFound(format!(
                    "Couldn't find any jobs matching IpcUuid =?= \"{invocation_id}\""
                ))),
                KillScript::Fail(output) => Err(LauncherError::KillFailed {
                    invocation_id: invocation_id.to_string(),
                    status: "exit status: 1".to_string(),
                    output,
                }),
            }
        })
    }

    fn held_invocation_ids(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            if let Some(output) = self.held_query_error.lock().unwrap().clone() {
                return Err(LauncherError::QueryFailed {
                    status: "exit status: 1".to_string(),
                    output,
                });
            }
            Ok(self.held.lock().unwrap().clone())
        })
    }

    fn queue_entries(&self) -> BoxFuture<'_, Result<Vec<QueueEntry>>> {
        Box::pin(async move {
            let held = self.held.lock().unwrap().clone();
            Ok(held
                .into_iter()
                .enumerate()
                .map(|(i, id)| QueueEntry {
                    cluster_id: (i + 1).to_string(),
                    invocation_id: id,
                    held: true,
                })
                .collect())
        })
    }
}

/// An acknowledger that records how its delivery was settled.
#[derive(Debug, Clone, Default)]
pub struct RecordingAcker {
    settled: Arc<Mutex<Vec<Disposition>>>,
}

impl RecordingAcker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settled(&self) -> Vec<Disposition> {
        self.settled.lock().unwrap().clone()
    }
}

impl Acknowledger for RecordingAcker {
    fn settle(&self, disposition: Disposition) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.settled.lock().unwrap().push(disposition);
            Ok(())
        })
    }
}

/// A credential store that hands out numbered tokens and records what it was
/// asked to do.
#[derive(Debug, Default)]
pub struct RecordingCredentials {
    token_uses: Mutex<Vec<u32>>,
    stored: Mutex<Vec<(String, String, String)>>,
    fail: Mutex<Option<String>>,
}

impl RecordingCredentials {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail.lock().unwrap() = Some(message.to_string());
    }

    /// `num_uses` of every child token issued.
    pub fn token_uses(&self) -> Vec<u32> {
        self.token_uses.lock().unwrap().clone()
    }

    /// `(token, invocation_id, config)` of every write.
    pub fn stored(&self) -> Vec<(String, String, String)> {
        self.stored.lock().unwrap().clone()
    }
}

impl CredentialStore for RecordingCredentials {
    fn child_token(&self, num_uses: u32) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Some(msg) = self.fail.lock().unwrap().clone() {
                return Err(LauncherError::Credentials(msg));
            }
            let mut uses = self.token_uses.lock().unwrap();
            uses.push(num_uses);
            Ok(format!("child-token-{}", uses.len()))
        })
    }

    fn store_config<'a>(
        &'a self,
        token: &'a str,
        invocation_id: &'a str,
        config: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.stored.lock().unwrap().push((
                token.to_string(),
                invocation_id.to_string(),
                config.to_string(),
            ));
            Ok(())
        })
    }

    fn url(&self) -> &str {
        "http://vault.test:8200"
    }
}
