// src/engine/coordinator.rs

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ConfigFile, MissingJobPolicy};
use crate::errors::{LauncherError, Result};
use crate::fs::{FileSystem, DIR_MODE};
use crate::messaging::{Delivery, DeliveryHandler, Disposition, Messenger, Route};
use crate::model::messages::{stop_queue_name, PING_KEY, PONG_KEY};
use crate::model::{JobDescription, JobRequest, JobState, Pong, StopRequest, UpdateMessage};
use crate::scheduler::{KillOutcome, SchedulerClient};
use crate::submit::Builders;

use super::{launch_failed_message, launched_message, KILLED_MESSAGE};

/// Request-handling state machine.
///
/// Every delivery ends in exactly one [`Disposition`]. Failures are retried
/// once: a delivery that fails is rejected with requeue unless the broker
/// already marked it redelivered, in which case it is dropped.
///
/// Publishing status updates is best effort and never changes the
/// disposition.
#[derive(Debug)]
pub struct Coordinator {
    cfg: Arc<ConfigFile>,
    messenger: Arc<dyn Messenger>,
    scheduler: Arc<dyn SchedulerClient>,
    fs: Arc<dyn FileSystem>,
    builders: Builders,
    missing_job_policy: MissingJobPolicy,
}

impl Coordinator {
    pub fn new(
        cfg: Arc<ConfigFile>,
        messenger: Arc<dyn Messenger>,
        scheduler: Arc<dyn SchedulerClient>,
        fs: Arc<dyn FileSystem>,
        builders: Builders,
    ) -> Self {
        let missing_job_policy = cfg.condor.missing_job_policy;
        Self {
            cfg,
            messenger,
            scheduler,
            fs,
            builders,
            missing_job_policy,
        }
    }

    pub fn config(&self) -> &ConfigFile {
        &self.cfg
    }

    pub async fn handle(&self, route: Route, delivery: &Delivery) -> Disposition {
        match route {
            Route::Launches => self.handle_launch(delivery).await,
            Route::Stops => self.handle_stop(delivery).await,
            Route::Events => self.handle_event(delivery).await,
        }
    }

    #[instrument(skip_all, fields(redelivered = delivery.redelivered))]
    pub async fn handle_launch(&self, delivery: &Delivery) -> Disposition {
        let request: JobRequest = match serde_json::from_slice(&delivery.body) {
            Ok(r) => r,
            Err(err) => {
                error!(
                    error = %err,
                    body = %String::from_utf8_lossy(&delivery.body),
                    "could not parse launch request"
                );
                return Disposition::retry_unless_redelivered(delivery.redelivered);
            }
        };

        if !request.is_launch() {
            info!(command = %request.command, "ignoring job request that is not a launch");
            return Disposition::Ack;
        }

        let mut job = request.job;
        job.apply_launcher_defaults(&self.cfg);

        match self.launch(&mut job).await {
            Ok(cluster_id) => {
                info!(invocation_id = %job.invocation_id, %cluster_id, "launched job");
                let message = launched_message(&cluster_id);
                self.publish_update(UpdateMessage::new(job, JobState::Submitted, message))
                    .await;
                Disposition::Ack
            }
            Err(err) => {
                error!(invocation_id = %job.invocation_id, error = %err, "launch failed");
                if !delivery.redelivered {
                    let message = launch_failed_message(&err);
                    self.publish_update(UpdateMessage::new(job, JobState::Failed, message))
                        .await;
                }
                Disposition::retry_unless_redelivered(delivery.redelivered)
            }
        }
    }

    #[instrument(skip_all, fields(redelivered = delivery.redelivered))]
    pub async fn handle_stop(&self, delivery: &Delivery) -> Disposition {
        let request: StopRequest = match serde_json::from_slice(&delivery.body) {
            Ok(r) => r,
            Err(err) => {
                error!(error = %err, "could not parse stop request");
                return Disposition::retry_unless_redelivered(delivery.redelivered);
            }
        };

        match self.stop_job(&request.invocation_id, &request.reason).await {
            Ok(()) => Disposition::Ack,
            Err(err) => {
                error!(
                    invocation_id = %request.invocation_id,
                    error = %err,
                    "stop failed"
                );
                Disposition::retry_unless_redelivered(delivery.redelivered)
            }
        }
    }

    /// Events are already acknowledged by the transport, so the disposition
    /// returned here is informational.
    pub async fn handle_event(&self, delivery: &Delivery) -> Disposition {
        match delivery.routing_key.as_str() {
            PING_KEY => {
                info!("received ping");
                match self.send_pong().await {
                    Ok(()) => info!("sent pong"),
                    Err(err) => error!(error = %err, "failed to send pong"),
                }
            }
            other => warn!(routing_key = other, "unhandled event"),
        }
        Disposition::Ack
    }

    /// Write the workspace for `job`, submit it and return the cluster id.
    ///
    /// `job` is expected to have had launcher defaults applied. Once the
    /// workspace is written it is replaced by the job stored there, so the
    /// caller reports the file names the submission actually uses.
    #[instrument(skip_all, fields(invocation_id = %job.invocation_id))]
    pub async fn launch(&self, job: &mut JobDescription) -> Result<String> {
        let builder = self.builders.for_target(&job.execution_target)?;
        let dir = job.workspace_dir();
        self.fs.create_dir_all(&dir, DIR_MODE)?;
        debug!(dir = %dir.display(), "created workspace");

        let built = builder.build(job, &dir).await?;
        *job = built.job;
        self.scheduler.submit(&built.submit_file).await
    }

    /// Remove every job of `invocation_id` from the queue, report it as
    /// killed and drop its dedicated stop queue.
    #[instrument(skip(self))]
    pub async fn stop_job(&self, invocation_id: &str, reason: &str) -> Result<()> {
        match self.scheduler.kill(invocation_id).await? {
            KillOutcome::Removed(_) => info!("removed job from queue"),
            KillOutcome::NotFound(output) => match self.missing_job_policy {
                MissingJobPolicy::Acknowledge => {
                    info!("job already absent from queue");
                }
                MissingJobPolicy::Retry => {
                    return Err(LauncherError::KillFailed {
                        invocation_id: invocation_id.to_string(),
                        status: "no matching job".to_string(),
                        output,
                    });
                }
            },
        }

        let update = UpdateMessage::new(
            JobDescription::stub(invocation_id),
            JobState::Failed,
            KILLED_MESSAGE,
        );
        self.publish_update(update).await;

        let queue = stop_queue_name(invocation_id);
        if let Err(err) = self.messenger.delete_queue(&queue).await {
            warn!(%queue, error = %err, "could not delete stop queue");
        }
        Ok(())
    }

    pub async fn held_invocation_ids(&self) -> Result<Vec<String>> {
        self.scheduler.held_invocation_ids().await
    }

    async fn send_pong(&self) -> Result<()> {
        let body = serde_json::to_vec(&Pong::default())?;
        self.messenger.publish(PONG_KEY, &body).await
    }

    async fn publish_update(&self, update: UpdateMessage) {
        if let Err(err) = self.messenger.publish_job_update(&update).await {
            error!(
                invocation_id = %update.job.invocation_id,
                state = ?update.state,
                error = %err,
                "failed to publish job update"
            );
        }
    }
}

impl DeliveryHandler for Coordinator {
    fn handle<'a>(&'a self, route: Route, delivery: &'a Delivery) -> BoxFuture<'a, Disposition> {
        Box::pin(Coordinator::handle(self, route, delivery))
    }
}
