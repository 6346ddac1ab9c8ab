// src/lib.rs

pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod scheduler;
pub mod shutdown;
pub mod submit;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn, Instrument};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile};
use crate::credentials::VaultClient;
use crate::engine::{Coordinator, HeldJobReaper};
use crate::fs::{FileSystem, RealFileSystem};
use crate::messaging::amqp::LAUNCHER_CONSUMERS;
use crate::messaging::AmqpClient;
use crate::scheduler::{CondorBinaries, CondorClient};
use crate::shutdown::install_shutdown_handler;
use crate::submit::{Builders, Templates};

pub const SERVICE_NAME: &str = "condor-launcher";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - HTCondor tool lookup
/// - the Vault mount and the submission builders
/// - the broker consumers and the held-job reaper
/// - SIGINT/SIGTERM handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;
    let condor = CondorClient::locate(&cfg.condor)?;

    if args.check_config {
        print_check_config(&args.config, &cfg, condor.binaries());
        return Ok(());
    }

    let span = tracing::info_span!("service", service = SERVICE_NAME);
    serve(Arc::new(cfg), condor).instrument(span).await
}

async fn serve(cfg: Arc<ConfigFile>, condor: CondorClient) -> Result<()> {
    let shutdown = install_shutdown_handler()?;

    let templates = Arc::new(Templates::new()?);
    let vault = VaultClient::new(&cfg.vault)?;
    vault.ensure_mount().await.context("preparing the Vault mount")?;

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let builders = Builders::new(
        Arc::clone(&cfg),
        templates,
        Arc::clone(&fs),
        Arc::new(vault),
    );

    let amqp = Arc::new(
        AmqpClient::connect(&cfg.amqp)
            .await
            .context("connecting to the AMQP broker")?,
    );
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&cfg),
        amqp.clone(),
        Arc::new(condor),
        fs,
        builders,
    ));

    let mut tasks = Vec::with_capacity(LAUNCHER_CONSUMERS.len() + 1);
    for binding in LAUNCHER_CONSUMERS {
        let handle = amqp
            .consume(binding, coordinator.clone(), shutdown.clone())
            .await
            .with_context(|| format!("starting consumer on {}", binding.queue))?;
        tasks.push(handle);
    }

    let interval = Duration::from_secs(cfg.condor.held_sweep_interval_secs);
    tasks.push(HeldJobReaper::new(coordinator, interval).spawn(shutdown.clone()));

    info!("condor-launcher started");
    shutdown.cancelled().await;

    // Consumer tasks end only once their in-flight deliveries are settled,
    // so the connection stays open until then.
    for task in tasks {
        if let Err(err) = task.await {
            warn!(error = %err, "background task ended abnormally");
        }
    }
    if let Err(err) = amqp.close().await {
        warn!(error = %err, "closing broker connection failed");
    }

    info!("condor-launcher stopped");
    Ok(())
}

/// Summary printed by `--check-config`.
fn print_check_config(path: &str, cfg: &ConfigFile, binaries: &CondorBinaries) {
    println!("condor-launcher config check: {path}");
    println!("  amqp.exchange = {} ({})", cfg.amqp.exchange.name, cfg.amqp.exchange.kind);
    println!("  amqp.prefetch = {}", cfg.amqp.prefetch);
    println!("  condor.log_path = {}", cfg.condor.log_path);
    println!("  condor.condor_config = {}", cfg.condor.condor_config);
    println!("  condor.held_sweep_interval_secs = {}", cfg.condor.held_sweep_interval_secs);
    println!("  condor.missing_job_policy = {:?}", cfg.condor.missing_job_policy);
    println!("  vault.url = {}", cfg.vault.url);
    println!("  vault.mount_path = {}", cfg.vault.mount_path);
    println!();

    println!("binaries:");
    println!("  condor_submit: {}", binaries.submit.display());
    println!("  condor_rm:     {}", binaries.remove.display());
    println!("  condor_q:      {}", binaries.queue.display());

    debug!("config check complete");
}
