// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{LauncherError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::LauncherError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_amqp(cfg)?;
    validate_condor(cfg)?;
    validate_vault(cfg)?;
    Ok(())
}

fn require(value: &str, key: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LauncherError::ConfigError(format!(
            "{key} must be set to a non-empty value"
        )));
    }
    Ok(())
}

fn validate_amqp(cfg: &RawConfigFile) -> Result<()> {
    require(&cfg.amqp.uri, "[amqp].uri")?;
    require(&cfg.amqp.exchange.name, "[amqp.exchange].name")?;
    require(&cfg.amqp.exchange.kind, "[amqp.exchange].type")?;
    Ok(())
}

fn validate_condor(cfg: &RawConfigFile) -> Result<()> {
    let condor = &cfg.condor;
    require(&condor.log_path, "[condor].log_path")?;
    require(&condor.path_env_var, "[condor].path_env_var")?;
    require(&condor.condor_config, "[condor].condor_config")?;
    require(&condor.submit_command, "[condor].submit_command")?;
    require(&condor.remove_command, "[condor].remove_command")?;
    require(&condor.queue_command, "[condor].queue_command")?;

    if condor.held_sweep_interval_secs == 0 {
        return Err(LauncherError::ConfigError(
            "[condor].held_sweep_interval_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_vault(cfg: &RawConfigFile) -> Result<()> {
    require(&cfg.vault.url, "[vault].url")?;
    require(&cfg.vault.token, "[vault].token")?;
    require(&cfg.vault.mount_path, "[vault].mount_path")?;

    if cfg.vault.mount_path.contains('/') {
        return Err(LauncherError::ConfigError(format!(
            "[vault].mount_path must be a single path segment (got '{}')",
            cfg.vault.mount_path
        )));
    }

    Ok(())
}
