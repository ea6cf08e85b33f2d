use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::engagement::MIN_BELIEF_LOG_CAPACITY;
use crate::domain::models::Config;

pub const CONFIG_DIR: &str = ".crucible";
pub const CONFIG_FILE: &str = "config.yaml";
pub const LOCAL_CONFIG_FILE: &str = "local.yaml";
const ENV_PREFIX: &str = "CRUCIBLE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid belief_log_capacity: {0}. Must be at least 4")]
    InvalidBeliefLogCapacity(usize),

    #[error("Invalid scoring weight {name}: {value}. Must be a non-negative number")]
    InvalidWeight { name: &'static str, value: f64 },

    #[error("Invalid top_k: {0}. Must be at least 1")]
    InvalidTopK(usize),

    #[error("Invalid max_concurrency: {0}. Must be at least 1")]
    InvalidMaxConcurrency(usize),

    #[error("Invalid narrow_workers: {0}. Must be between 1 and 3")]
    InvalidNarrowWorkers(usize),

    #[error("Invalid worker_timeout_secs: {0}. Must be at least 1")]
    InvalidWorkerTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: hourly, daily, never")]
    InvalidRotation(String),

    #[error("Invalid proof setting {name}: {value}. Must be non-negative")]
    InvalidProofSetting { name: &'static str, value: f64 },

    #[error("Duplicate worker id: {0}")]
    DuplicateWorker(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .crucible/config.yaml (project config, created by init)
    /// 3. .crucible/local.yaml (local overrides, optional)
    /// 4. Environment variables (CRUCIBLE_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_dir`.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Config> {
        let dir = project_dir.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join(CONFIG_FILE)))
            .merge(Yaml::file(dir.join(LOCAL_CONFIG_FILE)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let capacity = config.engagement.belief_log_capacity;
        if capacity < MIN_BELIEF_LOG_CAPACITY {
            return Err(ConfigError::InvalidBeliefLogCapacity(capacity));
        }

        let weights = &config.synthesis.weights;
        for (name, value) in [
            ("density", weights.density),
            ("severity", weights.severity),
            ("novelty", weights.novelty),
            ("categories", weights.categories),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        if config.synthesis.top_k == 0 {
            return Err(ConfigError::InvalidTopK(0));
        }

        let dispatcher = &config.dispatcher;
        if dispatcher.max_concurrency == 0 {
            return Err(ConfigError::InvalidMaxConcurrency(0));
        }
        if dispatcher.narrow_workers == 0 || dispatcher.narrow_workers > 3 {
            return Err(ConfigError::InvalidNarrowWorkers(dispatcher.narrow_workers));
        }
        if dispatcher.worker_timeout_secs == 0 {
            return Err(ConfigError::InvalidWorkerTimeout(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let proof = &config.proof;
        for (name, value) in [
            ("adverse_cost_factor", proof.adverse_cost_factor),
            ("jitter", proof.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidProofSetting { name, value });
            }
        }

        let mut seen = HashSet::new();
        for worker in &config.workers {
            if worker.id.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "worker id cannot be empty".to_string(),
                ));
            }
            if worker.command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "worker '{}' command cannot be empty",
                    worker.id
                )));
            }
            if !seen.insert(worker.id.as_str()) {
                return Err(ConfigError::DuplicateWorker(worker.id.clone()));
            }
        }

        if let Some(oracle) = &config.oracle {
            if oracle.command.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "oracle command cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
