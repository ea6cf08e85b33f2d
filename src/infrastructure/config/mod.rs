//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading (`.crucible/config.yaml`, `.crucible/local.yaml`)
//! - Environment variable overrides (`CRUCIBLE_*`)
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR, CONFIG_FILE, LOCAL_CONFIG_FILE};
