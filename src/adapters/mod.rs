//! Adapters for external workers, the target oracle and artifact storage.

pub mod artifacts;
pub mod command;
pub mod oracle;
pub mod workers;
