//! Domain layer for crucible
//!
//! This module contains the engagement model, the finding schema and the
//! ports through which the pipeline reaches workers, probes and storage.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, GraphError, SchemaError};
