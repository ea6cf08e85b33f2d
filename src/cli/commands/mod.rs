//! CLI command implementations.

pub mod graph;
pub mod init;
pub mod run;
pub mod show;
