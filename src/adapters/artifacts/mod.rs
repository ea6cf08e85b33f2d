//! Artifact sink implementations.

pub mod filesystem;
pub mod memory;

pub use filesystem::FilesystemArtifactSink;
pub use memory::{MemoryArtifactSink, RecordedOutput};
