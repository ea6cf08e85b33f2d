//! Worker adapter implementations.

pub mod mock;
pub mod process;
pub mod registry;

pub use mock::{MockReply, MockWorker};
pub use process::ProcessWorker;
pub use registry::WorkerRegistry;
