//! Target oracle adapters: one backend answering both probe and scenario
//! requests.

pub mod mock;
pub mod process;

pub use mock::{MockOracle, OracleScript};
pub use process::ProcessOracle;
