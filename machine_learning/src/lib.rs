pub mod arch;
pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod initialization;
pub mod optimization;
pub mod replication;
pub mod training;

pub use error::{MlErr, Result};
