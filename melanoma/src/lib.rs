pub mod config;
pub mod data;
pub mod devices;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod seed;
pub mod submission;
pub mod tracking;

pub use config::PipelineConfig;
pub use error::{PipelineErr, Result};
pub use pipeline::{Pipeline, Report};
