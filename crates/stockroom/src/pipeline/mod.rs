pub mod config;
pub mod error;
pub mod runner;

pub use config::PipelineConfig;
pub use error::FatalError;
pub use runner::{IngestPipeline, RunOutcome};
