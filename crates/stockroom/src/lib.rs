pub mod archive;
pub mod error;
pub mod job;
pub mod layout;
pub mod metadata;
pub mod pipeline;
pub mod policy;
pub mod processor;
pub mod security;
pub mod store;
pub mod tracker;
pub mod worker;

pub use archive::{ArchiveExtractor, Extraction};
pub use error::{ArchiveError, DataError, IngestError, ProcessError, Result, StructureError};
pub use job::{CategoryStat, ErrorRecord, JobStatus, UploadJob};
pub use pipeline::{IngestPipeline, PipelineConfig, RunOutcome};
pub use policy::UploadPolicy;
pub use store::{Database, StoreError};
pub use tracker::RunTracker;
pub use worker::WorkerPool;
