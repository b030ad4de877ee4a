use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Structure error: {0}")]
    Structure(#[from] StructureError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failures while validating or extracting the uploaded archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read archive '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid or corrupted archive: {0}")]
    Corrupt(String),

    #[error("Not a ZIP archive: {path}")]
    NotZip { path: PathBuf },

    #[error("Archive is too small to be valid ({bytes} bytes, minimum: {limit})")]
    TooSmall { bytes: u64, limit: u64 },

    #[error("Archive size {bytes} bytes exceeds limit of {limit} bytes")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("Too many files in archive ({count} entries, limit: {limit})")]
    TooManyEntries { count: usize, limit: usize },

    #[error("Uncompressed size {bytes} bytes exceeds limit of {limit} bytes")]
    UncompressedTooLarge { bytes: u64, limit: u64 },

    #[error("Suspicious file path '{name}': {reason}")]
    UnsafePath { name: String, reason: String },

    #[error("Unsupported file type: {name}")]
    UnsupportedContent { name: String },

    #[error("File '{name}' is too large ({bytes} bytes, limit: {limit})")]
    OversizedContent { name: String, bytes: u64, limit: u64 },

    #[error("Failed to create scratch directory: {source}")]
    Scratch {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write extracted file '{path}': {source}")]
    WriteEntry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whole-catalog structural failures. Always fatal for the run.
#[derive(Error, Debug)]
pub enum StructureError {
    #[error("No catalog directories found in archive. Ensure the archive contains category directories.")]
    NoCategories,

    #[error("No valid category directories were processed successfully")]
    NoneProcessed,

    #[error("Failed to read directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-item metadata problems. Recorded against the item, never fatal.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Unknown metadata field: {field}")]
    UnknownField { field: String },

    #[error("Data file is empty after sanitization")]
    EmptyContent,

    #[error("Metadata is not a JSON object")]
    NotAnObject,

    #[error("Failed to parse metadata JSON: {0}")]
    Json(String),

    #[error("Invalid name: {given}")]
    InvalidName { given: String },
}

/// Per-image problems. Recorded and skipped, never fatal.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to read image '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid or corrupted image '{path}': {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode image: {reason}")]
    Encode { reason: String },

    #[error("Processed image '{filename}' is too large ({bytes} bytes, limit: {limit})")]
    TooLarge {
        filename: String,
        bytes: u64,
        limit: u64,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker channel closed unexpectedly")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, IngestError>;
