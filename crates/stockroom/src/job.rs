//! The upload job record — the externally observable state of one
//! ingestion run.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Processing lifecycle. `Completed` and `Failed` are terminal for a run;
/// a requeue action resets a failed job back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Structured diagnostic entry. Append-only; always carries an
/// expected-vs-given pair so a failed item can be diagnosed from the job
/// record alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub product: Option<String>,
    pub error_type: String,
    pub expected: String,
    pub given: String,
    pub message: String,
}

/// Per-category upload statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStat {
    pub expected: u32,
    pub uploaded: u32,
    pub errors: Vec<ErrorRecord>,
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: String,
    pub archive_path: PathBuf,
    pub submitted_by: Option<String>,
    pub status: JobStatus,
    pub uploaded_at: String,
    pub processed_at: Option<String>,
    pub categories_created: u32,
    pub categories_updated: u32,
    pub products_created: u32,
    pub products_updated: u32,
    pub images_processed: u32,
    pub error_log: Option<String>,
    pub processing_notes: Option<String>,
    pub category_stats: BTreeMap<String, CategoryStat>,
    pub detailed_errors: Vec<ErrorRecord>,
    pub empty_categories: Vec<String>,
}

impl UploadJob {
    pub fn new(archive_path: PathBuf) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            archive_path,
            submitted_by: None,
            status: JobStatus::Pending,
            uploaded_at: Utc::now().to_rfc3339(),
            processed_at: None,
            categories_created: 0,
            categories_updated: 0,
            products_created: 0,
            products_updated: 0,
            images_processed: 0,
            error_log: None,
            processing_notes: None,
            category_stats: BTreeMap::new(),
            detailed_errors: Vec::new(),
            empty_categories: Vec::new(),
        }
    }

    pub fn with_submitter(archive_path: PathBuf, submitted_by: String) -> Self {
        Self {
            submitted_by: Some(submitted_by),
            ..Self::new(archive_path)
        }
    }
}
