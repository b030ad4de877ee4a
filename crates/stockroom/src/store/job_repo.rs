//! Upload-job repository — persistence for the `upload_jobs` table.
//!
//! The `status` column is the only externally observable progress signal
//! for a run; the tracking columns (`category_stats`, `detailed_errors`,
//! `empty_categories`) are stored as JSON.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use super::{Database, StoreError};
use crate::job::{JobStatus, UploadJob};

fn from_row(row: &Row<'_>) -> Result<UploadJob, rusqlite::Error> {
    let status: String = row.get("status")?;
    let archive_path: String = row.get("archive_path")?;
    let category_stats: Option<String> = row.get("category_stats")?;
    let detailed_errors: Option<String> = row.get("detailed_errors")?;
    let empty_categories: Option<String> = row.get("empty_categories")?;

    Ok(UploadJob {
        id: row.get("id")?,
        archive_path: PathBuf::from(archive_path),
        submitted_by: row.get("submitted_by")?,
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Failed),
        uploaded_at: row.get("uploaded_at")?,
        processed_at: row.get("processed_at")?,
        categories_created: row.get("categories_created")?,
        categories_updated: row.get("categories_updated")?,
        products_created: row.get("products_created")?,
        products_updated: row.get("products_updated")?,
        images_processed: row.get("images_processed")?,
        error_log: row.get("error_log")?,
        processing_notes: row.get("processing_notes")?,
        category_stats: decode_json(category_stats),
        detailed_errors: decode_json(detailed_errors),
        empty_categories: decode_json(empty_categories),
    })
}

fn decode_json<T: serde::de::DeserializeOwned + Default>(value: Option<String>) -> T {
    value
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Inserts a new pending job row.
pub fn insert(db: &Database, job: &UploadJob) -> Result<(), StoreError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO upload_jobs (id, archive_path, submitted_by, status, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job.id,
                job.archive_path.to_string_lossy(),
                job.submitted_by,
                job.status.as_str(),
                job.uploaded_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<UploadJob>, StoreError> {
    db.with_conn(|conn| {
        let job = conn
            .query_row("SELECT * FROM upload_jobs WHERE id = ?1", params![id], from_row)
            .optional()?;
        Ok(job)
    })
}

/// Claims a pending job for processing. Returns `false` when the job is not
/// in `pending` state — another worker already owns it, or it has finished.
pub fn claim(db: &Database, id: &str) -> Result<bool, StoreError> {
    db.with_conn(|conn| {
        let rows = conn.execute(
            "UPDATE upload_jobs SET status = 'processing' WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        Ok(rows == 1)
    })
}

/// Writes the terminal state of a run: status, timestamps, counters, and the
/// JSON tracking columns. Called exactly once per run, for both outcomes.
pub fn finalize(db: &Database, job: &UploadJob) -> Result<(), StoreError> {
    let category_stats = serde_json::to_string(&job.category_stats)?;
    let detailed_errors = serde_json::to_string(&job.detailed_errors)?;
    let empty_categories = serde_json::to_string(&job.empty_categories)?;

    db.with_conn(|conn| {
        let rows = conn.execute(
            "UPDATE upload_jobs SET status = ?2, processed_at = ?3,
             categories_created = ?4, categories_updated = ?5,
             products_created = ?6, products_updated = ?7, images_processed = ?8,
             error_log = ?9, processing_notes = ?10,
             category_stats = ?11, detailed_errors = ?12, empty_categories = ?13
             WHERE id = ?1",
            params![
                job.id,
                job.status.as_str(),
                job.processed_at,
                job.categories_created,
                job.categories_updated,
                job.products_created,
                job.products_updated,
                job.images_processed,
                job.error_log,
                job.processing_notes,
                category_stats,
                detailed_errors,
                empty_categories,
            ],
        )?;
        if rows == 0 {
            return Err(StoreError::JobNotFound {
                id: job.id.clone(),
            });
        }
        Ok(())
    })
}

/// Resets a failed job back to `pending` with its error log cleared so it
/// can be picked up again. Returns `false` when the job is not failed.
pub fn requeue(db: &Database, id: &str) -> Result<bool, StoreError> {
    db.with_conn(|conn| {
        let rows = conn.execute(
            "UPDATE upload_jobs SET status = 'pending', error_log = NULL, processed_at = NULL
             WHERE id = ?1 AND status = 'failed'",
            params![id],
        )?;
        Ok(rows == 1)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, StoreError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM upload_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Convenience for tests and callers that finalize a job in one step.
pub fn mark_processed_at_now(job: &mut UploadJob, status: JobStatus) {
    job.status = status;
    job.processed_at = Some(Utc::now().to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CategoryStat, ErrorRecord};
    use std::collections::BTreeMap;

    fn sample_job() -> UploadJob {
        UploadJob::new(PathBuf::from("/uploads/catalog.zip"))
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let job = sample_job();
        insert(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.archive_path, PathBuf::from("/uploads/catalog.zip"));
    }

    #[test]
    fn test_find_nonexistent() {
        let db = Database::open_in_memory().unwrap();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_claim_is_single_winner() {
        let db = Database::open_in_memory().unwrap();
        let job = sample_job();
        insert(&db, &job).unwrap();

        assert!(claim(&db, &job.id).unwrap());
        // Second claim loses: the job is no longer pending.
        assert!(!claim(&db, &job.id).unwrap());

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Processing);
    }

    #[test]
    fn test_finalize_round_trips_tracking_data() {
        let db = Database::open_in_memory().unwrap();
        let mut job = sample_job();
        insert(&db, &job).unwrap();
        claim(&db, &job.id).unwrap();

        job.categories_created = 2;
        job.products_created = 5;
        job.images_processed = 7;
        job.empty_categories = vec!["pickles".to_string()];
        job.detailed_errors.push(ErrorRecord {
            category: "spices".to_string(),
            product: Some("XYZ_invalid".to_string()),
            error_type: "Invalid directory name".to_string(),
            expected: "PRODUCT_name format".to_string(),
            given: "XYZ_invalid".to_string(),
            message: "bad name".to_string(),
        });
        let mut stats = BTreeMap::new();
        stats.insert(
            "spices".to_string(),
            CategoryStat {
                expected: 3,
                uploaded: 2,
                errors: vec![],
            },
        );
        job.category_stats = stats;
        mark_processed_at_now(&mut job, JobStatus::Completed);

        finalize(&db, &job).unwrap();

        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Completed);
        assert!(found.processed_at.is_some());
        assert_eq!(found.categories_created, 2);
        assert_eq!(found.products_created, 5);
        assert_eq!(found.empty_categories, vec!["pickles".to_string()]);
        assert_eq!(found.detailed_errors.len(), 1);
        assert_eq!(found.detailed_errors[0].error_type, "Invalid directory name");
        assert_eq!(found.category_stats["spices"].expected, 3);
        assert_eq!(found.category_stats["spices"].uploaded, 2);
    }

    #[test]
    fn test_finalize_unknown_job_errors() {
        let db = Database::open_in_memory().unwrap();
        let mut job = sample_job();
        mark_processed_at_now(&mut job, JobStatus::Failed);
        assert!(matches!(
            finalize(&db, &job),
            Err(StoreError::JobNotFound { .. })
        ));
    }

    #[test]
    fn test_requeue_only_failed_jobs() {
        let db = Database::open_in_memory().unwrap();
        let mut job = sample_job();
        insert(&db, &job).unwrap();

        // Pending job cannot be requeued.
        assert!(!requeue(&db, &job.id).unwrap());

        claim(&db, &job.id).unwrap();
        job.error_log = Some("File Error: boom".to_string());
        mark_processed_at_now(&mut job, JobStatus::Failed);
        finalize(&db, &job).unwrap();

        assert!(requeue(&db, &job.id).unwrap());
        let found = find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Pending);
        assert!(found.error_log.is_none());
        assert!(found.processed_at.is_none());
    }

    #[test]
    fn test_count_by_status() {
        let db = Database::open_in_memory().unwrap();
        insert(&db, &sample_job()).unwrap();
        insert(&db, &sample_job()).unwrap();

        assert_eq!(count_by_status(&db, JobStatus::Pending).unwrap(), 2);
        assert_eq!(count_by_status(&db, JobStatus::Completed).unwrap(), 0);
    }
}
