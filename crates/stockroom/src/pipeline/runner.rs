//! The ingestion orchestrator.
//!
//! Owns the job's processing state machine: a pending job is claimed by
//! exactly one execution, the catalog is extracted and walked, and the job
//! finishes `completed` only when the run-level error list is empty.
//! Item-level problems are recorded on the tracker and never abort sibling
//! items; extractor-level and whole-catalog failures abort the run.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::archive::ArchiveExtractor;
use crate::job::{ErrorRecord, JobStatus, UploadJob};
use crate::layout::{CatalogWalker, CategoryDraft, CategoryEntry, ProductDraft};
use crate::metadata::MetadataParser;
use crate::processor::{ImageNormalizer, ProcessedImage};
use crate::security::SecurityValidator;
use crate::store::catalog_repo::{self, CategoryRecord, UpsertOutcome};
use crate::store::{job_repo, Database};
use crate::tracker::RunTracker;

use super::config::PipelineConfig;
use super::error::FatalError;

pub struct IngestPipeline {
    config: Arc<PipelineConfig>,
    db: Database,
    validator: SecurityValidator,
    extractor: ArchiveExtractor,
    parser: MetadataParser,
    normalizer: ImageNormalizer,
    walker: CatalogWalker,
}

/// What a run reported back to its caller. The persisted job row carries
/// the full detail; this is the in-process summary.
#[derive(Debug)]
pub struct RunOutcome {
    pub job_id: String,
    pub status: JobStatus,
    pub categories_created: u32,
    pub products_created: u32,
    pub error: Option<String>,
}

impl IngestPipeline {
    pub fn from_config(config: Arc<PipelineConfig>, db: Database) -> Self {
        let policy = config.policy.clone();
        Self {
            validator: SecurityValidator::new(policy.clone()),
            extractor: ArchiveExtractor::new(policy.clone()),
            parser: MetadataParser::new(policy.clone()),
            normalizer: ImageNormalizer::new(policy.clone()),
            walker: CatalogWalker::new(policy),
            config,
            db,
        }
    }

    /// Runs one ingestion end to end and persists the outcome.
    ///
    /// The claim guard makes this safe to call from multiple workers: only
    /// the execution that flips the job from `pending` to `processing` does
    /// any work.
    pub fn run(&self, job: &UploadJob) -> RunOutcome {
        let _span = info_span!("ingest", job_id = %job.id).entered();

        match job_repo::claim(&self.db, &job.id) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Job is not pending; another worker owns it");
                return RunOutcome {
                    job_id: job.id.clone(),
                    status: job.status,
                    categories_created: 0,
                    products_created: 0,
                    error: Some("job is not pending".to_string()),
                };
            }
            Err(e) => {
                warn!("Failed to claim job: {}", e);
                return RunOutcome {
                    job_id: job.id.clone(),
                    status: job.status,
                    categories_created: 0,
                    products_created: 0,
                    error: Some(e.to_string()),
                };
            }
        }

        let mut tracker = RunTracker::new();
        let result = self.execute(job, &mut tracker);

        let status = match result {
            Ok(()) if tracker.is_clean() => JobStatus::Completed,
            Ok(()) => JobStatus::Failed,
            Err(e) => {
                warn!("Run aborted: {}", e);
                tracker.run_error(e.to_string());
                JobStatus::Failed
            }
        };

        // Tracking data is persisted for both outcomes so a failed run
        // still carries its diagnostics.
        let mut finished = job.clone();
        tracker.apply_to(&mut finished);
        finished.status = status;
        finished.processed_at = Some(Utc::now().to_rfc3339());

        if let Err(e) = job_repo::finalize(&self.db, &finished) {
            warn!("Failed to persist job outcome: {}", e);
        }

        info!(
            status = status.as_str(),
            categories_created = finished.categories_created,
            products_created = finished.products_created,
            "Ingestion finished"
        );

        RunOutcome {
            job_id: job.id.clone(),
            status,
            categories_created: finished.categories_created,
            products_created: finished.products_created,
            error: finished.error_log.clone(),
        }
    }

    fn execute(&self, job: &UploadJob, tracker: &mut RunTracker) -> Result<(), FatalError> {
        // The scratch directory lives for the rest of this scope; dropping
        // it removes the tree on every path out, success or failure.
        let extraction = self.extractor.extract(&job.archive_path)?;
        for warning in &extraction.warnings {
            tracker.note(warning.clone());
        }
        tracker.note(format!(
            "Archive extracted and validated ({} files)",
            extraction.file_count
        ));

        let (categories, skipped) = self.walker.category_dirs(extraction.scratch.path())?;
        for note in skipped {
            tracker.note(note);
        }

        let mut processed = 0usize;
        for entry in &categories {
            match self.process_category(entry, tracker) {
                Ok(()) => processed += 1,
                Err(message) => {
                    warn!("Category '{}' failed: {}", entry.parsed.name, message);
                    tracker.run_error(message);
                }
            }
        }

        if processed == 0 {
            return Err(crate::error::StructureError::NoneProcessed.into());
        }

        Ok(())
    }

    /// Processes one category directory. An `Err` is a category-wide,
    /// run-level failure; sibling categories still proceed.
    fn process_category(
        &self,
        entry: &CategoryEntry,
        tracker: &mut RunTracker,
    ) -> Result<(), String> {
        let parsed = &entry.parsed;
        let _span = info_span!("category", name = %parsed.name).entered();

        let name = self.validator.sanitize_text(&parsed.name).text;
        if name.is_empty() {
            return Err(format!(
                "Category name became empty after sanitization: {}",
                parsed.name
            ));
        }
        if !self.validator.validate_category_name(&name) {
            return Err(format!("Invalid category name: {}", name));
        }

        let (fields, notes) =
            self.walker
                .read_category_descriptions(&entry.dir, &parsed.code, &self.parser);
        for note in notes {
            tracker.note(note);
        }

        let (primary_path, secondary_path) = self
            .walker
            .category_images(&entry.dir)
            .map_err(|e| format!("Failed to scan images for category '{}': {}", name, e))?;
        let primary_image = primary_path.and_then(|p| self.normalize_image(&p, tracker));
        let secondary_image = secondary_path.and_then(|p| self.normalize_image(&p, tracker));

        let draft = CategoryDraft {
            name: name.clone(),
            display_order: parsed.display_order,
            fields,
            primary_image,
            secondary_image,
        };
        let (category, outcome) = catalog_repo::upsert_category(&self.db, &draft)
            .map_err(|e| format!("Failed to save category '{}': {}", name, e))?;
        match outcome {
            UpsertOutcome::Created => tracker.category_created(&name),
            UpsertOutcome::Updated => tracker.category_updated(&name),
            UpsertOutcome::Unchanged => debug!("Category unchanged: {}", name),
        }

        tracker.ensure_category(&name);

        let products_dir = self.walker.products_dir(&entry.dir, &parsed.code);
        if !products_dir.is_dir() {
            tracker.note(format!(
                "No products directory found for category: {} (expected: {}_products)",
                name, parsed.code
            ));
            tracker.set_expected(&name, 0);
            tracker.mark_empty(&name);
            return Ok(());
        }

        let product_dirs = self
            .walker
            .product_dirs(&products_dir)
            .map_err(|e| format!("Cannot read products directory for '{}': {}", name, e))?;
        tracker.set_expected(&name, product_dirs.len() as u32);

        if product_dirs.is_empty() {
            tracker.mark_empty(&name);
            return Ok(());
        }

        for product_dir in &product_dirs {
            self.process_product(&category, &name, product_dir, tracker);
        }

        Ok(())
    }

    /// Processes one product directory. Failures are recorded as
    /// [`ErrorRecord`]s; sibling products always proceed.
    fn process_product(
        &self,
        category: &CategoryRecord,
        category_name: &str,
        dir: &Path,
        tracker: &mut RunTracker,
    ) {
        let dir_name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let _span = info_span!("product", dir = %dir_name).entered();

        let Some(raw_name) = self.walker.product_name(&dir_name) else {
            tracker.record(ErrorRecord {
                category: category_name.to_string(),
                product: Some(dir_name.clone()),
                error_type: "Invalid directory name".to_string(),
                expected: "PRODUCT_name format".to_string(),
                given: dir_name.clone(),
                message: format!(
                    "Invalid product directory name: {}. Expected format: PRODUCT_name",
                    dir_name
                ),
            });
            return;
        };

        let name = self.validator.sanitize_text(&raw_name).text;
        if !self.validator.validate_product_name(&name) {
            tracker.record(ErrorRecord {
                category: category_name.to_string(),
                product: Some(dir_name.clone()),
                error_type: "Invalid product name".to_string(),
                expected: "Printable name within length bounds".to_string(),
                given: raw_name,
                message: format!("Invalid product name in directory: {}", dir_name),
            });
            return;
        }

        let Some(data_file) = self.walker.product_data_file(dir) else {
            tracker.record(ErrorRecord {
                category: category_name.to_string(),
                product: Some(dir_name.clone()),
                error_type: "Missing data file".to_string(),
                expected: "Valid product data file".to_string(),
                given: "No .txt or .json file found".to_string(),
                message: format!("No valid product data found for: {}", dir_name),
            });
            return;
        };

        let raw = match std::fs::read_to_string(&data_file) {
            Ok(raw) => raw,
            Err(e) => {
                tracker.record(ErrorRecord {
                    category: category_name.to_string(),
                    product: Some(dir_name.clone()),
                    error_type: "Unreadable data file".to_string(),
                    expected: "Valid product data file".to_string(),
                    given: "Unreadable file".to_string(),
                    message: e.to_string(),
                });
                return;
            }
        };

        let sanitized = self.validator.sanitize_text(&raw);
        if sanitized.truncated {
            tracker.note("Text content truncated due to length limit");
        }

        let fields = match self.parser.parse_product(&sanitized.text) {
            Ok(fields) => fields,
            Err(e) => {
                tracker.record(ErrorRecord {
                    category: category_name.to_string(),
                    product: Some(dir_name.clone()),
                    error_type: "Invalid product data".to_string(),
                    expected: "Valid product data file".to_string(),
                    given: "Missing or invalid product data".to_string(),
                    message: e.to_string(),
                });
                return;
            }
        };

        let mut images = Vec::new();
        for path in self.walker.product_images(dir) {
            if let Some(image) = self.normalize_image(&path, tracker) {
                images.push(image);
            }
        }

        let draft = ProductDraft {
            name: name.clone(),
            fields,
            images,
        };
        match catalog_repo::upsert_product(&self.db, category.id, &draft, &self.config.policy) {
            Ok((_, UpsertOutcome::Created)) => {
                tracker.product_created(&name);
                tracker.product_uploaded(category_name);
            }
            Ok((_, UpsertOutcome::Updated)) => {
                tracker.product_updated(&name);
                tracker.product_uploaded(category_name);
            }
            Ok((_, UpsertOutcome::Unchanged)) => {
                debug!("Product unchanged: {}", name);
                tracker.product_uploaded(category_name);
            }
            Err(e) => {
                tracker.record(ErrorRecord {
                    category: category_name.to_string(),
                    product: Some(dir_name),
                    error_type: "Product processing failed".to_string(),
                    expected: "Valid product data and structure".to_string(),
                    given: "Database rejected the product".to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn normalize_image(&self, path: &Path, tracker: &mut RunTracker) -> Option<ProcessedImage> {
        match self.normalizer.process(path) {
            Ok(image) => {
                tracker.image_processed();
                Some(image)
            }
            Err(e) => {
                tracker.note(format!("Skipped image: {}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn test_config() -> Arc<PipelineConfig> {
        let policy = crate::policy::UploadPolicy {
            min_archive_bytes: 0,
            ..Default::default()
        };
        Arc::new(PipelineConfig {
            policy,
            worker_count: 1,
        })
    }

    fn build_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("catalog.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    fn submitted_job(db: &Database, archive: PathBuf) -> UploadJob {
        let job = UploadJob::new(archive);
        job_repo::insert(db, &job).unwrap();
        job
    }

    #[test]
    fn test_claimed_job_is_not_run_twice() {
        let tmp = TempDir::new().unwrap();
        let archive = build_zip(tmp.path(), &[("1_SPH_spices/x.txt", b"text".as_slice())]);

        let db = Database::open_in_memory().unwrap();
        let pipeline = IngestPipeline::from_config(test_config(), db.clone());
        let job = submitted_job(&db, archive);

        job_repo::claim(&db, &job.id).unwrap();

        let outcome = pipeline.run(&job);
        assert_eq!(outcome.error.as_deref(), Some("job is not pending"));
        assert_eq!(outcome.categories_created, 0);
    }

    #[test]
    fn test_missing_archive_fails_job_with_file_error() {
        let db = Database::open_in_memory().unwrap();
        let pipeline = IngestPipeline::from_config(test_config(), db.clone());
        let job = submitted_job(&db, PathBuf::from("/nonexistent/catalog.zip"));

        let outcome = pipeline.run(&job);
        assert_eq!(outcome.status, JobStatus::Failed);

        let persisted = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert_eq!(persisted.status, JobStatus::Failed);
        assert!(persisted.error_log.unwrap().contains("File Error"));
        assert!(persisted.processed_at.is_some());
    }

    #[test]
    fn test_archive_without_directories_fails_with_structure_error() {
        let tmp = TempDir::new().unwrap();
        let archive = build_zip(tmp.path(), &[("loose.txt", b"no dirs here".as_slice())]);

        let db = Database::open_in_memory().unwrap();
        let pipeline = IngestPipeline::from_config(test_config(), db.clone());
        let job = submitted_job(&db, archive);

        let outcome = pipeline.run(&job);
        assert_eq!(outcome.status, JobStatus::Failed);

        let persisted = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert!(persisted
            .error_log
            .unwrap()
            .contains("Structure Error"));
    }

    #[test]
    fn test_category_without_primary_image_fails_run_but_persists_tracking() {
        let tmp = TempDir::new().unwrap();
        // A structurally valid category with no image at all.
        let archive = build_zip(
            tmp.path(),
            &[(
                "1_SPH_spices/SPH_txt_long.txt",
                b"All about spices".as_slice(),
            )],
        );

        let db = Database::open_in_memory().unwrap();
        let pipeline = IngestPipeline::from_config(test_config(), db.clone());
        let job = submitted_job(&db, archive);

        let outcome = pipeline.run(&job);
        assert_eq!(outcome.status, JobStatus::Failed);

        let persisted = job_repo::find_by_id(&db, &job.id).unwrap().unwrap();
        assert!(persisted
            .error_log
            .unwrap()
            .contains("Primary image is required"));
        assert_eq!(catalog_repo::category_count(&db).unwrap(), 0);
    }
}
