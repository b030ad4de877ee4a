//! Per-run statistics, processing notes, and error aggregation.
//!
//! Two error tiers: run-level errors (category-wide or structural problems
//! that mark the whole job failed) and item-level [`ErrorRecord`]s, which
//! are diagnostic only and never block completion. Both are append-only.

use std::collections::BTreeMap;

use crate::job::{CategoryStat, ErrorRecord, UploadJob};

#[derive(Debug, Default)]
pub struct RunTracker {
    categories_created: u32,
    categories_updated: u32,
    products_created: u32,
    products_updated: u32,
    images_processed: u32,
    notes: Vec<String>,
    run_errors: Vec<String>,
    category_stats: BTreeMap<String, CategoryStat>,
    detailed_errors: Vec<ErrorRecord>,
    empty_categories: Vec<String>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    /// Records a run-level error. Any entry here blocks the `completed`
    /// transition.
    pub fn run_error(&mut self, message: impl Into<String>) {
        self.run_errors.push(message.into());
    }

    pub fn is_clean(&self) -> bool {
        self.run_errors.is_empty()
    }

    pub fn category_created(&mut self, name: &str) {
        self.categories_created += 1;
        self.note(format!("Created category: {}", name));
    }

    pub fn category_updated(&mut self, name: &str) {
        self.categories_updated += 1;
        self.note(format!("Updated category: {}", name));
    }

    pub fn product_created(&mut self, name: &str) {
        self.products_created += 1;
        self.note(format!("Created product: {}", name));
    }

    pub fn product_updated(&mut self, name: &str) {
        self.products_updated += 1;
        self.note(format!("Updated product: {}", name));
    }

    pub fn image_processed(&mut self) {
        self.images_processed += 1;
    }

    /// Makes sure a stats entry exists for the category.
    pub fn ensure_category(&mut self, name: &str) {
        self.category_stats.entry(name.to_string()).or_default();
    }

    /// Sets the expected product count. Must be called before any
    /// `product_uploaded` for the same category so `uploaded <= expected`
    /// holds at the end of the run.
    pub fn set_expected(&mut self, name: &str, expected: u32) {
        self.category_stats
            .entry(name.to_string())
            .or_default()
            .expected = expected;
    }

    pub fn product_uploaded(&mut self, name: &str) {
        self.category_stats
            .entry(name.to_string())
            .or_default()
            .uploaded += 1;
    }

    pub fn mark_empty(&mut self, name: &str) {
        if !self.empty_categories.iter().any(|n| n == name) {
            self.empty_categories.push(name.to_string());
        }
    }

    /// Appends a detailed error record, mirrored into the owning category's
    /// stats entry when one exists.
    pub fn record(&mut self, record: ErrorRecord) {
        if let Some(stat) = self.category_stats.get_mut(&record.category) {
            stat.errors.push(record.clone());
        }
        self.detailed_errors.push(record);
    }

    pub fn categories_created(&self) -> u32 {
        self.categories_created
    }

    pub fn products_created(&self) -> u32 {
        self.products_created
    }

    /// Copies the accumulated tracking data onto the job record. The empty
    /// set is reconciled here: a category that uploaded at least one product
    /// is never reported empty.
    pub fn apply_to(&self, job: &mut UploadJob) {
        job.categories_created = self.categories_created;
        job.categories_updated = self.categories_updated;
        job.products_created = self.products_created;
        job.products_updated = self.products_updated;
        job.images_processed = self.images_processed;

        job.category_stats = self.category_stats.clone();
        job.detailed_errors = self.detailed_errors.clone();
        job.empty_categories = self
            .empty_categories
            .iter()
            .filter(|name| {
                self.category_stats
                    .get(*name)
                    .is_none_or(|stat| stat.uploaded == 0)
            })
            .cloned()
            .collect();

        job.processing_notes = if self.notes.is_empty() {
            None
        } else {
            Some(self.notes.join("\n"))
        };
        job.error_log = if self.run_errors.is_empty() {
            None
        } else {
            Some(self.run_errors.join("\n"))
        };
    }
}
