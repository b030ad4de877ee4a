//! Archive extraction with zip-bomb and path-traversal defenses.
//!
//! Every entry name is screened before a single byte is extracted. Unsafe
//! entries are skipped with a warning; ceiling breaches abort the run.

use std::fs;
use std::io;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::policy::UploadPolicy;
use crate::security::SecurityValidator;

/// A validated extraction. Dropping the [`TempDir`] removes the scratch tree,
/// which is the guaranteed-cleanup path for every run outcome.
#[derive(Debug)]
pub struct Extraction {
    pub scratch: TempDir,
    /// Number of regular files that survived extraction and validation.
    pub file_count: usize,
    /// Non-fatal problems: skipped entries, deleted files.
    pub warnings: Vec<String>,
}

pub struct ArchiveExtractor {
    policy: UploadPolicy,
    validator: SecurityValidator,
}

impl ArchiveExtractor {
    pub fn new(policy: UploadPolicy) -> Self {
        let validator = SecurityValidator::new(policy.clone());
        Self { policy, validator }
    }

    /// Extracts `archive_path` into a fresh scratch directory.
    ///
    /// Fatal conditions: missing/corrupt archive, entry-count or
    /// uncompressed-size ceiling breaches, scratch I/O failures. Per-entry
    /// path problems and per-file content problems accumulate as warnings.
    pub fn extract(&self, archive_path: &Path) -> Result<Extraction, ArchiveError> {
        let meta = fs::metadata(archive_path).map_err(|_| ArchiveError::NotFound {
            path: archive_path.to_path_buf(),
        })?;

        if meta.len() < self.policy.min_archive_bytes {
            return Err(ArchiveError::TooSmall {
                bytes: meta.len(),
                limit: self.policy.min_archive_bytes,
            });
        }
        if meta.len() > self.policy.max_archive_bytes {
            return Err(ArchiveError::TooLarge {
                bytes: meta.len(),
                limit: self.policy.max_archive_bytes,
            });
        }

        let looks_like_zip = mime_guess::from_path(archive_path)
            .first()
            .map(|m| m.essence_str() == "application/zip")
            .unwrap_or(false);
        if !looks_like_zip {
            return Err(ArchiveError::NotZip {
                path: archive_path.to_path_buf(),
            });
        }

        let file = fs::File::open(archive_path).map_err(|e| ArchiveError::Unreadable {
            path: archive_path.to_path_buf(),
            source: e,
        })?;
        let mut zip = ZipArchive::new(file).map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

        if zip.len() > self.policy.max_entries {
            return Err(ArchiveError::TooManyEntries {
                count: zip.len(),
                limit: self.policy.max_entries,
            });
        }

        // First pass: validate every entry name and accumulate the
        // uncompressed size before extracting anything.
        let mut warnings = Vec::new();
        let mut safe_entries = Vec::new();
        let mut total_uncompressed: u64 = 0;

        for index in 0..zip.len() {
            let entry = zip
                .by_index(index)
                .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

            total_uncompressed = total_uncompressed.saturating_add(entry.size());
            if total_uncompressed > self.policy.max_uncompressed_bytes {
                return Err(ArchiveError::UncompressedTooLarge {
                    bytes: total_uncompressed,
                    limit: self.policy.max_uncompressed_bytes,
                });
            }

            match self.validator.validate_entry_path(entry.name()) {
                Ok(()) => safe_entries.push(index),
                Err(e) => {
                    warn!("Skipping unsafe archive entry: {}", e);
                    warnings.push(format!("Skipped archive entry: {}", e));
                }
            }
        }

        let scratch = TempDir::new().map_err(|e| ArchiveError::Scratch { source: e })?;
        let mut file_count = 0usize;

        for index in safe_entries {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| ArchiveError::Corrupt(e.to_string()))?;

            // Belt and braces: enclosed_name re-checks containment.
            let rel = match entry.enclosed_name() {
                Some(rel) => rel,
                None => {
                    warnings.push(format!("Skipped archive entry: {}", entry.name()));
                    continue;
                }
            };
            let dest = scratch.path().join(rel);

            if entry.is_dir() {
                fs::create_dir_all(&dest).map_err(|e| ArchiveError::WriteEntry {
                    path: dest.clone(),
                    source: e,
                })?;
                continue;
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::WriteEntry {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            let mut out = fs::File::create(&dest).map_err(|e| ArchiveError::WriteEntry {
                path: dest.clone(),
                source: e,
            })?;
            io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::WriteEntry {
                path: dest.clone(),
                source: e,
            })?;
            file_count += 1;
        }

        // Second pass: re-validate extracted content; invalid files are
        // deleted from the scratch tree rather than failing the run.
        for entry in WalkDir::new(scratch.path())
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if let Err(e) = self.validator.validate_content(entry.path(), size) {
                if fs::remove_file(entry.path()).is_ok() {
                    debug!("Removed invalid file from scratch tree: {}", e);
                    warnings.push(format!("Removed invalid file: {}", e));
                    file_count = file_count.saturating_sub(1);
                }
            }
        }

        debug!(
            "Extracted {} files ({} warnings) to {}",
            file_count,
            warnings.len(),
            scratch.path().display()
        );

        Ok(Extraction {
            scratch,
            file_count,
            warnings,
        })
    }
}
