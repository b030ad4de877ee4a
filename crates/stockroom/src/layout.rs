//! Interprets the directory conventions of a catalog archive.
//!
//! Categories are top-level directories named `<order>_<code>_<name>`;
//! each holds its images, its description files, and a `<code>_products`
//! subfolder of product directories named `<CODE>_<name>` where `CODE`
//! belongs to the policy's whitelist.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::StructureError;
use crate::metadata::{CategoryFields, MetadataParser, ProductFields};
use crate::policy::UploadPolicy;
use crate::processor::ProcessedImage;
use crate::security::{FileKind, SecurityValidator};

/// Parsed parts of a category directory name.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDirName {
    pub display_order: i64,
    pub code: String,
    pub name: String,
}

impl CategoryDirName {
    /// `1_SPH_spices and herbs` → order 1, code `SPH`, name `spices and herbs`.
    /// Returns `None` for anything that does not match the convention.
    pub fn parse(dir_name: &str) -> Option<Self> {
        let parts: Vec<&str> = dir_name.split('_').collect();
        if parts.len() < 3 {
            return None;
        }

        let display_order = parts[0].parse::<i64>().ok()?;
        let code = parts[1];
        if code.is_empty() {
            return None;
        }

        let name = parts[2..].join(" ").trim().to_string();
        let name = if name.is_empty() {
            code.to_string()
        } else {
            name
        };

        Some(Self {
            display_order,
            code: code.to_string(),
            name,
        })
    }
}

/// A recognized category directory awaiting processing.
#[derive(Debug)]
pub struct CategoryEntry {
    pub dir: PathBuf,
    pub parsed: CategoryDirName,
}

/// Ephemeral category representation handed to the repository, then dropped.
#[derive(Debug)]
pub struct CategoryDraft {
    pub name: String,
    pub display_order: i64,
    pub fields: CategoryFields,
    pub primary_image: Option<ProcessedImage>,
    pub secondary_image: Option<ProcessedImage>,
}

/// Ephemeral product representation handed to the repository, then dropped.
#[derive(Debug)]
pub struct ProductDraft {
    pub name: String,
    pub fields: ProductFields,
    pub images: Vec<ProcessedImage>,
}

pub struct CatalogWalker {
    policy: UploadPolicy,
    validator: SecurityValidator,
}

impl CatalogWalker {
    pub fn new(policy: UploadPolicy) -> Self {
        let validator = SecurityValidator::new(policy.clone());
        Self { policy, validator }
    }

    /// Lists the category directories under the scratch root.
    ///
    /// Returns the recognized entries (ordered by display order, then name,
    /// so runs are reproducible) plus a note for every directory skipped for
    /// not matching the naming convention. No directories at all is fatal.
    pub fn category_dirs(
        &self,
        scratch: &Path,
    ) -> Result<(Vec<CategoryEntry>, Vec<String>), StructureError> {
        let mut dirs = list_dirs(scratch)?;
        dirs.sort();

        if dirs.is_empty() {
            return Err(StructureError::NoCategories);
        }

        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for dir in dirs {
            let name = dir_name(&dir);
            if name.starts_with('.') {
                debug!("Skipping hidden directory: {}", name);
                continue;
            }
            match CategoryDirName::parse(&name) {
                Some(parsed) => entries.push(CategoryEntry { dir, parsed }),
                None => {
                    skipped.push(format!(
                        "Skipped invalid directory: {} (expected format: number_CODE_name)",
                        name
                    ));
                }
            }
        }

        entries.sort_by(|a, b| {
            (a.parsed.display_order, &a.parsed.name).cmp(&(b.parsed.display_order, &b.parsed.name))
        });

        Ok((entries, skipped))
    }

    /// Locates the category's primary and secondary image files.
    ///
    /// The image whose filename contains `main` (case-insensitive) is the
    /// primary; any other qualifying image becomes the secondary.
    pub fn category_images(
        &self,
        dir: &Path,
    ) -> Result<(Option<PathBuf>, Option<PathBuf>), StructureError> {
        let mut primary = None;
        let mut secondary = None;

        for path in self.image_files(dir)? {
            let name = dir_name(&path).to_lowercase();
            if name.contains("main") {
                primary = Some(path);
            } else {
                secondary = Some(path);
            }
        }

        Ok((primary, secondary))
    }

    /// Reads category description text with the legacy paired files taking
    /// precedence over a single fallback `.txt` file.
    pub fn read_category_descriptions(
        &self,
        dir: &Path,
        code: &str,
        parser: &MetadataParser,
    ) -> (CategoryFields, Vec<String>) {
        let mut fields = CategoryFields::default();
        let mut notes = Vec::new();

        let short_file = dir.join(format!("{}_txt_short.txt", code));
        let long_file = dir.join(format!("{}_txt_long.txt", code));

        if short_file.is_file() {
            match fs::read_to_string(&short_file) {
                Ok(raw) => {
                    let sanitized = self.validator.sanitize_text(&raw);
                    if sanitized.truncated {
                        notes.push("Text content truncated due to length limit".to_string());
                    }
                    fields.secondary_description = sanitized.text;
                }
                Err(e) => {
                    notes.push(format!(
                        "Error reading short description file for {}: {}",
                        code, e
                    ));
                }
            }
        }

        if long_file.is_file() {
            match fs::read_to_string(&long_file) {
                Ok(raw) => {
                    let sanitized = self.validator.sanitize_text(&raw);
                    if sanitized.truncated {
                        notes.push("Text content truncated due to length limit".to_string());
                    }
                    fields.description = sanitized.text;
                }
                Err(e) => {
                    notes.push(format!(
                        "Error reading long description file for {}: {}",
                        code, e
                    ));
                }
            }
        }

        if fields.is_empty() {
            if let Some(txt) = self.first_fallback_text_file(dir) {
                match fs::read_to_string(&txt) {
                    Ok(raw) => {
                        let sanitized = self.validator.sanitize_text(&raw);
                        if sanitized.truncated {
                            notes.push("Text content truncated due to length limit".to_string());
                        }
                        fields = parser.parse_category_text(&sanitized.text);
                    }
                    Err(e) => {
                        notes.push(format!(
                            "Error reading metadata file {} for {}: {}",
                            dir_name(&txt),
                            code,
                            e
                        ));
                    }
                }
            }
        }

        (fields, notes)
    }

    pub fn products_dir(&self, category_dir: &Path, code: &str) -> PathBuf {
        category_dir.join(format!("{}_products", code))
    }

    /// Non-hidden product directories, sorted by name.
    pub fn product_dirs(&self, products_dir: &Path) -> Result<Vec<PathBuf>, StructureError> {
        let mut dirs: Vec<PathBuf> = list_dirs(products_dir)?
            .into_iter()
            .filter(|d| !dir_name(d).starts_with('.'))
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// Extracts the product name from a whitelisted `<CODE>_<name>` directory.
    pub fn product_name(&self, dir_name: &str) -> Option<String> {
        let (code, rest) = dir_name.split_once('_')?;
        if !self.policy.is_product_code(code) {
            return None;
        }
        let name = rest.trim();
        if name.is_empty() {
            return None;
        }
        Some(name.to_string())
    }

    /// Finds the product's data file. Exact directory-name matches win, then
    /// any `.txt` file, then any `.json` file.
    pub fn product_data_file(&self, product_dir: &Path) -> Option<PathBuf> {
        let base = dir_name(product_dir);
        let candidates = [
            format!("{}.txt", base),
            format!("{}.txt", base.replace('_', "_ ")),
            format!("{}.txt", base.replace('_', " ")),
        ];

        for candidate in &candidates {
            let path = product_dir.join(candidate);
            if path.is_file() {
                return Some(path);
            }
        }

        let mut texts = Vec::new();
        let mut jsons = Vec::new();
        if let Ok(entries) = fs::read_dir(product_dir) {
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                match path.extension().and_then(|e| e.to_str()) {
                    Some("txt") => texts.push(path),
                    Some("json") => jsons.push(path),
                    _ => {}
                }
            }
        }
        texts.sort();
        jsons.sort();
        texts.into_iter().next().or_else(|| jsons.into_iter().next())
    }

    /// All image files directly inside a product directory, sorted.
    pub fn product_images(&self, product_dir: &Path) -> Vec<PathBuf> {
        self.image_files(product_dir).unwrap_or_default()
    }

    fn image_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StructureError> {
        let entries = fs::read_dir(dir).map_err(|e| StructureError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.validator.classify(p) == FileKind::Image)
            .collect();
        files.sort();
        Ok(files)
    }

    fn first_fallback_text_file(&self, dir: &Path) -> Option<PathBuf> {
        let mut texts: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("txt")
            })
            .collect();
        texts.sort();
        texts.into_iter().next()
    }
}

fn list_dirs(path: &Path) -> Result<Vec<PathBuf>, StructureError> {
    let entries = fs::read_dir(path).map_err(|e| StructureError::ReadDir {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}
