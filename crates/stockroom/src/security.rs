//! Path, name, and text safety checks applied to untrusted archive content.
//!
//! All checks are pure functions over the [`UploadPolicy`]; the validator
//! holds no other state and can be cloned freely between components.

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::ArchiveError;
use crate::policy::{UploadPolicy, SUSPICIOUS_PATTERNS};

/// What kind of content a file holds, as far as the pipeline is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Text,
    Unsupported,
}

/// Result of text sanitization. `truncated` is a non-fatal processing note
/// for the caller to record.
#[derive(Debug, Clone)]
pub struct Sanitized {
    pub text: String,
    pub truncated: bool,
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid pattern"))
}

fn scheme_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(javascript|data|vbscript):").expect("valid pattern"))
}

#[derive(Debug, Clone)]
pub struct SecurityValidator {
    policy: UploadPolicy,
}

impl SecurityValidator {
    pub fn new(policy: UploadPolicy) -> Self {
        Self { policy }
    }

    /// Screens an archive entry name before anything is extracted.
    ///
    /// Entry names must be relative, free of parent-directory segments,
    /// within the depth limit, and end in a component of sane length.
    pub fn validate_entry_path(&self, name: &str) -> Result<(), ArchiveError> {
        if name.is_empty() {
            return Err(ArchiveError::UnsafePath {
                name: name.to_string(),
                reason: "empty entry name".to_string(),
            });
        }

        // ZIP entries use '/' separators regardless of platform; normalize
        // backslashes so Windows-built archives get the same screening.
        let normalized = name.replace('\\', "/");
        let path = Path::new(&normalized);

        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::ParentDir => {
                    return Err(ArchiveError::UnsafePath {
                        name: name.to_string(),
                        reason: "parent-directory segment".to_string(),
                    });
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ArchiveError::UnsafePath {
                        name: name.to_string(),
                        reason: "absolute path".to_string(),
                    });
                }
                Component::Normal(part) => {
                    depth += 1;
                    if part.len() > self.policy.max_filename_len {
                        return Err(ArchiveError::UnsafePath {
                            name: name.to_string(),
                            reason: format!(
                                "component longer than {} characters",
                                self.policy.max_filename_len
                            ),
                        });
                    }
                }
                Component::CurDir => {}
            }
        }

        if depth > self.policy.max_depth {
            return Err(ArchiveError::UnsafePath {
                name: name.to_string(),
                reason: format!("directory depth exceeds {}", self.policy.max_depth),
            });
        }

        Ok(())
    }

    /// Classifies a file by extension against the policy allow-lists.
    pub fn classify(&self, path: &Path) -> FileKind {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some(e) if self.policy.is_image_extension(e) => FileKind::Image,
            Some(e) if self.policy.is_text_extension(e) => FileKind::Text,
            _ => FileKind::Unsupported,
        }
    }

    /// Enforces the per-kind size ceilings. Unknown extensions are rejected
    /// as content the pipeline does not process, which callers treat as
    /// delete-and-note rather than a fatal condition.
    pub fn validate_content(&self, path: &Path, size: u64) -> Result<FileKind, ArchiveError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<unknown>")
            .to_string();

        match self.classify(path) {
            FileKind::Image if size <= self.policy.max_image_bytes => Ok(FileKind::Image),
            FileKind::Image => Err(ArchiveError::OversizedContent {
                name,
                bytes: size,
                limit: self.policy.max_image_bytes,
            }),
            FileKind::Text if size <= self.policy.max_text_bytes => Ok(FileKind::Text),
            FileKind::Text => Err(ArchiveError::OversizedContent {
                name,
                bytes: size,
                limit: self.policy.max_text_bytes,
            }),
            FileKind::Unsupported => Err(ArchiveError::UnsupportedContent { name }),
        }
    }

    /// Strips HTML-like tags and script/data/vbscript URI schemes, then
    /// truncates to the policy's text-length ceiling.
    pub fn sanitize_text(&self, text: &str) -> Sanitized {
        let stripped = tag_pattern().replace_all(text, "");
        let stripped = scheme_pattern().replace_all(&stripped, "");
        let trimmed = stripped.trim();

        if trimmed.chars().count() > self.policy.max_text_len {
            let text: String = trimmed.chars().take(self.policy.max_text_len).collect();
            Sanitized {
                text: text.trim_end().to_string(),
                truncated: true,
            }
        } else {
            Sanitized {
                text: trimmed.to_string(),
                truncated: false,
            }
        }
    }

    /// Length and suspicious-pattern screen for category and product names.
    pub fn validate_name(&self, name: &str, max_len: usize) -> bool {
        let trimmed = name.trim();
        let len = trimmed.chars().count();
        if len < self.policy.min_name_len || len > max_len {
            return false;
        }

        let lower = trimmed.to_lowercase();
        !SUSPICIOUS_PATTERNS.iter().any(|p| lower.contains(p))
    }

    pub fn validate_category_name(&self, name: &str) -> bool {
        self.validate_name(name, self.policy.max_category_name_len)
    }

    pub fn validate_product_name(&self, name: &str) -> bool {
        self.validate_name(name, self.policy.max_product_name_len)
    }

    /// Lowercase URL-slug from a name: alphanumeric runs joined by `-`.
    /// May return an empty string; callers fall back to a prefixed form.
    pub fn slugify(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        let mut pending_dash = false;

        for c in name.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }

        slug
    }
}
