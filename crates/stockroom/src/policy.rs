//! Static limits and allow-lists applied to every catalog upload.
//!
//! One immutable [`UploadPolicy`] value is built at startup and passed into
//! each component's constructor. There is no process-wide mutable state.

/// Patterns that disqualify a name or text fragment outright.
pub const SUSPICIOUS_PATTERNS: &[&str] = &[
    "<script",
    "javascript:",
    "data:",
    "vbscript:",
    "onload=",
    "onerror=",
    "onclick=",
    "onmouseover=",
];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "json"];

/// Category codes a product directory may be prefixed with.
const PRODUCT_CODES: &[&str] = &["SPH", "BLS", "PKL", "MUK", "FRP", "IFP"];

#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Upper bound on the archive file itself.
    pub max_archive_bytes: u64,
    /// Archives smaller than this cannot be valid ZIP files.
    pub min_archive_bytes: u64,
    /// Ceiling on the cumulative uncompressed size of all entries.
    pub max_uncompressed_bytes: u64,
    /// Ceiling on the number of archive entries.
    pub max_entries: usize,
    pub max_filename_len: usize,
    pub max_depth: usize,
    pub max_image_bytes: u64,
    pub max_text_bytes: u64,
    /// Maximum length for text content such as descriptions, in characters.
    pub max_text_len: usize,
    pub min_name_len: usize,
    pub max_category_name_len: usize,
    pub max_product_name_len: usize,
    pub image_extensions: Vec<String>,
    pub text_extensions: Vec<String>,
    pub product_codes: Vec<String>,
    /// Images wider or taller than this are downscaled, preserving aspect.
    pub image_max_edge: u32,
    pub jpeg_quality: u8,
    pub max_tags: usize,
    /// Placeholder variant given to products created with no variants.
    pub default_variant_price: f64,
    pub default_variant_weight: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_archive_bytes: 100 * 1024 * 1024,
            min_archive_bytes: 1024,
            max_uncompressed_bytes: 500 * 1024 * 1024,
            max_entries: 10_000,
            max_filename_len: 255,
            max_depth: 15,
            max_image_bytes: 10 * 1024 * 1024,
            max_text_bytes: 1024 * 1024,
            max_text_len: 5000,
            min_name_len: 2,
            max_category_name_len: 100,
            max_product_name_len: 200,
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            text_extensions: TEXT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            product_codes: PRODUCT_CODES.iter().map(|s| s.to_string()).collect(),
            image_max_edge: 1920,
            jpeg_quality: 85,
            max_tags: 10,
            default_variant_price: 2000.0,
            default_variant_weight: "100gms".to_string(),
        }
    }
}

impl UploadPolicy {
    pub fn is_image_extension(&self, ext: &str) -> bool {
        self.image_extensions.iter().any(|e| e == ext)
    }

    pub fn is_text_extension(&self, ext: &str) -> bool {
        self.text_extensions.iter().any(|e| e == ext)
    }

    pub fn is_product_code(&self, code: &str) -> bool {
        self.product_codes.iter().any(|c| c == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let policy = UploadPolicy::default();
        assert_eq!(policy.max_entries, 10_000);
        assert_eq!(policy.max_uncompressed_bytes, 500 * 1024 * 1024);
        assert_eq!(policy.max_depth, 15);
        assert_eq!(policy.max_filename_len, 255);
        assert_eq!(policy.image_max_edge, 1920);
    }

    #[test]
    fn test_extension_checks() {
        let policy = UploadPolicy::default();
        assert!(policy.is_image_extension("jpg"));
        assert!(policy.is_image_extension("webp"));
        assert!(!policy.is_image_extension("exe"));
        assert!(policy.is_text_extension("txt"));
        assert!(policy.is_text_extension("json"));
        assert!(!policy.is_text_extension("html"));
    }

    #[test]
    fn test_product_code_whitelist() {
        let policy = UploadPolicy::default();
        assert!(policy.is_product_code("SPH"));
        assert!(policy.is_product_code("IFP"));
        assert!(!policy.is_product_code("XYZ"));
        assert!(!policy.is_product_code("sph"));
    }
}
