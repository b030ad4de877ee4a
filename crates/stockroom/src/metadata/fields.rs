//! Typed field sets for parsed category and product metadata.
//!
//! The source data is loosely-keyed vendor JSON; everything downstream of
//! the parser works with these structs. A key outside the whitelist rejects
//! the whole record as invalid data.

/// Keys a product data file may carry. The capitalized forms are the raw
/// vendor keys; the lowercase forms appear in already-normalized files.
pub const ALLOWED_PRODUCT_KEYS: &[&str] = &[
    "Description",
    "Ingredients",
    "Features & Benefits",
    "Usage Recommendation",
    "description",
    "secondary_description",
    "tags",
    "price",
    "weight",
];

pub const ALLOWED_CATEGORY_KEYS: &[&str] = &["slug", "description", "secondary_description"];

/// Parsed category description data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFields {
    pub slug: String,
    pub description: String,
    pub secondary_description: String,
}

impl CategoryFields {
    pub fn is_empty(&self) -> bool {
        self.description.is_empty() && self.secondary_description.is_empty()
    }
}

/// Parsed product description data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFields {
    pub description: String,
    pub secondary_description: String,
    pub tags: Vec<String>,
}
