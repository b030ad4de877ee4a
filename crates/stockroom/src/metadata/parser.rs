//! Tolerant parser for category and product description files.
//!
//! Product data files arrive as JSON from an upstream vendor with a few
//! recurring malformations. Strict parsing is attempted first; on failure a
//! fixed set of three repair rules is applied, then a regex-based manual
//! extraction, and finally the whole content is treated as a plain-text
//! description. The repair rules are a compatibility shim for observed
//! vendor defects — they are deliberately not a general JSON repair pass.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::DataError;
use crate::metadata::fields::{CategoryFields, ProductFields, ALLOWED_PRODUCT_KEYS};
use crate::policy::UploadPolicy;
use crate::security::SecurityValidator;

/// Tokens never worth indexing as tags.
const TAG_STOP_WORDS: &[&str] = &["and", "the", "for", "with", "helps", "aids"];

/// Vendor fields that feed tag derivation.
const TAG_SOURCE_KEYS: &[&str] = &["Ingredients", "Features & Benefits", "Usage Recommendation"];

fn description_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""Description"\s*:\s*"([^"]+)""#).expect("valid pattern")
    })
}

fn ingredients_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""Ingredients"\s*:\s*"([^"]+)""#).expect("valid pattern")
    })
}

fn missing_ingredients_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"("Description"\s*:\s*"[^"]*")\s*:\s*("[^"]*")"#).expect("valid pattern")
    })
}

/// Periods become commas in descriptions so downstream display code does not
/// truncate at the first sentence boundary.
fn periods_to_commas(text: &str) -> String {
    text.replace('.', ",")
}

/// Repair rule (a): double a bare backslash that does not start a
/// recognized escape sequence. Hand-rolled scan; the regex crate has no
/// lookbehind.
pub(crate) fn escape_bare_backslashes(s: &str) -> String {
    const RECOGNIZED: &[char] = &['"', '\\', 'n', 'r', 't', 'b', 'f', '/'];
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if c == '\\'
            && (i == 0 || chars[i - 1] != '\\')
            && chars.get(i + 1).is_none_or(|n| !RECOGNIZED.contains(n))
        {
            out.push_str("\\\\");
        } else {
            out.push(c);
        }
    }
    out
}

/// Repair rule (b): escape an unescaped quote that immediately precedes a
/// word character. Tuned for double-encoded vendor blobs where legitimate
/// quotes arrive pre-escaped.
pub(crate) fn escape_quote_before_word(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        let preceded_by_escape = i > 0 && chars[i - 1] == '\\';
        let followed_by_word = chars
            .get(i + 1)
            .is_some_and(|n| n.is_alphanumeric() || *n == '_');
        if c == '"' && !preceded_by_escape && followed_by_word {
            out.push_str("\\\"");
        } else {
            out.push(c);
        }
    }
    out
}

/// Repair rule (c): a `"Description"` string value immediately followed by a
/// bare string value is missing a comma and the `"Ingredients"` key — a
/// specific upstream authoring defect.
pub(crate) fn insert_missing_ingredients_key(s: &str) -> String {
    missing_ingredients_pattern()
        .replace_all(s, r#"${1}, "Ingredients": ${2}"#)
        .into_owned()
}

/// All three repair rules, in order.
pub(crate) fn repair_json(s: &str) -> String {
    let fixed = escape_bare_backslashes(s);
    let fixed = escape_quote_before_word(&fixed);
    insert_missing_ingredients_key(&fixed)
}

pub struct MetadataParser {
    validator: SecurityValidator,
    max_tags: usize,
}

impl MetadataParser {
    pub fn new(policy: UploadPolicy) -> Self {
        let max_tags = policy.max_tags;
        Self {
            validator: SecurityValidator::new(policy),
            max_tags,
        }
    }

    /// Parses a product data file. `content` is expected to be sanitized by
    /// the caller (who records the truncation note, if any).
    ///
    /// Errors only on empty content or on a well-formed JSON object carrying
    /// a key outside the whitelist; every other input yields a best-effort
    /// record.
    pub fn parse_product(&self, content: &str) -> Result<ProductFields, DataError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DataError::EmptyContent);
        }

        match self.parse_product_json(content) {
            Ok(fields) => return Ok(fields),
            Err(DataError::UnknownField { field }) => {
                return Err(DataError::UnknownField { field });
            }
            Err(e) => debug!("JSON parse failed, trying manual extraction: {}", e),
        }

        if let Some(fields) = self.extract_product_manually(content) {
            return Ok(fields);
        }

        // Last resort: the whole file is the description.
        Ok(ProductFields {
            description: periods_to_commas(content),
            secondary_description: String::new(),
            tags: Vec::new(),
        })
    }

    fn parse_product_json(&self, content: &str) -> Result<ProductFields, DataError> {
        let value: Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(_) => serde_json::from_str(&repair_json(content))
                .map_err(|e| DataError::Json(e.to_string()))?,
        };

        // Double-encoded JSON: the top-level value is itself a JSON string.
        // The inner document gets the missing-Ingredients repair only; its
        // quotes are already unescaped, so the quote rules would mangle it.
        let value = match value {
            Value::String(inner) => match serde_json::from_str(&inner) {
                Ok(v) => v,
                Err(_) => serde_json::from_str(&insert_missing_ingredients_key(&inner))
                    .map_err(|e| DataError::Json(e.to_string()))?,
            },
            v => v,
        };

        let map = value.as_object().ok_or(DataError::NotAnObject)?;

        for key in map.keys() {
            if !ALLOWED_PRODUCT_KEYS.contains(&key.as_str()) {
                return Err(DataError::UnknownField { field: key.clone() });
            }
        }

        let raw_description = string_field(map, "Description")
            .or_else(|| string_field(map, "description"))
            .unwrap_or_default();
        let raw_secondary = string_field(map, "Ingredients")
            .or_else(|| string_field(map, "secondary_description"))
            .unwrap_or_default();

        let description = periods_to_commas(&self.validator.sanitize_text(&raw_description).text);
        let secondary_description = self.validator.sanitize_text(&raw_secondary).text;
        let tags = self.derive_tags(map);

        Ok(ProductFields {
            description,
            secondary_description,
            tags,
        })
    }

    /// Tokenizes the tag-source fields on commas/semicolons/newlines, drops
    /// stop-words and short tokens, and caps the result.
    fn derive_tags(&self, map: &serde_json::Map<String, Value>) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();

        for key in TAG_SOURCE_KEYS {
            let Some(source) = string_field(map, key) else {
                continue;
            };
            let source = periods_to_commas(&source);
            for token in source.split([',', ';', '\n']) {
                let tag = token.trim().to_lowercase();
                if tag.chars().count() > 2
                    && !TAG_STOP_WORDS.contains(&tag.as_str())
                    && !tags.contains(&tag)
                {
                    tags.push(tag);
                }
            }
        }

        // An already-normalized file may carry an explicit tags array.
        if tags.is_empty() {
            if let Some(Value::Array(list)) = map.get("tags") {
                for v in list {
                    if let Some(tag) = v.as_str() {
                        let tag = tag.trim().to_lowercase();
                        if !tag.is_empty() && !tags.contains(&tag) {
                            tags.push(tag);
                        }
                    }
                }
            }
        }

        tags.truncate(self.max_tags);
        tags
    }

    /// Regex extraction of the two load-bearing fields from content that
    /// resisted both strict parsing and repair.
    fn extract_product_manually(&self, content: &str) -> Option<ProductFields> {
        let desc = description_pattern().captures(content)?;
        let raw_description = desc.get(1).map(|m| m.as_str()).unwrap_or_default();

        let raw_secondary = ingredients_pattern()
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or_default();

        Some(ProductFields {
            description: periods_to_commas(&self.validator.sanitize_text(raw_description).text),
            secondary_description: self.validator.sanitize_text(raw_secondary).text,
            tags: Vec::new(),
        })
    }

    /// Parses a single-file category description: `key: value` lines for
    /// recognized keys, everything else becomes description content.
    pub fn parse_category_text(&self, content: &str) -> CategoryFields {
        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut slug = String::new();
        let mut description = String::new();
        let mut description_lines: Vec<&str> = Vec::new();

        for line in &lines {
            match line.split_once(':') {
                Some((key, value)) => {
                    let key = key.trim().to_lowercase();
                    let value = value.trim();
                    match key.as_str() {
                        "slug" | "short" | "short_description" => slug = value.to_string(),
                        "description" | "long" | "long_description" | "details" => {
                            description = value.to_string();
                        }
                        _ => description_lines.push(line),
                    }
                }
                None => description_lines.push(line),
            }
        }

        if description.is_empty() && !description_lines.is_empty() {
            description = description_lines.join("\n");
        }
        if slug.is_empty() {
            if let Some(first) = description_lines.first() {
                slug = first.chars().take(50).collect();
            }
        }

        CategoryFields {
            slug,
            description: self.validator.sanitize_text(&description).text,
            secondary_description: String::new(),
        }
    }
}

fn string_field(map: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(|s| s.to_string())
}
