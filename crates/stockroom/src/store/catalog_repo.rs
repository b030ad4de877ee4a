//! Catalog repository — idempotent create-or-update of categories,
//! products, variants, and image attachments.
//!
//! Entities are matched by exact human-readable name, not by code, so
//! repeated uploads of the same catalog resolve to updates. Every upsert
//! for a single entity runs inside one transaction; a partial failure rolls
//! back only that unit.

use rusqlite::{params, Connection, OptionalExtension};

use super::{Database, StoreError};
use crate::layout::{CategoryDraft, ProductDraft};
use crate::policy::UploadPolicy;
use crate::security::SecurityValidator;

/// How an upsert resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct CategoryRecord {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub secondary_description: String,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: String,
}

/// Creates or updates a category from a draft.
///
/// Creation requires a processed primary image and always sets all provided
/// fields; the update path only overwrites fields whose new value is
/// non-empty and differs from what is stored.
pub fn upsert_category(
    db: &Database,
    draft: &CategoryDraft,
) -> Result<(CategoryRecord, UpsertOutcome), StoreError> {
    db.with_tx(|conn| {
        let existing = conn
            .query_row(
                "SELECT id, slug, description, secondary_description, display_order
                 FROM categories WHERE name = ?1",
                params![draft.name],
                |r| {
                    Ok(CategoryRecord {
                        id: r.get(0)?,
                        name: draft.name.clone(),
                        slug: r.get(1)?,
                        description: r.get(2)?,
                        secondary_description: r.get(3)?,
                        display_order: r.get(4)?,
                    })
                },
            )
            .optional()?;

        match existing {
            None => {
                let primary = draft.primary_image.as_ref().ok_or_else(|| {
                    StoreError::PrimaryImageRequired {
                        category: draft.name.clone(),
                    }
                })?;

                let slug = category_slug(&draft.name);

                conn.execute(
                    "INSERT INTO categories (name, slug, description, secondary_description,
                     display_order, primary_image_name, primary_image,
                     secondary_image_name, secondary_image, is_active)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)",
                    params![
                        draft.name,
                        slug,
                        draft.fields.description,
                        draft.fields.secondary_description,
                        draft.display_order,
                        primary.filename,
                        primary.bytes,
                        draft.secondary_image.as_ref().map(|i| i.filename.clone()),
                        draft.secondary_image.as_ref().map(|i| i.bytes.clone()),
                    ],
                )?;

                let record = CategoryRecord {
                    id: conn.last_insert_rowid(),
                    name: draft.name.clone(),
                    slug,
                    description: draft.fields.description.clone(),
                    secondary_description: draft.fields.secondary_description.clone(),
                    display_order: Some(draft.display_order),
                };
                Ok((record, UpsertOutcome::Created))
            }
            Some(mut record) => {
                let mut updated = false;

                if !draft.fields.description.is_empty()
                    && record.description != draft.fields.description
                {
                    conn.execute(
                        "UPDATE categories SET description = ?2 WHERE id = ?1",
                        params![record.id, draft.fields.description],
                    )?;
                    record.description = draft.fields.description.clone();
                    updated = true;
                }

                if !draft.fields.secondary_description.is_empty()
                    && record.secondary_description != draft.fields.secondary_description
                {
                    conn.execute(
                        "UPDATE categories SET secondary_description = ?2 WHERE id = ?1",
                        params![record.id, draft.fields.secondary_description],
                    )?;
                    record.secondary_description = draft.fields.secondary_description.clone();
                    updated = true;
                }

                let outcome = if updated {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                };
                Ok((record, outcome))
            }
        }
    })
}

/// Creates or updates a product under a category.
///
/// Images are deduplicated by stored filename; the first image attached to a
/// product with no primary becomes primary. A product that ends up with zero
/// variants receives one placeholder price/weight variant so nothing is left
/// unsellable-by-construction.
pub fn upsert_product(
    db: &Database,
    category_id: i64,
    draft: &ProductDraft,
    policy: &UploadPolicy,
) -> Result<(ProductRecord, UpsertOutcome), StoreError> {
    db.with_tx(|conn| {
        let existing = conn
            .query_row(
                "SELECT id, category_id, description FROM products WHERE name = ?1",
                params![draft.name],
                |r| {
                    Ok(ProductRecord {
                        id: r.get(0)?,
                        category_id: r.get(1)?,
                        name: draft.name.clone(),
                        description: r.get(2)?,
                    })
                },
            )
            .optional()?;

        let (record, outcome) = match existing {
            None => {
                conn.execute(
                    "INSERT INTO products (category_id, name, description,
                     secondary_description, is_active)
                     VALUES (?1, ?2, ?3, ?4, 1)",
                    params![
                        category_id,
                        draft.name,
                        draft.fields.description,
                        draft.fields.secondary_description,
                    ],
                )?;
                let record = ProductRecord {
                    id: conn.last_insert_rowid(),
                    category_id,
                    name: draft.name.clone(),
                    description: draft.fields.description.clone(),
                };

                for tag in draft.fields.tags.iter().take(policy.max_tags) {
                    conn.execute(
                        "INSERT OR IGNORE INTO product_tags (product_id, tag) VALUES (?1, ?2)",
                        params![record.id, tag],
                    )?;
                }

                (record, UpsertOutcome::Created)
            }
            Some(mut record) => {
                let mut updated = false;
                if !draft.fields.description.is_empty()
                    && record.description != draft.fields.description
                {
                    conn.execute(
                        "UPDATE products SET description = ?2 WHERE id = ?1",
                        params![record.id, draft.fields.description],
                    )?;
                    record.description = draft.fields.description.clone();
                    updated = true;
                }
                let outcome = if updated {
                    UpsertOutcome::Updated
                } else {
                    UpsertOutcome::Unchanged
                };
                (record, outcome)
            }
        };

        attach_images(conn, record.id, draft)?;
        ensure_default_variant(conn, record.id, policy)?;

        Ok((record, outcome))
    })
}

fn attach_images(conn: &Connection, product_id: i64, draft: &ProductDraft) -> Result<(), StoreError> {
    for image in &draft.images {
        let already_attached: bool = conn
            .query_row(
                "SELECT 1 FROM product_images WHERE product_id = ?1 AND filename = ?2",
                params![product_id, image.filename],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if already_attached {
            continue;
        }

        let has_primary: bool = conn
            .query_row(
                "SELECT 1 FROM product_images WHERE product_id = ?1 AND is_primary = 1",
                params![product_id],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        conn.execute(
            "INSERT INTO product_images (product_id, filename, data, is_primary)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, image.filename, image.bytes, !has_primary],
        )?;
    }
    Ok(())
}

fn ensure_default_variant(
    conn: &Connection,
    product_id: i64,
    policy: &UploadPolicy,
) -> Result<(), StoreError> {
    let variant_count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM price_weights WHERE product_id = ?1",
        params![product_id],
        |r| r.get(0),
    )?;
    if variant_count == 0 {
        conn.execute(
            "INSERT INTO price_weights (product_id, price, weight, inventory)
             VALUES (?1, ?2, ?3, 0)",
            params![
                product_id,
                policy.default_variant_price,
                policy.default_variant_weight
            ],
        )?;
    }
    Ok(())
}

/// Whether a category with this exact name already exists. Used to decide
/// if a category directory without a primary image may still proceed as an
/// update.
pub fn category_exists(db: &Database, name: &str) -> Result<bool, StoreError> {
    db.with_conn(|conn| {
        let found: bool = conn
            .query_row(
                "SELECT 1 FROM categories WHERE name = ?1",
                params![name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(found)
    })
}

pub fn category_count(db: &Database) -> Result<u64, StoreError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))?;
        Ok(count)
    })
}

pub fn product_count(db: &Database) -> Result<u64, StoreError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
        Ok(count)
    })
}

pub fn product_tags(db: &Database, product_id: i64) -> Result<Vec<String>, StoreError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT tag FROM product_tags WHERE product_id = ?1 ORDER BY tag",
        )?;
        let tags = stmt
            .query_map(params![product_id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    })
}

pub fn product_variant_count(db: &Database, product_id: i64) -> Result<u64, StoreError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM price_weights WHERE product_id = ?1",
            params![product_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

pub fn product_image_count(db: &Database, product_id: i64) -> Result<u64, StoreError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM product_images WHERE product_id = ?1",
            params![product_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

fn category_slug(name: &str) -> String {
    let slug = SecurityValidator::slugify(name);
    if slug.is_empty() {
        SecurityValidator::slugify(&format!("category-{}", name))
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CategoryFields, ProductFields};
    use crate::processor::ProcessedImage;

    fn test_image(filename: &str) -> ProcessedImage {
        ProcessedImage {
            filename: filename.to_string(),
            bytes: vec![0xff, 0xd8, 0xff, 0xe0],
            width: 32,
            height: 32,
        }
    }

    fn category_draft(name: &str) -> CategoryDraft {
        CategoryDraft {
            name: name.to_string(),
            display_order: 1,
            fields: CategoryFields {
                slug: String::new(),
                description: "fresh spices".to_string(),
                secondary_description: "short blurb".to_string(),
            },
            primary_image: Some(test_image("main.jpg")),
            secondary_image: None,
        }
    }

    fn product_draft(name: &str) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            fields: ProductFields {
                description: "golden spice".to_string(),
                secondary_description: "turmeric".to_string(),
                tags: vec!["turmeric".to_string(), "spice".to_string()],
            },
            images: vec![test_image("turmeric.jpg")],
        }
    }

    #[test]
    fn test_create_category() {
        let db = Database::open_in_memory().unwrap();
        let (record, outcome) = upsert_category(&db, &category_draft("spices and herbs")).unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(record.slug, "spices-and-herbs");
        assert_eq!(category_count(&db).unwrap(), 1);
    }

    #[test]
    fn test_create_category_requires_primary_image() {
        let db = Database::open_in_memory().unwrap();
        let mut draft = category_draft("no image");
        draft.primary_image = None;

        assert!(matches!(
            upsert_category(&db, &draft),
            Err(StoreError::PrimaryImageRequired { .. })
        ));
        assert_eq!(category_count(&db).unwrap(), 0);
    }

    #[test]
    fn test_existing_category_updates_without_image() {
        let db = Database::open_in_memory().unwrap();
        upsert_category(&db, &category_draft("spices")).unwrap();

        let mut draft = category_draft("spices");
        draft.primary_image = None;
        draft.fields.description = "new description".to_string();

        let (record, outcome) = upsert_category(&db, &draft).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(record.description, "new description");
        assert_eq!(category_count(&db).unwrap(), 1);
    }

    #[test]
    fn test_category_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let draft = category_draft("spices");

        let (_, first) = upsert_category(&db, &draft).unwrap();
        let (_, second) = upsert_category(&db, &draft).unwrap();

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Unchanged);
        assert_eq!(category_count(&db).unwrap(), 1);
    }

    #[test]
    fn test_slug_fallback_for_non_ascii_name() {
        let db = Database::open_in_memory().unwrap();
        let (record, _) = upsert_category(&db, &category_draft("मसाले")).unwrap();
        assert_eq!(record.slug, "category");
    }

    #[test]
    fn test_create_product_with_default_variant() {
        let db = Database::open_in_memory().unwrap();
        let (category, _) = upsert_category(&db, &category_draft("spices")).unwrap();

        let (product, outcome) =
            upsert_product(&db, category.id, &product_draft("turmeric"), &UploadPolicy::default())
                .unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(product_variant_count(&db, product.id).unwrap(), 1);
        assert_eq!(product_image_count(&db, product.id).unwrap(), 1);
        assert_eq!(
            product_tags(&db, product.id).unwrap(),
            vec!["spice".to_string(), "turmeric".to_string()]
        );
    }

    #[test]
    fn test_product_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (category, _) = upsert_category(&db, &category_draft("spices")).unwrap();
        let policy = UploadPolicy::default();
        let draft = product_draft("turmeric");

        let (first, first_outcome) = upsert_product(&db, category.id, &draft, &policy).unwrap();
        let (second, second_outcome) = upsert_product(&db, category.id, &draft, &policy).unwrap();

        assert_eq!(first_outcome, UpsertOutcome::Created);
        assert_eq!(second_outcome, UpsertOutcome::Unchanged);
        assert_eq!(first.id, second.id);
        assert_eq!(product_count(&db).unwrap(), 1);
        // Images deduped by filename; variant not duplicated.
        assert_eq!(product_image_count(&db, first.id).unwrap(), 1);
        assert_eq!(product_variant_count(&db, first.id).unwrap(), 1);
    }

    #[test]
    fn test_product_update_overwrites_changed_description_only() {
        let db = Database::open_in_memory().unwrap();
        let (category, _) = upsert_category(&db, &category_draft("spices")).unwrap();
        let policy = UploadPolicy::default();
        upsert_product(&db, category.id, &product_draft("turmeric"), &policy).unwrap();

        let mut draft = product_draft("turmeric");
        draft.fields.description = "brighter golden spice".to_string();
        let (record, outcome) = upsert_product(&db, category.id, &draft, &policy).unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(record.description, "brighter golden spice");
    }

    #[test]
    fn test_first_image_becomes_primary() {
        let db = Database::open_in_memory().unwrap();
        let (category, _) = upsert_category(&db, &category_draft("spices")).unwrap();

        let mut draft = product_draft("turmeric");
        draft.images = vec![test_image("one.jpg"), test_image("two.jpg")];
        let (product, _) =
            upsert_product(&db, category.id, &draft, &UploadPolicy::default()).unwrap();

        db.with_conn(|conn| {
            let primaries: u32 = conn.query_row(
                "SELECT COUNT(*) FROM product_images WHERE product_id = ?1 AND is_primary = 1",
                params![product.id],
                |r| r.get(0),
            )?;
            assert_eq!(primaries, 1);
            let primary_name: String = conn.query_row(
                "SELECT filename FROM product_images WHERE product_id = ?1 AND is_primary = 1",
                params![product.id],
                |r| r.get(0),
            )?;
            assert_eq!(primary_name, "one.jpg");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_category_exists() {
        let db = Database::open_in_memory().unwrap();
        assert!(!category_exists(&db, "spices").unwrap());
        upsert_category(&db, &category_draft("spices")).unwrap();
        assert!(category_exists(&db, "spices").unwrap());
        // Name matching is case-sensitive.
        assert!(!category_exists(&db, "Spices").unwrap());
    }
}
