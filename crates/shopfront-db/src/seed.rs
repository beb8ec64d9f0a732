//! Idempotent loading of the YAML seed catalog, plus random sample coupons.
//!
//! Everything is matched by title, so running the seed twice leaves one copy
//! of each record. Products that already exist (same title and type) are
//! skipped entirely, including their variants.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use shopfront_core::{
    catalog_schema::ProductTypeSeed,
    forms::CouponForm,
    plan_variants, CatalogSchema, DiscountKind, ProductTypeSchema,
};
use sqlx::{PgConnection, PgPool};

use crate::catalog::product_types::load_product_type_schema;
use crate::catalog::variants::insert_variant;
use crate::discounts::create_coupon;
use crate::DbError;

/// Counts of records the seed created (existing records are not counted).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub attributes: usize,
    pub categories: usize,
    pub collections: usize,
    pub product_types: usize,
    pub products: usize,
    pub variants: usize,
}

#[derive(Default)]
struct TitleIds {
    attributes: HashMap<String, i64>,
    categories: HashMap<String, i64>,
    collections: HashMap<String, i64>,
}

/// Write the seed catalog in one transaction.
///
/// # Errors
///
/// Returns [`DbError`] if any write fails; nothing is kept in that case.
pub async fn seed_catalog(pool: &PgPool, schema: &CatalogSchema) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();
    let mut ids = TitleIds::default();

    for attribute in &schema.attributes {
        let (id, created) = upsert_by_title(&mut tx, "product_attributes", &attribute.title).await?;
        summary.attributes += usize::from(created);
        for (position, value) in attribute.values.iter().enumerate() {
            sqlx::query(
                "INSERT INTO attribute_choice_values (attribute_id, title, position) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (attribute_id, title) DO NOTHING",
            )
            .bind(id)
            .bind(value)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }
        ids.attributes.insert(attribute.title.clone(), id);
    }

    for category in &schema.categories {
        let (id, created) = upsert_by_title(&mut tx, "categories", &category.title).await?;
        summary.categories += usize::from(created);
        if created {
            sqlx::query("UPDATE categories SET background_img = $2 WHERE id = $1")
                .bind(id)
                .bind(category.background_img.as_deref())
                .execute(&mut *tx)
                .await?;
        }
        ids.categories.insert(category.title.clone(), id);
    }
    for category in &schema.categories {
        let parent = category
            .parent
            .as_ref()
            .and_then(|p| ids.categories.get(p).copied());
        if let (Some(id), Some(parent)) = (ids.categories.get(&category.title), parent) {
            sqlx::query("UPDATE categories SET parent_id = $2 WHERE id = $1")
                .bind(*id)
                .bind(parent)
                .execute(&mut *tx)
                .await?;
        }
    }

    for collection in &schema.collections {
        let (id, created) = upsert_by_title(&mut tx, "collections", &collection.title).await?;
        summary.collections += usize::from(created);
        if created {
            sqlx::query("UPDATE collections SET background_img = $2 WHERE id = $1")
                .bind(id)
                .bind(collection.background_img.as_deref())
                .execute(&mut *tx)
                .await?;
        }
        ids.collections.insert(collection.title.clone(), id);
    }

    for product_type in &schema.product_types {
        seed_product_type(&mut tx, product_type, &ids, &mut summary).await?;
    }

    tx.commit().await?;
    tracing::info!(?summary, "seeded catalog");
    Ok(summary)
}

/// Find a row by title in `table`, inserting it when missing.
/// Returns the id and whether it was created.
async fn upsert_by_title(
    conn: &mut PgConnection,
    table: &'static str,
    title: &str,
) -> Result<(i64, bool), DbError> {
    let select = format!("SELECT id FROM {table} WHERE title = $1 ORDER BY id LIMIT 1");
    let existing: Option<i64> = sqlx::query_scalar(&select)
        .bind(title)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(id) = existing {
        return Ok((id, false));
    }
    let insert = format!("INSERT INTO {table} (title) VALUES ($1) RETURNING id");
    let id: i64 = sqlx::query_scalar(&insert)
        .bind(title)
        .fetch_one(&mut *conn)
        .await?;
    Ok((id, true))
}

async fn seed_product_type(
    conn: &mut PgConnection,
    seed: &ProductTypeSeed,
    ids: &TitleIds,
    summary: &mut SeedSummary,
) -> Result<(), DbError> {
    let (type_id, created) = upsert_by_title(conn, "product_types", &seed.title).await?;
    if created {
        summary.product_types += 1;
        sqlx::query(
            "UPDATE product_types SET has_variants = $2, is_shipping_required = $3 WHERE id = $1",
        )
        .bind(type_id)
        .bind(seed.has_variants)
        .bind(seed.is_shipping_required)
        .execute(&mut *conn)
        .await?;

        let roles = seed
            .product_attributes
            .iter()
            .map(|t| (t, "product"))
            .chain(seed.variant_attributes.iter().map(|t| (t, "variant")));
        for (position, (title, role)) in roles.enumerate() {
            let Some(attribute_id) = ids.attributes.get(title) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO product_type_attributes \
                 (product_type_id, attribute_id, role, position) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (product_type_id, attribute_id) DO NOTHING",
            )
            .bind(type_id)
            .bind(*attribute_id)
            .bind(role)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *conn)
            .await?;
        }
    }

    let schema = load_product_type_schema(conn, type_id)
        .await?
        .ok_or(DbError::NotFound)?;
    let category_id = ids.categories.get(&seed.category).copied();

    for product in &seed.products {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM products WHERE title = $1 AND product_type_id = $2",
        )
        .bind(&product.title)
        .bind(type_id)
        .fetch_optional(&mut *conn)
        .await?;
        if existing.is_some() {
            continue;
        }

        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO products \
             (title, description, price, is_featured, category_id, product_type_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.is_featured)
        .bind(category_id)
        .bind(type_id)
        .fetch_one(&mut *conn)
        .await?;
        summary.products += 1;

        for (attribute, value) in &product.attributes {
            let Some(axis) = schema.product_attributes.iter().find(|a| &a.title == attribute)
            else {
                continue;
            };
            let Some(choice) = axis.values.iter().find(|v| &v.title == value) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO product_attribute_values (product_id, attribute_id, value_id) \
                 VALUES ($1, $2, $3)",
            )
            .bind(product_id)
            .bind(axis.id.0)
            .bind(choice.id.0)
            .execute(&mut *conn)
            .await?;
        }

        for (position, image) in product.images.iter().enumerate() {
            sqlx::query(
                "INSERT INTO product_images (product_id, image, position) VALUES ($1, $2, $3)",
            )
            .bind(product_id)
            .bind(image)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .execute(&mut *conn)
            .await?;
        }

        for title in &product.collections {
            if let Some(collection_id) = ids.collections.get(title) {
                sqlx::query(
                    "INSERT INTO collection_products (collection_id, product_id) \
                     VALUES ($1, $2) ON CONFLICT DO NOTHING",
                )
                .bind(*collection_id)
                .bind(product_id)
                .execute(&mut *conn)
                .await?;
            }
        }

        for variant in plan_variants(product_id, &schema) {
            let price_override = variant_price(&schema, &variant.attributes, &seed.variant_prices);
            insert_variant(
                conn,
                product_id,
                &variant.sku,
                variant.title.as_deref(),
                price_override,
                seed.stock_per_variant,
                &variant.attributes,
            )
            .await?;
            summary.variants += 1;
        }
    }
    Ok(())
}

/// Override price for a variant: the first of its value titles that has a
/// configured price.
fn variant_price(
    schema: &ProductTypeSchema,
    attributes: &shopfront_core::AttributeMap,
    prices: &HashMap<String, Decimal>,
) -> Option<Decimal> {
    schema.variant_attributes.iter().find_map(|axis| {
        let value_id = attributes.get(axis.id)?;
        let choice = axis.value(value_id)?;
        prices.get(&choice.title).copied()
    })
}

/// Create `count` sample coupons with random codes and a 10% discount.
///
/// # Errors
///
/// Returns [`DbError`] if a coupon cannot be written.
pub async fn seed_coupons(pool: &PgPool, count: usize) -> Result<Vec<String>, DbError> {
    let mut codes = Vec::with_capacity(count);
    for n in 1..=count {
        let form = CouponForm {
            title: format!("Sample coupon {n}"),
            code: None,
            kind: DiscountKind::Percent,
            value: Decimal::new(10, 0),
            usage_limit: Some(100),
            min_amount: None,
            not_before: None,
            not_after: None,
            enabled: true,
        };
        let row = create_coupon(pool, &form).await?;
        if let Some(code) = row.code {
            codes.push(code);
        }
    }
    tracing::info!(count = codes.len(), "seeded coupons");
    Ok(codes)
}

#[cfg(test)]
mod tests {
    use shopfront_core::{AttributeAxis, AttributeChoice, AttributeId, AttributeValueId};

    use super::*;

    fn coffee_schema() -> ProductTypeSchema {
        let axis = AttributeAxis {
            id: AttributeId(1),
            title: "Box Size".to_string(),
            values: vec![
                AttributeChoice {
                    id: AttributeValueId(10),
                    title: "250g".to_string(),
                },
                AttributeChoice {
                    id: AttributeValueId(11),
                    title: "1kg".to_string(),
                },
            ],
        };
        ProductTypeSchema::new(1, "Coffee", true, true, vec![], vec![axis]).expect("schema")
    }

    #[test]
    fn variant_price_uses_the_configured_value_price() {
        let schema = coffee_schema();
        let prices = HashMap::from([("1kg".to_string(), Decimal::new(3500, 2))]);
        let variants = plan_variants(5, &schema);

        assert_eq!(variant_price(&schema, &variants[0].attributes, &prices), None);
        assert_eq!(
            variant_price(&schema, &variants[1].attributes, &prices),
            Some(Decimal::new(3500, 2))
        );
    }
}
