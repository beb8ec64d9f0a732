//! Database operations for the `products` table and product attribute values.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::ProductForm, plan_variants, AttributeId, AttributeMap, AttributeRole, AttributeValueId,
    FormErrors, ProductTypeSchema, Sort,
};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use super::product_types::load_product_type_schema;
use super::variants::insert_variant;
use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub on_sale: bool,
    pub is_featured: bool,
    pub rating: Decimal,
    pub sold_count: i32,
    pub review_count: i32,
    pub category_id: Option<i64>,
    pub product_type_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing card: the product with its first image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductSummaryRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub first_img: Option<String>,
}

const PRODUCT_COLUMNS: &str = "id, title, description, price, on_sale, is_featured, rating, \
     sold_count, review_count, category_id, product_type_id, created_at, updated_at";

/// Select list for [`ProductSummaryRow`] over `products p`.
pub(crate) const SUMMARY_SELECT: &str = "SELECT p.id, p.title, p.description, p.price, \
     (SELECT i.image FROM product_images i WHERE i.product_id = p.id \
      ORDER BY i.position, i.id LIMIT 1) AS first_img \
     FROM products p";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<ProductRow>, DbError> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Dashboard list, newest first, optionally filtered by title.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_products_page(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Page<ProductRow>, DbError> {
    let pattern = search.map(like_pattern);

    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE ($1::text IS NULL OR title ILIKE $1) \
         ORDER BY id DESC LIMIT $2 OFFSET $3"
    );
    let items = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(pattern.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM products WHERE ($1::text IS NULL OR title ILIKE $1)",
    )
    .bind(pattern.as_deref())
    .fetch_one(pool)
    .await?;
    Ok(Page { items, total })
}

/// Public product index: on-sale products with an optional case-insensitive
/// search over title and description.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_products_index(
    pool: &PgPool,
    search: Option<&str>,
    sort: Option<Sort>,
    limit: i64,
    offset: i64,
) -> Result<Page<ProductSummaryRow>, DbError> {
    let pattern = search.map(like_pattern);

    let mut query = QueryBuilder::<Postgres>::new(SUMMARY_SELECT);
    push_index_filter(&mut query, pattern.as_deref());
    match sort {
        Some(sort) => {
            query.push(format!(
                " ORDER BY p.{} {}, p.id",
                sort.key.column(),
                sort.order.sql()
            ));
        }
        None => {
            query.push(" ORDER BY p.id");
        }
    }
    query.push(" LIMIT ").push_bind(limit);
    query.push(" OFFSET ").push_bind(offset);
    let items = query
        .build_query_as::<ProductSummaryRow>()
        .fetch_all(pool)
        .await?;

    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
    push_index_filter(&mut count, pattern.as_deref());
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    Ok(Page { items, total })
}

fn push_index_filter(query: &mut QueryBuilder<'_, Postgres>, pattern: Option<&str>) {
    query.push(" WHERE p.on_sale");
    if let Some(pattern) = pattern {
        query
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.to_string())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern.to_string())
            .push(")");
    }
}

/// `%value%` with LIKE wildcards in `value` escaped.
fn like_pattern(value: &str) -> String {
    let escaped = value
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Featured on-sale products, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_featured_products(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ProductSummaryRow>, DbError> {
    let sql = format!("{SUMMARY_SELECT} WHERE p.is_featured AND p.on_sale ORDER BY p.id LIMIT $1");
    let rows = sqlx::query_as::<_, ProductSummaryRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_product_attributes(pool: &PgPool, id: i64) -> Result<AttributeMap, DbError> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT attribute_id, value_id FROM product_attribute_values WHERE product_id = $1",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|(a, v)| (AttributeId(a), AttributeValueId(v)))
        .collect())
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Create a product and generate its variants in the same transaction.
///
/// Variants come from the Cartesian product of the type's variant
/// attributes; a type without variants gets one default variant. All
/// variants start with zero stock.
///
/// # Errors
///
/// Returns [`DbError::Form`] for an unknown type or category or an
/// attribute map the type does not declare, or [`DbError::Sqlx`] on query
/// failure.
pub async fn create_product(pool: &PgPool, form: &ProductForm) -> Result<ProductRow, DbError> {
    let mut tx = pool.begin().await?;
    let schema = load_schema_for(&mut tx, form).await?;

    let sql = format!(
        "INSERT INTO products \
         (title, description, price, on_sale, is_featured, rating, sold_count, review_count, \
          category_id, product_type_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING {PRODUCT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(&form.title)
        .bind(&form.description)
        .bind(form.price)
        .bind(form.on_sale)
        .bind(form.is_featured)
        .bind(form.rating)
        .bind(form.sold_count)
        .bind(form.review_count)
        .bind(form.category_id)
        .bind(form.product_type_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| super::map_foreign_key(e, "category_id", "unknown category"))?;

    write_attribute_values(&mut tx, row.id, &form.attributes).await?;

    let planned = plan_variants(row.id, &schema);
    for variant in &planned {
        insert_variant(
            &mut tx,
            row.id,
            &variant.sku,
            variant.title.as_deref(),
            None,
            0,
            &variant.attributes,
        )
        .await?;
    }

    tx.commit().await?;
    tracing::info!(
        product_id = row.id,
        variants = planned.len(),
        "created product"
    );
    Ok(row)
}

/// Update a product's fields and replace its attribute values. The product
/// type cannot change once variants exist for it.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist,
/// [`DbError::Form`] for invalid references or attributes, or
/// [`DbError::Sqlx`] on query failure.
pub async fn update_product(
    pool: &PgPool,
    id: i64,
    form: &ProductForm,
) -> Result<ProductRow, DbError> {
    let mut tx = pool.begin().await?;

    let current_type: i64 =
        sqlx::query_scalar("SELECT product_type_id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(DbError::NotFound)?;
    if current_type != form.product_type_id {
        return Err(DbError::Form(FormErrors::single(
            "product_type_id",
            "cannot change the type of an existing product",
        )));
    }
    load_schema_for(&mut tx, form).await?;

    let sql = format!(
        "UPDATE products SET \
         title = $2, description = $3, price = $4, on_sale = $5, is_featured = $6, \
         rating = $7, sold_count = $8, review_count = $9, category_id = $10, \
         updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {PRODUCT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProductRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(&form.description)
        .bind(form.price)
        .bind(form.on_sale)
        .bind(form.is_featured)
        .bind(form.rating)
        .bind(form.sold_count)
        .bind(form.review_count)
        .bind(form.category_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| super::map_foreign_key(e, "category_id", "unknown category"))?;

    sqlx::query("DELETE FROM product_attribute_values WHERE product_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    write_attribute_values(&mut tx, id, &form.attributes).await?;

    tx.commit().await?;
    Ok(row)
}

/// Delete a product with its variants and images. Order lines keep their
/// snapshot; collection and sale memberships are removed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_product(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

async fn load_schema_for(
    conn: &mut PgConnection,
    form: &ProductForm,
) -> Result<ProductTypeSchema, DbError> {
    let schema = load_product_type_schema(conn, form.product_type_id)
        .await?
        .ok_or_else(|| {
            DbError::Form(FormErrors::single("product_type_id", "unknown product type"))
        })?;
    schema
        .validate(AttributeRole::Product, &form.attributes)
        .map_err(|e| DbError::Form(FormErrors::single("attributes", e.to_string())))?;
    Ok(schema)
}

async fn write_attribute_values(
    conn: &mut PgConnection,
    product_id: i64,
    attributes: &AttributeMap,
) -> Result<(), DbError> {
    for (attribute_id, value_id) in attributes.iter() {
        sqlx::query(
            "INSERT INTO product_attribute_values (product_id, attribute_id, value_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(product_id)
        .bind(attribute_id.0)
        .bind(value_id.0)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_and_escapes_wildcards() {
        assert_eq!(like_pattern(" tee "), "%tee%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn index_filter_without_search_only_restricts_on_sale() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM products p");
        push_index_filter(&mut query, None);
        assert_eq!(query.sql(), "SELECT 1 FROM products p WHERE p.on_sale");
    }

    #[test]
    fn index_filter_searches_title_and_description() {
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM products p");
        push_index_filter(&mut query, Some("%mug%"));
        assert_eq!(
            query.sql(),
            "SELECT 1 FROM products p WHERE p.on_sale \
             AND (p.title ILIKE $1 OR p.description ILIKE $2)"
        );
    }
}
