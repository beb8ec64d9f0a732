//! Database operations for `product_variants`: CRUD, variant attribute
//! values, and the stock allocation counters used by checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::VariantForm, quantity_available, AttributeId, AttributeMap, AttributeRole,
    AttributeValueId, FormErrors,
};
use sqlx::{PgConnection, PgPool};

use super::product_types::load_product_type_schema;
use crate::DbError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub product_id: i64,
    pub sku: String,
    pub title: Option<String>,
    pub price_override: Option<Decimal>,
    pub quantity: i32,
    pub quantity_allocated: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VariantRow {
    #[must_use]
    pub fn quantity_available(&self) -> i32 {
        quantity_available(self.quantity, self.quantity_allocated)
    }

    #[must_use]
    pub fn is_in_stock(&self) -> bool {
        self.quantity_available() > 0
    }

    /// Variant title, falling back to the SKU for default variants.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.sku)
    }
}

const VARIANT_COLUMNS: &str = "id, product_id, sku, title, price_override, quantity, \
     quantity_allocated, created_at, updated_at";

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Variants of a product in SKU order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_variants(pool: &PgPool, product_id: i64) -> Result<Vec<VariantRow>, DbError> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = $1 ORDER BY id"
    );
    let rows = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(product_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_variant(pool: &PgPool, id: i64) -> Result<Option<VariantRow>, DbError> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1");
    let row = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_variant_attributes(pool: &PgPool, id: i64) -> Result<AttributeMap, DbError> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT attribute_id, value_id FROM variant_attribute_values WHERE variant_id = $1",
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

pub(crate) async fn insert_variant(
    conn: &mut PgConnection,
    product_id: i64,
    sku: &str,
    title: Option<&str>,
    price_override: Option<Decimal>,
    quantity: i32,
    attributes: &AttributeMap,
) -> Result<VariantRow, DbError> {
    let sql = format!(
        "INSERT INTO product_variants (product_id, sku, title, price_override, quantity) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {VARIANT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(product_id)
        .bind(sku)
        .bind(title)
        .bind(price_override)
        .bind(quantity)
        .fetch_one(&mut *conn)
        .await?;
    write_variant_attributes(conn, row.id, attributes).await?;
    Ok(row)
}

async fn write_variant_attributes(
    conn: &mut PgConnection,
    variant_id: i64,
    attributes: &AttributeMap,
) -> Result<(), DbError> {
    for (attribute_id, value_id) in attributes.iter() {
        sqlx::query(
            "INSERT INTO variant_attribute_values (variant_id, attribute_id, value_id) \
             VALUES ($1, $2, $3)",
        )
        .bind(variant_id)
        .bind(attribute_id.0)
        .bind(value_id.0)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Validate a variant attribute map against the product's type.
async fn check_variant_attributes(
    conn: &mut PgConnection,
    product_id: i64,
    attributes: &AttributeMap,
) -> Result<(), DbError> {
    let product_type_id: i64 =
        sqlx::query_scalar("SELECT product_type_id FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(DbError::NotFound)?;
    let schema = load_product_type_schema(conn, product_type_id)
        .await?
        .ok_or(DbError::NotFound)?;
    schema
        .validate(AttributeRole::Variant, attributes)
        .map_err(|e| DbError::Form(FormErrors::single("attributes", e.to_string())))
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist,
/// [`DbError::Form`] for attributes the type does not declare, or
/// [`DbError::Sqlx`] on query failure (a duplicate SKU is a unique
/// violation).
pub async fn create_variant(
    pool: &PgPool,
    product_id: i64,
    form: &VariantForm,
) -> Result<VariantRow, DbError> {
    let mut tx = pool.begin().await?;
    check_variant_attributes(&mut tx, product_id, &form.attributes).await?;
    let row = insert_variant(
        &mut tx,
        product_id,
        &form.sku,
        form.title.as_deref(),
        form.price_override,
        form.quantity,
        &form.attributes,
    )
    .await?;
    tx.commit().await?;
    Ok(row)
}

/// Update a variant. Stock cannot drop below what is already allocated.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the variant does not exist,
/// [`DbError::Form`] for invalid attributes or stock, or [`DbError::Sqlx`]
/// on query failure.
pub async fn update_variant(
    pool: &PgPool,
    id: i64,
    form: &VariantForm,
) -> Result<VariantRow, DbError> {
    let mut tx = pool.begin().await?;

    let (product_id, allocated): (i64, i32) = sqlx::query_as(
        "SELECT product_id, quantity_allocated FROM product_variants WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if form.quantity < allocated {
        return Err(DbError::Form(FormErrors::single(
            "quantity",
            format!("must be at least the {allocated} units already allocated"),
        )));
    }
    check_variant_attributes(&mut tx, product_id, &form.attributes).await?;

    let sql = format!(
        "UPDATE product_variants \
         SET sku = $2, title = $3, price_override = $4, quantity = $5, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {VARIANT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, VariantRow>(&sql)
        .bind(id)
        .bind(&form.sku)
        .bind(form.title.as_deref())
        .bind(form.price_override)
        .bind(form.quantity)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM variant_attribute_values WHERE variant_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    write_variant_attributes(&mut tx, id, &form.attributes).await?;

    tx.commit().await?;
    Ok(row)
}

/// Delete a variant. Returns the owning product id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the variant does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_variant(pool: &PgPool, id: i64) -> Result<i64, DbError> {
    sqlx::query_scalar("DELETE FROM product_variants WHERE id = $1 RETURNING product_id")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Stock counters
// ---------------------------------------------------------------------------

/// Reserve `quantity` units, failing if that would exceed stock. The
/// condition and increment are one statement, so concurrent checkouts cannot
/// over-allocate.
pub(crate) async fn allocate_stock(
    conn: &mut PgConnection,
    variant_id: i64,
    quantity: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE product_variants \
         SET quantity_allocated = quantity_allocated + $2, updated_at = NOW() \
         WHERE id = $1 AND quantity_allocated + $2 <= quantity",
    )
    .bind(variant_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let current: Option<(i32, i32)> = sqlx::query_as(
            "SELECT quantity, quantity_allocated FROM product_variants WHERE id = $1",
        )
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await?;
        let (stock, allocated) = current.ok_or(DbError::NotFound)?;
        return Err(DbError::InsufficientStock {
            variant_id,
            requested: quantity,
            available: quantity_available(stock, allocated),
        });
    }
    Ok(())
}

/// Return `quantity` allocated units to availability.
pub(crate) async fn release_allocation(
    conn: &mut PgConnection,
    variant_id: i64,
    quantity: i32,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE product_variants \
         SET quantity_allocated = GREATEST(quantity_allocated - $2, 0), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(variant_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Ship `quantity` allocated units: both stock and allocation go down.
pub(crate) async fn consume_allocation(
    conn: &mut PgConnection,
    variant_id: i64,
    quantity: i32,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE product_variants \
         SET quantity = GREATEST(quantity - $2, 0), \
             quantity_allocated = GREATEST(quantity_allocated - $2, 0), \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(variant_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
