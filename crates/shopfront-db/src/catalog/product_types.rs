//! Database operations for `product_types` and their attribute roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{forms::ProductTypeForm, AttributeRole, ProductTypeSchema};
use sqlx::{PgConnection, PgPool};

use super::attributes::load_axes;
use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductTypeRow {
    pub id: i64,
    pub title: String,
    pub has_variants: bool,
    pub is_shipping_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct TypeAttributeRow {
    attribute_id: i64,
    role: String,
}

const TYPE_COLUMNS: &str = "id, title, has_variants, is_shipping_required, created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_product_types_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<ProductTypeRow>, DbError> {
    let sql = format!("SELECT {TYPE_COLUMNS} FROM product_types ORDER BY id LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, ProductTypeRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_types")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_product_type(pool: &PgPool, id: i64) -> Result<Option<ProductTypeRow>, DbError> {
    let sql = format!("SELECT {TYPE_COLUMNS} FROM product_types WHERE id = $1");
    let row = sqlx::query_as::<_, ProductTypeRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Pool-level wrapper around [`load_product_type_schema`].
///
/// # Errors
///
/// Returns [`DbError::Validation`] if the stored roles overlap, or
/// [`DbError::Sqlx`] on query failure.
pub async fn get_product_type_schema(
    pool: &PgPool,
    id: i64,
) -> Result<Option<ProductTypeSchema>, DbError> {
    let mut conn = pool.acquire().await?;
    load_product_type_schema(&mut conn, id).await
}

/// Load a product type with both attribute roles resolved into axes.
///
/// # Errors
///
/// Returns [`DbError::Validation`] if the stored roles overlap, or
/// [`DbError::Sqlx`] on query failure.
pub async fn load_product_type_schema(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<ProductTypeSchema>, DbError> {
    let sql = format!("SELECT {TYPE_COLUMNS} FROM product_types WHERE id = $1");
    let Some(product_type) = sqlx::query_as::<_, ProductTypeRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };

    let roles = sqlx::query_as::<_, TypeAttributeRow>(
        "SELECT attribute_id, role FROM product_type_attributes \
         WHERE product_type_id = $1 \
         ORDER BY position, attribute_id",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let ids_for = |role: AttributeRole| -> Vec<i64> {
        roles
            .iter()
            .filter(|r| AttributeRole::parse(&r.role) == Some(role))
            .map(|r| r.attribute_id)
            .collect()
    };
    let product_axes = load_axes(conn, &ids_for(AttributeRole::Product)).await?;
    let variant_axes = load_axes(conn, &ids_for(AttributeRole::Variant)).await?;

    let schema = ProductTypeSchema::new(
        product_type.id,
        product_type.title,
        product_type.has_variants,
        product_type.is_shipping_required,
        product_axes,
        variant_axes,
    )?;
    Ok(Some(schema))
}

/// # Errors
///
/// Returns [`DbError::Form`] for unknown attributes, or [`DbError::Sqlx`] on
/// query failure.
pub async fn create_product_type(
    pool: &PgPool,
    form: &ProductTypeForm,
) -> Result<ProductTypeRow, DbError> {
    let mut tx = pool.begin().await?;
    check_attribute_ids(&mut tx, form).await?;

    let sql = format!(
        "INSERT INTO product_types (title, has_variants, is_shipping_required) \
         VALUES ($1, $2, $3) \
         RETURNING {TYPE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProductTypeRow>(&sql)
        .bind(&form.title)
        .bind(form.has_variants)
        .bind(form.is_shipping_required)
        .fetch_one(&mut *tx)
        .await?;

    write_roles(&mut tx, row.id, form).await?;
    tx.commit().await?;
    Ok(row)
}

/// Update a product type and replace its attribute roles. Stored product
/// attribute values for attributes no longer declared are removed.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the type does not exist,
/// [`DbError::Form`] for unknown attributes, or [`DbError::Sqlx`] on query
/// failure.
pub async fn update_product_type(
    pool: &PgPool,
    id: i64,
    form: &ProductTypeForm,
) -> Result<ProductTypeRow, DbError> {
    let mut tx = pool.begin().await?;
    check_attribute_ids(&mut tx, form).await?;

    let sql = format!(
        "UPDATE product_types \
         SET title = $2, has_variants = $3, is_shipping_required = $4, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {TYPE_COLUMNS}"
    );
    let row = sqlx::query_as::<_, ProductTypeRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.has_variants)
        .bind(form.is_shipping_required)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

    sqlx::query("DELETE FROM product_type_attributes WHERE product_type_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    write_roles(&mut tx, id, form).await?;

    sqlx::query(
        "DELETE FROM product_attribute_values pav \
         USING products p \
         WHERE pav.product_id = p.id \
           AND p.product_type_id = $1 \
           AND NOT (pav.attribute_id = ANY($2))",
    )
    .bind(id)
    .bind(&form.product_attributes)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Delete a product type. Types still used by products cannot be deleted.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the type does not exist,
/// [`DbError::Form`] while products reference it, or [`DbError::Sqlx`] on
/// query failure.
pub async fn delete_product_type(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM product_types WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| super::map_foreign_key(e, "id", "product type is still in use"))?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

async fn check_attribute_ids(
    conn: &mut PgConnection,
    form: &ProductTypeForm,
) -> Result<(), DbError> {
    super::ensure_ids_exist(
        conn,
        "product_attributes",
        &form.product_attributes,
        "product_attributes",
    )
    .await?;
    super::ensure_ids_exist(
        conn,
        "product_attributes",
        &form.variant_attributes,
        "variant_attributes",
    )
    .await
}

async fn write_roles(
    conn: &mut PgConnection,
    product_type_id: i64,
    form: &ProductTypeForm,
) -> Result<(), DbError> {
    let roles = form
        .product_attributes
        .iter()
        .map(|id| (*id, AttributeRole::Product))
        .chain(
            form.variant_attributes
                .iter()
                .map(|id| (*id, AttributeRole::Variant)),
        );
    for (position, (attribute_id, role)) in roles.enumerate() {
        sqlx::query(
            "INSERT INTO product_type_attributes (product_type_id, attribute_id, role, position) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(product_type_id)
        .bind(attribute_id)
        .bind(role.as_str())
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
