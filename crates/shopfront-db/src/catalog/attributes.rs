//! Database operations for `product_attributes` and their
//! `attribute_choice_values`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::{
    forms::AttributeForm, AttributeAxis, AttributeChoice, AttributeId, AttributeValueId,
};
use sqlx::{PgConnection, PgPool};

use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttributeRow {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttributeValueRow {
    pub id: i64,
    pub attribute_id: i64,
    pub title: String,
    pub position: i32,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_attributes_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<AttributeRow>, DbError> {
    let items = sqlx::query_as::<_, AttributeRow>(
        "SELECT id, title, created_at, updated_at FROM product_attributes \
         ORDER BY id LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_attributes")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_attribute(pool: &PgPool, id: i64) -> Result<Option<AttributeRow>, DbError> {
    let row = sqlx::query_as::<_, AttributeRow>(
        "SELECT id, title, created_at, updated_at FROM product_attributes WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Values of one attribute in declaration order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_attribute_values(
    pool: &PgPool,
    attribute_id: i64,
) -> Result<Vec<AttributeValueRow>, DbError> {
    let rows = sqlx::query_as::<_, AttributeValueRow>(
        "SELECT id, attribute_id, title, position FROM attribute_choice_values \
         WHERE attribute_id = $1 \
         ORDER BY position, id",
    )
    .bind(attribute_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Resolve attribute ids into axes, keeping the order of `ids`. Unknown ids
/// are skipped.
pub(crate) async fn load_axes(
    conn: &mut PgConnection,
    ids: &[i64],
) -> Result<Vec<AttributeAxis>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let attributes = sqlx::query_as::<_, (i64, String)>(
        "SELECT id, title FROM product_attributes WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    let values = sqlx::query_as::<_, AttributeValueRow>(
        "SELECT id, attribute_id, title, position FROM attribute_choice_values \
         WHERE attribute_id = ANY($1) \
         ORDER BY attribute_id, position, id",
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(assemble_axes(ids, attributes, values))
}

pub(crate) fn assemble_axes(
    ids: &[i64],
    attributes: Vec<(i64, String)>,
    values: Vec<AttributeValueRow>,
) -> Vec<AttributeAxis> {
    let mut titles: HashMap<i64, String> = attributes.into_iter().collect();
    let mut choices: HashMap<i64, Vec<AttributeChoice>> = HashMap::new();
    for value in values {
        choices
            .entry(value.attribute_id)
            .or_default()
            .push(AttributeChoice {
                id: AttributeValueId(value.id),
                title: value.title,
            });
    }
    ids.iter()
        .filter_map(|id| {
            let title = titles.remove(id)?;
            Some(AttributeAxis {
                id: AttributeId(*id),
                title,
                values: choices.remove(id).unwrap_or_default(),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Create an attribute with its values and attach it to the listed product
/// types as a product attribute.
///
/// # Errors
///
/// Returns [`DbError::Form`] for unknown product types, or [`DbError::Sqlx`]
/// on query failure (a duplicate title is a unique violation).
pub async fn create_attribute(pool: &PgPool, form: &AttributeForm) -> Result<AttributeRow, DbError> {
    let mut tx = pool.begin().await?;
    super::ensure_ids_exist(&mut tx, "product_types", &form.product_type_ids, "product_type_ids")
        .await?;

    let row = sqlx::query_as::<_, AttributeRow>(
        "INSERT INTO product_attributes (title) VALUES ($1) \
         RETURNING id, title, created_at, updated_at",
    )
    .bind(&form.title)
    .fetch_one(&mut *tx)
    .await?;

    sync_values(&mut tx, row.id, &form.values).await?;
    sync_product_types(&mut tx, row.id, &form.product_type_ids).await?;

    tx.commit().await?;
    Ok(row)
}

/// Rename an attribute and reconcile its values and product types.
///
/// Values are matched by title: kept values keep their id (so products
/// referencing them stay valid), missing ones are deleted, new ones are
/// inserted, and positions follow the submitted order.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the attribute does not exist,
/// [`DbError::Form`] for unknown product types, or [`DbError::Sqlx`] on
/// query failure.
pub async fn update_attribute(
    pool: &PgPool,
    id: i64,
    form: &AttributeForm,
) -> Result<AttributeRow, DbError> {
    let mut tx = pool.begin().await?;
    super::ensure_ids_exist(&mut tx, "product_types", &form.product_type_ids, "product_type_ids")
        .await?;

    let row = sqlx::query_as::<_, AttributeRow>(
        "UPDATE product_attributes SET title = $2, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING id, title, created_at, updated_at",
    )
    .bind(id)
    .bind(&form.title)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    sync_values(&mut tx, id, &form.values).await?;
    sync_product_types(&mut tx, id, &form.product_type_ids).await?;

    tx.commit().await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the attribute does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_attribute(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM product_attributes WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

async fn sync_values(
    conn: &mut PgConnection,
    attribute_id: i64,
    values: &[String],
) -> Result<(), DbError> {
    sqlx::query(
        "DELETE FROM attribute_choice_values \
         WHERE attribute_id = $1 AND NOT (title = ANY($2))",
    )
    .bind(attribute_id)
    .bind(values)
    .execute(&mut *conn)
    .await?;

    for (position, title) in values.iter().enumerate() {
        let position = i32::try_from(position).unwrap_or(i32::MAX);
        sqlx::query(
            "INSERT INTO attribute_choice_values (attribute_id, title, position) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (attribute_id, title) DO UPDATE SET position = EXCLUDED.position",
        )
        .bind(attribute_id)
        .bind(title)
        .bind(position)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Attach the attribute as a product attribute to exactly `product_type_ids`.
/// Types where it is already a variant attribute are left alone.
async fn sync_product_types(
    conn: &mut PgConnection,
    attribute_id: i64,
    product_type_ids: &[i64],
) -> Result<(), DbError> {
    sqlx::query(
        "DELETE FROM product_type_attributes \
         WHERE attribute_id = $1 AND role = 'product' AND NOT (product_type_id = ANY($2))",
    )
    .bind(attribute_id)
    .bind(product_type_ids)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO product_type_attributes (product_type_id, attribute_id, role, position) \
         SELECT t.id, $1, 'product', \
                COALESCE((SELECT MAX(position) + 1 FROM product_type_attributes \
                          WHERE product_type_id = t.id), 0) \
         FROM product_types t \
         WHERE t.id = ANY($2) \
         ON CONFLICT (product_type_id, attribute_id) DO NOTHING",
    )
    .bind(attribute_id)
    .bind(product_type_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(id: i64, attribute_id: i64, title: &str) -> AttributeValueRow {
        AttributeValueRow {
            id,
            attribute_id,
            title: title.to_string(),
            position: 0,
        }
    }

    #[test]
    fn assemble_axes_keeps_requested_order_and_skips_unknown() {
        let axes = assemble_axes(
            &[2, 9, 1],
            vec![(1, "Color".to_string()), (2, "Size".to_string())],
            vec![value(10, 1, "Red"), value(20, 2, "S"), value(21, 2, "M")],
        );
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[0].title, "Size");
        assert_eq!(axes[0].values.len(), 2);
        assert_eq!(axes[1].id, AttributeId(1));
        assert_eq!(axes[1].values[0].id, AttributeValueId(10));
    }

    #[test]
    fn attribute_without_values_yields_empty_axis() {
        let axes = assemble_axes(&[5], vec![(5, "Author".to_string())], vec![]);
        assert!(axes[0].values.is_empty());
    }
}
