//! Database operations for `collections` and their product membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfront_core::forms::CollectionForm;
use sqlx::{PgConnection, PgPool};

use crate::{DbError, Page};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CollectionRow {
    pub id: i64,
    pub title: String,
    pub background_img: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLLECTION_COLUMNS: &str = "id, title, background_img, created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_collections_page(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Page<CollectionRow>, DbError> {
    let sql =
        format!("SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY id LIMIT $1 OFFSET $2");
    let items = sqlx::query_as::<_, CollectionRow>(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
        .fetch_one(pool)
        .await?;
    Ok(Page { items, total })
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_collection(pool: &PgPool, id: i64) -> Result<Option<CollectionRow>, DbError> {
    let sql = format!("SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1");
    let row = sqlx::query_as::<_, CollectionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_collection_product_ids(
    pool: &PgPool,
    collection_id: i64,
) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar(
        "SELECT product_id FROM collection_products WHERE collection_id = $1 ORDER BY product_id",
    )
    .bind(collection_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// # Errors
///
/// Returns [`DbError::Form`] for unknown products, or [`DbError::Sqlx`] on
/// query failure.
pub async fn create_collection(
    pool: &PgPool,
    form: &CollectionForm,
) -> Result<CollectionRow, DbError> {
    let mut tx = pool.begin().await?;
    super::ensure_ids_exist(&mut tx, "products", &form.product_ids, "product_ids").await?;

    let sql = format!(
        "INSERT INTO collections (title, background_img) VALUES ($1, $2) \
         RETURNING {COLLECTION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollectionRow>(&sql)
        .bind(&form.title)
        .bind(form.background_img.as_deref())
        .fetch_one(&mut *tx)
        .await?;
    sync_products(&mut tx, row.id, &form.product_ids).await?;

    tx.commit().await?;
    Ok(row)
}

/// Update a collection and make its members exactly `form.product_ids`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the collection does not exist,
/// [`DbError::Form`] for unknown products, or [`DbError::Sqlx`] on query
/// failure.
pub async fn update_collection(
    pool: &PgPool,
    id: i64,
    form: &CollectionForm,
) -> Result<CollectionRow, DbError> {
    let mut tx = pool.begin().await?;
    super::ensure_ids_exist(&mut tx, "products", &form.product_ids, "product_ids").await?;

    let sql = format!(
        "UPDATE collections SET title = $2, background_img = $3, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {COLLECTION_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollectionRow>(&sql)
        .bind(id)
        .bind(&form.title)
        .bind(form.background_img.as_deref())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;
    sync_products(&mut tx, id, &form.product_ids).await?;

    tx.commit().await?;
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the collection does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn delete_collection(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

async fn sync_products(
    conn: &mut PgConnection,
    collection_id: i64,
    product_ids: &[i64],
) -> Result<(), DbError> {
    sqlx::query(
        "DELETE FROM collection_products \
         WHERE collection_id = $1 AND NOT (product_id = ANY($2))",
    )
    .bind(collection_id)
    .bind(product_ids)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO collection_products (collection_id, product_id) \
         SELECT $1, UNNEST($2::bigint[]) \
         ON CONFLICT DO NOTHING",
    )
    .bind(collection_id)
    .bind(product_ids)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
