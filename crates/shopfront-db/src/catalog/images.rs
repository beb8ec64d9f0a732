//! Database operations for `product_images`.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductImageRow {
    pub id: i64,
    pub product_id: i64,
    pub image: String,
    pub position: i32,
}

/// Images of a product in display order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_product_images(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ProductImageRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductImageRow>(
        "SELECT id, product_id, image, position FROM product_images \
         WHERE product_id = $1 \
         ORDER BY position, id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Make the product's images exactly `images`, in that order.
///
/// Images already attached keep their row; images no longer listed are
/// removed and new ones are appended.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist, or
/// [`DbError::Sqlx`] on query failure.
pub async fn replace_product_images(
    pool: &PgPool,
    product_id: i64,
    images: &[String],
) -> Result<Vec<ProductImageRow>, DbError> {
    let mut tx = pool.begin().await?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DbError::NotFound);
    }

    sqlx::query("DELETE FROM product_images WHERE product_id = $1 AND NOT (image = ANY($2))")
        .bind(product_id)
        .bind(images)
        .execute(&mut *tx)
        .await?;

    let existing: Vec<String> =
        sqlx::query_scalar("SELECT image FROM product_images WHERE product_id = $1")
            .bind(product_id)
            .fetch_all(&mut *tx)
            .await?;

    for (position, image) in images.iter().enumerate() {
        let position = i32::try_from(position).unwrap_or(i32::MAX);
        if existing.contains(image) {
            sqlx::query(
                "UPDATE product_images SET position = $3 WHERE product_id = $1 AND image = $2",
            )
            .bind(product_id)
            .bind(image)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "INSERT INTO product_images (product_id, image, position) VALUES ($1, $2, $3)",
            )
            .bind(product_id)
            .bind(image)
            .bind(position)
            .execute(&mut *tx)
            .await?;
        }
    }

    let rows = sqlx::query_as::<_, ProductImageRow>(
        "SELECT id, product_id, image, position FROM product_images \
         WHERE product_id = $1 \
         ORDER BY position, id",
    )
    .bind(product_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(rows)
}
